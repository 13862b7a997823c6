use std::path::Path;
use std::str::FromStr;

use ndarray::Array2;

use crate::model::error::{CwmError, CwmResult};

/// A named numeric table read from CSV: header gives column names, the first
/// field of each record the row name. Empty fields and "NA" parse as NaN.
pub struct NamedTable {
    pub row_names: Vec<String>,
    pub col_names: Vec<String>,
    pub matrix: Array2<f64>,
}

impl NamedTable {
    pub fn from_path(path: &Path) -> CwmResult<Self> {
        let mut reader = csv::ReaderBuilder::new()
            .from_path(path)
            .map_err(CwmError::CsvError)?;

        // Parse the header line (column names)
        let col_names: Vec<String> = reader
            .headers()
            .map_err(CwmError::CsvError)?
            .iter()
            .skip(1)
            .map(|name| name.to_string())
            .collect();

        // Parse each record
        let mut row_names: Vec<String> = Vec::new();
        let mut values: Vec<f64> = Vec::new();
        for (line_no, result) in reader.records().enumerate() {
            let record = result.map_err(CwmError::CsvError)?;
            let row_name = record
                .get(0)
                .ok_or_else(|| CwmError::Error(format!("No row name at line {line_no}.")))?
                .to_string();
            if record.len() != col_names.len() + 1 {
                return Err(CwmError::Error(format!(
                    "Expected {} fields at line {line_no}, found {}.",
                    col_names.len() + 1,
                    record.len()
                )));
            }
            for field in record.iter().skip(1) {
                if field.is_empty() || field == "NA" {
                    values.push(f64::NAN);
                } else {
                    values.push(f64::from_str(field).map_err(CwmError::ParseFloatError)?);
                }
            }
            row_names.push(row_name);
        }

        let matrix = Array2::from_shape_vec((row_names.len(), col_names.len()), values)
            .map_err(|e| CwmError::Error(e.to_string()))?;
        Ok(NamedTable {
            row_names,
            col_names,
            matrix,
        })
    }
}

/// Read the first column of a CSV file as a factor: (row names, level labels).
pub fn read_factor_column(path: &Path) -> CwmResult<(Vec<String>, String, Vec<String>)> {
    let mut reader = csv::ReaderBuilder::new()
        .from_path(path)
        .map_err(CwmError::CsvError)?;

    let name = reader
        .headers()
        .map_err(CwmError::CsvError)?
        .get(1)
        .ok_or_else(|| CwmError::Error("Factor file needs a value column.".to_string()))?
        .to_string();

    let mut row_names = Vec::new();
    let mut values = Vec::new();
    for (line_no, result) in reader.records().enumerate() {
        let record = result.map_err(CwmError::CsvError)?;
        let row_name = record
            .get(0)
            .ok_or_else(|| CwmError::Error(format!("No row name at line {line_no}.")))?;
        let value = record
            .get(1)
            .ok_or_else(|| CwmError::Error(format!("No factor value at line {line_no}.")))?;
        row_names.push(row_name.to_string());
        values.push(value.to_string());
    }
    Ok((row_names, name, values))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_named_table_round_trip() {
        let dir = std::env::temp_dir();
        let path = dir.join("cwmtest_table.csv");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, ",sp1,sp2,sp3").unwrap();
        writeln!(file, "sample1,1.5,NA,3").unwrap();
        writeln!(file, "sample2,0,2,").unwrap();
        drop(file);

        let table = NamedTable::from_path(&path).unwrap();
        assert_eq!(table.row_names, vec!["sample1", "sample2"]);
        assert_eq!(table.col_names, vec!["sp1", "sp2", "sp3"]);
        assert_eq!(table.matrix[[0, 0]], 1.5);
        assert!(table.matrix[[0, 1]].is_nan());
        assert_eq!(table.matrix[[1, 1]], 2.0);
        assert!(table.matrix[[1, 2]].is_nan());
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_factor_column() {
        let dir = std::env::temp_dir();
        let path = dir.join("cwmtest_factor.csv");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, ",moisture").unwrap();
        writeln!(file, "sample1,wet").unwrap();
        writeln!(file, "sample2,dry").unwrap();
        drop(file);

        let (rows, name, values) = read_factor_column(&path).unwrap();
        assert_eq!(rows, vec!["sample1", "sample2"]);
        assert_eq!(name, "moisture");
        assert_eq!(values, vec!["wet", "dry"]);
        std::fs::remove_file(&path).ok();
    }
}
