use std::collections::HashMap;

use ndarray::Array2;

use crate::model::error::{CwmError, CwmResult};
use crate::ndarray::validation::{exit_if_nan, exit_if_negative};

/// A sample-by-species abundance matrix (e.g. percentage cover).
/// Immutable once constructed; shared read-only by the weighted-mean
/// computation and the randomizer.
#[derive(Debug, Clone)]
pub struct AbundanceMatrix {
    pub samples: Vec<String>,
    pub species: Vec<String>,
    pub species_to_idx: HashMap<String, usize>,
    pub matrix: Array2<f64>,
}

impl AbundanceMatrix {
    pub fn new(
        samples: Vec<String>,
        species: Vec<String>,
        matrix: Array2<f64>,
    ) -> CwmResult<Self> {
        if matrix.nrows() != samples.len() || matrix.ncols() != species.len() {
            return Err(CwmError::DimensionMismatch(format!(
                "abundance matrix is {}x{} but {} samples and {} species were named",
                matrix.nrows(),
                matrix.ncols(),
                samples.len(),
                species.len()
            )));
        }
        exit_if_nan(&matrix)?;
        exit_if_negative(&matrix)?;
        let species_to_idx = species
            .iter()
            .enumerate()
            .map(|(i, sp)| (sp.clone(), i))
            .collect();
        Ok(AbundanceMatrix {
            samples,
            species,
            species_to_idx,
            matrix,
        })
    }

    pub fn n_samples(&self) -> usize {
        self.matrix.nrows()
    }

    pub fn n_species(&self) -> usize {
        self.matrix.ncols()
    }

    /// Total abundance per sample, used as case weights by the slope method.
    pub fn row_sums(&self) -> Vec<f64> {
        self.matrix.rows().into_iter().map(|row| row.sum()).collect()
    }
}

/// A species-by-attribute matrix of trait or indicator values.
/// Missing entries are stored as NaN and tracked per column.
#[derive(Debug, Clone)]
pub struct AttributeMatrix {
    pub species: Vec<String>,
    pub attributes: Vec<String>,
    pub matrix: Array2<f64>,
}

impl AttributeMatrix {
    pub fn new(
        species: Vec<String>,
        attributes: Vec<String>,
        matrix: Array2<f64>,
    ) -> CwmResult<Self> {
        if matrix.nrows() != species.len() || matrix.ncols() != attributes.len() {
            return Err(CwmError::DimensionMismatch(format!(
                "attribute matrix is {}x{} but {} species and {} attributes were named",
                matrix.nrows(),
                matrix.ncols(),
                species.len(),
                attributes.len()
            )));
        }
        Ok(AttributeMatrix {
            species,
            attributes,
            matrix,
        })
    }

    /// A single attribute column given as a plain vector.
    pub fn from_column(name: &str, species: Vec<String>, values: &[f64]) -> CwmResult<Self> {
        let matrix = Array2::from_shape_vec((values.len(), 1), values.to_vec())
            .map_err(|e| CwmError::Error(e.to_string()))?;
        Self::new(species, vec![name.to_string()], matrix)
    }

    pub fn n_species(&self) -> usize {
        self.matrix.nrows()
    }

    pub fn n_attributes(&self) -> usize {
        self.matrix.ncols()
    }

    /// Indices of species with a non-missing value for the given column.
    pub fn valid_species(&self, column: usize) -> Vec<usize> {
        self.matrix
            .column(column)
            .iter()
            .enumerate()
            .filter(|(_, v)| !v.is_nan())
            .map(|(i, _)| i)
            .collect()
    }
}

/// Environmental data: either one or more continuous columns, or a single
/// categorical factor (required by the ANOVA and Kruskal-Wallis methods).
#[derive(Debug, Clone)]
pub enum EnvData {
    Continuous {
        names: Vec<String>,
        matrix: Array2<f64>,
    },
    Categorical {
        name: String,
        codes: Vec<usize>,
        levels: Vec<String>,
    },
}

impl EnvData {
    pub fn from_column(name: &str, values: &[f64]) -> CwmResult<Self> {
        let matrix = Array2::from_shape_vec((values.len(), 1), values.to_vec())
            .map_err(|e| CwmError::Error(e.to_string()))?;
        Ok(EnvData::Continuous {
            names: vec![name.to_string()],
            matrix,
        })
    }

    pub fn from_columns(names: Vec<String>, matrix: Array2<f64>) -> CwmResult<Self> {
        if matrix.ncols() != names.len() {
            return Err(CwmError::DimensionMismatch(format!(
                "environment matrix has {} columns but {} names were given",
                matrix.ncols(),
                names.len()
            )));
        }
        Ok(EnvData::Continuous { names, matrix })
    }

    /// Encode a factor column: levels are assigned codes in first-seen order.
    pub fn from_factor(name: &str, values: &[String]) -> Self {
        let mut levels: Vec<String> = Vec::new();
        let mut level_to_code: HashMap<&str, usize> = HashMap::new();
        let mut codes = Vec::with_capacity(values.len());
        for value in values {
            let code = match level_to_code.get(value.as_str()) {
                Some(&code) => code,
                None => {
                    let code = levels.len();
                    levels.push(value.clone());
                    level_to_code.insert(value.as_str(), code);
                    code
                }
            };
            codes.push(code);
        }
        EnvData::Categorical {
            name: name.to_string(),
            codes,
            levels,
        }
    }

    pub fn n_samples(&self) -> usize {
        match self {
            EnvData::Continuous { matrix, .. } => matrix.nrows(),
            EnvData::Categorical { codes, .. } => codes.len(),
        }
    }

    pub fn n_columns(&self) -> usize {
        match self {
            EnvData::Continuous { matrix, .. } => matrix.ncols(),
            EnvData::Categorical { .. } => 1,
        }
    }

    pub fn n_levels(&self) -> usize {
        match self {
            EnvData::Continuous { .. } => 0,
            EnvData::Categorical { levels, .. } => levels.len(),
        }
    }
}

#[test]
fn test_abundance_matrix_rejects_mismatched_names() {
    let matrix = Array2::zeros((2, 3));
    let result = AbundanceMatrix::new(
        vec!["s1".to_string()],
        vec!["a".to_string(), "b".to_string(), "c".to_string()],
        matrix,
    );
    assert!(result.is_err());
}

#[test]
fn test_attribute_valid_species_mask() {
    let matrix =
        Array2::from_shape_vec((3, 1), vec![1.0, f64::NAN, 3.0]).unwrap();
    let attrs = AttributeMatrix::new(
        vec!["a".to_string(), "b".to_string(), "c".to_string()],
        vec!["height".to_string()],
        matrix,
    )
    .unwrap();
    assert_eq!(attrs.valid_species(0), vec![0, 2]);
}

#[test]
fn test_env_factor_codes() {
    let values = vec![
        "wet".to_string(),
        "dry".to_string(),
        "wet".to_string(),
        "mesic".to_string(),
    ];
    let env = EnvData::from_factor("moisture", &values);
    match env {
        EnvData::Categorical { codes, levels, .. } => {
            assert_eq!(codes, vec![0, 1, 0, 2]);
            assert_eq!(levels, vec!["wet", "dry", "mesic"]);
        }
        _ => panic!("expected categorical"),
    }
}
