use crate::model::outcome::TestOutcome;
use crate::util::numeric::round_f64;

fn fmt_value(x: f64) -> String {
    if x.is_nan() {
        "NA".to_string()
    } else if x.is_infinite() {
        if x > 0.0 { "Inf".to_string() } else { "-Inf".to_string() }
    } else {
        format!("{}", round_f64(x, 4))
    }
}

fn fmt_optional(x: Option<f64>) -> String {
    match x {
        Some(x) => fmt_value(x),
        None => "-".to_string(),
    }
}

fn fmt_coefficients(coefficients: &[f64]) -> String {
    if coefficients.is_empty() {
        return "NA".to_string();
    }
    coefficients
        .iter()
        .map(|&c| fmt_value(c))
        .collect::<Vec<String>>()
        .join(", ")
}

/// Render a tabular summary of test outcomes, one row per attribute column.
pub fn render_table(outcomes: &[TestOutcome]) -> String {
    let headers = ["attribute", "coefficients", "statistic", "p_param", "p_standard", "p_modified"];
    let mut rows: Vec<Vec<String>> = vec![headers.iter().map(|h| h.to_string()).collect()];
    for outcome in outcomes {
        rows.push(vec![
            outcome.attribute.clone(),
            fmt_coefficients(&outcome.coefficients),
            fmt_value(outcome.statistic),
            fmt_value(outcome.p_parametric),
            fmt_optional(outcome.p_standard),
            fmt_optional(outcome.p_modified),
        ]);
    }

    // Pad each column to its widest cell
    let n_cols = headers.len();
    let widths: Vec<usize> = (0..n_cols)
        .map(|c| rows.iter().map(|r| r[c].len()).max().unwrap_or(0))
        .collect();

    let mut out = String::new();
    for row in &rows {
        let line: Vec<String> = row
            .iter()
            .enumerate()
            .map(|(c, cell)| format!("{:<width$}", cell, width = widths[c]))
            .collect();
        out.push_str(line.join("  ").trim_end());
        out.push('\n');
    }
    out
}

/// Render a per-column narrative summary, including the permutation counts
/// that actually contributed to each null distribution.
pub fn render_verbose(outcomes: &[TestOutcome]) -> String {
    let mut out = String::new();
    for outcome in outcomes {
        out.push_str(&format!("Attribute: {}\n", outcome.attribute));
        if let Some(reason) = &outcome.error {
            out.push_str(&format!("  fit failed: {}\n\n", reason));
            continue;
        }
        out.push_str(&format!(
            "  coefficients: {}\n  statistic: {} ({:?})\n  parametric p: {}\n",
            fmt_coefficients(&outcome.coefficients),
            fmt_value(outcome.statistic),
            outcome.tail,
            fmt_value(outcome.p_parametric),
        ));
        if let (Some(p), Some(n)) = (outcome.p_standard, outcome.n_standard) {
            out.push_str(&format!(
                "  standard permutation p: {} ({} permutations)\n",
                fmt_value(p),
                n
            ));
        }
        if let (Some(p), Some(n)) = (outcome.p_modified, outcome.n_modified) {
            out.push_str(&format!(
                "  modified permutation p: {} ({} permutations)\n",
                fmt_value(p),
                n
            ));
        }
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::method::Tail;

    fn outcome() -> TestOutcome {
        TestOutcome {
            attribute: "height".to_string(),
            coefficients: vec![0.5, 1.25],
            statistic: 12.3456789,
            tail: Tail::UpperOneSided,
            p_parametric: 0.00123,
            p_standard: Some(0.02),
            n_standard: Some(49),
            p_modified: None,
            n_modified: None,
            error: None,
        }
    }

    #[test]
    fn test_render_table_contains_values() {
        let table = render_table(&[outcome()]);
        assert!(table.contains("height"));
        assert!(table.contains("12.3457"));
        assert!(table.contains("0.02"));
        // Modified p was not computed
        assert!(table.lines().nth(1).unwrap().trim_end().ends_with('-'));
    }

    #[test]
    fn test_render_verbose_reports_permutation_count() {
        let text = render_verbose(&[outcome()]);
        assert!(text.contains("49 permutations"));
        assert!(!text.contains("modified"));
    }

    #[test]
    fn test_render_failed_column() {
        let failed = TestOutcome::failed("sla", Tail::TwoSided, "response has no variance".to_string());
        let table = render_table(&[failed.clone()]);
        assert!(table.contains("NA"));
        let text = render_verbose(&[failed]);
        assert!(text.contains("fit failed"));
    }
}
