use crate::model::method::Tail;

/// Uniform result of a single statistical fit: coefficients, the test
/// statistic used for permutation ranking, the parametric p-value, and the
/// tail direction the statistic is compared in.
pub struct FitResult {
    pub coefficients: Vec<f64>,
    pub statistic: f64,
    pub p_value: f64,
    pub tail: Tail,
}

/// Terminal artifact of the permutation test: one per attribute column.
#[derive(Debug, Clone)]
pub struct TestOutcome {
    pub attribute: String,
    pub coefficients: Vec<f64>,
    pub statistic: f64,
    pub tail: Tail,
    pub p_parametric: f64,
    /// Standard (row-permutation) p-value, with the number of successful
    /// permutation draws behind it.
    pub p_standard: Option<f64>,
    pub n_standard: Option<usize>,
    /// Modified (attribute-permutation) p-value, with the number of
    /// successful permutation draws behind it.
    pub p_modified: Option<f64>,
    pub n_modified: Option<usize>,
    /// Set when the real-statistic fit failed for this column; all other
    /// statistic fields are NaN/empty in that case.
    pub error: Option<String>,
}

impl TestOutcome {
    /// Placeholder outcome for a column whose real fit failed.
    pub fn failed(attribute: &str, tail: Tail, reason: String) -> Self {
        TestOutcome {
            attribute: attribute.to_string(),
            coefficients: Vec::new(),
            statistic: f64::NAN,
            tail,
            p_parametric: f64::NAN,
            p_standard: None,
            n_standard: None,
            p_modified: None,
            n_modified: None,
            error: Some(reason),
        }
    }
}
