#[derive(Debug)]
pub enum CwmError {
    Error(String),
    InvalidInput(String),
    NotWeightedMean,
    DimensionMismatch(String),
    UnsupportedConfiguration(String),
    FitFailure { column: usize, reason: String },
    CsvError(csv::Error),
    IoError(std::io::Error),
    RayonError(rayon::ThreadPoolBuildError),
    ParseFloatError(std::num::ParseFloatError),
}

impl std::fmt::Display for CwmError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            CwmError::Error(e) => write!(f, "{}", e),
            CwmError::InvalidInput(e) => write!(f, "Invalid input: {}", e),
            CwmError::NotWeightedMean => write!(
                f,
                "The modified permutation test requires a weighted-mean object \
                 carrying its abundance and attribute matrices."
            ),
            CwmError::DimensionMismatch(e) => write!(f, "Dimension mismatch: {}", e),
            CwmError::UnsupportedConfiguration(e) => {
                write!(f, "Unsupported configuration: {}", e)
            }
            CwmError::FitFailure { column, reason } => {
                write!(f, "Fit failed for attribute column {}: {}", column, reason)
            }
            CwmError::CsvError(e) => write!(f, "CSV error: {}", e),
            CwmError::IoError(e) => write!(f, "IO error: {}", e),
            CwmError::RayonError(e) => write!(f, "Rayon error: {}", e),
            CwmError::ParseFloatError(e) => write!(f, "Parse float error: {}", e),
        }
    }
}

impl std::error::Error for CwmError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CwmError::Error(_) => None,
            CwmError::InvalidInput(_) => None,
            CwmError::NotWeightedMean => None,
            CwmError::DimensionMismatch(_) => None,
            CwmError::UnsupportedConfiguration(_) => None,
            CwmError::FitFailure { .. } => None,
            CwmError::CsvError(e) => Some(e),
            CwmError::IoError(e) => Some(e),
            CwmError::RayonError(e) => Some(e),
            CwmError::ParseFloatError(e) => Some(e),
        }
    }
}

pub type CwmResult<T> = Result<T, CwmError>;
