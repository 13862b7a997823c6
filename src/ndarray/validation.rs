use ndarray::Array2;

use crate::model::error::{CwmError, CwmResult};

pub fn contains_nan(x: &Array2<f64>) -> bool {
    for v in x.iter() {
        if v.is_nan() {
            return true;
        }
    }
    false
}

pub fn exit_if_nan(x: &Array2<f64>) -> CwmResult<()> {
    if contains_nan(x) {
        return Err(CwmError::InvalidInput(
            "NaN found in abundance matrix".to_string(),
        ));
    }
    Ok(())
}

pub fn exit_if_negative(x: &Array2<f64>) -> CwmResult<()> {
    for v in x.iter() {
        if *v < 0.0 {
            return Err(CwmError::InvalidInput(
                "negative abundance value found".to_string(),
            ));
        }
    }
    Ok(())
}

#[test]
fn test_contains_nan() {
    let mut x = Array2::zeros((2, 2));
    assert!(!contains_nan(&x));
    x[[1, 0]] = f64::NAN;
    assert!(contains_nan(&x));
}

#[test]
fn test_exit_if_negative() {
    let mut x = Array2::zeros((2, 2));
    assert!(exit_if_negative(&x).is_ok());
    x[[0, 1]] = -3.0;
    assert!(exit_if_negative(&x).is_err());
}
