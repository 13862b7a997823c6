use crate::model::outcome::FitResult;
use crate::stats::fit::FitContext;

/// A statistical fitter: takes a prepared context and returns the uniform
/// fit result, or a reason the fit could not be completed.
pub type FitFn = fn(&FitContext) -> Result<FitResult, String>;
