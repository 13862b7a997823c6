//! Community-weighted means of species attributes, and permutation tests of
//! their relationship to environmental variables.
//!
//! The modified (attribute-permutation) test shuffles species-level
//! attribute values and recomputes the weighted means before refitting,
//! which corrects the compositional-autocorrelation bias that inflates the
//! significance of weighted-mean statistics under standard row permutation.

pub mod method;
pub mod ndarray;

pub mod util;
pub mod model;
pub mod stats;

pub use crate::method::perm_test::run_cwm_test;
pub use crate::method::randomize::randomize;
pub use crate::model::cwm::{weighted_mean, CwmMatrix};
pub use crate::model::error::{CwmError, CwmResult};
