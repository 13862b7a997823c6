use clap::ValueEnum;

use crate::model::types::FitFn;
use crate::stats::fit::{fit_anova, fit_cor, fit_kruskal, fit_lm, fit_slope};

/// The statistical method relating weighted means to the environmental
/// variable(s).
#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum TestMethod {
    /// Linear regression (overall F-value)
    Lm,
    /// One-way ANOVA (F-value; categorical predictor)
    Anova,
    /// Correlation test (Pearson, Spearman or Kendall)
    Cor,
    /// Kruskal-Wallis test (categorical predictor)
    Kruskal,
    /// Regression slope with sample-total abundance as case weights
    Slope,
}

impl TestMethod {
    pub fn get_fn(&self) -> FitFn {
        match self {
            TestMethod::Lm => fit_lm,
            TestMethod::Anova => fit_anova,
            TestMethod::Cor => fit_cor,
            TestMethod::Kruskal => fit_kruskal,
            TestMethod::Slope => fit_slope,
        }
    }

    pub fn requires_categorical(&self) -> bool {
        matches!(self, TestMethod::Anova | TestMethod::Kruskal)
    }

    pub fn single_column_only(&self) -> bool {
        matches!(self, TestMethod::Cor | TestMethod::Slope)
    }

    /// Tail direction of the extracted statistic. The Spearman statistic (S)
    /// is negatively oriented, so its null comparison runs in the opposite
    /// direction to every other coefficient.
    pub fn tail(&self, corr_coef: CorrCoef) -> Tail {
        match self {
            TestMethod::Lm | TestMethod::Anova | TestMethod::Kruskal => Tail::UpperOneSided,
            TestMethod::Slope => Tail::TwoSided,
            TestMethod::Cor => match corr_coef {
                CorrCoef::Pearson | CorrCoef::Kendall => Tail::TwoSided,
                CorrCoef::Spearman => Tail::LowerOneSided,
            },
        }
    }
}

/// Correlation coefficient used by [`TestMethod::Cor`].
#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum CorrCoef {
    Pearson,
    Spearman,
    Kendall,
}

/// Which side of the relationship the weighted mean sits on.
#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum Dependence {
    /// Pick the conventional direction for the chosen method.
    Auto,
    /// Weighted mean is the response, environment the predictor.
    CwmIsResponse,
    /// Environment is the response, the weighted mean the predictor.
    EnvIsResponse,
}

impl Dependence {
    /// All methods conventionally model the weighted mean as the response.
    pub fn resolve(&self, _method: TestMethod) -> Dependence {
        match self {
            Dependence::Auto => Dependence::CwmIsResponse,
            other => *other,
        }
    }
}

/// Which null distributions to derive alongside the parametric p-value.
#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum TestKind {
    /// Row-permutation null only.
    Standard,
    /// Attribute-permutation null only (requires provenance).
    Modified,
    /// Both null distributions.
    Both,
}

impl TestKind {
    pub fn has_standard(&self) -> bool {
        matches!(self, TestKind::Standard | TestKind::Both)
    }

    pub fn has_modified(&self) -> bool {
        matches!(self, TestKind::Modified | TestKind::Both)
    }
}

/// Whether statistics are compared against the null distribution on one
/// side (and which side) or by absolute value.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Tail {
    UpperOneSided,
    LowerOneSided,
    TwoSided,
}

impl Tail {
    /// True when `draw` is at least as extreme as `real`.
    pub fn as_extreme(&self, draw: f64, real: f64) -> bool {
        match self {
            Tail::UpperOneSided => draw >= real,
            Tail::LowerOneSided => draw <= real,
            Tail::TwoSided => draw.abs() >= real.abs(),
        }
    }
}

/// How permutation draws are scheduled.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ExecutionMode {
    Sequential,
    Parallel { threads: usize },
}

impl ExecutionMode {
    pub fn from_threads(threads: usize) -> Self {
        if threads <= 1 {
            ExecutionMode::Sequential
        } else {
            ExecutionMode::Parallel { threads }
        }
    }
}

#[test]
fn test_tail_comparison_directions() {
    assert!(Tail::UpperOneSided.as_extreme(2.0, 1.0));
    assert!(!Tail::UpperOneSided.as_extreme(0.5, 1.0));
    assert!(Tail::LowerOneSided.as_extreme(0.5, 1.0));
    assert!(!Tail::LowerOneSided.as_extreme(2.0, 1.0));
    assert!(Tail::TwoSided.as_extreme(-2.0, 1.0));
    assert!(!Tail::TwoSided.as_extreme(0.5, -1.0));
}

#[test]
fn test_spearman_tail_inverts() {
    assert_eq!(TestMethod::Cor.tail(CorrCoef::Spearman), Tail::LowerOneSided);
    assert_eq!(TestMethod::Cor.tail(CorrCoef::Pearson), Tail::TwoSided);
    assert_eq!(TestMethod::Lm.tail(CorrCoef::Pearson), Tail::UpperOneSided);
}

#[test]
fn test_dependence_defaults_to_cwm_response() {
    assert_eq!(
        Dependence::Auto.resolve(TestMethod::Kruskal),
        Dependence::CwmIsResponse
    );
    assert_eq!(
        Dependence::EnvIsResponse.resolve(TestMethod::Lm),
        Dependence::EnvIsResponse
    );
}
