use log::warn;
use ndarray::Array2;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;

use crate::method::randomize::randomize;
use crate::model::cwm::CwmMatrix;
use crate::model::error::{CwmError, CwmResult};
use crate::model::matrix::EnvData;
use crate::model::method::{CorrCoef, Dependence, ExecutionMode, TestMethod};
use crate::model::outcome::{FitResult, TestOutcome};
use crate::model::params::TestParams;
use crate::stats::fit::{FitContext, Predictor};
use crate::util::rayon::create_pool;

// Offsets the modified-test random streams from the standard-test streams
// when both run under the same base seed.
const MODIFIED_SEED_OFFSET: u64 = 0x9E37_79B9_7F4A_7C15;

/// Run the community-weighted mean permutation test.
///
/// Computes the real (parametric) statistic of the chosen method for every
/// attribute column, then derives up to two empirical p-values by ranking
/// the real statistic within null distributions built from row permutation
/// (standard test) and species-level attribute permutation (modified test).
///
/// Validation errors abort before any computation. A real-fit failure
/// annotates its column only; a failed permutation draw is excluded from
/// that column's null distribution and shrinks the denominator.
pub fn run_cwm_test(
    wm: &CwmMatrix,
    env: &EnvData,
    params: &TestParams,
) -> CwmResult<Vec<TestOutcome>> {
    let dependence = validate(wm, env, params)?;

    let weights = match params.method {
        TestMethod::Slope => Some(wm.case_weights()),
        _ => None,
    };

    // Real statistic per attribute column; failures annotate the column
    // without aborting the others
    let n_attributes = wm.n_attributes();
    let tail = params.method.tail(params.corr_coef);
    let mut real_fits: Vec<Result<FitResult, String>> = Vec::with_capacity(n_attributes);
    for j in 0..n_attributes {
        let column = wm.column_vec(j);
        real_fits.push(fit_column(
            &column,
            env,
            dependence,
            params.method,
            params.corr_coef,
            weights.as_deref(),
        ));
    }
    let active: Vec<usize> = (0..n_attributes)
        .filter(|&j| real_fits[j].is_ok())
        .collect();

    let standard_nulls = if params.test_kind.has_standard() && !active.is_empty() {
        Some(row_permutation_nulls(
            wm, env, params, dependence, weights.as_deref(), &active,
        )?)
    } else {
        None
    };

    let modified_nulls = if params.test_kind.has_modified() && !active.is_empty() {
        Some(attribute_permutation_nulls(
            wm, env, params, dependence, weights.as_deref(), &active,
        )?)
    } else {
        None
    };

    // Assemble one outcome per attribute column
    let mut outcomes = Vec::with_capacity(n_attributes);
    for (j, real) in real_fits.into_iter().enumerate() {
        let fit = match real {
            Ok(fit) => fit,
            Err(reason) => {
                warn!(
                    "real-statistic fit failed for attribute column {}: {}",
                    j, reason
                );
                outcomes.push(TestOutcome::failed(&wm.attributes[j], tail, reason));
                continue;
            }
        };
        let slot = active.iter().position(|&a| a == j);

        let (p_standard, n_standard) = empirical_p(&fit, slot, standard_nulls.as_deref(), j, "standard");
        let (p_modified, n_modified) = empirical_p(&fit, slot, modified_nulls.as_deref(), j, "modified");

        outcomes.push(TestOutcome {
            attribute: wm.attributes[j].clone(),
            coefficients: fit.coefficients,
            statistic: fit.statistic,
            tail: fit.tail,
            p_parametric: fit.p_value,
            p_standard,
            n_standard,
            p_modified,
            n_modified,
            error: None,
        });
    }
    Ok(outcomes)
}

/// Fatal precondition checks, run before any computation.
fn validate(wm: &CwmMatrix, env: &EnvData, params: &TestParams) -> CwmResult<Dependence> {
    if wm.n_samples() != env.n_samples() {
        return Err(CwmError::DimensionMismatch(format!(
            "weighted-mean matrix has {} samples but environment has {}",
            wm.n_samples(),
            env.n_samples()
        )));
    }
    if params.permutations < 1 {
        return Err(CwmError::InvalidInput(
            "permutation count must be at least 1".to_string(),
        ));
    }

    if params.method.requires_categorical() {
        if env.n_levels() < 2 {
            return Err(CwmError::UnsupportedConfiguration(format!(
                "{:?} requires a categorical environmental variable with at least 2 levels",
                params.method
            )));
        }
    } else {
        match env {
            EnvData::Continuous { matrix, .. } => {
                if params.method.single_column_only() && matrix.ncols() != 1 {
                    return Err(CwmError::UnsupportedConfiguration(format!(
                        "{:?} requires a single-column environmental variable, got {}",
                        params.method,
                        matrix.ncols()
                    )));
                }
            }
            EnvData::Categorical { .. } => {
                return Err(CwmError::UnsupportedConfiguration(format!(
                    "{:?} requires a continuous environmental variable",
                    params.method
                )));
            }
        }
    }

    let dependence = params.dependence.resolve(params.method);
    if dependence == Dependence::EnvIsResponse {
        if !matches!(params.method, TestMethod::Lm | TestMethod::Cor) {
            return Err(CwmError::UnsupportedConfiguration(format!(
                "{:?} only supports the weighted mean as the response",
                params.method
            )));
        }
        if env.n_columns() != 1 {
            return Err(CwmError::UnsupportedConfiguration(
                "a multi-column environment cannot be the response".to_string(),
            ));
        }
    }

    if params.test_kind.has_modified() && wm.provenance.is_none() {
        return Err(CwmError::NotWeightedMean);
    }
    Ok(dependence)
}

/// Fit the configured method for one weighted-mean column against the
/// environmental data, in the resolved dependence direction.
fn fit_column(
    cwm_column: &[f64],
    env: &EnvData,
    dependence: Dependence,
    method: TestMethod,
    corr_coef: CorrCoef,
    weights: Option<&[f64]>,
) -> Result<FitResult, String> {
    match dependence {
        Dependence::CwmIsResponse | Dependence::Auto => {
            let predictor = match env {
                EnvData::Continuous { matrix, .. } => Predictor::Continuous(matrix),
                EnvData::Categorical { codes, levels, .. } => Predictor::Categorical {
                    codes,
                    n_levels: levels.len(),
                },
            };
            let ctx = FitContext {
                response: cwm_column,
                predictor,
                corr_coef,
                weights,
            };
            (method.get_fn())(&ctx)
        }
        Dependence::EnvIsResponse => {
            let response = match env {
                EnvData::Continuous { matrix, .. } => matrix.column(0).to_vec(),
                EnvData::Categorical { .. } => {
                    return Err("a categorical environment cannot be the response".to_string())
                }
            };
            let x = Array2::from_shape_vec((cwm_column.len(), 1), cwm_column.to_vec())
                .map_err(|e| e.to_string())?;
            let ctx = FitContext {
                response: &response,
                predictor: Predictor::Continuous(&x),
                corr_coef,
                weights,
            };
            (method.get_fn())(&ctx)
        }
    }
}

/// Null statistics from row permutation: each draw shuffles the sample order
/// of the weighted-mean matrix (environment fixed) and refits every active
/// column. One statistic (or failure reason) per active column per draw.
fn row_permutation_nulls(
    wm: &CwmMatrix,
    env: &EnvData,
    params: &TestParams,
    dependence: Dependence,
    weights: Option<&[f64]>,
    active: &[usize],
) -> CwmResult<Vec<Vec<Result<f64, String>>>> {
    let n_samples = wm.n_samples();

    let one_draw = |draw: usize| -> Vec<Result<f64, String>> {
        let mut rng = ChaCha8Rng::seed_from_u64(params.seed.wrapping_add(draw as u64));
        let mut order: Vec<usize> = (0..n_samples).collect();
        order.shuffle(&mut rng);

        active
            .iter()
            .map(|&j| {
                let column: Vec<f64> = order.iter().map(|&i| wm.matrix[[i, j]]).collect();
                fit_column(&column, env, dependence, params.method, params.corr_coef, weights)
                    .map(|fit| fit.statistic)
            })
            .collect()
    };

    match &params.exec {
        ExecutionMode::Sequential => Ok((0..params.permutations).map(one_draw).collect()),
        ExecutionMode::Parallel { threads } => {
            let pool = create_pool(*threads)?;
            Ok(pool.install(|| (0..params.permutations).into_par_iter().map(one_draw).collect()))
        }
    }
}

/// Null statistics from attribute permutation: each draw re-shuffles species
/// attribute values and recomputes the weighted mean via the randomizer,
/// then refits every active column.
fn attribute_permutation_nulls(
    wm: &CwmMatrix,
    env: &EnvData,
    params: &TestParams,
    dependence: Dependence,
    weights: Option<&[f64]>,
    active: &[usize],
) -> CwmResult<Vec<Vec<Result<f64, String>>>> {
    randomize(
        wm,
        params.permutations,
        |drawn| {
            active
                .iter()
                .map(|&j| {
                    let column = drawn.column_vec(j);
                    fit_column(&column, env, dependence, params.method, params.corr_coef, weights)
                        .map(|fit| fit.statistic)
                })
                .collect()
        },
        &params.exec,
        params.seed.wrapping_add(MODIFIED_SEED_OFFSET),
    )
}

/// Empirical p-value for one column: the real statistic joins its null
/// distribution, and p is the fraction of the combined draws at least as
/// extreme as the real value. Failed draws are excluded from the
/// denominator.
fn empirical_p(
    fit: &FitResult,
    slot: Option<usize>,
    nulls: Option<&[Vec<Result<f64, String>>]>,
    column: usize,
    label: &str,
) -> (Option<f64>, Option<usize>) {
    let (nulls, slot) = match (nulls, slot) {
        (Some(nulls), Some(slot)) => (nulls, slot),
        _ => return (None, None),
    };

    let mut successes = 0usize;
    let mut as_extreme = 0usize;
    for (draw, stats) in nulls.iter().enumerate() {
        match &stats[slot] {
            Ok(statistic) => {
                successes += 1;
                if fit.tail.as_extreme(*statistic, fit.statistic) {
                    as_extreme += 1;
                }
            }
            Err(reason) => {
                warn!(
                    "{} permutation draw {} failed for attribute column {}: {}; \
                     excluded from the null distribution",
                    label, draw, column, reason
                );
            }
        }
    }

    // The real statistic always counts itself, hence the +1 on both sides
    let p = (as_extreme + 1) as f64 / (successes + 1) as f64;
    (Some(p), Some(successes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::cwm::weighted_mean;
    use crate::model::matrix::{AbundanceMatrix, AttributeMatrix};
    use crate::model::method::TestKind;

    fn example_wm(n_samples: usize) -> CwmMatrix {
        let samples = (0..n_samples).map(|i| format!("sample{}", i)).collect();
        let species: Vec<String> = (0..3).map(|i| format!("sp{}", i)).collect();
        // Composition drifts along the sample sequence so the weighted mean
        // carries a gradient
        let mut data = Vec::with_capacity(n_samples * 3);
        for i in 0..n_samples {
            let t = i as f64 / (n_samples - 1) as f64;
            data.extend_from_slice(&[10.0 * (1.0 - t) + 1.0, 5.0, 10.0 * t + 1.0]);
        }
        let matrix = Array2::from_shape_vec((n_samples, 3), data).unwrap();
        let abundance = AbundanceMatrix::new(samples, species.clone(), matrix).unwrap();
        let attrs = AttributeMatrix::from_column("trait", species, &[1.0, 2.0, 3.0]).unwrap();
        weighted_mean(&abundance, &attrs).unwrap()
    }

    /// A 10-species community with abundance optima spaced along the sample
    /// gradient, so the weighted mean tracks the gradient closely but the
    /// row sums (and hence redraws) are not degenerate.
    fn gradient_community(n_samples: usize) -> CwmMatrix {
        let n_species = 10;
        let samples = (0..n_samples).map(|i| format!("sample{}", i)).collect();
        let species: Vec<String> = (0..n_species).map(|i| format!("sp{}", i)).collect();
        let mut data = Vec::with_capacity(n_samples * n_species);
        for i in 0..n_samples {
            let t = i as f64 / (n_samples - 1) as f64;
            for k in 0..n_species {
                let c = k as f64 / (n_species - 1) as f64;
                let cover = (1.0 - 2.0 * (t - c).abs()).max(0.05) * 10.0;
                data.push(cover);
            }
        }
        let matrix = Array2::from_shape_vec((n_samples, n_species), data).unwrap();
        let abundance = AbundanceMatrix::new(samples, species.clone(), matrix).unwrap();
        let values: Vec<f64> = (0..n_species).map(|k| (k + 1) as f64).collect();
        let attrs = AttributeMatrix::from_column("trait", species, &values).unwrap();
        weighted_mean(&abundance, &attrs).unwrap()
    }

    fn params(method: TestMethod, test_kind: TestKind, permutations: usize) -> TestParams {
        TestParams::new(
            method,
            CorrCoef::Pearson,
            Dependence::Auto,
            test_kind,
            permutations,
            ExecutionMode::Sequential,
            1234,
        )
    }

    #[test]
    fn test_perfect_correlation_minimum_p() {
        // The weighted mean tracks the gradient almost exactly, so both
        // empirical p-values bottom out at 1/(N+1)
        let wm = gradient_community(30);
        let env_values: Vec<f64> = (0..30).map(|i| i as f64).collect();
        let env = EnvData::from_column("gradient", &env_values).unwrap();
        let outcomes = run_cwm_test(&wm, &env, &params(TestMethod::Cor, TestKind::Both, 49)).unwrap();
        assert_eq!(outcomes.len(), 1);
        let outcome = &outcomes[0];
        assert!(outcome.error.is_none());
        assert!(outcome.p_parametric < 1e-6);
        assert_eq!(outcome.p_standard, Some(1.0 / 50.0));
        assert_eq!(outcome.p_modified, Some(1.0 / 50.0));
        assert_eq!(outcome.n_standard, Some(49));
        assert_eq!(outcome.n_modified, Some(49));
    }

    #[test]
    fn test_modified_without_provenance_fails() {
        let wm = example_wm(10);
        let bare = CwmMatrix::from_matrix(
            wm.samples.clone(),
            wm.attributes.clone(),
            wm.matrix.clone(),
        )
        .unwrap();
        let env_values: Vec<f64> = (0..10).map(|i| i as f64).collect();
        let env = EnvData::from_column("gradient", &env_values).unwrap();
        let result = run_cwm_test(&bare, &env, &params(TestMethod::Cor, TestKind::Modified, 49));
        assert!(matches!(result, Err(CwmError::NotWeightedMean)));
        // The standard test has no provenance requirement
        let result = run_cwm_test(&bare, &env, &params(TestMethod::Cor, TestKind::Standard, 49));
        assert!(result.is_ok());
    }

    #[test]
    fn test_correlation_rejects_multi_column_env() {
        let wm = example_wm(10);
        let env_matrix = Array2::zeros((10, 2));
        let env = EnvData::from_columns(vec!["a".to_string(), "b".to_string()], env_matrix).unwrap();
        let result = run_cwm_test(&wm, &env, &params(TestMethod::Cor, TestKind::Standard, 49));
        assert!(matches!(result, Err(CwmError::UnsupportedConfiguration(_))));
    }

    #[test]
    fn test_anova_rejects_continuous_env() {
        let wm = example_wm(10);
        let env_values: Vec<f64> = (0..10).map(|i| i as f64).collect();
        let env = EnvData::from_column("gradient", &env_values).unwrap();
        let result = run_cwm_test(&wm, &env, &params(TestMethod::Anova, TestKind::Standard, 49));
        assert!(matches!(result, Err(CwmError::UnsupportedConfiguration(_))));
    }

    #[test]
    fn test_dimension_mismatch_is_fatal() {
        let wm = example_wm(10);
        let env = EnvData::from_column("gradient", &[1.0, 2.0, 3.0]).unwrap();
        let result = run_cwm_test(&wm, &env, &params(TestMethod::Cor, TestKind::Standard, 49));
        assert!(matches!(result, Err(CwmError::DimensionMismatch(_))));
    }

    #[test]
    fn test_fixed_seed_is_deterministic() {
        let wm = example_wm(12);
        let env_values: Vec<f64> = (0..12).map(|i| ((i * 7) % 5) as f64).collect();
        let env = EnvData::from_column("noise", &env_values).unwrap();
        let p = params(TestMethod::Cor, TestKind::Both, 99);
        let first = run_cwm_test(&wm, &env, &p).unwrap();
        let second = run_cwm_test(&wm, &env, &p).unwrap();
        assert_eq!(first[0].p_standard, second[0].p_standard);
        assert_eq!(first[0].p_modified, second[0].p_modified);
    }

    #[test]
    fn test_parallel_matches_sequential() {
        let wm = example_wm(12);
        let env_values: Vec<f64> = (0..12).map(|i| ((i * 7) % 5) as f64).collect();
        let env = EnvData::from_column("noise", &env_values).unwrap();
        let sequential = run_cwm_test(&wm, &env, &params(TestMethod::Cor, TestKind::Both, 49)).unwrap();
        let mut par_params = params(TestMethod::Cor, TestKind::Both, 49);
        par_params.exec = ExecutionMode::Parallel { threads: 4 };
        let parallel = run_cwm_test(&wm, &env, &par_params).unwrap();
        assert_eq!(sequential[0].p_standard, parallel[0].p_standard);
        assert_eq!(sequential[0].p_modified, parallel[0].p_modified);
    }

    #[test]
    fn test_p_values_are_rank_fractions() {
        // Every empirical p-value must be k / (N + 1) for integer k in [1, N+1]
        let wm = example_wm(12);
        let env_values: Vec<f64> = (0..12).map(|i| ((i * 5) % 7) as f64).collect();
        let env = EnvData::from_column("noise", &env_values).unwrap();
        let n = 49usize;
        let outcomes = run_cwm_test(&wm, &env, &params(TestMethod::Lm, TestKind::Both, n)).unwrap();
        for p in [outcomes[0].p_standard.unwrap(), outcomes[0].p_modified.unwrap()] {
            let k = p * (n + 1) as f64;
            assert!((k - k.round()).abs() < 1e-9, "p = {} is not k/(N+1)", p);
            assert!(k >= 1.0 - 1e-9 && k <= (n + 1) as f64 + 1e-9);
        }
    }

    #[test]
    fn test_null_relationship_p_not_extreme() {
        // Uncorrelated environment: the empirical p-value should land well
        // away from the significant end
        let wm = gradient_community(20);
        let env_values: Vec<f64> = (0..20).map(|i| ((i * 13) % 11) as f64).collect();
        let env = EnvData::from_column("noise", &env_values).unwrap();
        let outcomes = run_cwm_test(&wm, &env, &params(TestMethod::Cor, TestKind::Both, 199)).unwrap();
        assert!(outcomes[0].p_standard.unwrap() > 0.01);
        assert!(outcomes[0].p_modified.unwrap() > 0.005);
    }

    #[test]
    fn test_all_missing_column_annotated_not_fatal() {
        // Second attribute column is entirely missing: its fit fails, the
        // first column still reports
        let samples: Vec<String> = (0..10).map(|i| format!("sample{}", i)).collect();
        let species: Vec<String> = (0..3).map(|i| format!("sp{}", i)).collect();
        let mut data = Vec::new();
        for i in 0..10 {
            let t = i as f64;
            data.extend_from_slice(&[t + 1.0, 5.0, 10.0 - t]);
        }
        let abundance = AbundanceMatrix::new(
            samples,
            species.clone(),
            Array2::from_shape_vec((10, 3), data).unwrap(),
        )
        .unwrap();
        let attr_matrix = Array2::from_shape_vec(
            (3, 2),
            vec![1.0, f64::NAN, 2.0, f64::NAN, 3.0, f64::NAN],
        )
        .unwrap();
        let attrs = AttributeMatrix::new(
            species,
            vec!["trait".to_string(), "empty".to_string()],
            attr_matrix,
        )
        .unwrap();
        let wm = weighted_mean(&abundance, &attrs).unwrap();

        let env_values: Vec<f64> = (0..10).map(|i| i as f64).collect();
        let env = EnvData::from_column("gradient", &env_values).unwrap();
        let outcomes = run_cwm_test(&wm, &env, &params(TestMethod::Cor, TestKind::Both, 49)).unwrap();
        assert_eq!(outcomes.len(), 2);
        assert!(outcomes[0].error.is_none());
        assert!(outcomes[0].p_modified.is_some());
        assert!(outcomes[1].error.is_some());
        assert!(outcomes[1].statistic.is_nan());
    }

    #[test]
    fn test_kruskal_and_anova_run_with_factor() {
        let wm = example_wm(12);
        let levels: Vec<String> = (0..12)
            .map(|i| if i < 6 { "low".to_string() } else { "high".to_string() })
            .collect();
        let env = EnvData::from_factor("group", &levels);
        for method in [TestMethod::Anova, TestMethod::Kruskal] {
            let outcomes = run_cwm_test(&wm, &env, &params(method, TestKind::Both, 49)).unwrap();
            let outcome = &outcomes[0];
            assert!(outcome.error.is_none());
            // Group split follows the gradient, so the test should come out
            // clearly significant in the parametric and standard senses
            assert!(outcome.p_parametric < 0.05);
            assert!(outcome.p_standard.unwrap() < 0.1);
        }
    }

    #[test]
    fn test_slope_direction_preserved() {
        let wm = example_wm(10);
        let env_values: Vec<f64> = (0..10).map(|i| -(i as f64)).collect();
        let env = EnvData::from_column("reversed", &env_values).unwrap();
        let outcomes = run_cwm_test(&wm, &env, &params(TestMethod::Slope, TestKind::Standard, 49)).unwrap();
        // Weighted mean increases along the gradient, env decreases
        assert!(outcomes[0].statistic < 0.0);
        assert!(outcomes[0].p_standard.unwrap() <= 2.0 / 50.0);
    }

    #[test]
    fn test_env_as_response_direction() {
        let wm = example_wm(10);
        let env_values: Vec<f64> = (0..10).map(|i| i as f64).collect();
        let env = EnvData::from_column("gradient", &env_values).unwrap();
        let mut p = params(TestMethod::Lm, TestKind::Standard, 49);
        p.dependence = Dependence::EnvIsResponse;
        let outcomes = run_cwm_test(&wm, &env, &p).unwrap();
        assert!(outcomes[0].error.is_none());
        assert_eq!(outcomes[0].p_standard, Some(1.0 / 50.0));
    }
}
