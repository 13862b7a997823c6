use ndarray::Array2;
use statrs::distribution::{ChiSquared, ContinuousCDF, FisherSnedecor, Normal, StudentsT};

use crate::model::method::{CorrCoef, Tail};
use crate::model::outcome::FitResult;
use crate::ndarray::filter::take_rows;
use crate::stats::linalg::{calc_pearson_correlation, ols_fit, weighted_slope_fit};
use crate::stats::vec::{rank_average, tie_correction};

/// The independent variable handed to a fitter.
pub enum Predictor<'a> {
    /// Samples-by-k matrix of continuous columns.
    Continuous(&'a Array2<f64>),
    /// Group codes of a factor with the given number of levels.
    Categorical { codes: &'a [usize], n_levels: usize },
}

/// Everything a fitter needs: response column, predictor, and per-method
/// options. Built once per (column, draw) by the engine.
pub struct FitContext<'a> {
    pub response: &'a [f64],
    pub predictor: Predictor<'a>,
    pub corr_coef: CorrCoef,
    /// Case weights for the slope method; None means unit weights.
    pub weights: Option<&'a [f64]>,
}

/// Indices of rows usable by a fit: response non-missing, and every
/// continuous predictor column non-missing.
fn complete_rows(ctx: &FitContext) -> Vec<usize> {
    (0..ctx.response.len())
        .filter(|&i| {
            if ctx.response[i].is_nan() {
                return false;
            }
            match &ctx.predictor {
                Predictor::Continuous(x) => (0..x.ncols()).all(|j| !x[[i, j]].is_nan()),
                Predictor::Categorical { .. } => true,
            }
        })
        .collect()
}

fn take(values: &[f64], rows: &[usize]) -> Vec<f64> {
    rows.iter().map(|&i| values[i]).collect()
}

fn f_p_value(statistic: f64, df1: f64, df2: f64) -> Result<f64, String> {
    if !statistic.is_finite() {
        return Ok(0.0);
    }
    let dist = FisherSnedecor::new(df1, df2).map_err(|e| e.to_string())?;
    Ok((1.0 - dist.cdf(statistic)).clamp(0.0, 1.0))
}

fn t_p_value_two_sided(statistic: f64, df: f64) -> Result<f64, String> {
    if !statistic.is_finite() {
        return Ok(0.0);
    }
    let dist = StudentsT::new(0.0, 1.0, df).map_err(|e| e.to_string())?;
    Ok((2.0 * (1.0 - dist.cdf(statistic.abs()))).clamp(0.0, 1.0))
}

/// Linear regression of the response on one or more continuous predictors.
/// Statistic: overall F-value of the fit.
pub fn fit_lm(ctx: &FitContext) -> Result<FitResult, String> {
    let x_full = match &ctx.predictor {
        Predictor::Continuous(x) => *x,
        Predictor::Categorical { .. } => {
            return Err("linear regression requires a continuous predictor".to_string())
        }
    };
    let rows = complete_rows(ctx);
    let y = take(ctx.response, &rows);
    let x = take_rows(x_full, &rows);

    let fit = ols_fit(&x, &y)?;
    if fit.sst < 1e-12 {
        return Err("response has no variance".to_string());
    }
    let statistic = if fit.sse > 1e-12 {
        ((fit.sst - fit.sse) / fit.df_model) / (fit.sse / fit.df_residual)
    } else {
        f64::INFINITY
    };
    let p_value = f_p_value(statistic, fit.df_model, fit.df_residual)?;

    Ok(FitResult {
        coefficients: fit.coefficients,
        statistic,
        p_value,
        tail: Tail::UpperOneSided,
    })
}

fn group_values(y: &[f64], codes: &[usize], n_levels: usize) -> Vec<Vec<f64>> {
    let mut groups: Vec<Vec<f64>> = vec![Vec::new(); n_levels];
    for (&value, &code) in y.iter().zip(codes) {
        groups[code].push(value);
    }
    groups.retain(|g| !g.is_empty());
    groups
}

/// One-way ANOVA of the response across factor levels.
/// Statistic: F from the ANOVA table. Coefficients: group means.
pub fn fit_anova(ctx: &FitContext) -> Result<FitResult, String> {
    let (codes, n_levels) = match &ctx.predictor {
        Predictor::Categorical { codes, n_levels } => (*codes, *n_levels),
        Predictor::Continuous(_) => {
            return Err("ANOVA requires a categorical predictor".to_string())
        }
    };
    let rows = complete_rows(ctx);
    let y = take(ctx.response, &rows);
    let group_codes = rows.iter().map(|&i| codes[i]).collect::<Vec<usize>>();
    let groups = group_values(&y, &group_codes, n_levels);

    let k = groups.len();
    if k < 2 {
        return Err("need at least 2 non-empty groups".to_string());
    }
    let n_total: usize = groups.iter().map(|g| g.len()).sum();
    if n_total <= k {
        return Err("total observations must exceed the number of groups".to_string());
    }

    let grand_mean = y.iter().sum::<f64>() / n_total as f64;
    let group_means: Vec<f64> = groups
        .iter()
        .map(|g| g.iter().sum::<f64>() / g.len() as f64)
        .collect();

    let ss_between: f64 = groups
        .iter()
        .zip(&group_means)
        .map(|(g, &m)| g.len() as f64 * (m - grand_mean).powi(2))
        .sum();
    let ss_within: f64 = groups
        .iter()
        .zip(&group_means)
        .map(|(g, &m)| g.iter().map(|&v| (v - m).powi(2)).sum::<f64>())
        .sum();

    let df_between = (k - 1) as f64;
    let df_within = (n_total - k) as f64;
    let ms_between = ss_between / df_between;
    let ms_within = ss_within / df_within;

    let statistic = if ms_within > 1e-12 {
        ms_between / ms_within
    } else if ms_between > 1e-12 {
        f64::INFINITY
    } else {
        return Err("response is constant".to_string());
    };
    let p_value = f_p_value(statistic, df_between, df_within)?;

    Ok(FitResult {
        coefficients: group_means,
        statistic,
        p_value,
        tail: Tail::UpperOneSided,
    })
}

/// Correlation test between the response and a single continuous column.
/// The statistic depends on the coefficient: t for Pearson, z for Kendall,
/// and S (sum of squared rank differences, negatively oriented) for
/// Spearman.
pub fn fit_cor(ctx: &FitContext) -> Result<FitResult, String> {
    let x_full = match &ctx.predictor {
        Predictor::Continuous(x) if x.ncols() == 1 => *x,
        _ => return Err("correlation requires a single continuous predictor".to_string()),
    };
    let rows = complete_rows(ctx);
    let y = take(ctx.response, &rows);
    let x: Vec<f64> = rows.iter().map(|&i| x_full[[i, 0]]).collect();

    let n = y.len();
    if n < 3 {
        return Err(format!("{} observations are too few for a correlation test", n));
    }

    match ctx.corr_coef {
        CorrCoef::Pearson => {
            let r = calc_pearson_correlation(&x, &y);
            if !r.is_finite() {
                return Err("a variable has no variance".to_string());
            }
            let denom = 1.0 - r * r;
            let statistic = if denom > 1e-12 {
                r * ((n as f64 - 2.0) / denom).sqrt()
            } else {
                f64::INFINITY * r.signum()
            };
            let p_value = t_p_value_two_sided(statistic, n as f64 - 2.0)?;
            Ok(FitResult {
                coefficients: vec![r],
                statistic,
                p_value,
                tail: Tail::TwoSided,
            })
        }
        CorrCoef::Spearman => {
            let rank_x = rank_average(&x);
            let rank_y = rank_average(&y);
            let rho = calc_pearson_correlation(&rank_x, &rank_y);
            if !rho.is_finite() {
                return Err("a variable has no variance in ranks".to_string());
            }
            let n_f = n as f64;
            // S is small for strong positive correlation, so its null
            // comparison runs on the lower tail.
            let statistic = (1.0 - rho) * (n_f.powi(3) - n_f) / 6.0;
            let denom = 1.0 - rho * rho;
            let t = if denom > 1e-12 {
                rho * ((n_f - 2.0) / denom).sqrt()
            } else {
                f64::INFINITY * rho.signum()
            };
            let p_value = t_p_value_two_sided(t, n_f - 2.0)?;
            Ok(FitResult {
                coefficients: vec![rho],
                statistic,
                p_value,
                tail: Tail::LowerOneSided,
            })
        }
        CorrCoef::Kendall => {
            let (tau, z) = kendall_tau(&x, &y)?;
            let p_value = {
                let dist = Normal::new(0.0, 1.0).map_err(|e| e.to_string())?;
                (2.0 * (1.0 - dist.cdf(z.abs()))).clamp(0.0, 1.0)
            };
            Ok(FitResult {
                coefficients: vec![tau],
                statistic: z,
                p_value,
                tail: Tail::TwoSided,
            })
        }
    }
}

/// Kendall's tau-b with the normal-approximation z statistic.
fn kendall_tau(x: &[f64], y: &[f64]) -> Result<(f64, f64), String> {
    let n = x.len();
    let mut concordant_minus_discordant = 0.0;
    let mut ties_x = 0.0;
    let mut ties_y = 0.0;
    for i in 0..n {
        for j in 0..i {
            let dx = (x[i] - x[j]).signum();
            let dy = (y[i] - y[j]).signum();
            if dx == 0.0 {
                ties_x += 1.0;
            }
            if dy == 0.0 {
                ties_y += 1.0;
            }
            concordant_minus_discordant += dx * dy;
        }
    }
    let n0 = (n * (n - 1)) as f64 / 2.0;
    let denom = ((n0 - ties_x) * (n0 - ties_y)).sqrt();
    if denom < 1e-12 {
        return Err("a variable has no variance".to_string());
    }
    let tau = concordant_minus_discordant / denom;
    let n_f = n as f64;
    let z = concordant_minus_discordant / (n_f * (n_f - 1.0) * (2.0 * n_f + 5.0) / 18.0).sqrt();
    Ok((tau, z))
}

/// Kruskal-Wallis rank-sum test across factor levels, with tie correction.
/// Statistic: H. Coefficients: mean rank per group.
pub fn fit_kruskal(ctx: &FitContext) -> Result<FitResult, String> {
    let (codes, n_levels) = match &ctx.predictor {
        Predictor::Categorical { codes, n_levels } => (*codes, *n_levels),
        Predictor::Continuous(_) => {
            return Err("Kruskal-Wallis requires a categorical predictor".to_string())
        }
    };
    let rows = complete_rows(ctx);
    let y = take(ctx.response, &rows);
    let group_codes = rows.iter().map(|&i| codes[i]).collect::<Vec<usize>>();

    let ranks = rank_average(&y);
    let rank_groups = group_values(&ranks, &group_codes, n_levels);
    let k = rank_groups.len();
    if k < 2 {
        return Err("need at least 2 non-empty groups".to_string());
    }
    let n = y.len();
    if n <= k {
        return Err("total observations must exceed the number of groups".to_string());
    }

    let n_f = n as f64;
    let rank_sum_term: f64 = rank_groups
        .iter()
        .map(|g| {
            let sum: f64 = g.iter().sum();
            sum * sum / g.len() as f64
        })
        .sum();
    let h = 12.0 / (n_f * (n_f + 1.0)) * rank_sum_term - 3.0 * (n_f + 1.0);

    let correction = tie_correction(&y);
    if correction <= 0.0 {
        return Err("response is constant".to_string());
    }
    let statistic = h / correction;

    let dist = ChiSquared::new((k - 1) as f64).map_err(|e| e.to_string())?;
    let p_value = (1.0 - dist.cdf(statistic)).clamp(0.0, 1.0);

    let mean_ranks = rank_groups
        .iter()
        .map(|g| g.iter().sum::<f64>() / g.len() as f64)
        .collect();

    Ok(FitResult {
        coefficients: mean_ranks,
        statistic,
        p_value,
        tail: Tail::UpperOneSided,
    })
}

/// Case-weighted regression slope of the response on a single continuous
/// predictor. Statistic: the slope itself, so direction is preserved.
pub fn fit_slope(ctx: &FitContext) -> Result<FitResult, String> {
    let x_full = match &ctx.predictor {
        Predictor::Continuous(x) if x.ncols() == 1 => *x,
        _ => return Err("slope regression requires a single continuous predictor".to_string()),
    };
    let rows = complete_rows(ctx);
    let y = take(ctx.response, &rows);
    let x: Vec<f64> = rows.iter().map(|&i| x_full[[i, 0]]).collect();
    let w: Vec<f64> = match ctx.weights {
        Some(w) => take(w, &rows),
        None => vec![1.0; rows.len()],
    };

    let fit = weighted_slope_fit(&x, &y, &w)?;
    let p_value = if fit.slope_se > 1e-12 {
        t_p_value_two_sided(fit.slope / fit.slope_se, fit.df)?
    } else {
        0.0
    };

    Ok(FitResult {
        coefficients: vec![fit.intercept, fit.slope],
        statistic: fit.slope,
        p_value,
        tail: Tail::TwoSided,
    })
}

#[cfg(test)]
fn column(values: &[f64]) -> Array2<f64> {
    Array2::from_shape_vec((values.len(), 1), values.to_vec()).unwrap()
}

#[test]
fn test_fit_lm_perfect_fit() {
    let x = column(&[1.0, 2.0, 3.0, 4.0, 5.0]);
    let y = [2.0, 4.0, 6.0, 8.0, 10.0];
    let ctx = FitContext {
        response: &y,
        predictor: Predictor::Continuous(&x),
        corr_coef: CorrCoef::Pearson,
        weights: None,
    };
    let fit = fit_lm(&ctx).unwrap();
    assert!(fit.statistic.is_infinite());
    assert_eq!(fit.p_value, 0.0);
    assert_eq!(fit.tail, Tail::UpperOneSided);
}

#[test]
fn test_fit_lm_skips_missing_rows() {
    let x = column(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
    let y = [2.1, f64::NAN, 5.9, 8.2, 9.8, 12.1];
    let ctx = FitContext {
        response: &y,
        predictor: Predictor::Continuous(&x),
        corr_coef: CorrCoef::Pearson,
        weights: None,
    };
    let fit = fit_lm(&ctx).unwrap();
    assert!(fit.statistic > 100.0);
    assert!(fit.p_value < 0.01);
}

#[test]
fn test_fit_anova_separated_groups() {
    let codes = [0usize, 0, 0, 1, 1, 1];
    let y = [1.0, 1.1, 0.9, 5.0, 5.1, 4.9];
    let ctx = FitContext {
        response: &y,
        predictor: Predictor::Categorical {
            codes: &codes,
            n_levels: 2,
        },
        corr_coef: CorrCoef::Pearson,
        weights: None,
    };
    let fit = fit_anova(&ctx).unwrap();
    assert!(fit.statistic > 100.0);
    assert!(fit.p_value < 0.001);
    assert_eq!(fit.coefficients.len(), 2);
    assert!((fit.coefficients[0] - 1.0).abs() < 1e-9);
    assert!((fit.coefficients[1] - 5.0).abs() < 1e-9);
}

#[test]
fn test_fit_cor_pearson_strong_positive() {
    let x = column(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
    let y = [1.1, 2.0, 2.9, 4.2, 5.1, 5.8];
    let ctx = FitContext {
        response: &y,
        predictor: Predictor::Continuous(&x),
        corr_coef: CorrCoef::Pearson,
        weights: None,
    };
    let fit = fit_cor(&ctx).unwrap();
    assert!(fit.coefficients[0] > 0.99);
    assert!(fit.statistic > 0.0);
    assert!(fit.p_value < 0.001);
    assert_eq!(fit.tail, Tail::TwoSided);
}

#[test]
fn test_fit_cor_spearman_statistic_orientation() {
    // Monotone increasing: rho = 1, so S = 0 (most extreme on the lower side)
    let x = column(&[1.0, 2.0, 3.0, 4.0, 5.0]);
    let y = [10.0, 20.0, 25.0, 40.0, 100.0];
    let ctx = FitContext {
        response: &y,
        predictor: Predictor::Continuous(&x),
        corr_coef: CorrCoef::Spearman,
        weights: None,
    };
    let fit = fit_cor(&ctx).unwrap();
    assert!((fit.coefficients[0] - 1.0).abs() < 1e-12);
    assert!(fit.statistic.abs() < 1e-9);
    assert_eq!(fit.tail, Tail::LowerOneSided);

    // Monotone decreasing: rho = -1, so S hits its maximum (n^3 - n) / 3
    let y_rev = [100.0, 40.0, 25.0, 20.0, 10.0];
    let ctx = FitContext {
        response: &y_rev,
        predictor: Predictor::Continuous(&x),
        corr_coef: CorrCoef::Spearman,
        weights: None,
    };
    let fit = fit_cor(&ctx).unwrap();
    assert!((fit.statistic - (125.0 - 5.0) / 3.0).abs() < 1e-9);
}

#[test]
fn test_fit_cor_kendall_sign() {
    let x = column(&[1.0, 2.0, 3.0, 4.0, 5.0]);
    let y = [5.0, 4.0, 3.0, 2.0, 1.0];
    let ctx = FitContext {
        response: &y,
        predictor: Predictor::Continuous(&x),
        corr_coef: CorrCoef::Kendall,
        weights: None,
    };
    let fit = fit_cor(&ctx).unwrap();
    assert!((fit.coefficients[0] + 1.0).abs() < 1e-12);
    assert!(fit.statistic < 0.0);
}

#[test]
fn test_fit_kruskal_separated_groups() {
    let codes = [0usize, 0, 0, 0, 1, 1, 1, 1];
    let y = [1.0, 2.0, 3.0, 4.0, 10.0, 11.0, 12.0, 13.0];
    let ctx = FitContext {
        response: &y,
        predictor: Predictor::Categorical {
            codes: &codes,
            n_levels: 2,
        },
        corr_coef: CorrCoef::Pearson,
        weights: None,
    };
    let fit = fit_kruskal(&ctx).unwrap();
    assert!(fit.statistic > 5.0);
    assert!(fit.p_value < 0.05);
}

#[test]
fn test_fit_slope_recovers_gradient() {
    let x = column(&[1.0, 2.0, 3.0, 4.0, 5.0]);
    let y = [1.2, 3.1, 4.9, 7.1, 8.9];
    let ctx = FitContext {
        response: &y,
        predictor: Predictor::Continuous(&x),
        corr_coef: CorrCoef::Pearson,
        weights: None,
    };
    let fit = fit_slope(&ctx).unwrap();
    assert!((fit.statistic - 1.95).abs() < 0.1);
    assert_eq!(fit.tail, Tail::TwoSided);
}

#[test]
fn test_fit_rejects_wrong_predictor_kind() {
    let codes = [0usize, 1, 0, 1];
    let y = [1.0, 2.0, 3.0, 4.0];
    let ctx = FitContext {
        response: &y,
        predictor: Predictor::Categorical {
            codes: &codes,
            n_levels: 2,
        },
        corr_coef: CorrCoef::Pearson,
        weights: None,
    };
    assert!(fit_lm(&ctx).is_err());
    assert!(fit_cor(&ctx).is_err());
    assert!(fit_slope(&ctx).is_err());
}

#[test]
fn test_fit_all_missing_response_fails() {
    let x = column(&[1.0, 2.0, 3.0, 4.0]);
    let y = [f64::NAN, f64::NAN, f64::NAN, f64::NAN];
    let ctx = FitContext {
        response: &y,
        predictor: Predictor::Continuous(&x),
        corr_coef: CorrCoef::Pearson,
        weights: None,
    };
    assert!(fit_lm(&ctx).is_err());
    assert!(fit_cor(&ctx).is_err());
}
