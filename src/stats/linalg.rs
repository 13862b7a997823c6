use ndarray::Array2;

use crate::stats::vec::calc_mean;

// Calculate the pearson correlation coefficient
pub fn calc_pearson_correlation(x: &[f64], y: &[f64]) -> f64 {
    assert_eq!(
        x.len(),
        y.len(),
        "Pearson correlation requires equal length vectors."
    );

    let x_mean = calc_mean(x);
    let y_mean = calc_mean(y);
    let (mut numerator, mut denominator_x, mut denominator_y) = (0.0, 0.0, 0.0);

    for i in 0..x.len() {
        let (x_diff, y_diff) = (x[i] - x_mean, y[i] - y_mean);
        numerator += x_diff * y_diff;
        denominator_x += x_diff.powi(2);
        denominator_y += y_diff.powi(2);
    }

    numerator / (denominator_x * denominator_y).sqrt()
}

#[test]
fn test_calc_pearson_correlation() {
    use crate::util::numeric::round_f64;

    assert_eq!(
        round_f64(
            calc_pearson_correlation(&[5.0, 4.0, 5.0, 2.0, 4.0], &[0.0, 6.0, 3.0, 7.0, 0.0]),
            6,
        ),
        round_f64(-0.6864282924115621, 6)
    );
    assert_eq!(
        calc_pearson_correlation(&[-2.0, -1.0, 0.0, 1.0, 2.0], &[-2.0, -1.0, 0.0, 1.0, 2.0]),
        1.0
    );
}

/// Solve a square linear system by Gaussian elimination with partial
/// pivoting. Returns None when the system is singular.
pub fn solve_linear_system(mut a: Vec<Vec<f64>>, mut b: Vec<f64>) -> Option<Vec<f64>> {
    let n = b.len();
    for col in 0..n {
        // Pivot on the largest remaining entry in this column
        let mut pivot = col;
        for row in col + 1..n {
            if a[row][col].abs() > a[pivot][col].abs() {
                pivot = row;
            }
        }
        if a[pivot][col].abs() < 1e-12 {
            return None;
        }
        a.swap(col, pivot);
        b.swap(col, pivot);

        for row in col + 1..n {
            let factor = a[row][col] / a[col][col];
            for k in col..n {
                a[row][k] -= factor * a[col][k];
            }
            b[row] -= factor * b[col];
        }
    }

    // Back substitution
    let mut x = vec![0.0; n];
    for col in (0..n).rev() {
        let mut total = b[col];
        for k in col + 1..n {
            total -= a[col][k] * x[k];
        }
        x[col] = total / a[col][col];
    }
    Some(x)
}

#[test]
fn test_solve_linear_system() {
    let a = vec![vec![2.0, 1.0], vec![1.0, 3.0]];
    let b = vec![5.0, 10.0];
    let x = solve_linear_system(a, b).unwrap();
    assert!((x[0] - 1.0).abs() < 1e-12);
    assert!((x[1] - 3.0).abs() < 1e-12);

    let singular = vec![vec![1.0, 2.0], vec![2.0, 4.0]];
    assert!(solve_linear_system(singular, vec![1.0, 2.0]).is_none());
}

pub struct OlsFit {
    /// Intercept followed by one coefficient per predictor column.
    pub coefficients: Vec<f64>,
    pub sse: f64,
    pub sst: f64,
    pub df_model: f64,
    pub df_residual: f64,
}

/// Fit an ordinary least-squares regression of y on the predictor columns
/// (intercept included) via the normal equations.
pub fn ols_fit(x: &Array2<f64>, y: &[f64]) -> Result<OlsFit, String> {
    let n = y.len();
    let k = x.ncols();
    if x.nrows() != n {
        return Err("predictor and response lengths differ".to_string());
    }
    if n < k + 2 {
        return Err(format!(
            "{} observations are too few to fit {} predictors",
            n, k
        ));
    }

    // Normal equations X'X b = X'y with an intercept column prepended
    let p = k + 1;
    let mut xtx = vec![vec![0.0; p]; p];
    let mut xty = vec![0.0; p];
    for i in 0..n {
        let mut row = Vec::with_capacity(p);
        row.push(1.0);
        for j in 0..k {
            row.push(x[[i, j]]);
        }
        for a in 0..p {
            xty[a] += row[a] * y[i];
            for b in 0..p {
                xtx[a][b] += row[a] * row[b];
            }
        }
    }

    let coefficients = solve_linear_system(xtx, xty)
        .ok_or_else(|| "singular fit (collinear or constant predictors)".to_string())?;

    let y_mean = calc_mean(y);
    let mut sse = 0.0;
    let mut sst = 0.0;
    for i in 0..n {
        let mut y_hat = coefficients[0];
        for j in 0..k {
            y_hat += coefficients[j + 1] * x[[i, j]];
        }
        sse += (y[i] - y_hat).powi(2);
        sst += (y[i] - y_mean).powi(2);
    }

    Ok(OlsFit {
        coefficients,
        sse,
        sst,
        df_model: k as f64,
        df_residual: (n - k - 1) as f64,
    })
}

#[test]
fn test_ols_fit_exact_line() {
    let x = Array2::from_shape_vec((4, 1), vec![1.0, 2.0, 3.0, 4.0]).unwrap();
    let y = [3.0, 5.0, 7.0, 9.0]; // y = 1 + 2x
    let fit = ols_fit(&x, &y).unwrap();
    assert!((fit.coefficients[0] - 1.0).abs() < 1e-10);
    assert!((fit.coefficients[1] - 2.0).abs() < 1e-10);
    assert!(fit.sse < 1e-10);
}

#[test]
fn test_ols_fit_rejects_constant_predictor() {
    let x = Array2::from_shape_vec((4, 1), vec![2.0, 2.0, 2.0, 2.0]).unwrap();
    let y = [1.0, 2.0, 3.0, 4.0];
    assert!(ols_fit(&x, &y).is_err());
}

pub struct SlopeFit {
    pub intercept: f64,
    pub slope: f64,
    pub slope_se: f64,
    pub df: f64,
}

/// Fit a case-weighted simple regression and return the slope with its
/// standard error.
pub fn weighted_slope_fit(x: &[f64], y: &[f64], w: &[f64]) -> Result<SlopeFit, String> {
    let n = x.len();
    if y.len() != n || w.len() != n {
        return Err("x, y and weights must have equal lengths".to_string());
    }
    if n < 3 {
        return Err(format!("{} observations are too few for a slope test", n));
    }

    let w_sum: f64 = w.iter().sum();
    if w_sum <= 0.0 {
        return Err("case weights sum to zero".to_string());
    }
    let x_bar = x.iter().zip(w).map(|(&x_i, &w_i)| w_i * x_i).sum::<f64>() / w_sum;
    let y_bar = y.iter().zip(w).map(|(&y_i, &w_i)| w_i * y_i).sum::<f64>() / w_sum;

    let mut sxx = 0.0;
    let mut sxy = 0.0;
    for i in 0..n {
        sxx += w[i] * (x[i] - x_bar).powi(2);
        sxy += w[i] * (x[i] - x_bar) * (y[i] - y_bar);
    }
    if sxx < 1e-12 {
        return Err("predictor has no variance".to_string());
    }

    let slope = sxy / sxx;
    let intercept = y_bar - slope * x_bar;

    let df = (n - 2) as f64;
    let sse: f64 = (0..n)
        .map(|i| w[i] * (y[i] - intercept - slope * x[i]).powi(2))
        .sum();
    let slope_se = (sse / df / sxx).sqrt();

    Ok(SlopeFit {
        intercept,
        slope,
        slope_se,
        df,
    })
}

#[test]
fn test_weighted_slope_fit_unit_weights() {
    let x = [1.0, 2.0, 3.0, 4.0];
    let y = [2.0, 4.0, 6.0, 8.0];
    let w = [1.0, 1.0, 1.0, 1.0];
    let fit = weighted_slope_fit(&x, &y, &w).unwrap();
    assert!((fit.slope - 2.0).abs() < 1e-10);
    assert!((fit.intercept).abs() < 1e-10);
}

#[test]
fn test_weighted_slope_fit_weights_pull_slope() {
    // The heavily weighted pair (x: 0 -> 1, y: 0 -> 1) dominates the fit
    let x = [0.0, 1.0, 2.0, 3.0];
    let y = [0.0, 1.0, 10.0, 11.0];
    let w = [100.0, 100.0, 1.0, 1.0];
    let fit = weighted_slope_fit(&x, &y, &w).unwrap();
    assert!(fit.slope < 3.0, "slope was {}", fit.slope);
}
