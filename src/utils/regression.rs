//! Small-sample least squares with optional ridge regularization.
//!
//! The normal equations are solved by Cholesky decomposition, which is
//! stable for the two- and three-column designs used by the trend and
//! driver-regression models.

use crate::error::{ForecastError, Result};

/// Fit `y ≈ X·β` by minimizing `‖y − Xβ‖² + ridge·‖β‖²`.
///
/// `design` holds one row per observation; every row must have the same
/// number of columns. Returns `β` in column order.
pub fn least_squares(design: &[Vec<f64>], y: &[f64], ridge: f64) -> Result<Vec<f64>> {
    let n = y.len();
    if n == 0 {
        return Err(ForecastError::InsufficientHistory { needed: 1, got: 0 });
    }
    if design.len() != n {
        return Err(ForecastError::DimensionMismatch {
            expected: n,
            got: design.len(),
        });
    }
    let k = design[0].len();
    if k == 0 {
        return Err(ForecastError::InvalidConfiguration(
            "design matrix has no columns".into(),
        ));
    }
    if !(ridge >= 0.0 && ridge.is_finite()) {
        return Err(ForecastError::InvalidConfiguration(format!(
            "ridge coefficient must be finite and >= 0, got {ridge}"
        )));
    }

    let mut xtx = vec![vec![0.0; k]; k];
    let mut xty = vec![0.0; k];
    for (row, &target) in design.iter().zip(y) {
        if row.len() != k {
            return Err(ForecastError::DimensionMismatch {
                expected: k,
                got: row.len(),
            });
        }
        for i in 0..k {
            xty[i] += row[i] * target;
            for j in 0..k {
                xtx[i][j] += row[i] * row[j];
            }
        }
    }
    for i in 0..k {
        xtx[i][i] += ridge;
    }

    let beta = solve_symmetric(&xtx, &xty).ok_or_else(|| {
        ForecastError::NumericDegeneracy("normal equations are not positive definite".into())
    })?;

    if beta.iter().any(|b| !b.is_finite()) {
        return Err(ForecastError::NumericDegeneracy(
            "regression produced non-finite coefficients".into(),
        ));
    }
    Ok(beta)
}

/// Ordinary least-squares line through `(i, y[i])`, returned as
/// `(slope, intercept)`.
pub fn linear_trend(y: &[f64]) -> Result<(f64, f64)> {
    if y.len() < 2 {
        return Err(ForecastError::InsufficientHistory {
            needed: 2,
            got: y.len(),
        });
    }
    let design: Vec<Vec<f64>> = (0..y.len()).map(|i| vec![i as f64, 1.0]).collect();
    let beta = least_squares(&design, y, 0.0)?;
    Ok((beta[0], beta[1]))
}

/// Solve symmetric positive definite system `A·x = b` via `A = L·Lᵀ`.
fn solve_symmetric(a: &[Vec<f64>], b: &[f64]) -> Option<Vec<f64>> {
    let n = b.len();
    if n == 0 || a.len() != n {
        return None;
    }

    let mut l = vec![vec![0.0; n]; n];
    for i in 0..n {
        for j in 0..=i {
            let mut sum = a[i][j];
            for k in 0..j {
                sum -= l[i][k] * l[j][k];
            }
            if i == j {
                // Relative pivot floor catches rank-deficient designs that
                // round to a tiny positive pivot.
                if sum <= 1e-12 * a[i][i].abs().max(1.0) {
                    return None;
                }
                l[i][j] = sum.sqrt();
            } else {
                l[i][j] = sum / l[j][j];
            }
        }
    }

    let mut z = vec![0.0; n];
    for i in 0..n {
        let mut sum = b[i];
        for j in 0..i {
            sum -= l[i][j] * z[j];
        }
        z[i] = sum / l[i][i];
    }

    let mut x = vec![0.0; n];
    for i in (0..n).rev() {
        let mut sum = z[i];
        for j in (i + 1)..n {
            sum -= l[j][i] * x[j];
        }
        x[i] = sum / l[i][i];
    }
    Some(x)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn linear_trend_recovers_exact_line() {
        let y: Vec<f64> = (0..10).map(|i| 3.0 + 0.5 * i as f64).collect();
        let (slope, intercept) = linear_trend(&y).unwrap();
        assert_relative_eq!(slope, 0.5, epsilon = 1e-10);
        assert_relative_eq!(intercept, 3.0, epsilon = 1e-10);
    }

    #[test]
    fn linear_trend_of_constant_is_flat() {
        let (slope, intercept) = linear_trend(&[10.0; 8]).unwrap();
        assert_relative_eq!(slope, 0.0, epsilon = 1e-10);
        assert_relative_eq!(intercept, 10.0, epsilon = 1e-10);
    }

    #[test]
    fn least_squares_with_two_regressors() {
        // y = 1 + 2*a - 0.5*b
        let rows: Vec<(f64, f64)> = vec![
            (0.0, 1.0),
            (1.0, 0.0),
            (2.0, 3.0),
            (3.0, 1.0),
            (4.0, 5.0),
            (5.0, 2.0),
        ];
        let design: Vec<Vec<f64>> = rows.iter().map(|&(a, b)| vec![1.0, a, b]).collect();
        let y: Vec<f64> = rows.iter().map(|&(a, b)| 1.0 + 2.0 * a - 0.5 * b).collect();

        let beta = least_squares(&design, &y, 0.0).unwrap();
        assert_relative_eq!(beta[0], 1.0, epsilon = 1e-8);
        assert_relative_eq!(beta[1], 2.0, epsilon = 1e-8);
        assert_relative_eq!(beta[2], -0.5, epsilon = 1e-8);
    }

    #[test]
    fn collinear_design_is_degenerate_without_ridge() {
        let design: Vec<Vec<f64>> = (0..6).map(|i| vec![1.0, i as f64, 2.0 * i as f64]).collect();
        let y: Vec<f64> = (0..6).map(|i| i as f64).collect();

        assert!(matches!(
            least_squares(&design, &y, 0.0),
            Err(ForecastError::NumericDegeneracy(_))
        ));
        assert!(least_squares(&design, &y, 1e-3).is_ok());
    }

    #[test]
    fn rejects_mismatched_rows() {
        let design = vec![vec![1.0, 0.0], vec![1.0]];
        assert!(matches!(
            least_squares(&design, &[1.0, 2.0], 0.0),
            Err(ForecastError::DimensionMismatch { .. })
        ));
    }
}
