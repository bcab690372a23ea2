//! Accuracy metrics for forecast evaluation.

use crate::error::{ForecastError, Result};
use serde::{Deserialize, Serialize};

/// Error summary over a set of forecast errors (`actual - predicted`).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AccuracyMetrics {
    /// Number of scored forecasts.
    pub n: usize,
    /// Mean Absolute Error
    pub mae: f64,
    /// Root Mean Squared Error
    pub rmse: f64,
    /// Fraction of errors whose sign matches the previous error's sign.
    pub hit_rate: f64,
}

/// Calculate metrics from errors given in fold order.
pub fn calculate_metrics(errors: &[f64]) -> Result<AccuracyMetrics> {
    if errors.is_empty() {
        return Err(ForecastError::EmptyData);
    }
    let n = errors.len() as f64;
    let mae = errors.iter().map(|e| e.abs()).sum::<f64>() / n;
    let mse = errors.iter().map(|e| e * e).sum::<f64>() / n;

    Ok(AccuracyMetrics {
        n: errors.len(),
        mae,
        rmse: mse.sqrt(),
        hit_rate: hit_rate(errors),
    })
}

/// Directional consistency: share of positions where `sign(e[t])` equals
/// `sign(e[t-1])`. The first error is compared against a zero sign.
pub fn hit_rate(errors: &[f64]) -> f64 {
    if errors.is_empty() {
        return f64::NAN;
    }
    let mut previous = 0.0;
    let mut hits = 0usize;
    for &e in errors {
        if sign(e) == previous {
            hits += 1;
        }
        previous = sign(e);
    }
    hits as f64 / errors.len() as f64
}

/// Three-valued sign: `-1`, `0` or `1`. Unlike `f64::signum`, zero maps to zero.
pub fn sign(x: f64) -> f64 {
    if x > 0.0 {
        1.0
    } else if x < 0.0 {
        -1.0
    } else {
        0.0
    }
}
