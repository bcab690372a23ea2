//! Forecast result and the per-category output record.

use serde::{Deserialize, Serialize};

/// Standard-normal quantile for a two-sided 80% interval.
pub const Z80: f64 = 1.2815515655446004;

/// An h-step-ahead forecast: point estimate plus optional uncertainty.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Forecast {
    horizon: usize,
    mean: f64,
    std_dev: Option<f64>,
    rmse: Option<f64>,
}

impl Forecast {
    /// Create a point forecast with undefined uncertainty.
    pub fn new(horizon: usize, mean: f64) -> Self {
        Self {
            horizon,
            mean,
            std_dev: None,
            rmse: None,
        }
    }

    pub fn with_std_dev(mut self, std_dev: f64) -> Self {
        self.std_dev = Some(std_dev).filter(|s| s.is_finite());
        self
    }

    /// Attach the in-sample RMSE (ignored when not finite).
    pub fn with_rmse(mut self, rmse: f64) -> Self {
        self.rmse = Some(rmse).filter(|r| r.is_finite());
        self
    }

    /// Replace the point estimate, keeping uncertainty.
    pub fn with_mean(mut self, mean: f64) -> Self {
        self.mean = mean;
        self
    }

    pub fn horizon(&self) -> usize {
        self.horizon
    }

    pub fn mean(&self) -> f64 {
        self.mean
    }

    pub fn std_dev(&self) -> Option<f64> {
        self.std_dev
    }

    pub fn rmse(&self) -> Option<f64> {
        self.rmse
    }

    /// Symmetric Gaussian interval `mean ± z·sd`, if a standard deviation exists.
    pub fn interval(&self, z: f64) -> Option<(f64, f64)> {
        self.std_dev
            .map(|sd| (self.mean - z * sd, self.mean + z * sd))
    }

    pub fn interval_80(&self) -> Option<(f64, f64)> {
        self.interval(Z80)
    }
}

/// One forecast per category per run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastRecord {
    pub category: String,
    pub horizon_periods: usize,
    pub point_estimate: f64,
    pub std_dev: Option<f64>,
    pub interval_80_low: Option<f64>,
    pub interval_80_high: Option<f64>,
    pub rmse_in_sample: Option<f64>,
    pub model_name: String,
    pub exogenous_used: bool,
    /// Models that were tried first and declined, as `model:reason`.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fallbacks: Vec<String>,
}

impl ForecastRecord {
    pub fn from_forecast(
        category: impl Into<String>,
        forecast: &Forecast,
        model_name: impl Into<String>,
        exogenous_used: bool,
    ) -> Self {
        let interval = forecast.interval_80();
        Self {
            category: category.into(),
            horizon_periods: forecast.horizon(),
            point_estimate: forecast.mean(),
            std_dev: forecast.std_dev(),
            interval_80_low: interval.map(|(lo, _)| lo),
            interval_80_high: interval.map(|(_, hi)| hi),
            rmse_in_sample: forecast.rmse(),
            model_name: model_name.into(),
            exogenous_used,
            fallbacks: Vec::new(),
        }
    }

    pub fn with_fallbacks(mut self, fallbacks: Vec<String>) -> Self {
        self.fallbacks = fallbacks;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn interval_requires_std_dev() {
        let forecast = Forecast::new(1, 10.0);
        assert!(forecast.interval_80().is_none());

        let forecast = forecast.with_std_dev(2.0);
        let (lo, hi) = forecast.interval_80().unwrap();
        assert_relative_eq!(lo, 10.0 - 2.0 * Z80, epsilon = 1e-12);
        assert_relative_eq!(hi, 10.0 + 2.0 * Z80, epsilon = 1e-12);
    }

    #[test]
    fn non_finite_uncertainty_is_undefined() {
        let forecast = Forecast::new(1, 3.0)
            .with_std_dev(f64::NAN)
            .with_rmse(f64::INFINITY);
        assert!(forecast.std_dev().is_none());
        assert!(forecast.rmse().is_none());
    }

    #[test]
    fn record_copies_forecast_fields() {
        let forecast = Forecast::new(2, 41.5).with_std_dev(1.0).with_rmse(0.7);
        let record = ForecastRecord::from_forecast("A", &forecast, "ssm", false);

        assert_eq!(record.category, "A");
        assert_eq!(record.horizon_periods, 2);
        assert_relative_eq!(record.point_estimate, 41.5);
        assert_eq!(record.rmse_in_sample, Some(0.7));
        assert!(record.interval_80_low.unwrap() < 41.5);
        assert!(record.interval_80_high.unwrap() > 41.5);
        assert!(record.fallbacks.is_empty());
    }

    #[test]
    fn record_serializes_without_empty_fallbacks() {
        let record = ForecastRecord::from_forecast("A", &Forecast::new(1, 1.0), "legacy", false);
        let json = serde_json::to_string(&record).unwrap();
        assert!(!json.contains("fallbacks"));
        assert!(json.contains("\"std_dev\":null"));
    }
}
