//! Damped linear-trend forecaster.
//!
//! Fits an OLS line to the trailing window and projects from the last
//! fitted point with the slope damped. Used as the minimum-data fallback and
//! as the comparison arm in backtests.

use crate::core::{Forecast, TimeSeries};
use crate::error::{ForecastError, Result};
use crate::models::Forecaster;
use crate::utils::linear_trend;
use crate::utils::stats::root_mean_square;
use serde::{Deserialize, Serialize};

/// Configuration for [`DampedTrend`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrendConfig {
    /// Trailing points used for the fit.
    pub window: usize,
    /// Multiplier applied to the fitted slope before projecting.
    pub damping: f64,
    /// Below this many points the forecast is the last observed value.
    pub min_points: usize,
}

impl Default for TrendConfig {
    fn default() -> Self {
        Self {
            window: 24,
            damping: 0.5,
            min_points: 6,
        }
    }
}

impl TrendConfig {
    pub fn with_window(mut self, window: usize) -> Self {
        self.window = window;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.window < 2 {
            return Err(ForecastError::InvalidConfiguration(format!(
                "trend window must be at least 2, got {}",
                self.window
            )));
        }
        if !(0.0..=1.0).contains(&self.damping) {
            return Err(ForecastError::InvalidConfiguration(format!(
                "damping must be in [0, 1], got {}",
                self.damping
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct TrendFit {
    anchor: f64,
    slope: f64,
    rmse: Option<f64>,
}

/// Legacy damped-trend model.
#[derive(Debug, Clone, Default)]
pub struct DampedTrend {
    config: TrendConfig,
    fit: Option<TrendFit>,
    residuals: Option<Vec<f64>>,
}

impl DampedTrend {
    pub fn new(config: TrendConfig) -> Self {
        Self {
            config,
            fit: None,
            residuals: None,
        }
    }

    /// Fitted slope before damping.
    pub fn slope(&self) -> Option<f64> {
        self.fit.map(|f| f.slope)
    }
}

impl Forecaster for DampedTrend {
    fn fit(&mut self, series: &TimeSeries) -> Result<()> {
        self.config.validate()?;
        let values = series.valid_values();
        let Some(&last) = values.last() else {
            return Err(ForecastError::InsufficientHistory { needed: 1, got: 0 });
        };

        if values.len() < self.config.min_points {
            self.fit = Some(TrendFit {
                anchor: last,
                slope: 0.0,
                rmse: None,
            });
            self.residuals = Some(Vec::new());
            return Ok(());
        }

        let y = &values[values.len().saturating_sub(self.config.window)..];
        let (slope, intercept) = linear_trend(y)?;
        let residuals: Vec<f64> = y
            .iter()
            .enumerate()
            .map(|(i, v)| v - (slope * i as f64 + intercept))
            .collect();
        let rmse = (residuals.len() > 2).then(|| root_mean_square(&residuals));

        self.fit = Some(TrendFit {
            anchor: slope * (y.len() - 1) as f64 + intercept,
            slope,
            rmse,
        });
        self.residuals = Some(residuals);
        Ok(())
    }

    fn predict(&self, horizon: usize) -> Result<Forecast> {
        let fit = self.fit.ok_or(ForecastError::FitRequired)?;
        if horizon == 0 {
            return Err(ForecastError::InvalidConfiguration(
                "horizon must be at least 1".into(),
            ));
        }
        let mean = fit.anchor + self.config.damping * fit.slope * horizon as f64;
        let forecast = Forecast::new(horizon, mean);
        Ok(match fit.rmse {
            Some(rmse) => forecast.with_rmse(rmse),
            None => forecast,
        })
    }

    fn residuals(&self) -> Option<&[f64]> {
        self.residuals.as_deref()
    }

    fn name(&self) -> &str {
        "legacy"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use chrono::NaiveDate;

    fn series(values: &[f64]) -> TimeSeries {
        let base = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let dates = (0..values.len())
            .map(|i| base + chrono::Duration::weeks(i as i64))
            .collect();
        TimeSeries::from_values(dates, "X", values).unwrap()
    }

    #[test]
    fn flat_series_forecasts_its_level() {
        let mut model = DampedTrend::default();
        model.fit(&series(&[10.0; 10])).unwrap();
        let forecast = model.predict(1).unwrap();
        assert_relative_eq!(forecast.mean(), 10.0, epsilon = 1e-10);
        assert_relative_eq!(forecast.rmse().unwrap(), 0.0, epsilon = 1e-10);
        assert!(forecast.std_dev().is_none());
    }

    #[test]
    fn slope_is_damped_from_last_fitted_point() {
        let values: Vec<f64> = (0..10).map(|i| 2.0 * i as f64 + 1.0).collect();
        let mut model = DampedTrend::default();
        model.fit(&series(&values)).unwrap();

        assert_relative_eq!(model.slope().unwrap(), 2.0, epsilon = 1e-10);
        // last fitted 19, plus 0.5 * 2 * 3
        assert_relative_eq!(model.predict(3).unwrap().mean(), 22.0, epsilon = 1e-9);
    }

    #[test]
    fn anchors_on_fit_not_on_last_raw_value() {
        let values = [1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 0.0];
        let mut model = DampedTrend::default();
        model.fit(&series(&values)).unwrap();
        let forecast = model.predict(1).unwrap();
        assert!(forecast.mean() > 0.0);
        assert!(forecast.rmse().unwrap() > 0.0);
    }

    #[test]
    fn short_history_returns_last_value() {
        let mut model = DampedTrend::default();
        model.fit(&series(&[4.0, 5.0, 9.0])).unwrap();
        let forecast = model.predict(2).unwrap();
        assert_eq!(forecast.mean(), 9.0);
        assert!(forecast.rmse().is_none());
    }

    #[test]
    fn window_uses_only_trailing_points() {
        let mut values = vec![100.0; 20];
        values.extend((0..6).map(|i| i as f64));
        let mut model = DampedTrend::new(TrendConfig::default().with_window(6));
        model.fit(&series(&values)).unwrap();
        assert_relative_eq!(model.predict(1).unwrap().mean(), 5.5, epsilon = 1e-9);
    }

    #[test]
    fn empty_series_is_insufficient() {
        let mut model = DampedTrend::default();
        assert!(matches!(
            model.fit(&series(&[])),
            Err(ForecastError::InsufficientHistory { .. })
        ));
        assert!(matches!(
            DampedTrend::default().predict(1),
            Err(ForecastError::FitRequired)
        ));
    }
}
