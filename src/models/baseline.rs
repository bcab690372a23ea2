//! Naive forecasting model.
//!
//! The naive method forecasts the last observed value for all future
//! periods. It is the random-walk reference arm in backtests.

use crate::core::{Forecast, TimeSeries};
use crate::error::{ForecastError, Result};
use crate::models::Forecaster;
use crate::utils::stats::{diff, root_mean_square};

/// Naive forecaster that repeats the last value.
#[derive(Debug, Clone, Default)]
pub struct Naive {
    last_value: Option<f64>,
    residuals: Option<Vec<f64>>,
}

impl Naive {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Forecaster for Naive {
    fn fit(&mut self, series: &TimeSeries) -> Result<()> {
        let values = series.valid_values();
        let Some(&last) = values.last() else {
            return Err(ForecastError::InsufficientHistory { needed: 1, got: 0 });
        };

        self.last_value = Some(last);
        // Residuals are first differences (y[t] - y[t-1])
        self.residuals = Some(diff(&values));
        Ok(())
    }

    fn predict(&self, horizon: usize) -> Result<Forecast> {
        let last = self.last_value.ok_or(ForecastError::FitRequired)?;
        if horizon == 0 {
            return Err(ForecastError::InvalidConfiguration(
                "horizon must be at least 1".into(),
            ));
        }

        let forecast = Forecast::new(horizon, last);
        let residuals = self.residuals.as_deref().unwrap_or_default();
        if residuals.is_empty() {
            return Ok(forecast);
        }
        // Random-walk uncertainty widens with sqrt(horizon)
        let sigma = root_mean_square(residuals);
        Ok(forecast
            .with_rmse(sigma)
            .with_std_dev(sigma * (horizon as f64).sqrt()))
    }

    fn residuals(&self) -> Option<&[f64]> {
        self.residuals.as_deref()
    }

    fn name(&self) -> &str {
        "naive"
    }
}
