//! Local-level forecaster corrected by an exogenous driver.
//!
//! A one-step ARX model `y[t+1] = a + b·y[t] + c·x[t]` is fitted by ridge
//! least squares on the trailing rows where both the target and the driver
//! are present. Its prediction is blended with the local-level mean and the
//! result is shrunk toward the latest observation again. The driver only
//! moves the point estimate; uncertainty comes from the local-level fit.

use crate::core::{Forecast, TimeSeries};
use crate::error::{ForecastError, Result};
use crate::models::local_level::{LocalLevel, LocalLevelConfig};
use crate::models::Forecaster;
use crate::utils::least_squares;
use serde::{Deserialize, Serialize};

/// Configuration for [`ExogenousLocalLevel`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExogenousConfig {
    /// Name of the regressor column carrying the driver.
    pub driver: String,
    /// Ridge penalty on all three coefficients.
    pub ridge: f64,
    /// Weight of the local-level mean in the blend.
    pub state_space_weight: f64,
    /// Minimum `(y[t], x[t], y[t+1])` transitions.
    pub min_pairs: usize,
}

impl Default for ExogenousConfig {
    fn default() -> Self {
        Self {
            driver: "driver".to_string(),
            ridge: 1e-3,
            state_space_weight: 0.65,
            min_pairs: 8,
        }
    }
}

impl ExogenousConfig {
    pub fn validate(&self) -> Result<()> {
        if !(self.ridge >= 0.0 && self.ridge.is_finite()) {
            return Err(ForecastError::InvalidConfiguration(format!(
                "ridge must be finite and >= 0, got {}",
                self.ridge
            )));
        }
        if !(0.0..=1.0).contains(&self.state_space_weight) {
            return Err(ForecastError::InvalidConfiguration(format!(
                "state_space_weight must be in [0, 1], got {}",
                self.state_space_weight
            )));
        }
        if self.min_pairs < 3 {
            return Err(ForecastError::InvalidConfiguration(format!(
                "min_pairs must be at least 3, got {}",
                self.min_pairs
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct ArxFit {
    coefficients: [f64; 3],
    prediction: f64,
    latest: f64,
}

/// Local-level model with an ARX driver correction.
#[derive(Debug, Clone)]
pub struct ExogenousLocalLevel {
    config: ExogenousConfig,
    base: LocalLevel,
    fit: Option<ArxFit>,
}

impl ExogenousLocalLevel {
    pub fn new(local: LocalLevelConfig, config: ExogenousConfig) -> Self {
        Self {
            config,
            base: LocalLevel::new(local),
            fit: None,
        }
    }

    pub fn with_q_scale(mut self, q_scale: f64) -> Self {
        self.base = self.base.with_q_scale(q_scale);
        self
    }

    /// `[a, b, c]` of the fitted ARX model.
    pub fn coefficients(&self) -> Option<[f64; 3]> {
        self.fit.map(|f| f.coefficients)
    }

    /// One-step ARX prediction before blending.
    pub fn arx_prediction(&self) -> Option<f64> {
        self.fit.map(|f| f.prediction)
    }
}

impl Forecaster for ExogenousLocalLevel {
    fn fit(&mut self, series: &TimeSeries) -> Result<()> {
        self.config.validate()?;
        self.fit = None;

        let values = series.primary_values();
        let driver = series.regressor(&self.config.driver).unwrap_or_default();
        let aligned: Vec<(f64, f64)> = values
            .iter()
            .zip(driver)
            .filter_map(|(y, x)| match (y, x) {
                (Some(y), Some(x)) if y.is_finite() && x.is_finite() => Some((*y, *x)),
                _ => None,
            })
            .collect();
        let window = self.base.config().window;
        let aligned = &aligned[aligned.len().saturating_sub(window)..];

        let transitions = aligned.len().saturating_sub(1);
        if transitions < self.config.min_pairs {
            return Err(ForecastError::InsufficientHistory {
                needed: self.config.min_pairs,
                got: transitions,
            });
        }

        self.base.fit(series)?;

        let design: Vec<Vec<f64>> = aligned[..transitions]
            .iter()
            .map(|(y, x)| vec![1.0, *y, *x])
            .collect();
        let targets: Vec<f64> = aligned[1..].iter().map(|(y, _)| *y).collect();
        let beta = least_squares(&design, &targets, self.config.ridge)?;

        let (y_last, x_last) = aligned[aligned.len() - 1];
        let prediction = beta[0] + beta[1] * y_last + beta[2] * x_last;
        let latest = series
            .valid_values()
            .last()
            .copied()
            .ok_or(ForecastError::InsufficientHistory { needed: 1, got: 0 })?;

        tracing::debug!(
            driver = %self.config.driver,
            pairs = transitions,
            a = beta[0],
            b = beta[1],
            c = beta[2],
            "driver regression fitted"
        );

        self.fit = Some(ArxFit {
            coefficients: [beta[0], beta[1], beta[2]],
            prediction,
            latest,
        });
        Ok(())
    }

    fn predict(&self, horizon: usize) -> Result<Forecast> {
        let fit = self.fit.ok_or(ForecastError::FitRequired)?;
        let base = self.base.predict(horizon)?;

        let w = self.config.state_space_weight;
        let blended = w * base.mean() + (1.0 - w) * fit.prediction;
        let shrink = self.base.config().recency_shrink;
        Ok(base.with_mean((1.0 - shrink) * blended + shrink * fit.latest))
    }

    fn residuals(&self) -> Option<&[f64]> {
        self.fit.and(self.base.residuals())
    }

    fn name(&self) -> &str {
        "ssm_exog"
    }
}
