//! Ordered fallback chains of forecasters.
//!
//! Each strategy either succeeds or declines with a reason. A strategy
//! declines when its fit or prediction fails with a recoverable error
//! (too little history, bad hyperparameters, numeric degeneracy); any
//! other error aborts the chain.

use crate::core::{Forecast, TimeSeries};
use crate::error::{ForecastError, Result};
use crate::models::traits::{BoxedForecaster, Forecaster};

/// Tagged result of one strategy.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Success(Forecast),
    Insufficient(String),
}

/// Fit and predict with one model, turning recoverable failures into
/// [`Outcome::Insufficient`].
pub fn attempt(model: &mut dyn Forecaster, series: &TimeSeries, horizon: usize) -> Result<Outcome> {
    match model.fit(series).and_then(|()| model.predict(horizon)) {
        Ok(forecast) => Ok(Outcome::Success(forecast)),
        Err(e) if e.is_recoverable() => Ok(Outcome::Insufficient(e.to_string())),
        Err(e) => Err(e),
    }
}

/// Forecast produced by a chain, with the trail of strategies that declined.
#[derive(Debug, Clone, PartialEq)]
pub struct ChainForecast {
    pub forecast: Forecast,
    pub model_name: String,
    /// `name: reason` for every strategy tried before the one that succeeded.
    pub fallbacks: Vec<String>,
}

impl ChainForecast {
    pub fn fell_back(&self) -> bool {
        !self.fallbacks.is_empty()
    }
}

/// Strategies tried in order until one succeeds.
#[derive(Default)]
pub struct ForecastChain {
    strategies: Vec<BoxedForecaster>,
}

impl ForecastChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a strategy.
    pub fn then<F: Forecaster + 'static>(mut self, model: F) -> Self {
        self.strategies.push(Box::new(model));
        self
    }

    pub fn len(&self) -> usize {
        self.strategies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strategies.is_empty()
    }

    pub fn strategies(&self) -> &[BoxedForecaster] {
        &self.strategies
    }

    pub fn names(&self) -> Vec<&str> {
        self.strategies.iter().map(|s| s.name()).collect()
    }

    /// Run the strategies in order on the first column of `series`.
    pub fn run(&mut self, series: &TimeSeries, horizon: usize) -> Result<ChainForecast> {
        let mut fallbacks = Vec::new();
        let category = series.primary_label().unwrap_or_default().to_string();

        for strategy in self.strategies.iter_mut() {
            match attempt(strategy.as_mut(), series, horizon)? {
                Outcome::Success(forecast) => {
                    tracing::debug!(
                        category = %category,
                        model = strategy.name(),
                        fallbacks = fallbacks.len(),
                        "forecast produced"
                    );
                    return Ok(ChainForecast {
                        forecast,
                        model_name: strategy.name().to_string(),
                        fallbacks,
                    });
                }
                Outcome::Insufficient(reason) => {
                    tracing::warn!(
                        category = %category,
                        model = strategy.name(),
                        reason = %reason,
                        "forecaster declined, falling back"
                    );
                    fallbacks.push(format!("{}: {}", strategy.name(), reason));
                }
            }
        }

        Err(ForecastError::NumericDegeneracy(if fallbacks.is_empty() {
            "forecast chain has no strategies".to_string()
        } else {
            format!("every forecaster declined ({})", fallbacks.join("; "))
        }))
    }
}

impl std::fmt::Debug for ForecastChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ForecastChain")
            .field("strategies", &self.names())
            .finish()
    }
}
