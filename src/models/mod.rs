//! Forecasting models.
//!
//! The primary model is the local-level state-space forecaster; the damped
//! trend is its minimum-data fallback and the naive model is a reference
//! arm for backtests. Fallback order is expressed as a [`ForecastChain`].

mod traits;

pub mod baseline;
pub mod chain;
pub mod exogenous;
pub mod local_level;
pub mod trend;

pub use chain::{attempt, ChainForecast, ForecastChain, Outcome};
pub use exogenous::{ExogenousConfig, ExogenousLocalLevel};
pub use local_level::{
    kalman_filter, local_level_nll, FilterOutput, LocalLevel, LocalLevelConfig, NoiseParams,
    ParameterGrid, ParameterSearch,
};
pub use traits::{BoxedForecaster, Forecaster, ModelRegistry, ModelSpec};
pub use trend::{DampedTrend, TrendConfig};

use crate::core::{Forecast, TimeSeries};
use crate::error::Result;
use serde::{Deserialize, Serialize};

/// Which forecaster family produces the published forecast.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ModelKind {
    #[serde(rename = "legacy")]
    Legacy,
    #[default]
    #[serde(rename = "ssm")]
    StateSpace,
}

impl ModelKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModelKind::Legacy => "legacy",
            ModelKind::StateSpace => "ssm",
        }
    }
}

impl std::fmt::Display for ModelKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Legacy damped-trend forecast.
pub fn forecast_next(series: &TimeSeries, horizon: usize, trend: &TrendConfig) -> Result<Forecast> {
    let mut model = DampedTrend::new(*trend);
    model.fit(series)?;
    model.predict(horizon)
}

/// Local-level forecast, degrading to the damped trend on short history.
pub fn forecast_next_ssm(
    series: &TimeSeries,
    horizon: usize,
    local: &LocalLevelConfig,
    trend: &TrendConfig,
    q_scale: f64,
) -> Result<ChainForecast> {
    ForecastChain::new()
        .then(LocalLevel::new(local.clone()).with_q_scale(q_scale))
        .then(DampedTrend::new(*trend))
        .run(series, horizon)
}

/// Driver-corrected local-level forecast.
///
/// Without enough aligned driver observations this is exactly
/// [`forecast_next_ssm`], with the declined driver model listed in
/// `fallbacks`.
pub fn forecast_next_ssm_with_exog(
    series: &TimeSeries,
    horizon: usize,
    local: &LocalLevelConfig,
    trend: &TrendConfig,
    exogenous: &ExogenousConfig,
    q_scale: f64,
) -> Result<ChainForecast> {
    ForecastChain::new()
        .then(ExogenousLocalLevel::new(local.clone(), exogenous.clone()).with_q_scale(q_scale))
        .then(LocalLevel::new(local.clone()).with_q_scale(q_scale))
        .then(DampedTrend::new(*trend))
        .run(series, horizon)
}

/// Names accepted by [`standard_variant`].
pub const STANDARD_VARIANTS: [&str; 3] = ["legacy", "ssm", "naive"];

/// Build one of the standard backtest variants by name.
///
/// `ssm` falls back to the damped trend exactly as [`forecast_next_ssm`] does.
pub fn standard_variant(name: &str, local: &LocalLevelConfig, trend: &TrendConfig) -> Option<ModelSpec> {
    let trend = *trend;
    match name {
        "legacy" => Some(ModelSpec::new("legacy", move |_| {
            ForecastChain::new().then(DampedTrend::new(trend))
        })),
        "ssm" => {
            let local = local.clone();
            Some(ModelSpec::new("ssm", move |q_scale| {
                ForecastChain::new()
                    .then(LocalLevel::new(local.clone()).with_q_scale(q_scale))
                    .then(DampedTrend::new(trend))
            }))
        }
        "naive" => Some(ModelSpec::new("naive", |_| {
            ForecastChain::new().then(baseline::Naive::new())
        })),
        _ => None,
    }
}

/// Registry holding every standard variant.
pub fn default_registry(local: &LocalLevelConfig, trend: &TrendConfig) -> ModelRegistry {
    let mut registry = ModelRegistry::new();
    for spec in STANDARD_VARIANTS
        .iter()
        .filter_map(|name| standard_variant(name, local, trend))
    {
        registry.register(spec);
    }
    registry
}
