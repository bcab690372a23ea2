//! # pollcast
//!
//! Survey blending and short-horizon forecasting.
//!
//! Reports from several sources are combined into one series per category
//! using accuracy and sample-size weights, optionally corrected for each
//! source's persistent bias, resampled onto a weekly grid and forecast one
//! or more periods ahead with a local-level Kalman filter. A damped-trend
//! model covers short histories, a driver regression can adjust the
//! state-space forecast, and a rolling-origin backtester compares variants.

#![allow(clippy::too_many_arguments)]
#![allow(clippy::needless_range_loop)]

pub mod blending;
pub mod config;
pub mod core;
pub mod detection;
pub mod error;
pub mod io;
pub mod models;
pub mod pipeline;
pub mod transform;
pub mod utils;
pub mod validation;

pub use error::{ForecastError, Result};

pub mod prelude {
    pub use crate::blending::{blend, resolve_and_blend, BlendConfig, HouseEffectConfig, Weights};
    pub use crate::config::PipelineConfig;
    pub use crate::core::{AccuracyRecord, Forecast, Observation, TimeSeries};
    pub use crate::error::{ForecastError, Result};
    pub use crate::models::{Forecaster, LocalLevel, LocalLevelConfig, ModelKind};
    pub use crate::pipeline::Pipeline;
    pub use crate::utils::{calculate_metrics, AccuracyMetrics};
}
