//! Utility functions shared by the blending and forecasting components.

pub mod interpolate;
pub mod metrics;
pub mod regression;
pub mod stats;

pub use interpolate::{fill_interior, interpolate_at};
pub use metrics::{calculate_metrics, hit_rate, AccuracyMetrics};
pub use regression::{least_squares, linear_trend};
