//! Core data structures for blending and forecasting.

mod forecast;
mod observation;
mod time_series;

pub use forecast::{Forecast, ForecastRecord, Z80};
pub use observation::{AccuracyRecord, Observation};
pub use time_series::{TimeSeries, TimeSeriesBuilder};
