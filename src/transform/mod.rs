//! Data transformations for blended series.
//!
//! # Example
//!
//! ```
//! use pollcast::core::TimeSeries;
//! use pollcast::transform::{to_weekly, ResampleConfig};
//! use chrono::NaiveDate;
//!
//! let dates = vec![
//!     NaiveDate::from_ymd_opt(2025, 1, 1).unwrap(),
//!     NaiveDate::from_ymd_opt(2025, 1, 15).unwrap(),
//! ];
//! let ts = TimeSeries::from_values(dates, "A", &[40.0, 42.0]).unwrap();
//! let weekly = to_weekly(&ts, &ResampleConfig::default()).unwrap();
//! assert_eq!(weekly.len(), 2);
//! ```

pub mod resample;

pub use resample::{interpolate_daily, resample_weekly, to_weekly, ResampleConfig};
