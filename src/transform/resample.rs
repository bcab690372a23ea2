//! Irregular period-end series to a regular weekly grid.
//!
//! Values are first spread onto a daily grid by time-weighted linear
//! interpolation, then sampled on a fixed weekday anchor. Each category is
//! interpolated only between its own first and last observation.

use crate::core::TimeSeries;
use crate::error::Result;
use crate::utils::interpolate_at;
use chrono::{Datelike, NaiveDate, Weekday};
use serde::{Deserialize, Serialize};

/// Weekly resampling configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResampleConfig {
    /// Weekday each resampled period is anchored on.
    pub anchor: Weekday,
}

impl Default for ResampleConfig {
    fn default() -> Self {
        Self {
            anchor: Weekday::Mon,
        }
    }
}

/// Interpolate every column onto consecutive calendar days.
///
/// The daily grid spans the first to last date of `series`. A series with
/// fewer than two dates cannot be interpolated and yields an empty series
/// with the same columns.
pub fn interpolate_daily(series: &TimeSeries) -> Result<TimeSeries> {
    let labels = series.labels().to_vec();
    if series.len() < 2 {
        return empty_like(labels);
    }

    let dates = series.dates();
    let first = dates[0];
    let last = dates[dates.len() - 1];
    let days: Vec<NaiveDate> = first.iter_days().take_while(|d| *d <= last).collect();

    let columns = series
        .columns()
        .map(|(_, values)| {
            let known: Vec<(NaiveDate, f64)> = dates
                .iter()
                .zip(values)
                .filter_map(|(d, v)| v.filter(|x| x.is_finite()).map(|x| (*d, x)))
                .collect();
            days.iter().map(|d| interpolate_at(&known, *d)).collect()
        })
        .collect();

    TimeSeries::new(days, labels, columns)
}

/// Keep only the rows of a daily series that fall on `anchor`.
pub fn resample_weekly(daily: &TimeSeries, anchor: Weekday) -> Result<TimeSeries> {
    let keep: Vec<usize> = daily
        .dates()
        .iter()
        .enumerate()
        .filter(|(_, d)| d.weekday() == anchor)
        .map(|(i, _)| i)
        .collect();

    let dates = keep.iter().map(|&i| daily.dates()[i]).collect();
    let columns = daily
        .columns()
        .map(|(_, values)| keep.iter().map(|&i| values[i]).collect())
        .collect();

    TimeSeries::new(dates, daily.labels().to_vec(), columns)
}

/// Convert an irregular period-end series into one row per anchor date.
pub fn to_weekly(series: &TimeSeries, config: &ResampleConfig) -> Result<TimeSeries> {
    let daily = interpolate_daily(series)?;
    let weekly = resample_weekly(&daily, config.anchor)?;
    tracing::debug!(
        input_rows = series.len(),
        weekly_rows = weekly.len(),
        anchor = ?config.anchor,
        "resampled to weekly grid"
    );
    Ok(weekly)
}

fn empty_like(labels: Vec<String>) -> Result<TimeSeries> {
    let columns = vec![Vec::new(); labels.len()];
    TimeSeries::new(Vec::new(), labels, columns)
}
