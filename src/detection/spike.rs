//! Spike suppression for auxiliary driver series.
//!
//! A point is a spike when its first difference deviates from the median
//! difference by more than `max(min_threshold, mad_multiplier · MAD)`.
//! Spikes are set to null and refilled by time-weighted interpolation
//! between their clean neighbours; spikes at the edges stay null.

use crate::core::TimeSeries;
use crate::error::{ForecastError, Result};
use crate::utils::fill_interior;
use crate::utils::stats::{median, median_abs_deviation};
use serde::{Deserialize, Serialize};

/// Configuration for driver spike cleaning.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpikeConfig {
    /// Lower bound on the spike threshold, in driver units.
    pub min_threshold: f64,
    /// Multiplier applied to the MAD of the differences.
    pub mad_multiplier: f64,
    /// Floor on the MAD.
    pub min_mad: f64,
}

impl Default for SpikeConfig {
    fn default() -> Self {
        Self {
            min_threshold: 8.0,
            mad_multiplier: 3.5,
            min_mad: 1e-6,
        }
    }
}

impl SpikeConfig {
    pub fn validate(&self) -> Result<()> {
        if !(self.min_threshold >= 0.0 && self.mad_multiplier > 0.0 && self.min_mad > 0.0) {
            return Err(ForecastError::InvalidConfiguration(
                "spike thresholds must be positive".into(),
            ));
        }
        Ok(())
    }
}

/// Result of spike cleaning.
#[derive(Debug, Clone, PartialEq)]
pub struct SpikeResult {
    /// Cleaned driver, one row per non-null input row.
    pub series: TimeSeries,
    /// Rows of `series` that were flagged as spikes.
    pub masked_indices: Vec<usize>,
    /// Threshold on `|diff - median|` used for detection.
    pub threshold: f64,
    /// Median first difference.
    pub median_step: f64,
}

impl SpikeResult {
    pub fn spike_count(&self) -> usize {
        self.masked_indices.len()
    }

    pub fn is_spike(&self, index: usize) -> bool {
        self.masked_indices.contains(&index)
    }
}

/// Clean the first column of a driver series.
///
/// Null rows are dropped first, so differences are taken between
/// consecutive reported values.
pub fn clean_driver(driver: &TimeSeries, config: &SpikeConfig) -> Result<SpikeResult> {
    config.validate()?;

    let label = driver.primary_label().unwrap_or("driver").to_string();
    let (dates, values): (Vec<_>, Vec<f64>) = driver
        .dates()
        .iter()
        .zip(driver.primary_values())
        .filter_map(|(d, v)| v.filter(|x| x.is_finite()).map(|x| (*d, x)))
        .unzip();

    let steps: Vec<f64> = values.windows(2).map(|w| w[1] - w[0]).collect();
    let (median_step, mad) = if steps.is_empty() {
        (0.0, 0.0)
    } else {
        let med = median(&steps);
        (med, median_abs_deviation(&steps, med))
    };
    let threshold = config
        .min_threshold
        .max(config.mad_multiplier * mad.max(config.min_mad));

    // step i is the move into row i + 1
    let masked_indices: Vec<usize> = steps
        .iter()
        .enumerate()
        .filter(|(_, s)| (*s - median_step).abs() > threshold)
        .map(|(i, _)| i + 1)
        .collect();

    let mut cells: Vec<Option<f64>> = values.iter().map(|v| Some(*v)).collect();
    for &i in &masked_indices {
        cells[i] = None;
    }
    let cleaned = fill_interior(&dates, &cells);

    if !masked_indices.is_empty() {
        tracing::warn!(
            driver = %label,
            spikes = masked_indices.len(),
            threshold,
            "masked driver spikes"
        );
    }

    Ok(SpikeResult {
        series: TimeSeries::univariate(dates, label, cleaned)?,
        masked_indices,
        threshold,
        median_step,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use chrono::NaiveDate;

    fn weekly(values: &[Option<f64>]) -> TimeSeries {
        let base = NaiveDate::from_ymd_opt(2025, 1, 6).unwrap();
        let dates = (0..values.len())
            .map(|i| base + chrono::Duration::weeks(i as i64))
            .collect();
        TimeSeries::univariate(dates, "approval", values.to_vec()).unwrap()
    }

    #[test]
    fn interior_spike_is_interpolated() {
        let values: Vec<Option<f64>> = [40.0, 41.0, 42.0, 43.0, 60.0, 44.0, 45.0, 46.0, 47.0, 48.0]
            .iter()
            .map(|v| Some(*v))
            .collect();
        let result = clean_driver(&weekly(&values), &SpikeConfig::default()).unwrap();

        // the jump into row 4 and the drop into row 5 both exceed 8
        assert_eq!(result.masked_indices, vec![4, 5]);
        assert_eq!(result.threshold, 8.0);
        let cleaned = result.series.valid_values();
        assert_relative_eq!(cleaned[4], 43.0 + 2.0 / 3.0, epsilon = 1e-10);
        assert_relative_eq!(cleaned[5], 43.0 + 4.0 / 3.0, epsilon = 1e-10);
    }

    #[test]
    fn trailing_spike_is_not_extrapolated() {
        let driver = weekly(&[Some(40.0), Some(41.0), Some(42.0), Some(70.0)]);
        let result = clean_driver(&driver, &SpikeConfig::default()).unwrap();
        assert_eq!(result.masked_indices, vec![3]);
        assert!(result.series.primary_values()[3].is_none());
    }

    #[test]
    fn threshold_scales_with_mad() {
        // steps 1, 4, -3, 6, -2, 5, 30: median 4, MAD 3
        let values: Vec<Option<f64>> = [0.0, 1.0, 5.0, 2.0, 8.0, 6.0, 11.0, 41.0]
            .iter()
            .map(|v| Some(*v))
            .collect();
        let result = clean_driver(&weekly(&values), &SpikeConfig::default()).unwrap();
        assert_relative_eq!(result.median_step, 4.0);
        assert_relative_eq!(result.threshold, 10.5, epsilon = 1e-12);
        assert_eq!(result.masked_indices, vec![7]);
    }

    #[test]
    fn null_rows_are_dropped() {
        let driver = weekly(&[Some(1.0), None, Some(2.0)]);
        let result = clean_driver(&driver, &SpikeConfig::default()).unwrap();
        assert_eq!(result.series.len(), 2);
        assert!(result.masked_indices.is_empty());
    }

    #[test]
    fn empty_driver_is_empty() {
        let driver = weekly(&[None, None]);
        let result = clean_driver(&driver, &SpikeConfig::default()).unwrap();
        assert!(result.series.is_empty());
        assert_eq!(result.threshold, 8.0);
    }
}
