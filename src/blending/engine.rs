//! Weighted combination of per-source observations into one series.
//!
//! For every period and category, the blended value is the weighted mean
//! of the sources that reported it. With sample-size weighting enabled each
//! accuracy weight is multiplied by the observation precision
//! `n / (p·(1−p))`. If that collapses the total weight to zero, the blend
//! falls back to accuracy weights alone; if those are zero too the cell is
//! null.

use crate::blending::weights::Weights;
use crate::core::{Observation, TimeSeries};
use crate::error::{ForecastError, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Lower bound on observation variance before inversion.
const MIN_OBSERVATION_VARIANCE: f64 = 1e-9;

/// Blending configuration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BlendConfig {
    /// Multiply accuracy weights by sample-size precision.
    pub sample_size_weight: bool,
    /// Clip for `p = value/100` into `[eps, 1-eps]`.
    pub sample_eps: f64,
}

impl Default for BlendConfig {
    fn default() -> Self {
        Self {
            sample_size_weight: true,
            sample_eps: 0.01,
        }
    }
}

impl BlendConfig {
    pub fn accuracy_only() -> Self {
        Self {
            sample_size_weight: false,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.sample_eps > 0.0 && self.sample_eps < 0.5) {
            return Err(ForecastError::InvalidConfiguration(format!(
                "sample_eps must be in (0, 0.5), got {}",
                self.sample_eps
            )));
        }
        Ok(())
    }
}

/// One blended row across all categories.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlendedPoint {
    pub period_end: NaiveDate,
    pub n_sources_reporting: usize,
    pub values: BTreeMap<String, Option<f64>>,
    /// Categories whose sample-size weights collapsed to zero and were
    /// blended with accuracy weights only.
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub accuracy_fallback: BTreeSet<String>,
}

impl BlendedPoint {
    pub fn value(&self, category: &str) -> Option<f64> {
        self.values.get(category).copied().flatten()
    }
}

/// Blended rows in period order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct BlendedSeries {
    categories: Vec<String>,
    points: Vec<BlendedPoint>,
}

impl BlendedSeries {
    pub fn categories(&self) -> &[String] {
        &self.categories
    }

    pub fn points(&self) -> &[BlendedPoint] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Blended value for one period and category.
    pub fn value(&self, period_end: NaiveDate, category: &str) -> Option<f64> {
        self.points
            .binary_search_by_key(&period_end, |p| p.period_end)
            .ok()
            .and_then(|i| self.points[i].value(category))
    }

    /// Wide period-indexed table, one column per category.
    pub fn to_time_series(&self) -> Result<TimeSeries> {
        let dates = self.points.iter().map(|p| p.period_end).collect();
        let columns = self
            .categories
            .iter()
            .map(|c| self.points.iter().map(|p| p.value(c)).collect())
            .collect();
        TimeSeries::new(dates, self.categories.clone(), columns)
    }
}

/// Result of combining one period/category cell.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CellBlend {
    /// Weighted mean; `accuracy_fallback` is set when precision weights
    /// collapsed and accuracy weights were used instead.
    Value { value: f64, accuracy_fallback: bool },
    /// No positive weight among the contributors.
    Null,
}

/// One source's contribution to a cell.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Contribution {
    pub accuracy_weight: f64,
    pub value: f64,
    pub sample_n: Option<f64>,
}

/// Combine the contributions to a single cell.
pub fn blend_cell(contributions: &[Contribution], config: &BlendConfig) -> CellBlend {
    if contributions.is_empty() {
        return CellBlend::Null;
    }

    if config.sample_size_weight {
        let weights: Vec<f64> = contributions
            .iter()
            .map(|c| c.accuracy_weight * precision(c.value, c.sample_n, config.sample_eps))
            .collect();
        if let Some(value) = weighted_mean(contributions, &weights) {
            return CellBlend::Value {
                value,
                accuracy_fallback: false,
            };
        }
    }

    let weights: Vec<f64> = contributions.iter().map(|c| c.accuracy_weight).collect();
    match weighted_mean(contributions, &weights) {
        Some(value) => CellBlend::Value {
            value,
            accuracy_fallback: config.sample_size_weight,
        },
        None => CellBlend::Null,
    }
}

/// Inverse binomial variance `1 / (p(1-p)/n)`; zero when `n` is unusable.
fn precision(value: f64, sample_n: Option<f64>, eps: f64) -> f64 {
    let Some(n) = sample_n.filter(|n| n.is_finite() && *n > 0.0) else {
        return 0.0;
    };
    let p = (value / 100.0).clamp(eps, 1.0 - eps);
    let variance = p * (1.0 - p) / n;
    let w = 1.0 / variance.max(MIN_OBSERVATION_VARIANCE);
    if w.is_finite() {
        w
    } else {
        0.0
    }
}

fn weighted_mean(contributions: &[Contribution], weights: &[f64]) -> Option<f64> {
    let total: f64 = weights.iter().sum();
    if !(total > 0.0 && total.is_finite()) {
        return None;
    }
    let sum: f64 = contributions
        .iter()
        .zip(weights)
        .map(|(c, w)| w * c.value)
        .sum();
    Some(sum / total)
}

/// Blend raw observations into one row per period.
///
/// Only sources present in `weights` contribute. Categories and sources
/// missing in a period are simply left out of that period's sums.
pub fn blend(
    observations: &[Observation],
    weights: &Weights,
    config: &BlendConfig,
) -> Result<BlendedSeries> {
    config.validate()?;

    let mut categories: BTreeSet<&str> = BTreeSet::new();
    let mut by_period: BTreeMap<NaiveDate, Vec<&Observation>> = BTreeMap::new();
    for obs in observations {
        if !weights.contains(&obs.source_id) {
            continue;
        }
        categories.insert(obs.category.as_str());
        by_period.entry(obs.period_end).or_default().push(obs);
    }

    let mut points = Vec::with_capacity(by_period.len());
    let mut fallback_cells = 0usize;
    for (period_end, group) in by_period {
        let n_sources_reporting = group
            .iter()
            .map(|o| o.source_id.as_str())
            .collect::<BTreeSet<_>>()
            .len();

        let mut values = BTreeMap::new();
        let mut accuracy_fallback = BTreeSet::new();
        for &category in &categories {
            let contributions: Vec<Contribution> = group
                .iter()
                .filter(|o| o.category == category && o.value.is_finite())
                .map(|o| Contribution {
                    accuracy_weight: weights.get(&o.source_id),
                    value: o.value,
                    sample_n: o.sample_n,
                })
                .collect();

            let cell = match blend_cell(&contributions, config) {
                CellBlend::Value {
                    value,
                    accuracy_fallback: fell_back,
                } => {
                    if fell_back {
                        accuracy_fallback.insert(category.to_string());
                        fallback_cells += 1;
                    }
                    Some(value)
                }
                CellBlend::Null => None,
            };
            values.insert(category.to_string(), cell);
        }

        points.push(BlendedPoint {
            period_end,
            n_sources_reporting,
            values,
            accuracy_fallback,
        });
    }

    if fallback_cells > 0 {
        tracing::warn!(
            cells = fallback_cells,
            "sample-size weights collapsed; used accuracy weights"
        );
    }

    Ok(BlendedSeries {
        categories: categories.into_iter().map(String::from).collect(),
        points,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 4, d).unwrap()
    }

    fn weights_ab() -> Weights {
        Weights::from_raw([("A", 0.7), ("B", 0.3)]).unwrap()
    }

    #[test]
    fn accuracy_weighted_mean_is_exact() {
        let obs = vec![
            Observation::new("A", "X", date(1), 60.0),
            Observation::new("B", "X", date(1), 40.0),
        ];
        let blended = blend(&obs, &weights_ab(), &BlendConfig::accuracy_only()).unwrap();
        assert_relative_eq!(blended.value(date(1), "X").unwrap(), 54.0, epsilon = 1e-12);
        assert_eq!(blended.points()[0].n_sources_reporting, 2);
    }

    #[test]
    fn missing_sample_sizes_fall_back_to_accuracy_weights() {
        let obs = vec![
            Observation::new("A", "X", date(1), 60.0),
            Observation::new("B", "X", date(1), 40.0),
        ];
        let blended = blend(&obs, &weights_ab(), &BlendConfig::default()).unwrap();
        assert_relative_eq!(blended.value(date(1), "X").unwrap(), 54.0, epsilon = 1e-12);
        assert!(blended.points()[0].accuracy_fallback.contains("X"));
    }

    #[test]
    fn larger_samples_pull_the_blend() {
        let obs = vec![
            Observation::new("A", "X", date(1), 50.0).with_sample_n(1000.0),
            Observation::new("B", "X", date(1), 50.0).with_sample_n(1000.0),
            Observation::new("A", "Y", date(1), 30.0).with_sample_n(100.0),
            Observation::new("B", "Y", date(1), 40.0).with_sample_n(4000.0),
        ];
        let weights = Weights::from_raw([("A", 0.5), ("B", 0.5)]).unwrap();
        let blended = blend(&obs, &weights, &BlendConfig::default()).unwrap();

        assert_relative_eq!(blended.value(date(1), "X").unwrap(), 50.0, epsilon = 1e-10);
        let y = blended.value(date(1), "Y").unwrap();
        assert!(y > 38.0 && y < 40.0, "got {y}");
    }

    #[test]
    fn zero_sample_size_contributes_no_precision() {
        let contributions = [
            Contribution {
                accuracy_weight: 0.5,
                value: 20.0,
                sample_n: Some(0.0),
            },
            Contribution {
                accuracy_weight: 0.5,
                value: 40.0,
                sample_n: Some(500.0),
            },
        ];
        match blend_cell(&contributions, &BlendConfig::default()) {
            CellBlend::Value {
                value,
                accuracy_fallback,
            } => {
                assert_relative_eq!(value, 40.0, epsilon = 1e-12);
                assert!(!accuracy_fallback);
            }
            CellBlend::Null => panic!("expected a value"),
        }
    }

    #[test]
    fn zero_accuracy_weight_yields_null_not_unweighted_mean() {
        let contributions = [Contribution {
            accuracy_weight: 0.0,
            value: 33.0,
            sample_n: Some(1000.0),
        }];
        assert_eq!(
            blend_cell(&contributions, &BlendConfig::default()),
            CellBlend::Null
        );
    }

    #[test]
    fn categories_missing_in_a_period_are_null() {
        let obs = vec![
            Observation::new("A", "X", date(1), 10.0),
            Observation::new("A", "Y", date(2), 20.0),
            Observation::new("Q", "X", date(2), 99.0),
        ];
        let blended = blend(&obs, &weights_ab(), &BlendConfig::accuracy_only()).unwrap();

        assert_eq!(blended.categories(), &["X".to_string(), "Y".to_string()]);
        assert_eq!(blended.len(), 2);
        assert!(blended.value(date(1), "Y").is_none());
        // Q is not an eligible source
        assert!(blended.value(date(2), "X").is_none());
        assert_eq!(blended.points()[1].n_sources_reporting, 1);
    }

    #[test]
    fn converts_to_wide_time_series() {
        let obs = vec![
            Observation::new("A", "X", date(1), 10.0),
            Observation::new("A", "X", date(3), 30.0),
        ];
        let ts = blend(&obs, &weights_ab(), &BlendConfig::accuracy_only())
            .unwrap()
            .to_time_series()
            .unwrap();
        assert_eq!(ts.dates(), &[date(1), date(3)]);
        assert_eq!(ts.valid_values(), vec![10.0, 30.0]);
    }

    #[test]
    fn invalid_eps_fails_fast() {
        let config = BlendConfig {
            sample_eps: 0.0,
            ..BlendConfig::default()
        };
        assert!(matches!(
            blend(&[], &weights_ab(), &config),
            Err(ForecastError::InvalidConfiguration(_))
        ));
    }
}
