//! Accuracy-based combination weights.
//!
//! Each eligible source gets weight `1/MAE`, normalized so the weights of
//! all eligible sources sum to one.

use crate::core::AccuracyRecord;
use crate::error::{ForecastError, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Which sources may contribute to a blend.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WeightConfig {
    /// Source whitelist. An empty list admits every source with a usable MAE.
    pub eligible_sources: Vec<String>,
}

impl WeightConfig {
    pub fn with_sources<I, S>(sources: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            eligible_sources: sources.into_iter().map(Into::into).collect(),
        }
    }

    fn admits(&self, source_id: &str) -> bool {
        self.eligible_sources.is_empty() || self.eligible_sources.iter().any(|s| s == source_id)
    }
}

/// Per-source weight derived from historical accuracy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeightEntry {
    pub source_id: String,
    pub mae: f64,
    pub weight: f64,
    pub weight_pct: f64,
}

/// Normalized accuracy weights keyed by source.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Weights {
    entries: BTreeMap<String, WeightEntry>,
}

impl Weights {
    /// Build weights from a historical accuracy table.
    ///
    /// Records outside the whitelist and records with a missing MAE are
    /// dropped. A source listed more than once uses the mean of its MAEs, so
    /// the result does not depend on row order.
    pub fn from_accuracy(records: &[AccuracyRecord], config: &WeightConfig) -> Result<Self> {
        let mut grouped: BTreeMap<&str, (f64, usize)> = BTreeMap::new();
        for record in records {
            if !config.admits(&record.source_id) {
                continue;
            }
            let Some(mae) = record.mae.filter(|m| m.is_finite()) else {
                continue;
            };
            if mae <= 0.0 {
                return Err(ForecastError::InvalidConfiguration(format!(
                    "MAE for source '{}' must be positive, got {mae}",
                    record.source_id
                )));
            }
            let slot = grouped.entry(record.source_id.as_str()).or_insert((0.0, 0));
            slot.0 += mae;
            slot.1 += 1;
        }

        if grouped.is_empty() {
            return Err(ForecastError::NumericDegeneracy(
                "no eligible source has a usable MAE".into(),
            ));
        }

        let maes: BTreeMap<&str, f64> = grouped
            .into_iter()
            .map(|(source, (sum, count))| (source, sum / count as f64))
            .collect();
        let total: f64 = maes.values().map(|mae| 1.0 / mae).sum();

        let entries = maes
            .into_iter()
            .map(|(source, mae)| {
                let weight = (1.0 / mae) / total;
                (
                    source.to_string(),
                    WeightEntry {
                        source_id: source.to_string(),
                        mae,
                        weight,
                        weight_pct: weight * 100.0,
                    },
                )
            })
            .collect();

        Ok(Self { entries })
    }

    /// Build weights directly from `(source, weight)` pairs, normalizing them.
    ///
    /// Used when a weight table is already known, e.g. from a previous run.
    pub fn from_raw<I, S>(pairs: I) -> Result<Self>
    where
        I: IntoIterator<Item = (S, f64)>,
        S: Into<String>,
    {
        let raw: Vec<(String, f64)> = pairs.into_iter().map(|(s, w)| (s.into(), w)).collect();
        if raw.iter().any(|(_, w)| !(w.is_finite() && *w >= 0.0)) {
            return Err(ForecastError::InvalidConfiguration(
                "weights must be finite and non-negative".into(),
            ));
        }
        let total: f64 = raw.iter().map(|(_, w)| w).sum();
        if total <= 0.0 {
            return Err(ForecastError::NumericDegeneracy(
                "weights sum to zero".into(),
            ));
        }
        let entries = raw
            .into_iter()
            .map(|(source, w)| {
                let weight = w / total;
                (
                    source.clone(),
                    WeightEntry {
                        source_id: source,
                        mae: f64::NAN,
                        weight,
                        weight_pct: weight * 100.0,
                    },
                )
            })
            .collect();
        Ok(Self { entries })
    }

    /// Normalized weight of a source, `0.0` when it is not eligible.
    pub fn get(&self, source_id: &str) -> f64 {
        self.entries.get(source_id).map(|e| e.weight).unwrap_or(0.0)
    }

    pub fn contains(&self, source_id: &str) -> bool {
        self.entries.contains_key(source_id)
    }

    pub fn sources(&self) -> BTreeSet<&str> {
        self.entries.keys().map(|s| s.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Weight table sorted by weight descending, ties by source id.
    pub fn table(&self) -> Vec<WeightEntry> {
        let mut rows: Vec<WeightEntry> = self.entries.values().cloned().collect();
        rows.sort_by(|a, b| {
            b.weight
                .partial_cmp(&a.weight)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.source_id.cmp(&b.source_id))
        });
        rows
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn weights_are_inverse_mae_normalized() {
        let records = vec![
            AccuracyRecord::new("A", 1.0),
            AccuracyRecord::new("B", 2.0),
            AccuracyRecord::new("C", 4.0),
        ];
        let weights = Weights::from_accuracy(&records, &WeightConfig::default()).unwrap();

        // 1/1 : 1/2 : 1/4 = 4 : 2 : 1
        assert_relative_eq!(weights.get("A"), 4.0 / 7.0, epsilon = 1e-12);
        assert_relative_eq!(weights.get("B"), 2.0 / 7.0, epsilon = 1e-12);
        assert_relative_eq!(weights.get("C"), 1.0 / 7.0, epsilon = 1e-12);
        let total: f64 = weights.table().iter().map(|e| e.weight).sum();
        assert_relative_eq!(total, 1.0, epsilon = 1e-12);
    }

    #[test]
    fn whitelist_and_missing_mae_are_dropped() {
        let records = vec![
            AccuracyRecord::new("A", 2.0),
            AccuracyRecord::new("B", 2.0),
            AccuracyRecord {
                source_id: "C".into(),
                mae: None,
            },
            AccuracyRecord::new("Z", 0.5),
        ];
        let config = WeightConfig::with_sources(["A", "B", "C"]);
        let weights = Weights::from_accuracy(&records, &config).unwrap();

        assert_eq!(weights.len(), 2);
        assert_relative_eq!(weights.get("A"), 0.5);
        assert_eq!(weights.get("C"), 0.0);
        assert_eq!(weights.get("Z"), 0.0);
    }

    #[test]
    fn duplicate_sources_do_not_depend_on_order() {
        let forward = vec![
            AccuracyRecord::new("A", 1.0),
            AccuracyRecord::new("A", 3.0),
            AccuracyRecord::new("B", 2.0),
        ];
        let mut reversed = forward.clone();
        reversed.reverse();

        let w1 = Weights::from_accuracy(&forward, &WeightConfig::default()).unwrap();
        let w2 = Weights::from_accuracy(&reversed, &WeightConfig::default()).unwrap();
        assert_eq!(w1, w2);
        assert_relative_eq!(w1.get("A"), 0.5);
    }

    #[test]
    fn table_is_sorted_by_weight_descending() {
        let records = vec![
            AccuracyRecord::new("slow", 4.0),
            AccuracyRecord::new("sharp", 1.0),
        ];
        let table = Weights::from_accuracy(&records, &WeightConfig::default())
            .unwrap()
            .table();
        assert_eq!(table[0].source_id, "sharp");
        assert_relative_eq!(table[0].weight_pct, 80.0, epsilon = 1e-10);
    }

    #[test]
    fn no_usable_source_is_degenerate() {
        let records = vec![AccuracyRecord {
            source_id: "A".into(),
            mae: None,
        }];
        assert!(matches!(
            Weights::from_accuracy(&records, &WeightConfig::default()),
            Err(ForecastError::NumericDegeneracy(_))
        ));
    }

    #[test]
    fn non_positive_mae_is_rejected() {
        let records = vec![AccuracyRecord::new("A", 0.0)];
        assert!(matches!(
            Weights::from_accuracy(&records, &WeightConfig::default()),
            Err(ForecastError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn raw_weights_are_normalized() {
        let weights = Weights::from_raw([("A", 7.0), ("B", 3.0)]).unwrap();
        assert_relative_eq!(weights.get("A"), 0.7, epsilon = 1e-12);
        assert_relative_eq!(weights.get("B"), 0.3, epsilon = 1e-12);
        assert!(Weights::from_raw([("A", 0.0)]).is_err());
    }
}
