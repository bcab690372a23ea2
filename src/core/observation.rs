//! Raw survey observations as ingested from a source.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// One source's reported value for one category at one reporting period.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub source_id: String,
    pub category: String,
    pub period_end: NaiveDate,
    /// Percentage in `[0, 100]`.
    pub value: f64,
    /// Reported sample size, if any.
    pub sample_n: Option<f64>,
}

impl Observation {
    pub fn new(
        source_id: impl Into<String>,
        category: impl Into<String>,
        period_end: NaiveDate,
        value: f64,
    ) -> Self {
        Self {
            source_id: source_id.into(),
            category: category.into(),
            period_end,
            value,
            sample_n: None,
        }
    }

    pub fn with_sample_n(mut self, sample_n: f64) -> Self {
        self.sample_n = Some(sample_n);
        self
    }

    /// Copy with a replacement value, as produced by bias correction.
    pub fn with_value(&self, value: f64) -> Self {
        Self {
            value,
            ..self.clone()
        }
    }
}

/// One source's historical accuracy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccuracyRecord {
    pub source_id: String,
    /// Mean absolute error; `None` when the cell was missing or non-numeric.
    pub mae: Option<f64>,
}

impl AccuracyRecord {
    pub fn new(source_id: impl Into<String>, mae: f64) -> Self {
        Self {
            source_id: source_id.into(),
            mae: Some(mae),
        }
    }
}
