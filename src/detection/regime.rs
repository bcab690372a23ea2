//! Short-term volatility regime detection.
//!
//! For each focus category the first differences of the series are split
//! into a recent block and the base block immediately before it. The
//! volatility z-score is `mean(|recent|) / max(std(base), eps)`.

use crate::core::TimeSeries;
use crate::error::{ForecastError, Result};
use crate::utils::stats::{diff, mean, population_std_dev};
use serde::{Deserialize, Serialize};

pub const REASON_NORMAL: &str = "normal";
pub const REASON_INSUFFICIENT_HISTORY: &str = "insufficient_history";
pub const REASON_FOCUS_MISSING: &str = "focus_categories_missing";
pub const REASON_DISABLED: &str = "disabled";

/// Regime detection configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegimeConfig {
    /// When false every run reports `disabled` and no noise scaling occurs.
    pub enabled: bool,
    /// Categories to monitor. Empty means every column of the series.
    pub focus_categories: Vec<String>,
    /// Number of most recent differences.
    pub recent_window: usize,
    /// Number of differences before the recent block.
    pub base_window: usize,
    /// Trigger threshold on the volatility z-score.
    pub z_threshold: f64,
    /// Floor on the base standard deviation.
    pub min_std: f64,
    /// Process-noise multiplier applied while triggered.
    pub q_scale: f64,
}

impl Default for RegimeConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            focus_categories: Vec::new(),
            recent_window: 4,
            base_window: 12,
            z_threshold: 2.0,
            min_std: 1e-6,
            q_scale: 2.0,
        }
    }
}

impl RegimeConfig {
    pub fn with_focus<I, S>(mut self, categories: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.focus_categories = categories.into_iter().map(Into::into).collect();
        self
    }

    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }

    /// Minimum non-null points a category needs to be scored.
    pub fn min_points(&self) -> usize {
        self.recent_window + self.base_window + 1
    }

    pub fn validate(&self) -> Result<()> {
        if self.recent_window == 0 || self.base_window == 0 {
            return Err(ForecastError::InvalidConfiguration(
                "regime windows must be positive".into(),
            ));
        }
        if !(self.z_threshold.is_finite() && self.z_threshold > 0.0) {
            return Err(ForecastError::InvalidConfiguration(format!(
                "z_threshold must be positive, got {}",
                self.z_threshold
            )));
        }
        if !(self.min_std > 0.0) {
            return Err(ForecastError::InvalidConfiguration(format!(
                "min_std must be positive, got {}",
                self.min_std
            )));
        }
        if !(self.q_scale.is_finite() && self.q_scale > 0.0) {
            return Err(ForecastError::InvalidConfiguration(format!(
                "q_scale must be positive, got {}",
                self.q_scale
            )));
        }
        Ok(())
    }
}

/// Outcome of a regime check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegimeStatus {
    pub triggered: bool,
    pub reasons: Vec<String>,
    /// Maximum z-score across scored focus categories, `0.0` if none.
    pub score: f64,
}

impl RegimeStatus {
    fn quiet(reason: &str) -> Self {
        Self {
            triggered: false,
            reasons: vec![reason.to_string()],
            score: 0.0,
        }
    }

    pub fn disabled() -> Self {
        Self::quiet(REASON_DISABLED)
    }

    pub fn is_insufficient(&self) -> bool {
        self.reasons.iter().any(|r| r == REASON_INSUFFICIENT_HISTORY)
    }

    /// Process-noise multiplier for forecasters: `scale` when triggered, 1 otherwise.
    pub fn q_scale(&self, scale: f64) -> f64 {
        if self.triggered {
            scale
        } else {
            1.0
        }
    }
}

/// Volatility z-score of one category, `None` if it lacks history.
pub fn volatility_z(values: &[f64], config: &RegimeConfig) -> Option<f64> {
    if values.len() < config.min_points() {
        return None;
    }
    let d = diff(values);
    let recent = &d[d.len() - config.recent_window..];
    let base = &d[d.len() - config.recent_window - config.base_window..d.len() - config.recent_window];

    let recent_abs: Vec<f64> = recent.iter().map(|x| x.abs()).collect();
    let base_std = population_std_dev(base);
    Some(mean(&recent_abs) / base_std.max(config.min_std))
}

/// Score the trailing window of `series` for abnormal volatility.
pub fn detect_regime(series: &TimeSeries, config: &RegimeConfig) -> RegimeStatus {
    if !config.enabled {
        return RegimeStatus::disabled();
    }

    let focus: Vec<&str> = if config.focus_categories.is_empty() {
        series.labels().iter().map(|s| s.as_str()).collect()
    } else {
        config
            .focus_categories
            .iter()
            .map(|s| s.as_str())
            .filter(|c| series.column(c).is_some())
            .collect()
    };
    if focus.is_empty() {
        return RegimeStatus::quiet(REASON_FOCUS_MISSING);
    }

    let mut scores = Vec::new();
    let mut reasons = Vec::new();
    for category in focus {
        let Some(column) = series.column(category) else {
            continue;
        };
        let values: Vec<f64> = column.iter().flatten().copied().filter(|v| v.is_finite()).collect();
        let Some(z) = volatility_z(&values, config) else {
            continue;
        };
        scores.push(z);
        if z >= config.z_threshold {
            reasons.push(format!("{category}:volatility_z={z:.2}"));
        }
    }

    if scores.is_empty() {
        return RegimeStatus::quiet(REASON_INSUFFICIENT_HISTORY);
    }

    let score = scores.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let triggered = !reasons.is_empty();
    if triggered {
        tracing::info!(score, reasons = ?reasons, "volatility regime triggered");
    }
    RegimeStatus {
        triggered,
        reasons: if triggered {
            reasons
        } else {
            vec![REASON_NORMAL.to_string()]
        },
        score,
    }
}
