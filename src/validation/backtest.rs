//! Rolling-origin backtesting.
//!
//! For every origin `t` from `min_train` to `len - horizon`, each variant is
//! trained on rows `[0, t)` and scored against row `t + horizon - 1`. The
//! regime check is rerun per fold on the training rows only.

use crate::core::TimeSeries;
use crate::detection::{detect_regime, RegimeConfig};
use crate::error::{ForecastError, Result};
use crate::models::{
    standard_variant, LocalLevelConfig, ModelRegistry, TrendConfig, STANDARD_VARIANTS,
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Backtest configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BacktestConfig {
    /// First origin; folds train on at least this many rows.
    pub min_train: usize,
    /// Trailing window handed to every variant.
    pub window: usize,
    /// Steps ahead being scored.
    pub horizon: usize,
    /// Folds whose training column has fewer non-null points are skipped.
    pub min_points: usize,
    /// Variants to evaluate, by registry name.
    pub variants: Vec<String>,
    /// Per-fold regime guard.
    pub regime: RegimeConfig,
}

impl Default for BacktestConfig {
    fn default() -> Self {
        Self {
            min_train: 20,
            window: 24,
            horizon: 1,
            min_points: 8,
            variants: vec!["legacy".to_string(), "ssm".to_string()],
            regime: RegimeConfig::default(),
        }
    }
}

impl BacktestConfig {
    pub fn with_variants<I, S>(mut self, variants: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.variants = variants.into_iter().map(Into::into).collect();
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.min_train == 0 || self.window == 0 || self.horizon == 0 {
            return Err(ForecastError::InvalidConfiguration(
                "backtest min_train, window and horizon must be positive".into(),
            ));
        }
        if self.variants.is_empty() {
            return Err(ForecastError::InvalidConfiguration(
                "backtest needs at least one variant".into(),
            ));
        }
        self.regime.validate()
    }
}

/// One scored prediction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacktestRow {
    pub date: NaiveDate,
    pub category: String,
    pub model: String,
    pub actual: f64,
    pub pred: f64,
    /// `actual - pred`
    pub error: f64,
    pub abs_error: f64,
    pub sq_error: f64,
    /// Whether the regime guard fired for this fold.
    pub triggered: bool,
}

/// Folds that produced no row, by cause.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SkipCounts {
    /// Target period has no value.
    pub missing_actual: usize,
    /// Training column below `min_points`.
    pub short_history: usize,
    /// Every strategy of a variant declined.
    pub declined: usize,
}

impl SkipCounts {
    pub fn total(&self) -> usize {
        self.missing_actual + self.short_history + self.declined
    }
}

/// Backtest output.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct BacktestResult {
    pub rows: Vec<BacktestRow>,
    pub skipped: SkipCounts,
    /// Number of origins evaluated.
    pub folds: usize,
}

/// Rolling-origin backtester over a set of forecasting variants.
#[derive(Debug)]
pub struct Backtester {
    config: BacktestConfig,
    registry: ModelRegistry,
}

impl Backtester {
    /// Build the requested standard variants with the backtest window applied.
    pub fn new(config: BacktestConfig, local: &LocalLevelConfig, trend: &TrendConfig) -> Result<Self> {
        config.validate()?;
        local.validate()?;
        trend.validate()?;
        let local = local.clone().with_window(config.window);
        let trend = trend.with_window(config.window);
        let mut registry = ModelRegistry::new();
        for variant in &config.variants {
            let spec = standard_variant(variant, &local, &trend).ok_or_else(|| {
                ForecastError::InvalidConfiguration(format!(
                    "unknown backtest variant '{variant}', expected one of {STANDARD_VARIANTS:?}"
                ))
            })?;
            registry.register(spec);
        }
        Ok(Self { config, registry })
    }

    /// Use a caller-supplied set of variants.
    pub fn with_registry(config: BacktestConfig, registry: ModelRegistry) -> Result<Self> {
        config.validate()?;
        Ok(Self { config, registry })
    }

    pub fn config(&self) -> &BacktestConfig {
        &self.config
    }

    /// Run every variant on every category column of `series`.
    pub fn run(&self, series: &TimeSeries) -> Result<BacktestResult> {
        let h = self.config.horizon;
        let mut result = BacktestResult::default();
        if series.len() < self.config.min_train + h + 1 {
            tracing::info!(
                rows = series.len(),
                needed = self.config.min_train + h + 1,
                "series too short to backtest"
            );
            return Ok(result);
        }

        for t in self.config.min_train..=series.len() - h {
            let train = series.head(t)?;
            let target = t + h - 1;
            let status = detect_regime(&train, &self.config.regime);
            let q_scale = status.q_scale(self.config.regime.q_scale);
            result.folds += 1;

            for category in series.labels() {
                let actual = series.require_column(category)?[target].filter(|v| v.is_finite());
                let Some(actual) = actual else {
                    result.skipped.missing_actual += 1;
                    continue;
                };
                let column = train.select(category)?;
                if column.count_valid() < self.config.min_points {
                    result.skipped.short_history += 1;
                    continue;
                }

                for spec in self.registry.iter() {
                    let mut chain = spec.create(q_scale);
                    let forecast = match chain.run(&column, h) {
                        Ok(out) => out.forecast,
                        Err(e) if e.is_recoverable() => {
                            tracing::warn!(
                                date = %series.dates()[target],
                                category = %category,
                                model = spec.name,
                                error = %e,
                                "skipping backtest fold"
                            );
                            result.skipped.declined += 1;
                            continue;
                        }
                        Err(e) => return Err(e),
                    };
                    let error = actual - forecast.mean();
                    result.rows.push(BacktestRow {
                        date: series.dates()[target],
                        category: category.clone(),
                        model: spec.name.to_string(),
                        actual,
                        pred: forecast.mean(),
                        error,
                        abs_error: error.abs(),
                        sq_error: error * error,
                        triggered: status.triggered,
                    });
                }
            }
        }

        tracing::info!(
            folds = result.folds,
            rows = result.rows.len(),
            skipped = result.skipped.total(),
            "backtest complete"
        );
        Ok(result)
    }
}
