//! End-to-end run: weights, blending, resampling, regime check, forecasts
//! and an optional backtest.

use crate::blending::{
    blend, resolve_and_blend, BlendedSeries, HouseEffectDiagnostic, WeightEntry, Weights,
};
use crate::config::PipelineConfig;
use crate::core::{AccuracyRecord, ForecastRecord, Observation, TimeSeries};
use crate::detection::{clean_driver, detect_regime, SpikeResult};
use crate::error::Result;
use crate::io::{self, RegimeReport};
use crate::models::{
    forecast_next, forecast_next_ssm, forecast_next_ssm_with_exog, ChainForecast, ModelKind,
};
use crate::transform::to_weekly;
use crate::validation::{build_summary, render_markdown, BacktestResult, Backtester, SummaryRow};
use std::path::Path;

/// Backtest tables.
#[derive(Debug, Clone, PartialEq)]
pub struct BacktestOutputs {
    pub result: BacktestResult,
    pub summary: Vec<SummaryRow>,
    /// Markdown report.
    pub report: String,
}

/// Every table produced by one run.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineOutputs {
    pub weights: Vec<WeightEntry>,
    pub blended: BlendedSeries,
    /// Empty when house-effect correction is off.
    pub diagnostics: Vec<HouseEffectDiagnostic>,
    pub weekly: TimeSeries,
    pub regime: RegimeReport,
    pub forecasts: Vec<ForecastRecord>,
    pub driver: Option<SpikeResult>,
    pub backtest: Option<BacktestOutputs>,
}

impl PipelineOutputs {
    /// Write all tables into `dir` under fixed file names.
    pub fn write_to(&self, dir: impl AsRef<Path>) -> Result<()> {
        let dir = dir.as_ref();
        io::write_file(dir.join("weights.csv"), &io::weights_to_csv(&self.weights))?;
        io::write_file(dir.join("blended.csv"), &io::blended_to_csv(&self.blended))?;
        if !self.diagnostics.is_empty() {
            io::write_file(
                dir.join("house_effects.csv"),
                &io::diagnostics_to_csv(&self.diagnostics),
            )?;
        }
        io::write_file(dir.join("forecasts.csv"), &io::forecasts_to_csv(&self.forecasts))?;
        io::write_file(dir.join("regime.json"), &self.regime.to_json()?)?;
        if let Some(backtest) = &self.backtest {
            io::write_file(
                dir.join("backtest_predictions.csv"),
                &io::backtest_to_csv(&backtest.result.rows),
            )?;
            io::write_file(
                dir.join("backtest_summary.csv"),
                &io::summary_to_csv(&backtest.summary),
            )?;
            io::write_file(dir.join("backtest_report.md"), &backtest.report)?;
        }
        tracing::info!(dir = %dir.display(), "outputs written");
        Ok(())
    }
}

/// Configured pipeline. Runs are deterministic and hold no state.
#[derive(Debug, Clone)]
pub struct Pipeline {
    config: PipelineConfig,
}

impl Pipeline {
    pub fn new(config: PipelineConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Run every stage. `driver` is only used when the exogenous model is
    /// enabled.
    pub fn run(
        &self,
        observations: &[Observation],
        accuracy: &[AccuracyRecord],
        driver: Option<&TimeSeries>,
    ) -> Result<PipelineOutputs> {
        let cfg = &self.config;

        let weights = Weights::from_accuracy(accuracy, &cfg.weights)?;
        tracing::info!(sources = weights.len(), "weights built");

        let (blended, diagnostics) = if cfg.forecast.house_effect {
            let (blended, correction) =
                resolve_and_blend(observations, &weights, &cfg.blend, &cfg.house_effect)?;
            (blended, correction.diagnostics)
        } else {
            (blend(observations, &weights, &cfg.blend)?, Vec::new())
        };
        tracing::info!(
            observations = observations.len(),
            periods = blended.len(),
            categories = blended.categories().len(),
            "blend complete"
        );

        let weekly = to_weekly(&blended.to_time_series()?, &cfg.resample)?;

        let status = detect_regime(&weekly, &cfg.regime);
        let q_scale = status.q_scale(cfg.regime.q_scale);

        let driver = match driver.filter(|_| cfg.forecast.exogenous) {
            Some(d) => Some(clean_driver(d, &cfg.spike)?),
            None => None,
        };

        let forecasts = self.forecast_all(&weekly, driver.as_ref(), q_scale)?;
        tracing::info!(
            forecasts = forecasts.len(),
            model = %cfg.forecast.model,
            q_scale,
            "forecasts complete"
        );

        let regime = RegimeReport {
            status,
            q_scale_applied: q_scale,
            model: cfg.forecast.model,
            exogenous: driver.is_some(),
            driver_rows: driver.as_ref().map_or(0, |d| d.series.len()),
        };

        let backtest = if cfg.forecast.backtest {
            Some(self.backtest(&weekly)?)
        } else {
            None
        };

        Ok(PipelineOutputs {
            weights: weights.table(),
            blended,
            diagnostics,
            weekly,
            regime,
            forecasts,
            driver,
            backtest,
        })
    }

    fn forecast_all(
        &self,
        weekly: &TimeSeries,
        driver: Option<&SpikeResult>,
        q_scale: f64,
    ) -> Result<Vec<ForecastRecord>> {
        let cfg = &self.config;
        let horizon = cfg.forecast.horizon;
        let local = cfg.local_level_for_forecast();
        let trend = cfg.trend_for_forecast();

        let mut records = Vec::with_capacity(weekly.labels().len());
        for category in weekly.labels() {
            let mut column = weekly.select(category)?;
            if let Some(driver) = driver {
                column.align_regressor(cfg.exogenous.driver.clone(), &driver.series)?;
            }

            let outcome = match cfg.forecast.model {
                ModelKind::Legacy => {
                    forecast_next(&column, horizon, &trend).map(|forecast| ChainForecast {
                        forecast,
                        model_name: ModelKind::Legacy.to_string(),
                        fallbacks: Vec::new(),
                    })
                }
                ModelKind::StateSpace if driver.is_some() => forecast_next_ssm_with_exog(
                    &column,
                    horizon,
                    &local,
                    &trend,
                    &cfg.exogenous,
                    q_scale,
                ),
                ModelKind::StateSpace => forecast_next_ssm(&column, horizon, &local, &trend, q_scale),
            };

            let chosen = match outcome {
                Ok(chosen) => chosen,
                Err(e) if e.is_recoverable() => {
                    tracing::warn!(category = %category, error = %e, "no forecast for category");
                    continue;
                }
                Err(e) => return Err(e),
            };
            tracing::debug!(
                category = %category,
                model = %chosen.model_name,
                mean = chosen.forecast.mean(),
                "category forecast"
            );
            let exogenous_used = chosen.model_name == "ssm_exog";
            records.push(
                ForecastRecord::from_forecast(
                    category.as_str(),
                    &chosen.forecast,
                    chosen.model_name,
                    exogenous_used,
                )
                .with_fallbacks(chosen.fallbacks),
            );
        }
        Ok(records)
    }

    fn backtest(&self, weekly: &TimeSeries) -> Result<BacktestOutputs> {
        let cfg = &self.config;
        let backtester = Backtester::new(cfg.backtest.clone(), &cfg.local_level, &cfg.trend)?;
        let result = backtester.run(weekly)?;
        let summary = build_summary(&result.rows);
        let report = render_markdown(&summary);
        tracing::info!(
            folds = result.folds,
            rows = result.rows.len(),
            skipped = result.skipped.total(),
            "backtest complete"
        );
        Ok(BacktestOutputs {
            result,
            summary,
            report,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::REASON_DISABLED;
    use crate::error::ForecastError;
    use chrono::{Duration, NaiveDate};

    fn start() -> NaiveDate {
        // a Monday
        NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()
    }

    /// Two sources, weekly Monday releases, A reads one point high.
    fn panel(weeks: i64) -> Vec<Observation> {
        (0..weeks)
            .flat_map(|w| {
                let d = start() + Duration::weeks(w);
                let x = 45.0 + 0.1 * w as f64 + if w % 2 == 0 { 0.3 } else { -0.3 };
                let y = 30.0 - 0.05 * w as f64;
                vec![
                    Observation::new("A", "X", d, x + 1.0).with_sample_n(1000.0),
                    Observation::new("B", "X", d, x - 1.0).with_sample_n(1000.0),
                    Observation::new("A", "Y", d, y).with_sample_n(1000.0),
                    Observation::new("B", "Y", d, y).with_sample_n(1000.0),
                ]
            })
            .collect()
    }

    fn accuracy() -> Vec<AccuracyRecord> {
        vec![AccuracyRecord::new("A", 2.0), AccuracyRecord::new("B", 2.0)]
    }

    #[test]
    fn full_run_produces_every_table() {
        let mut config = PipelineConfig::default();
        config.forecast.backtest = true;
        let outputs = Pipeline::new(config).unwrap().run(&panel(30), &accuracy(), None).unwrap();

        assert_eq!(outputs.weights.len(), 2);
        assert_eq!(outputs.blended.len(), 30);
        assert_eq!(outputs.weekly.len(), 30);
        assert!(!outputs.diagnostics.is_empty());
        assert_eq!(outputs.forecasts.len(), 2);
        for record in &outputs.forecasts {
            assert_eq!(record.model_name, "ssm");
            assert!(record.std_dev.is_some());
            assert!(!record.exogenous_used);
        }
        assert!(!outputs.regime.exogenous);
        assert_eq!(outputs.regime.driver_rows, 0);

        let backtest = outputs.backtest.unwrap();
        assert!(backtest.result.folds > 0);
        assert!(backtest.report.contains("Overall MAE legacy"));
    }

    #[test]
    fn legacy_model_has_no_std_dev() {
        let mut config = PipelineConfig::default();
        config.forecast.model = ModelKind::Legacy;
        config.forecast.house_effect = false;
        config.regime.enabled = false;
        let outputs = Pipeline::new(config).unwrap().run(&panel(12), &accuracy(), None).unwrap();

        assert!(outputs.diagnostics.is_empty());
        assert_eq!(outputs.regime.status.reasons, vec![REASON_DISABLED]);
        assert_eq!(outputs.regime.q_scale_applied, 1.0);
        for record in &outputs.forecasts {
            assert_eq!(record.model_name, "legacy");
            assert!(record.std_dev.is_none());
            assert!(record.interval_80_low.is_none());
        }
    }

    #[test]
    fn driver_enables_exogenous_model() {
        let mut config = PipelineConfig::default();
        config.forecast.exogenous = true;
        config.forecast.house_effect = false;
        let dates: Vec<NaiveDate> = (0..30).map(|w| start() + Duration::weeks(w)).collect();
        let values: Vec<f64> = (0..30).map(|w| 100.0 + (w % 5) as f64).collect();
        let driver = TimeSeries::from_values(dates, io::DRIVER_COLUMN, &values).unwrap();

        let outputs = Pipeline::new(config)
            .unwrap()
            .run(&panel(30), &accuracy(), Some(&driver))
            .unwrap();
        assert!(outputs.regime.exogenous);
        assert_eq!(outputs.regime.driver_rows, 30);
        assert!(outputs.forecasts.iter().all(|r| r.model_name == "ssm_exog"));
        assert!(outputs.forecasts.iter().all(|r| r.exogenous_used));
    }

    #[test]
    fn short_history_falls_back_to_legacy() {
        let outputs = Pipeline::new(PipelineConfig::default())
            .unwrap()
            .run(&panel(6), &accuracy(), None)
            .unwrap();
        for record in &outputs.forecasts {
            assert_eq!(record.model_name, "legacy");
            assert_eq!(record.fallbacks.len(), 1);
        }
    }

    #[test]
    fn missing_accuracy_aborts_the_run() {
        let err = Pipeline::new(PipelineConfig::default())
            .unwrap()
            .run(&panel(10), &[], None)
            .unwrap_err();
        assert!(matches!(err, ForecastError::NumericDegeneracy(_)));
    }

    #[test]
    fn invalid_config_is_rejected_up_front() {
        let mut config = PipelineConfig::default();
        config.house_effect.ewma_lambda = 1.5;
        assert!(matches!(
            Pipeline::new(config).unwrap_err(),
            ForecastError::InvalidConfiguration(_)
        ));
    }
}
