//! Time-varying house-effect correction.
//!
//! Each `(source, category)` pair carries an EWMA of its residuals against
//! the uncorrected blend. The bias subtracted from an observation is always
//! the state *before* that observation's residual is folded in, so the
//! corrector never absorbs the current period's signal.

use crate::blending::engine::{blend, BlendConfig, BlendedSeries};
use crate::blending::weights::Weights;
use crate::core::Observation;
use crate::error::{ForecastError, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// House-effect filter configuration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HouseEffectConfig {
    /// EWMA memory, must lie in `[0, 1)`.
    pub ewma_lambda: f64,
    /// Absolute clip applied to the lagged bias.
    pub bias_clip: f64,
    /// Prior observations required before any bias is applied.
    pub min_obs: usize,
}

impl Default for HouseEffectConfig {
    fn default() -> Self {
        Self {
            ewma_lambda: 0.8,
            bias_clip: 6.0,
            min_obs: 3,
        }
    }
}

impl HouseEffectConfig {
    pub fn validate(&self) -> Result<()> {
        if !(0.0..1.0).contains(&self.ewma_lambda) {
            return Err(ForecastError::InvalidConfiguration(format!(
                "ewma_lambda must be in [0, 1), got {}",
                self.ewma_lambda
            )));
        }
        if !(self.bias_clip >= 0.0) {
            return Err(ForecastError::InvalidConfiguration(format!(
                "bias_clip must be non-negative, got {}",
                self.bias_clip
            )));
        }
        Ok(())
    }
}

/// Filter state for one `(source, category)` pair.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct HouseEffectState {
    pub bias_estimate: f64,
    pub observation_count: usize,
}

impl HouseEffectState {
    /// Bias to subtract from the next observation.
    pub fn applied_bias(&self, config: &HouseEffectConfig) -> f64 {
        if self.observation_count >= config.min_obs {
            self.bias_estimate.clamp(-config.bias_clip, config.bias_clip)
        } else {
            0.0
        }
    }

    /// Fold one residual into the state.
    pub fn update(&mut self, residual: f64, config: &HouseEffectConfig) {
        self.bias_estimate =
            config.ewma_lambda * self.bias_estimate + (1.0 - config.ewma_lambda) * residual;
        self.observation_count += 1;
    }
}

/// States keyed by `(source_id, category)`.
pub type HouseEffectStates = BTreeMap<(String, String), HouseEffectState>;

/// Audit row for one corrected observation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HouseEffectDiagnostic {
    pub period_end: NaiveDate,
    pub source_id: String,
    pub category: String,
    pub raw: f64,
    pub baseline: f64,
    pub residual: f64,
    pub applied_bias: f64,
    pub adjusted: f64,
    pub obs_count: usize,
}

/// Output of one correction pass.
#[derive(Debug, Clone, PartialEq)]
pub struct Correction {
    /// Observations in input order with corrected values.
    pub adjusted: Vec<Observation>,
    /// Sorted by `(period_end, source_id, category)`.
    pub diagnostics: Vec<HouseEffectDiagnostic>,
    /// Final filter states.
    pub states: HouseEffectStates,
}

/// Lagged EWMA house-effect corrector.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HouseEffectCorrector {
    config: HouseEffectConfig,
}

impl HouseEffectCorrector {
    pub fn new(config: HouseEffectConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &HouseEffectConfig {
        &self.config
    }

    /// Correct observations against an uncorrected `baseline` blend.
    ///
    /// `states` seeds the filters; pass an empty map for a fresh run.
    /// Observations whose value or baseline is missing pass through
    /// untouched and do not advance their filter.
    pub fn correct(
        &self,
        observations: &[Observation],
        baseline: &BlendedSeries,
        mut states: HouseEffectStates,
    ) -> Correction {
        let mut order: Vec<usize> = (0..observations.len()).collect();
        // stable sort keeps input order as the tie-break within a date
        order.sort_by(|&a, &b| {
            let (x, y) = (&observations[a], &observations[b]);
            x.source_id
                .cmp(&y.source_id)
                .then_with(|| x.period_end.cmp(&y.period_end))
        });

        let mut adjusted = observations.to_vec();
        let mut diagnostics = Vec::new();

        for i in order {
            let obs = &observations[i];
            if !obs.value.is_finite() {
                continue;
            }
            let Some(base) = baseline.value(obs.period_end, &obs.category) else {
                continue;
            };

            let state = states
                .entry((obs.source_id.clone(), obs.category.clone()))
                .or_default();
            let applied_bias = state.applied_bias(&self.config);
            let residual = obs.value - base;
            let value = obs.value - applied_bias;
            state.update(residual, &self.config);

            adjusted[i] = obs.with_value(value);
            diagnostics.push(HouseEffectDiagnostic {
                period_end: obs.period_end,
                source_id: obs.source_id.clone(),
                category: obs.category.clone(),
                raw: obs.value,
                baseline: base,
                residual,
                applied_bias,
                adjusted: value,
                obs_count: state.observation_count,
            });
        }

        diagnostics.sort_by(|a, b| {
            a.period_end
                .cmp(&b.period_end)
                .then_with(|| a.source_id.cmp(&b.source_id))
                .then_with(|| a.category.cmp(&b.category))
        });

        Correction {
            adjusted,
            diagnostics,
            states,
        }
    }
}

/// Blend, correct house effects against that blend, then blend again.
///
/// Returns the corrected blend together with the correction pass so the
/// diagnostics stay available to the caller.
pub fn resolve_and_blend(
    observations: &[Observation],
    weights: &Weights,
    blend_config: &BlendConfig,
    config: &HouseEffectConfig,
) -> Result<(BlendedSeries, Correction)> {
    let corrector = HouseEffectCorrector::new(*config)?;
    let eligible: Vec<Observation> = observations
        .iter()
        .filter(|o| weights.contains(&o.source_id))
        .cloned()
        .collect();

    let baseline = blend(&eligible, weights, blend_config)?;
    let correction = corrector.correct(&eligible, &baseline, HouseEffectStates::new());
    let corrected = blend(&correction.adjusted, weights, blend_config)?;

    tracing::info!(
        observations = eligible.len(),
        corrected = correction.diagnostics.len(),
        filters = correction.states.len(),
        "house-effect correction complete"
    );
    Ok((corrected, correction))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 5, d).unwrap()
    }

    fn weights() -> Weights {
        Weights::from_raw([("A", 0.5), ("B", 0.5)]).unwrap()
    }

    /// A reads 2 points above B every period around a consensus of 40.
    fn biased_panel(periods: u32) -> Vec<Observation> {
        (1..=periods)
            .flat_map(|d| {
                [
                    Observation::new("A", "X", date(d), 41.0),
                    Observation::new("B", "X", date(d), 39.0),
                ]
            })
            .collect()
    }

    #[test]
    fn lambda_outside_unit_interval_fails_fast() {
        for lambda in [1.0, -0.1, f64::NAN] {
            let config = HouseEffectConfig {
                ewma_lambda: lambda,
                ..HouseEffectConfig::default()
            };
            assert!(matches!(
                HouseEffectCorrector::new(config),
                Err(ForecastError::InvalidConfiguration(_))
            ));
        }
    }

    #[test]
    fn bias_is_lagged_and_gated_by_min_obs() {
        let obs = biased_panel(5);
        let (_, correction) =
            resolve_and_blend(&obs, &weights(), &BlendConfig::accuracy_only(), &HouseEffectConfig::default())
                .unwrap();

        let a_rows: Vec<&HouseEffectDiagnostic> = correction
            .diagnostics
            .iter()
            .filter(|d| d.source_id == "A")
            .collect();
        assert_eq!(a_rows.len(), 5);

        // first three observations see no bias
        for row in &a_rows[..3] {
            assert_eq!(row.applied_bias, 0.0);
            assert_eq!(row.adjusted, row.raw);
            assert_relative_eq!(row.residual, 1.0);
        }
        // fourth uses the state after three residuals of 1.0: 1 - 0.8^3
        assert_relative_eq!(a_rows[3].applied_bias, 1.0 - 0.8_f64.powi(3), epsilon = 1e-12);
        assert_relative_eq!(a_rows[4].applied_bias, 1.0 - 0.8_f64.powi(4), epsilon = 1e-12);
        assert_eq!(a_rows[4].obs_count, 5);

        let state = correction.states[&("A".to_string(), "X".to_string())];
        assert_relative_eq!(state.bias_estimate, 1.0 - 0.8_f64.powi(5), epsilon = 1e-12);
    }

    #[test]
    fn zero_residual_source_is_left_untouched() {
        let obs: Vec<Observation> = (1..=8)
            .flat_map(|d| {
                [
                    Observation::new("A", "X", date(d), 30.0 + d as f64),
                    Observation::new("B", "X", date(d), 30.0 + d as f64),
                ]
            })
            .collect();
        let (blended, correction) =
            resolve_and_blend(&obs, &weights(), &BlendConfig::accuracy_only(), &HouseEffectConfig::default())
                .unwrap();

        assert!(correction.states.values().all(|s| s.bias_estimate == 0.0));
        assert!(correction.diagnostics.iter().all(|d| d.adjusted == d.raw));
        assert_relative_eq!(blended.value(date(8), "X").unwrap(), 38.0);
    }

    #[test]
    fn bias_is_clipped_when_applied() {
        let config = HouseEffectConfig {
            ewma_lambda: 0.0,
            bias_clip: 2.0,
            min_obs: 1,
        };
        let corrector = HouseEffectCorrector::new(config).unwrap();
        let obs = vec![
            Observation::new("A", "X", date(1), 60.0),
            Observation::new("A", "X", date(2), 60.0),
        ];
        let baseline_obs = vec![
            Observation::new("B", "X", date(1), 50.0),
            Observation::new("B", "X", date(2), 50.0),
        ];
        let baseline = blend(
            &baseline_obs,
            &Weights::from_raw([("B", 1.0)]).unwrap(),
            &BlendConfig::accuracy_only(),
        )
        .unwrap();

        let correction = corrector.correct(&obs, &baseline, HouseEffectStates::new());
        assert_eq!(correction.diagnostics[1].applied_bias, 2.0);
        assert_eq!(correction.adjusted[1].value, 58.0);
        // internal state is not clipped
        assert_eq!(
            correction.states[&("A".to_string(), "X".to_string())].bias_estimate,
            10.0
        );
    }

    #[test]
    fn missing_baseline_passes_through() {
        let corrector = HouseEffectCorrector::new(HouseEffectConfig::default()).unwrap();
        let obs = vec![Observation::new("A", "X", date(1), 42.0)];
        let correction = corrector.correct(&obs, &BlendedSeries::default(), HouseEffectStates::new());
        assert_eq!(correction.adjusted, obs);
        assert!(correction.diagnostics.is_empty());
        assert!(correction.states.is_empty());
    }

    #[test]
    fn diagnostics_are_sorted_by_date_source_category() {
        let mut obs = biased_panel(3);
        obs.reverse();
        let (_, correction) =
            resolve_and_blend(&obs, &weights(), &BlendConfig::accuracy_only(), &HouseEffectConfig::default())
                .unwrap();
        let keys: Vec<(NaiveDate, &str)> = correction
            .diagnostics
            .iter()
            .map(|d| (d.period_end, d.source_id.as_str()))
            .collect();
        let mut sorted = keys.clone();
        sorted.sort();
        assert_eq!(keys, sorted);
    }

    #[test]
    fn seeded_state_carries_across_calls() {
        let corrector = HouseEffectCorrector::new(HouseEffectConfig::default()).unwrap();
        let mut states = HouseEffectStates::new();
        states.insert(
            ("A".into(), "X".into()),
            HouseEffectState {
                bias_estimate: 1.5,
                observation_count: 10,
            },
        );
        let obs = vec![
            Observation::new("A", "X", date(1), 41.0),
            Observation::new("B", "X", date(1), 39.0),
        ];
        let baseline = blend(&obs, &weights(), &BlendConfig::accuracy_only()).unwrap();
        let correction = corrector.correct(&obs, &baseline, states);
        assert_relative_eq!(correction.adjusted[0].value, 39.5);
    }
}
