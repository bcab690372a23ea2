//! Local-level (random walk plus noise) state-space forecaster.
//!
//! ```text
//! level[t]    = level[t-1] + η,  η ~ N(0, q)
//! observed[t] = level[t]   + ε,  ε ~ N(0, r)
//! ```
//!
//! The noise variances are chosen per fit by minimizing the Kalman filter's
//! innovation negative log-likelihood over a finite grid of multipliers of
//! the window's variance. The search strategy sits behind
//! [`ParameterSearch`] so it can be replaced without touching callers.

use crate::core::{Forecast, TimeSeries};
use crate::error::{ForecastError, Result};
use crate::models::Forecaster;
use crate::utils::stats::{population_variance, root_mean_square};
use serde::{Deserialize, Serialize};

/// Floor on the forecast variance before taking the square root.
const MIN_FORECAST_VARIANCE: f64 = 1e-9;

/// Process and observation noise variances.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NoiseParams {
    pub q: f64,
    pub r: f64,
}

/// Strategy for choosing [`NoiseParams`] from a window of observations.
pub trait ParameterSearch {
    fn search(&self, y: &[f64]) -> Result<NoiseParams>;
}

/// Finite grid of `(q, r)` candidates expressed as multiples of the
/// window's variance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParameterGrid {
    pub q_multipliers: Vec<f64>,
    pub r_multipliers: Vec<f64>,
    /// Floor on the variance scale so flat windows still get positive noise.
    pub min_scale: f64,
}

impl Default for ParameterGrid {
    fn default() -> Self {
        Self {
            q_multipliers: vec![0.001, 0.003, 0.01, 0.03, 0.07, 0.15, 0.3],
            r_multipliers: vec![0.05, 0.1, 0.2, 0.4, 0.8, 1.2],
            min_scale: 1e-3,
        }
    }
}

impl ParameterGrid {
    pub fn validate(&self) -> Result<()> {
        if self.q_multipliers.is_empty() || self.r_multipliers.is_empty() {
            return Err(ForecastError::InvalidConfiguration(
                "parameter grid must not be empty".into(),
            ));
        }
        let all_positive = self
            .q_multipliers
            .iter()
            .chain(&self.r_multipliers)
            .all(|m| m.is_finite() && *m > 0.0);
        if !all_positive {
            return Err(ForecastError::InvalidConfiguration(
                "grid multipliers must be finite and positive".into(),
            ));
        }
        if !(self.min_scale > 0.0) {
            return Err(ForecastError::InvalidConfiguration(format!(
                "min_scale must be positive, got {}",
                self.min_scale
            )));
        }
        Ok(())
    }

    /// Variance scale the multipliers apply to.
    pub fn scale(&self, y: &[f64]) -> f64 {
        population_variance(y).max(self.min_scale)
    }

    /// Every candidate in search order: r outer, q inner.
    pub fn candidates(&self, y: &[f64]) -> Vec<NoiseParams> {
        let scale = self.scale(y);
        self.r_multipliers
            .iter()
            .flat_map(|rf| {
                self.q_multipliers.iter().map(move |qf| NoiseParams {
                    q: qf * scale,
                    r: rf * scale,
                })
            })
            .collect()
    }
}

impl ParameterSearch for ParameterGrid {
    /// Exhaustive search. Ties keep the earliest candidate.
    fn search(&self, y: &[f64]) -> Result<NoiseParams> {
        self.validate()?;
        let mut best: Option<(f64, NoiseParams)> = None;
        for params in self.candidates(y) {
            let nll = local_level_nll(y, params);
            if nll.is_finite() && best.map_or(true, |(b, _)| nll < b) {
                best = Some((nll, params));
            }
        }
        best.map(|(_, p)| p).ok_or_else(|| {
            ForecastError::NumericDegeneracy("no grid candidate has a finite likelihood".into())
        })
    }
}

/// Filter state after a full pass.
#[derive(Debug, Clone, PartialEq)]
pub struct FilterOutput {
    /// Filtered level at the last observation.
    pub level: f64,
    /// Filtered level variance at the last observation.
    pub variance: f64,
    /// One-step-ahead innovations `y[t] - level[t|t-1]` for `t >= 1`.
    pub innovations: Vec<f64>,
    /// Innovation negative log-likelihood.
    pub nll: f64,
}

fn initial_state(y: &[f64]) -> (f64, f64) {
    (y[0], population_variance(y).max(1.0))
}

/// Run the Kalman recursion over `y`.
///
/// The level starts at `y[0]` with variance `max(var(y), 1)`; the first
/// observation only initializes the state. Returns `None` for an empty
/// window or when an innovation variance is not positive and finite.
pub fn kalman_filter(y: &[f64], params: NoiseParams) -> Option<FilterOutput> {
    if y.is_empty() {
        return None;
    }
    let (mut level, mut variance) = initial_state(y);
    let mut innovations = Vec::with_capacity(y.len().saturating_sub(1));
    let mut nll = 0.0;

    for &obs in &y[1..] {
        let predicted_variance = variance + params.q;
        let s = predicted_variance + params.r;
        if !(s > 0.0 && s.is_finite()) {
            return None;
        }
        let e = obs - level;
        nll += 0.5 * (s.ln() + e * e / s);
        innovations.push(e);

        let gain = predicted_variance / s;
        level += gain * e;
        variance = (1.0 - gain) * predicted_variance;
    }

    Some(FilterOutput {
        level,
        variance,
        innovations,
        nll,
    })
}

/// Innovation negative log-likelihood, `+∞` when the filter degenerates.
pub fn local_level_nll(y: &[f64], params: NoiseParams) -> f64 {
    kalman_filter(y, params).map_or(f64::INFINITY, |f| f.nll)
}

/// Configuration for [`LocalLevel`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LocalLevelConfig {
    /// Trailing non-null points used for fitting.
    pub window: usize,
    /// Fewer non-null points than this is insufficient history.
    pub min_points: usize,
    /// Weight pulling the filtered level toward the last observation.
    pub recency_shrink: f64,
    /// Floor on the scaled process noise.
    pub min_q: f64,
    pub grid: ParameterGrid,
}

impl Default for LocalLevelConfig {
    fn default() -> Self {
        Self {
            window: 24,
            min_points: 8,
            recency_shrink: 0.35,
            min_q: 1e-9,
            grid: ParameterGrid::default(),
        }
    }
}

impl LocalLevelConfig {
    pub fn with_window(mut self, window: usize) -> Self {
        self.window = window;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.window < 2 || self.min_points < 2 {
            return Err(ForecastError::InvalidConfiguration(
                "local-level window and min_points must be at least 2".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.recency_shrink) {
            return Err(ForecastError::InvalidConfiguration(format!(
                "recency_shrink must be in [0, 1], got {}",
                self.recency_shrink
            )));
        }
        if !(self.min_q > 0.0) {
            return Err(ForecastError::InvalidConfiguration(format!(
                "min_q must be positive, got {}",
                self.min_q
            )));
        }
        self.grid.validate()
    }
}

#[derive(Debug, Clone, PartialEq)]
struct LocalLevelFit {
    params: NoiseParams,
    level: f64,
    variance: f64,
    last_observed: f64,
}

/// Local-level Kalman forecaster with grid-searched noise.
#[derive(Debug, Clone)]
pub struct LocalLevel<S = ParameterGrid> {
    config: LocalLevelConfig,
    search: S,
    q_scale: f64,
    fit: Option<LocalLevelFit>,
    residuals: Option<Vec<f64>>,
}

impl LocalLevel<ParameterGrid> {
    pub fn new(config: LocalLevelConfig) -> Self {
        let search = config.grid.clone();
        Self::with_search(config, search)
    }
}

impl<S: ParameterSearch> LocalLevel<S> {
    pub fn with_search(config: LocalLevelConfig, search: S) -> Self {
        Self {
            config,
            search,
            q_scale: 1.0,
            fit: None,
            residuals: None,
        }
    }

    /// Multiply the selected process noise before the final filter pass.
    pub fn with_q_scale(mut self, q_scale: f64) -> Self {
        self.q_scale = q_scale;
        self
    }

    pub fn config(&self) -> &LocalLevelConfig {
        &self.config
    }

    /// Noise variances used by the final filter pass.
    pub fn params(&self) -> Option<NoiseParams> {
        self.fit.as_ref().map(|f| f.params)
    }

    /// Filtered level at the end of the window.
    pub fn level(&self) -> Option<f64> {
        self.fit.as_ref().map(|f| f.level)
    }
}

impl<S: ParameterSearch> Forecaster for LocalLevel<S> {
    fn fit(&mut self, series: &TimeSeries) -> Result<()> {
        self.config.validate()?;
        if !(self.q_scale.is_finite() && self.q_scale > 0.0) {
            return Err(ForecastError::InvalidConfiguration(format!(
                "q_scale must be positive, got {}",
                self.q_scale
            )));
        }

        let values = series.valid_values();
        if values.len() < self.config.min_points {
            return Err(ForecastError::InsufficientHistory {
                needed: self.config.min_points,
                got: values.len(),
            });
        }
        let y = &values[values.len().saturating_sub(self.config.window)..];

        let selected = self.search.search(y)?;
        let params = NoiseParams {
            q: (selected.q * self.q_scale).max(self.config.min_q),
            r: selected.r,
        };
        let output = kalman_filter(y, params).ok_or_else(|| {
            ForecastError::NumericDegeneracy("local-level filter diverged".into())
        })?;

        tracing::debug!(
            q = params.q,
            r = params.r,
            q_scale = self.q_scale,
            nll = output.nll,
            "local-level parameters selected"
        );

        self.fit = Some(LocalLevelFit {
            params,
            level: output.level,
            variance: output.variance,
            last_observed: y[y.len() - 1],
        });
        self.residuals = Some(output.innovations);
        Ok(())
    }

    fn predict(&self, horizon: usize) -> Result<Forecast> {
        let fit = self.fit.as_ref().ok_or(ForecastError::FitRequired)?;
        if horizon == 0 {
            return Err(ForecastError::InvalidConfiguration(
                "horizon must be at least 1".into(),
            ));
        }

        let shrink = self.config.recency_shrink;
        let mean = (1.0 - shrink) * fit.level + shrink * fit.last_observed;
        let variance = fit.variance + horizon as f64 * fit.params.q + fit.params.r;

        let mut forecast =
            Forecast::new(horizon, mean).with_std_dev(variance.max(MIN_FORECAST_VARIANCE).sqrt());
        if let Some(residuals) = self.residuals.as_deref().filter(|r| !r.is_empty()) {
            forecast = forecast.with_rmse(root_mean_square(residuals));
        }
        Ok(forecast)
    }

    fn residuals(&self) -> Option<&[f64]> {
        self.residuals.as_deref()
    }

    fn name(&self) -> &str {
        "ssm"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use chrono::NaiveDate;

    fn series(values: &[f64]) -> TimeSeries {
        let base = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let dates = (0..values.len())
            .map(|i| base + chrono::Duration::weeks(i as i64))
            .collect();
        TimeSeries::from_values(dates, "X", values).unwrap()
    }

    fn wobbly(n: usize) -> Vec<f64> {
        (0..n)
            .map(|i| 40.0 + 0.3 * i as f64 + if i % 3 == 0 { 1.2 } else { -0.7 })
            .collect()
    }

    #[test]
    fn filter_matches_hand_computation() {
        let y = [1.0, 2.0];
        let params = NoiseParams { q: 0.5, r: 1.0 };
        let out = kalman_filter(&y, params).unwrap();

        // var(y) = 0.25, so p0 = 1; p_pred = 1.5; s = 2.5; k = 0.6
        assert_relative_eq!(out.level, 1.6, epsilon = 1e-12);
        assert_relative_eq!(out.variance, 0.6, epsilon = 1e-12);
        assert_eq!(out.innovations, vec![1.0]);
        assert_relative_eq!(out.nll, 0.5 * (2.5f64.ln() + 1.0 / 2.5), epsilon = 1e-12);
    }

    #[test]
    fn grid_search_is_exhaustive() {
        let y = wobbly(20);
        let grid = ParameterGrid::default();
        let best = grid.search(&y).unwrap();
        let best_nll = local_level_nll(&y, best);

        assert!(best.q > 0.0 && best.r > 0.0);
        for candidate in grid.candidates(&y) {
            assert!(best_nll <= local_level_nll(&y, candidate));
        }
    }

    #[test]
    fn flat_history_gives_tight_interval() {
        let mut model = LocalLevel::new(LocalLevelConfig::default());
        model.fit(&series(&[10.0; 10])).unwrap();
        let forecast = model.predict(1).unwrap();

        assert_relative_eq!(forecast.mean(), 10.0, epsilon = 1e-10);
        assert!(forecast.std_dev().unwrap() < 0.05);
        assert_relative_eq!(forecast.rmse().unwrap(), 0.0);
    }

    #[test]
    fn q_scale_widens_the_interval() {
        let ts = series(&wobbly(20));
        let mut calm = LocalLevel::new(LocalLevelConfig::default());
        let mut guarded = LocalLevel::new(LocalLevelConfig::default()).with_q_scale(2.0);
        calm.fit(&ts).unwrap();
        guarded.fit(&ts).unwrap();

        assert_relative_eq!(
            guarded.params().unwrap().q,
            2.0 * calm.params().unwrap().q,
            epsilon = 1e-15
        );
        let sd_calm = calm.predict(1).unwrap().std_dev().unwrap();
        let sd_guarded = guarded.predict(1).unwrap().std_dev().unwrap();
        assert!(sd_guarded > sd_calm);
    }

    #[test]
    fn variance_grows_with_horizon() {
        let mut model = LocalLevel::new(LocalLevelConfig::default());
        model.fit(&series(&wobbly(16))).unwrap();
        let one = model.predict(1).unwrap();
        let four = model.predict(4).unwrap();
        assert_eq!(one.mean(), four.mean());
        assert!(four.std_dev().unwrap() > one.std_dev().unwrap());
    }

    #[test]
    fn recency_shrink_pulls_toward_last_value() {
        let mut values = vec![10.0; 12];
        values.push(14.0);
        let mut model = LocalLevel::new(LocalLevelConfig::default());
        model.fit(&series(&values)).unwrap();
        let level = model.level().unwrap();
        let mean = model.predict(1).unwrap().mean();
        assert_relative_eq!(mean, 0.65 * level + 0.35 * 14.0, epsilon = 1e-12);
    }

    #[test]
    fn too_few_points_is_insufficient() {
        let mut model = LocalLevel::new(LocalLevelConfig::default());
        assert_eq!(
            model.fit(&series(&[1.0; 7])),
            Err(ForecastError::InsufficientHistory { needed: 8, got: 7 })
        );
    }

    #[test]
    fn custom_search_strategy_is_used() {
        struct Fixed;
        impl ParameterSearch for Fixed {
            fn search(&self, _y: &[f64]) -> Result<NoiseParams> {
                Ok(NoiseParams { q: 0.25, r: 0.5 })
            }
        }
        let mut model = LocalLevel::with_search(LocalLevelConfig::default(), Fixed);
        model.fit(&series(&wobbly(12))).unwrap();
        assert_eq!(model.params(), Some(NoiseParams { q: 0.25, r: 0.5 }));
    }

    #[test]
    fn empty_grid_is_rejected() {
        let grid = ParameterGrid {
            q_multipliers: Vec::new(),
            ..ParameterGrid::default()
        };
        assert!(matches!(
            grid.search(&[1.0, 2.0]),
            Err(ForecastError::InvalidConfiguration(_))
        ));
    }
}
