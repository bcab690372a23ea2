//! Pipeline configuration.
//!
//! Every component has its own config struct with documented defaults;
//! [`PipelineConfig`] gathers them under one TOML document where each
//! section is optional.
//!
//! ```toml
//! [forecast]
//! model = "ssm"
//! exogenous = true
//!
//! [house_effect]
//! ewma_lambda = 0.8
//!
//! [regime]
//! focus_categories = ["A", "B"]
//! ```

use crate::blending::{BlendConfig, HouseEffectConfig, WeightConfig};
use crate::detection::{RegimeConfig, SpikeConfig};
use crate::error::{ForecastError, Result};
use crate::models::{ExogenousConfig, LocalLevelConfig, ModelKind, TrendConfig};
use crate::transform::ResampleConfig;
use crate::validation::BacktestConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Settings for the published forecast.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ForecastConfig {
    pub model: ModelKind,
    /// Periods ahead to forecast.
    pub horizon: usize,
    /// Trailing window shared by the local-level and trend models.
    pub window: usize,
    /// Correct house effects before the final blend.
    pub house_effect: bool,
    /// Use the driver series when one is supplied.
    pub exogenous: bool,
    /// Also run the rolling-origin backtest.
    pub backtest: bool,
}

impl Default for ForecastConfig {
    fn default() -> Self {
        Self {
            model: ModelKind::StateSpace,
            horizon: 1,
            window: 24,
            house_effect: true,
            exogenous: false,
            backtest: false,
        }
    }
}

impl ForecastConfig {
    pub fn validate(&self) -> Result<()> {
        if self.horizon == 0 {
            return Err(ForecastError::InvalidConfiguration(
                "forecast horizon must be at least 1".into(),
            ));
        }
        if self.window < 2 {
            return Err(ForecastError::InvalidConfiguration(format!(
                "forecast window must be at least 2, got {}",
                self.window
            )));
        }
        Ok(())
    }
}

/// All component configurations.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub forecast: ForecastConfig,
    pub weights: WeightConfig,
    pub blend: BlendConfig,
    pub house_effect: HouseEffectConfig,
    pub resample: ResampleConfig,
    pub regime: RegimeConfig,
    pub local_level: LocalLevelConfig,
    pub trend: TrendConfig,
    pub exogenous: ExogenousConfig,
    pub spike: SpikeConfig,
    pub backtest: BacktestConfig,
}

impl PipelineConfig {
    /// Parse and validate a TOML document.
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let config: PipelineConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| ForecastError::Io(format!("failed to read {}: {e}", path.display())))?;
        let config = Self::from_toml_str(&text)?;
        tracing::debug!(path = %path.display(), "loaded pipeline config");
        Ok(config)
    }

    /// Check every section. Runs before any data is touched.
    pub fn validate(&self) -> Result<()> {
        self.forecast.validate()?;
        self.blend.validate()?;
        self.house_effect.validate()?;
        self.regime.validate()?;
        self.local_level.validate()?;
        self.trend.validate()?;
        self.exogenous.validate()?;
        self.spike.validate()?;
        self.backtest.validate()?;
        Ok(())
    }

    /// Local-level settings with the forecast window applied.
    pub fn local_level_for_forecast(&self) -> LocalLevelConfig {
        self.local_level.clone().with_window(self.forecast.window)
    }

    /// Trend settings with the forecast window applied.
    pub fn trend_for_forecast(&self) -> TrendConfig {
        self.trend.with_window(self.forecast.window)
    }
}
