//! The forecaster capability and named factories of fallback chains.

use crate::core::{Forecast, TimeSeries};
use crate::error::Result;
use crate::models::chain::ForecastChain;

/// One forecasting strategy.
///
/// Models read the first column of the series they are fitted on and
/// ignore nulls. This trait is object-safe and can be used with
/// `Box<dyn Forecaster>`.
pub trait Forecaster {
    /// Estimate parameters from `series`.
    fn fit(&mut self, series: &TimeSeries) -> Result<()>;

    /// Forecast `horizon` periods past the last observation.
    fn predict(&self, horizon: usize) -> Result<Forecast>;

    /// In-sample one-step errors from the last fit.
    fn residuals(&self) -> Option<&[f64]>;

    /// Get the model name.
    fn name(&self) -> &str;

    /// Whether a fit has succeeded.
    fn is_fitted(&self) -> bool {
        self.residuals().is_some()
    }
}

/// Owned, type-erased forecaster.
///
/// # Example
///
/// ```
/// use pollcast::models::{BoxedForecaster, Forecaster};
/// use pollcast::models::baseline::Naive;
///
/// let model: BoxedForecaster = Box::new(Naive::new());
/// assert_eq!(model.name(), "naive");
/// ```
pub type BoxedForecaster = Box<dyn Forecaster>;

/// A named forecasting variant for batch evaluation.
///
/// The factory receives the process-noise scale chosen by the regime
/// detector for the current run or fold, and builds a fresh chain.
///
/// # Example
///
/// ```
/// use pollcast::models::{ForecastChain, ModelSpec};
/// use pollcast::models::baseline::Naive;
///
/// let spec = ModelSpec::new("naive", |_q_scale| ForecastChain::new().then(Naive::new()));
/// let chain = spec.create(1.0);
/// assert_eq!(chain.len(), 1);
/// ```
pub struct ModelSpec {
    /// Display name of the variant
    pub name: &'static str,
    factory: Box<dyn Fn(f64) -> ForecastChain + Send + Sync>,
}

impl ModelSpec {
    pub fn new<F>(name: &'static str, factory: F) -> Self
    where
        F: Fn(f64) -> ForecastChain + Send + Sync + 'static,
    {
        Self {
            name,
            factory: Box::new(factory),
        }
    }

    /// Build a fresh, unfitted chain for the given q-scale.
    pub fn create(&self, q_scale: f64) -> ForecastChain {
        (self.factory)(q_scale)
    }
}

impl std::fmt::Debug for ModelSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelSpec").field("name", &self.name).finish()
    }
}

/// Ordered collection of forecasting variants.
#[derive(Debug, Default)]
pub struct ModelRegistry {
    models: Vec<ModelSpec>,
}

impl ModelRegistry {
    pub fn new() -> Self {
        Self { models: Vec::new() }
    }

    pub fn register(&mut self, spec: ModelSpec) {
        self.models.push(spec);
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.models.iter().map(|m| m.name).collect()
    }

    pub fn get(&self, name: &str) -> Option<&ModelSpec> {
        self.models.iter().find(|m| m.name == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ModelSpec> {
        self.models.iter()
    }
}
