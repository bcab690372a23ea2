//! Multi-source blending and house-effect correction.
//!
//! # Example
//!
//! ```
//! use pollcast::blending::{blend, BlendConfig, Weights};
//! use pollcast::core::Observation;
//! use chrono::NaiveDate;
//!
//! let date = NaiveDate::from_ymd_opt(2025, 3, 7).unwrap();
//! let observations = vec![
//!     Observation::new("A", "X", date, 60.0),
//!     Observation::new("B", "X", date, 40.0),
//! ];
//! let weights = Weights::from_raw([("A", 0.7), ("B", 0.3)]).unwrap();
//! let blended = blend(&observations, &weights, &BlendConfig::accuracy_only()).unwrap();
//! assert!((blended.value(date, "X").unwrap() - 54.0).abs() < 1e-12);
//! ```

pub mod engine;
pub mod house_effect;
pub mod weights;

pub use engine::{blend, blend_cell, BlendConfig, BlendedPoint, BlendedSeries, CellBlend, Contribution};
pub use house_effect::{
    resolve_and_blend, Correction, HouseEffectConfig, HouseEffectCorrector, HouseEffectDiagnostic,
    HouseEffectState, HouseEffectStates,
};
pub use weights::{WeightConfig, WeightEntry, Weights};
