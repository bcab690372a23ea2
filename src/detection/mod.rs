//! Detection utilities for blended series and driver inputs.
//!
//! This module provides tools for detecting:
//! - Volatility regime shifts in focus categories
//! - Spikes in auxiliary driver series

mod regime;
mod spike;

pub use regime::{
    detect_regime, volatility_z, RegimeConfig, RegimeStatus, REASON_DISABLED,
    REASON_FOCUS_MISSING, REASON_INSUFFICIENT_HISTORY, REASON_NORMAL,
};
pub use spike::{clean_driver, SpikeConfig, SpikeResult};
