//! Rolling-origin evaluation of forecasting variants.
//!
//! # Example
//!
//! ```
//! use pollcast::core::TimeSeries;
//! use pollcast::models::{LocalLevelConfig, TrendConfig};
//! use pollcast::validation::{build_summary, render_markdown, BacktestConfig, Backtester};
//! use chrono::NaiveDate;
//!
//! let base = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
//! let dates: Vec<_> = (0..26).map(|i| base + chrono::Duration::weeks(i)).collect();
//! let values: Vec<f64> = (0..26).map(|i| 30.0 + 0.2 * i as f64).collect();
//! let series = TimeSeries::from_values(dates, "X", &values).unwrap();
//!
//! let backtester = Backtester::new(
//!     BacktestConfig::default(),
//!     &LocalLevelConfig::default(),
//!     &TrendConfig::default(),
//! )
//! .unwrap();
//! let result = backtester.run(&series).unwrap();
//! let summary = build_summary(&result.rows);
//! assert!(render_markdown(&summary).contains("legacy"));
//! ```

pub mod backtest;
pub mod report;
pub mod summary;

pub use backtest::{BacktestConfig, BacktestResult, BacktestRow, Backtester, SkipCounts};
pub use report::render_markdown;
pub use summary::{build_summary, overall_for, SummaryLevel, SummaryRow, ALL_CATEGORIES};
