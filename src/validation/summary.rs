//! Aggregation of backtest rows into accuracy summaries.

use crate::utils::metrics::calculate_metrics;
use crate::validation::backtest::BacktestRow;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Category label used on overall rows.
pub const ALL_CATEGORIES: &str = "ALL";

/// Granularity of a summary row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SummaryLevel {
    Overall,
    Category,
}

impl SummaryLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            SummaryLevel::Overall => "overall",
            SummaryLevel::Category => "category",
        }
    }
}

/// Accuracy of one model, overall or within one category.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryRow {
    pub level: SummaryLevel,
    pub category: String,
    pub model: String,
    pub n: usize,
    pub mae: f64,
    pub rmse: f64,
    pub hit_rate: f64,
}

/// Summarize rows per model, then per `(category, model)`.
///
/// Errors are taken in row order within each group, which for backtester
/// output is fold order; hit rates depend on it.
pub fn build_summary(rows: &[BacktestRow]) -> Vec<SummaryRow> {
    let mut overall: BTreeMap<&str, Vec<f64>> = BTreeMap::new();
    let mut by_category: BTreeMap<(&str, &str), Vec<f64>> = BTreeMap::new();
    for row in rows {
        overall.entry(row.model.as_str()).or_default().push(row.error);
        by_category
            .entry((row.category.as_str(), row.model.as_str()))
            .or_default()
            .push(row.error);
    }

    let overall_rows = overall
        .into_iter()
        .map(|(model, errors)| (SummaryLevel::Overall, ALL_CATEGORIES, model, errors));
    let category_rows = by_category
        .into_iter()
        .map(|((category, model), errors)| (SummaryLevel::Category, category, model, errors));

    overall_rows
        .chain(category_rows)
        .filter_map(|(level, category, model, errors)| {
            let metrics = calculate_metrics(&errors).ok()?;
            Some(SummaryRow {
                level,
                category: category.to_string(),
                model: model.to_string(),
                n: metrics.n,
                mae: metrics.mae,
                rmse: metrics.rmse,
                hit_rate: metrics.hit_rate,
            })
        })
        .collect()
}

/// Overall row for `model`, if present.
pub fn overall_for<'a>(summary: &'a [SummaryRow], model: &str) -> Option<&'a SummaryRow> {
    summary
        .iter()
        .find(|r| r.level == SummaryLevel::Overall && r.model == model)
}
