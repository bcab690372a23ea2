//! Markdown rendering of backtest summaries.

use crate::validation::summary::{overall_for, SummaryLevel, SummaryRow};
use std::cmp::Ordering;
use std::fmt::Write;

/// Render a summary as a Markdown report.
///
/// When both `legacy` and `ssm` are present, the report leads with their
/// overall MAE and the relative improvement of `ssm` over `legacy`.
pub fn render_markdown(summary: &[SummaryRow]) -> String {
    let mut out = String::from("# Backtest Report\n\n");
    if summary.is_empty() {
        out.push_str("No backtest rows generated.\n");
        return out;
    }

    if let (Some(legacy), Some(ssm)) = (overall_for(summary, "legacy"), overall_for(summary, "ssm")) {
        let improvement = if legacy.mae > 0.0 {
            (legacy.mae - ssm.mae) / legacy.mae * 100.0
        } else {
            0.0
        };
        let _ = writeln!(out, "- Overall MAE legacy: **{:.3}**", legacy.mae);
        let _ = writeln!(out, "- Overall MAE ssm: **{:.3}**", ssm.mae);
        let _ = writeln!(out, "- Improvement (legacy -> ssm): **{improvement:+.2}%**");
        out.push('\n');
    }

    let by_mae = |a: &&SummaryRow, b: &&SummaryRow| a.mae.partial_cmp(&b.mae).unwrap_or(Ordering::Equal);

    out.push_str("## Overall\n\n| Model | N | MAE | RMSE | Hit Rate |\n|---|---:|---:|---:|---:|\n");
    let mut overall: Vec<&SummaryRow> = summary
        .iter()
        .filter(|r| r.level == SummaryLevel::Overall)
        .collect();
    overall.sort_by(by_mae);
    for r in overall {
        let _ = writeln!(
            out,
            "| {} | {} | {:.3} | {:.3} | {:.3} |",
            r.model, r.n, r.mae, r.rmse, r.hit_rate
        );
    }

    out.push_str("\n## By Category\n\n| Category | Model | N | MAE | RMSE |\n|---|---|---:|---:|---:|\n");
    let mut categories: Vec<&SummaryRow> = summary
        .iter()
        .filter(|r| r.level == SummaryLevel::Category)
        .collect();
    categories.sort_by(|a, b| a.category.cmp(&b.category).then_with(|| by_mae(a, b)));
    for r in categories {
        let _ = writeln!(
            out,
            "| {} | {} | {} | {:.3} | {:.3} |",
            r.category.replace('\n', " ").trim(),
            r.model,
            r.n,
            r.mae,
            r.rmse
        );
    }
    out
}
