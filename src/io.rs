//! Flat-file interchange.
//!
//! Inputs are comma-separated text with a header row. Columns are located by
//! name, so extra columns are ignored. Empty or non-numeric numeric cells are
//! read as null; dates are ISO `YYYY-MM-DD`.

use crate::blending::{BlendedSeries, HouseEffectDiagnostic, WeightEntry};
use crate::core::{AccuracyRecord, ForecastRecord, Observation, TimeSeries};
use crate::detection::RegimeStatus;
use crate::error::{ForecastError, Result};
use crate::models::ModelKind;
use crate::validation::{BacktestRow, SummaryRow};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::path::Path;

/// Column label given to a parsed driver series.
pub const DRIVER_COLUMN: &str = "driver_value";

/// Header row plus data rows tagged with their 1-based line number.
struct Table {
    headers: Vec<String>,
    rows: Vec<(usize, Vec<String>)>,
}

impl Table {
    fn parse(text: &str) -> Result<Self> {
        let mut records = split_records(text).into_iter();
        let (_, header) = records
            .next()
            .ok_or_else(|| ForecastError::MissingInput("header row".into()))?;
        let headers: Vec<String> = header
            .into_iter()
            .map(|h| h.trim().trim_start_matches('\u{feff}').to_string())
            .collect();

        let mut rows = Vec::new();
        for (line, mut fields) in records {
            if fields.len() > headers.len() {
                return Err(ForecastError::Parse {
                    line,
                    message: format!("expected {} fields, found {}", headers.len(), fields.len()),
                });
            }
            fields.resize(headers.len(), String::new());
            rows.push((line, fields));
        }
        Ok(Self { headers, rows })
    }

    fn find(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == name)
    }

    fn require(&self, name: &str) -> Result<usize> {
        self.find(name)
            .ok_or_else(|| ForecastError::MissingInput(format!("column '{name}'")))
    }
}

/// Split CSV text into records tagged with the line each one starts on.
///
/// Double-quoted fields may contain commas and line breaks. Blank lines are
/// skipped.
fn split_records(text: &str) -> Vec<(usize, Vec<String>)> {
    let mut records = Vec::new();
    let mut fields = Vec::new();
    let mut field = String::new();
    let mut quoted = false;
    let mut line = 1;
    let mut start = 1;
    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '"' if quoted && chars.peek() == Some(&'"') => {
                field.push('"');
                chars.next();
            }
            '"' => quoted = !quoted,
            ',' if !quoted => fields.push(std::mem::take(&mut field)),
            '\r' if chars.peek() == Some(&'\n') => {}
            '\n' if quoted => {
                field.push('\n');
                line += 1;
            }
            '\n' => {
                fields.push(std::mem::take(&mut field));
                keep_record(&mut records, start, std::mem::take(&mut fields));
                line += 1;
                start = line;
            }
            _ => field.push(c),
        }
    }
    fields.push(field);
    keep_record(&mut records, start, fields);
    records
}

fn keep_record(records: &mut Vec<(usize, Vec<String>)>, line: usize, fields: Vec<String>) {
    let blank = matches!(fields.as_slice(), [only] if only.trim().is_empty());
    if !blank {
        records.push((line, fields));
    }
}

fn parse_date(cell: &str, line: usize) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(cell.trim(), "%Y-%m-%d").map_err(|e| ForecastError::Parse {
        line,
        message: format!("invalid date '{}': {e}", cell.trim()),
    })
}

/// Numeric cell, `None` when empty, non-numeric or non-finite.
fn parse_number(cell: &str) -> Option<f64> {
    cell.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Sample sizes arrive as `"1,204"`, `"n=800"` or `"800.0"`; only digits and
/// the decimal point count.
fn parse_sample_size(cell: &str) -> Option<f64> {
    let digits: String = cell
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.')
        .collect();
    digits.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Parse observations from `source_id,category,period_end,value[,sample_n]`.
///
/// Rows whose value is null are dropped.
pub fn parse_observations(text: &str) -> Result<Vec<Observation>> {
    let table = Table::parse(text)?;
    let source = table.require("source_id")?;
    let category = table.require("category")?;
    let period_end = table.require("period_end")?;
    let value = table.require("value")?;
    let sample_n = table.find("sample_n");

    let mut observations = Vec::with_capacity(table.rows.len());
    let mut dropped = 0usize;
    for (line, fields) in &table.rows {
        let Some(v) = parse_number(&fields[value]) else {
            dropped += 1;
            continue;
        };
        let date = parse_date(&fields[period_end], *line)?;
        let mut obs = Observation::new(fields[source].trim(), fields[category].trim(), date, v);
        obs.sample_n = sample_n.and_then(|i| parse_sample_size(&fields[i]));
        observations.push(obs);
    }
    if dropped > 0 {
        tracing::debug!(dropped, "dropped observations with null value");
    }
    Ok(observations)
}

/// Parse an accuracy table: `source_id` plus the first column whose header
/// contains `MAE` in any case.
pub fn parse_accuracy(text: &str) -> Result<Vec<AccuracyRecord>> {
    let table = Table::parse(text)?;
    let source = table.require("source_id")?;
    let mae = table
        .headers
        .iter()
        .position(|h| h.to_ascii_lowercase().contains("mae"))
        .ok_or_else(|| ForecastError::MissingInput("MAE column".into()))?;

    Ok(table
        .rows
        .iter()
        .map(|(_, fields)| AccuracyRecord {
            source_id: fields[source].trim().to_string(),
            mae: parse_number(&fields[mae]),
        })
        .collect())
}

/// Parse a driver series from `period_start,driver_value`.
///
/// Rows are sorted by date; a repeated date keeps its last value.
pub fn parse_driver(text: &str) -> Result<TimeSeries> {
    let table = Table::parse(text)?;
    let start = table.require("period_start")?;
    let value = table.require(DRIVER_COLUMN)?;

    let mut by_date = BTreeMap::new();
    for (line, fields) in &table.rows {
        let date = parse_date(&fields[start], *line)?;
        by_date.insert(date, parse_number(&fields[value]));
    }
    let (dates, values): (Vec<NaiveDate>, Vec<Option<f64>>) = by_date.into_iter().unzip();
    TimeSeries::univariate(dates, DRIVER_COLUMN, values)
}

/// Parse a wide blended table: `period_end` then one column per category.
/// `n_sources_reporting` is ignored if present.
pub fn parse_blended(text: &str) -> Result<TimeSeries> {
    let table = Table::parse(text)?;
    let period_end = table.require("period_end")?;
    let value_columns: Vec<usize> = (0..table.headers.len())
        .filter(|&i| i != period_end && table.headers[i] != "n_sources_reporting")
        .collect();

    let mut dates = Vec::with_capacity(table.rows.len());
    let mut columns = vec![Vec::with_capacity(table.rows.len()); value_columns.len()];
    for (line, fields) in &table.rows {
        dates.push(parse_date(&fields[period_end], *line)?);
        for (column, &i) in columns.iter_mut().zip(&value_columns) {
            column.push(parse_number(&fields[i]));
        }
    }
    let labels = value_columns.iter().map(|&i| table.headers[i].clone()).collect();
    TimeSeries::new(dates, labels, columns)
}

fn read_file(path: &Path) -> Result<String> {
    std::fs::read_to_string(path)
        .map_err(|e| ForecastError::Io(format!("failed to read {}: {e}", path.display())))
}

pub fn read_observations(path: impl AsRef<Path>) -> Result<Vec<Observation>> {
    parse_observations(&read_file(path.as_ref())?)
}

pub fn read_accuracy(path: impl AsRef<Path>) -> Result<Vec<AccuracyRecord>> {
    parse_accuracy(&read_file(path.as_ref())?)
}

pub fn read_driver(path: impl AsRef<Path>) -> Result<TimeSeries> {
    parse_driver(&read_file(path.as_ref())?)
}

/// Write `contents`, creating parent directories as needed.
pub fn write_file(path: impl AsRef<Path>, contents: &str) -> Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, contents)
        .map_err(|e| ForecastError::Io(format!("failed to write {}: {e}", path.display())))
}

fn escape(field: &str) -> String {
    if field.contains([',', '"', '\n']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

fn number(value: f64) -> String {
    if value.is_finite() {
        value.to_string()
    } else {
        String::new()
    }
}

fn optional(value: Option<f64>) -> String {
    value.map(number).unwrap_or_default()
}

fn push_record<I, S>(out: &mut String, fields: I)
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let line: Vec<String> = fields.into_iter().map(|f| escape(f.as_ref())).collect();
    let _ = writeln!(out, "{}", line.join(","));
}

/// Wide blended table, one column per category.
pub fn blended_to_csv(series: &BlendedSeries) -> String {
    let mut out = String::new();
    push_record(
        &mut out,
        ["period_end", "n_sources_reporting"]
            .into_iter()
            .map(str::to_string)
            .chain(series.categories().iter().cloned()),
    );
    for point in series.points() {
        push_record(
            &mut out,
            [point.period_end.to_string(), point.n_sources_reporting.to_string()]
                .into_iter()
                .chain(series.categories().iter().map(|c| optional(point.value(c)))),
        );
    }
    out
}

pub fn weights_to_csv(entries: &[WeightEntry]) -> String {
    let mut out = String::from("source_id,mae,weight,weight_pct\n");
    for e in entries {
        push_record(
            &mut out,
            [e.source_id.clone(), number(e.mae), number(e.weight), number(e.weight_pct)],
        );
    }
    out
}

pub fn diagnostics_to_csv(diagnostics: &[HouseEffectDiagnostic]) -> String {
    let mut out = String::from(
        "period_end,source_id,category,raw,baseline,residual,applied_bias,adjusted,obs_count\n",
    );
    for d in diagnostics {
        push_record(
            &mut out,
            [
                d.period_end.to_string(),
                d.source_id.clone(),
                d.category.clone(),
                number(d.raw),
                number(d.baseline),
                number(d.residual),
                number(d.applied_bias),
                number(d.adjusted),
                d.obs_count.to_string(),
            ],
        );
    }
    out
}

pub fn forecasts_to_csv(records: &[ForecastRecord]) -> String {
    let mut out = String::from(
        "category,horizon_periods,point_estimate,std_dev,interval_80_low,interval_80_high,\
         rmse_in_sample,model_name,exogenous_used\n",
    );
    for r in records {
        push_record(
            &mut out,
            [
                r.category.clone(),
                r.horizon_periods.to_string(),
                number(r.point_estimate),
                optional(r.std_dev),
                optional(r.interval_80_low),
                optional(r.interval_80_high),
                optional(r.rmse_in_sample),
                r.model_name.clone(),
                r.exogenous_used.to_string(),
            ],
        );
    }
    out
}

pub fn backtest_to_csv(rows: &[BacktestRow]) -> String {
    let mut out =
        String::from("date,category,model,actual,pred,error,abs_error,sq_error,triggered\n");
    for r in rows {
        push_record(
            &mut out,
            [
                r.date.to_string(),
                r.category.clone(),
                r.model.clone(),
                number(r.actual),
                number(r.pred),
                number(r.error),
                number(r.abs_error),
                number(r.sq_error),
                r.triggered.to_string(),
            ],
        );
    }
    out
}

pub fn summary_to_csv(summary: &[SummaryRow]) -> String {
    let mut out = String::from("level,category,model,n,mae,rmse,hit_rate\n");
    for r in summary {
        push_record(
            &mut out,
            [
                r.level.as_str().to_string(),
                r.category.clone(),
                r.model.clone(),
                r.n.to_string(),
                number(r.mae),
                number(r.rmse),
                number(r.hit_rate),
            ],
        );
    }
    out
}

/// Regime status as published alongside a forecast run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegimeReport {
    #[serde(flatten)]
    pub status: RegimeStatus,
    pub q_scale_applied: f64,
    pub model: ModelKind,
    pub exogenous: bool,
    pub driver_rows: usize,
}

impl RegimeReport {
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }
}
