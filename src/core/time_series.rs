//! Period-indexed table of nullable category values.

use crate::error::{ForecastError, Result};
use chrono::NaiveDate;
use std::collections::BTreeMap;

/// A period-indexed series with one nullable column per category.
///
/// Columns are stored column-major: `values[column][period]`. Auxiliary
/// driver series are attached as regressors aligned to the same dates.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TimeSeries {
    dates: Vec<NaiveDate>,
    values: Vec<Vec<Option<f64>>>,
    labels: Vec<String>,
    regressors: BTreeMap<String, Vec<Option<f64>>>,
}

/// Builder for constructing a [`TimeSeries`] column by column.
#[derive(Debug, Clone, Default)]
pub struct TimeSeriesBuilder {
    dates: Vec<NaiveDate>,
    values: Vec<Vec<Option<f64>>>,
    labels: Vec<String>,
    regressors: BTreeMap<String, Vec<Option<f64>>>,
}

impl TimeSeriesBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn dates(mut self, dates: Vec<NaiveDate>) -> Self {
        self.dates = dates;
        self
    }

    /// Append a labelled column.
    pub fn column(mut self, label: impl Into<String>, values: Vec<Option<f64>>) -> Self {
        self.labels.push(label.into());
        self.values.push(values);
        self
    }

    pub fn regressor(mut self, name: impl Into<String>, values: Vec<Option<f64>>) -> Self {
        self.regressors.insert(name.into(), values);
        self
    }

    pub fn build(self) -> Result<TimeSeries> {
        let mut series = TimeSeries::new(self.dates, self.labels, self.values)?;
        for (name, values) in self.regressors {
            series.set_regressor(name, values)?;
        }
        Ok(series)
    }
}

impl TimeSeries {
    /// Create a series from dates, column labels and column-major values.
    pub fn new(
        dates: Vec<NaiveDate>,
        labels: Vec<String>,
        values: Vec<Vec<Option<f64>>>,
    ) -> Result<Self> {
        for i in 1..dates.len() {
            if dates[i] <= dates[i - 1] {
                return Err(ForecastError::TimestampError(
                    "dates must be strictly increasing".to_string(),
                ));
            }
        }

        if labels.len() != values.len() {
            return Err(ForecastError::DimensionMismatch {
                expected: values.len(),
                got: labels.len(),
            });
        }

        for column in &values {
            if column.len() != dates.len() {
                return Err(ForecastError::DimensionMismatch {
                    expected: dates.len(),
                    got: column.len(),
                });
            }
        }

        for (i, label) in labels.iter().enumerate() {
            if labels[..i].contains(label) {
                return Err(ForecastError::MissingInput(format!(
                    "duplicate category column '{label}'"
                )));
            }
        }

        Ok(Self {
            dates,
            values,
            labels,
            regressors: BTreeMap::new(),
        })
    }

    /// Create a single-column series.
    pub fn univariate(
        dates: Vec<NaiveDate>,
        label: impl Into<String>,
        values: Vec<Option<f64>>,
    ) -> Result<Self> {
        Self::new(dates, vec![label.into()], vec![values])
    }

    /// Create a single-column series with no gaps.
    pub fn from_values(dates: Vec<NaiveDate>, label: impl Into<String>, values: &[f64]) -> Result<Self> {
        Self::univariate(dates, label, values.iter().map(|&v| Some(v)).collect())
    }

    /// Number of periods.
    pub fn len(&self) -> usize {
        self.dates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dates.is_empty()
    }

    pub fn dates(&self) -> &[NaiveDate] {
        &self.dates
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    /// Values of the column with the given label.
    pub fn column(&self, label: &str) -> Option<&[Option<f64>]> {
        self.labels
            .iter()
            .position(|l| l == label)
            .map(|i| self.values[i].as_slice())
    }

    /// Values of the column with the given label, or `MissingInput`.
    pub fn require_column(&self, label: &str) -> Result<&[Option<f64>]> {
        self.column(label)
            .ok_or_else(|| ForecastError::MissingInput(format!("category column '{label}'")))
    }

    /// Values of the first column.
    pub fn primary_values(&self) -> &[Option<f64>] {
        self.values.first().map(|v| v.as_slice()).unwrap_or(&[])
    }

    pub fn primary_label(&self) -> Option<&str> {
        self.labels.first().map(|s| s.as_str())
    }

    /// Non-null values of the first column, in date order.
    pub fn valid_values(&self) -> Vec<f64> {
        self.primary_values()
            .iter()
            .flatten()
            .copied()
            .filter(|v| v.is_finite())
            .collect()
    }

    /// All columns as `(label, values)` pairs.
    pub fn columns(&self) -> impl Iterator<Item = (&str, &[Option<f64>])> {
        self.labels
            .iter()
            .zip(self.values.iter())
            .map(|(l, v)| (l.as_str(), v.as_slice()))
    }

    /// Rows `[start, end)` including attached regressors.
    pub fn slice(&self, start: usize, end: usize) -> Result<Self> {
        if start > end || end > self.len() {
            return Err(ForecastError::DimensionMismatch {
                expected: self.len(),
                got: end,
            });
        }
        Ok(Self {
            dates: self.dates[start..end].to_vec(),
            values: self
                .values
                .iter()
                .map(|col| col[start..end].to_vec())
                .collect(),
            labels: self.labels.clone(),
            regressors: self
                .regressors
                .iter()
                .map(|(k, v)| (k.clone(), v[start..end].to_vec()))
                .collect(),
        })
    }

    /// The first `n` periods.
    pub fn head(&self, n: usize) -> Result<Self> {
        self.slice(0, n.min(self.len()))
    }

    /// A single-column view of `label`, keeping dates and regressors.
    pub fn select(&self, label: &str) -> Result<Self> {
        let column = self.require_column(label)?.to_vec();
        Ok(Self {
            dates: self.dates.clone(),
            values: vec![column],
            labels: vec![label.to_string()],
            regressors: self.regressors.clone(),
        })
    }

    /// Attach a regressor column aligned to this series' dates.
    pub fn set_regressor(&mut self, name: impl Into<String>, values: Vec<Option<f64>>) -> Result<()> {
        if values.len() != self.len() {
            return Err(ForecastError::DimensionMismatch {
                expected: self.len(),
                got: values.len(),
            });
        }
        self.regressors.insert(name.into(), values);
        Ok(())
    }

    /// Attach `driver`'s first column by exact date match. Dates the driver
    /// does not cover become null.
    pub fn align_regressor(&mut self, name: impl Into<String>, driver: &TimeSeries) -> Result<()> {
        let lookup: BTreeMap<NaiveDate, Option<f64>> = driver
            .dates()
            .iter()
            .copied()
            .zip(driver.primary_values().iter().copied())
            .collect();
        let aligned = self
            .dates
            .iter()
            .map(|d| lookup.get(d).copied().flatten())
            .collect();
        self.set_regressor(name, aligned)
    }

    pub fn regressor(&self, name: &str) -> Option<&[Option<f64>]> {
        self.regressors.get(name).map(|v| v.as_slice())
    }

    pub fn has_regressors(&self) -> bool {
        !self.regressors.is_empty()
    }

    /// Number of finite cells in the first column, matching [`Self::valid_values`].
    pub fn count_valid(&self) -> usize {
        self.primary_values()
            .iter()
            .filter(|v| v.is_some_and(f64::is_finite))
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn weekly_dates(n: usize) -> Vec<NaiveDate> {
        let base = NaiveDate::from_ymd_opt(2025, 1, 6).unwrap();
        (0..n).map(|i| base + chrono::Duration::weeks(i as i64)).collect()
    }

    #[test]
    fn rejects_non_increasing_dates() {
        let mut dates = weekly_dates(3);
        dates.swap(1, 2);
        let result = TimeSeries::from_values(dates, "A", &[1.0, 2.0, 3.0]);
        assert!(matches!(result, Err(ForecastError::TimestampError(_))));
    }

    #[test]
    fn rejects_column_length_mismatch() {
        let result = TimeSeries::univariate(weekly_dates(3), "A", vec![Some(1.0)]);
        assert!(matches!(
            result,
            Err(ForecastError::DimensionMismatch { expected: 3, got: 1 })
        ));
    }

    #[test]
    fn rejects_duplicate_labels() {
        let result = TimeSeries::new(
            weekly_dates(1),
            vec!["A".into(), "A".into()],
            vec![vec![Some(1.0)], vec![Some(2.0)]],
        );
        assert!(matches!(result, Err(ForecastError::MissingInput(_))));
    }

    #[test]
    fn valid_values_skip_nulls() {
        let ts = TimeSeries::univariate(
            weekly_dates(4),
            "A",
            vec![Some(1.0), None, Some(3.0), Some(4.0)],
        )
        .unwrap();
        assert_eq!(ts.valid_values(), vec![1.0, 3.0, 4.0]);
        assert_eq!(ts.count_valid(), 3);
    }

    #[test]
    fn non_finite_cells_are_not_counted() {
        let ts = TimeSeries::univariate(
            weekly_dates(4),
            "A",
            vec![Some(1.0), Some(f64::NAN), Some(f64::INFINITY), Some(4.0)],
        )
        .unwrap();
        assert_eq!(ts.valid_values(), vec![1.0, 4.0]);
        assert_eq!(ts.count_valid(), 2);
    }

    #[test]
    fn select_and_slice_keep_regressors_aligned() {
        let ts = TimeSeriesBuilder::new()
            .dates(weekly_dates(4))
            .column("A", vec![Some(1.0), Some(2.0), Some(3.0), Some(4.0)])
            .column("B", vec![Some(5.0), Some(6.0), Some(7.0), Some(8.0)])
            .regressor("x", vec![Some(0.1), Some(0.2), Some(0.3), Some(0.4)])
            .build()
            .unwrap();

        let b = ts.select("B").unwrap();
        assert_eq!(b.primary_label(), Some("B"));
        assert_eq!(b.valid_values(), vec![5.0, 6.0, 7.0, 8.0]);

        let tail = b.slice(2, 4).unwrap();
        assert_eq!(tail.valid_values(), vec![7.0, 8.0]);
        assert_eq!(tail.regressor("x").unwrap(), &[Some(0.3), Some(0.4)]);
        assert!(ts.select("C").is_err());
    }

    #[test]
    fn align_regressor_matches_by_date() {
        let dates = weekly_dates(3);
        let mut ts = TimeSeries::from_values(dates.clone(), "A", &[1.0, 2.0, 3.0]).unwrap();
        let driver =
            TimeSeries::from_values(vec![dates[0], dates[2]], "driver", &[40.0, 42.0]).unwrap();

        ts.align_regressor("driver", &driver).unwrap();
        assert_eq!(
            ts.regressor("driver").unwrap(),
            &[Some(40.0), None, Some(42.0)]
        );
    }
}
