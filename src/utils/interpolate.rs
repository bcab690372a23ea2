//! Time-weighted linear interpolation over dated observations.

use chrono::NaiveDate;

/// Linearly interpolate `points` (sorted by date, non-null) at `at`.
///
/// Returns `None` outside `[first, last]`; there is no extrapolation.
pub fn interpolate_at(points: &[(NaiveDate, f64)], at: NaiveDate) -> Option<f64> {
    let first = points.first()?;
    let last = points.last()?;
    if at < first.0 || at > last.0 {
        return None;
    }
    // index of the first point with date >= at
    let idx = points.partition_point(|(d, _)| *d < at);
    let (d1, v1) = points[idx];
    if d1 == at || idx == 0 {
        return Some(v1);
    }
    let (d0, v0) = points[idx - 1];
    let span = (d1 - d0).num_days() as f64;
    let offset = (at - d0).num_days() as f64;
    Some(v0 + (v1 - v0) * offset / span)
}

/// Fill interior nulls by time-weighted linear interpolation between the
/// nearest non-null neighbours. Leading and trailing nulls are kept.
pub fn fill_interior(dates: &[NaiveDate], values: &[Option<f64>]) -> Vec<Option<f64>> {
    let known: Vec<(NaiveDate, f64)> = dates
        .iter()
        .zip(values)
        .filter_map(|(d, v)| v.filter(|x| x.is_finite()).map(|x| (*d, x)))
        .collect();

    dates
        .iter()
        .zip(values)
        .map(|(d, v)| match v {
            Some(x) if x.is_finite() => Some(*x),
            _ => interpolate_at(&known, *d),
        })
        .collect()
}
