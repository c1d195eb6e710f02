/// Series Normalizer: turns a backend's `RawSeries` into canonical
/// `TimeSeries`, one per raw column.
///
/// Rows are stably sorted by instant, two rows at the same instant are rejected,
/// and blank or non-finite cells are left out of that column. Nothing is
/// interpolated. Values stay in m³/s; the display unit is only recorded so
/// the output adapter can label axes.

use crate::model::{DisplayUnit, HydroError, RawSeries, SeriesPoint, TimeSeries};

/// Normalizes every column of `raw`.
///
/// # Errors
/// `ExtractionFailed` if two rows share a timestamp.
pub fn normalize(raw: RawSeries, unit: DisplayUnit) -> Result<Vec<TimeSeries>, HydroError> {
    let RawSeries { columns, mut rows } = raw;

    rows.sort_by(|a, b| a.timestamp.cmp(&b.timestamp));

    if let Some(pair) = rows.windows(2).find(|w| w[0].timestamp == w[1].timestamp) {
        return Err(HydroError::extraction(
            "normalizing series",
            format!("duplicate timestamp {}", pair[0].timestamp),
        ));
    }

    let series = columns
        .into_iter()
        .enumerate()
        .map(|(col, name)| {
            let points = rows
                .iter()
                .filter_map(|row| {
                    let value = row.values.get(col).copied().flatten()?;
                    value.is_finite().then_some(SeriesPoint {
                        timestamp: row.timestamp,
                        value,
                    })
                })
                .collect();
            TimeSeries { name, unit, points }
        })
        .collect();

    Ok(series)
}

/// Normalizes a single-column series (archive extracts, historic
/// simulation). A raw series without columns yields an empty series.
pub fn normalize_single(raw: RawSeries, unit: DisplayUnit) -> Result<TimeSeries, HydroError> {
    let mut series = normalize(raw, unit)?;
    if series.is_empty() {
        return Ok(TimeSeries {
            name: String::new(),
            unit,
            points: Vec::new(),
        });
    }
    Ok(series.swap_remove(0))
}
