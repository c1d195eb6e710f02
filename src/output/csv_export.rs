/// CSV output: tabular downloads of normalized series.
///
/// Rows are keyed by timestamp across all series. A series with no value
/// at a timestamp leaves its cell blank rather than carrying a value
/// forward.

use std::collections::BTreeMap;

use crate::model::{HydroError, LocationKey, TimeSeries, Timestamp};
use crate::output::chart::TIMESTAMP_FORMAT;

pub const ARCHIVE_HEADER: [&str; 2] = ["datetime", "flow (m3/s)"];
pub const HISTORIC_HEADER: [&str; 2] = ["datetime", "streamflow (m3/s)"];
pub const FORECAST_HEADER: [&str; 7] = [
    "datetime",
    "high_res (m3/s)",
    "max (m3/s)",
    "mean (m3/s)",
    "min (m3/s)",
    "std_dev_range_lower (m3/s)",
    "std_dev_range_upper (m3/s)",
];

/// Forecast column names in `FORECAST_HEADER` order.
pub const FORECAST_COLUMNS: [&str; 6] = [
    "high_res",
    "max",
    "mean",
    "min",
    "std_dev_range_lower",
    "std_dev_range_upper",
];

/// A ready-to-send CSV download.
#[derive(Debug, Clone, PartialEq)]
pub struct CsvExport {
    pub filename: String,
    pub body: Vec<u8>,
}

/// Lays out `series` as rows under `header`, one row per distinct
/// timestamp in ascending order. `header` must have one more entry than
/// there are series.
pub fn to_csv_rows(series: &[TimeSeries], header: &[&str]) -> Vec<Vec<String>> {
    let mut table: BTreeMap<Timestamp, Vec<Option<f64>>> = BTreeMap::new();
    for (col, s) in series.iter().enumerate() {
        for point in &s.points {
            table.entry(point.timestamp).or_insert_with(|| vec![None; series.len()])[col] =
                Some(point.value);
        }
    }

    let mut rows = Vec::with_capacity(table.len() + 1);
    rows.push(header.iter().map(|h| h.to_string()).collect());
    for (timestamp, values) in table {
        let mut row = Vec::with_capacity(values.len() + 1);
        row.push(timestamp.format(TIMESTAMP_FORMAT).to_string());
        row.extend(values.into_iter().map(|v| v.map(|v| v.to_string()).unwrap_or_default()));
        rows.push(row);
    }
    rows
}

/// Serializes rows as comma-separated UTF-8.
pub fn write_csv(rows: &[Vec<String>]) -> Result<Vec<u8>, HydroError> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    for row in rows {
        writer
            .write_record(row)
            .map_err(|e| HydroError::extraction("writing CSV", e))?;
    }
    writer
        .into_inner()
        .map_err(|e| HydroError::extraction("writing CSV", e.to_string()))
}

/// `{prefix}_streamflow_{watershed}_{subbasin}_{reach}[_{date}].csv`
pub fn export_filename(prefix: &str, location: &LocationKey, date: Option<&str>) -> String {
    let mut name = format!(
        "{}_streamflow_{}_{}_{}",
        prefix, location.watershed, location.subbasin, location.reach_id
    );
    if let Some(date) = date {
        name.push('_');
        name.push_str(date);
    }
    name.push_str(".csv");
    name
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{DisplayUnit, SeriesPoint};
    use chrono::NaiveDate;

    fn at(day: u32, hour: u32) -> Timestamp {
        NaiveDate::from_ymd_opt(2020, 1, day)
            .unwrap()
            .and_hms_opt(hour, 0, 0)
            .unwrap()
            .and_utc()
            .fixed_offset()
    }

    fn series(name: &str, points: &[(Timestamp, f64)]) -> TimeSeries {
        TimeSeries {
            name: name.to_string(),
            unit: DisplayUnit::Metric,
            points: points.iter().map(|&(timestamp, value)| SeriesPoint { timestamp, value }).collect(),
        }
    }

    #[test]
    fn test_single_series_rows() {
        let rows = to_csv_rows(
            &[series("Qout", &[(at(1, 0), 10.5), (at(2, 0), 20.25)])],
            &ARCHIVE_HEADER,
        );
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0], vec!["datetime", "flow (m3/s)"]);
        assert_eq!(rows[1], vec!["2020-01-01 00:00:00", "10.5"]);
        assert_eq!(rows[2], vec!["2020-01-02 00:00:00", "20.25"]);
    }

    #[test]
    fn test_missing_values_left_blank() {
        let rows = to_csv_rows(
            &[
                series("high_res", &[(at(1, 0), 12.0)]),
                series("mean", &[(at(1, 0), 13.0), (at(1, 12), 14.5)]),
            ],
            &["datetime", "high_res (m3/s)", "mean (m3/s)"],
        );
        assert_eq!(rows[1], vec!["2020-01-01 00:00:00", "12", "13"]);
        assert_eq!(rows[2], vec!["2020-01-01 12:00:00", "", "14.5"]);
    }

    #[test]
    fn test_repeated_local_hour_keeps_both_rows() {
        use chrono::{FixedOffset, TimeZone};
        let edt = FixedOffset::west_opt(4 * 3600).unwrap();
        let est = FixedOffset::west_opt(5 * 3600).unwrap();
        let rows = to_csv_rows(
            &[series(
                "Qout",
                &[
                    (edt.with_ymd_and_hms(2020, 11, 1, 1, 0, 0).unwrap(), 1.0),
                    (est.with_ymd_and_hms(2020, 11, 1, 1, 0, 0).unwrap(), 2.0),
                ],
            )],
            &ARCHIVE_HEADER,
        );
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[1], vec!["2020-11-01 01:00:00", "1"]);
        assert_eq!(rows[2], vec!["2020-11-01 01:00:00", "2"]);
    }

    #[test]
    fn test_written_csv_reads_back() {
        let rows = to_csv_rows(
            &[series("streamflow", &[(at(3, 0), 120.75), (at(1, 0), 35.5)])],
            &HISTORIC_HEADER,
        );
        let bytes = write_csv(&rows).unwrap();

        let mut reader = csv::Reader::from_reader(bytes.as_slice());
        assert_eq!(reader.headers().unwrap(), vec!["datetime", "streamflow (m3/s)"]);
        let records: Vec<csv::StringRecord> = reader.records().map(|r| r.unwrap()).collect();
        assert_eq!(records.len(), 2);
        assert_eq!(&records[0][0], "2020-01-01 00:00:00");
        assert_eq!(&records[1][1], "120.75");
    }

    #[test]
    fn test_empty_series_writes_header_only() {
        let rows = to_csv_rows(&[series("Qout", &[])], &ARCHIVE_HEADER);
        let text = String::from_utf8(write_csv(&rows).unwrap()).unwrap();
        assert_eq!(text, "datetime,flow (m3/s)\n");
    }

    #[test]
    fn test_export_filename() {
        let key = LocationKey::new("Sample", "Basin1", 102).unwrap();
        assert_eq!(
            export_filename("lis", &key, Some("2020-01-01")),
            "lis_streamflow_Sample_Basin1_102_2020-01-01.csv"
        );
        assert_eq!(
            export_filename("historic", &key, None),
            "historic_streamflow_Sample_Basin1_102.csv"
        );
    }
}
