/// Core data types for the hydroviewer service.
///
/// This module defines the shared domain model imported by all other modules:
/// model families, location keys, source descriptors, raw and normalized
/// series, return period thresholds, and the error type every stage of the
/// retrieval pipeline reports through.

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use thiserror::Error;

// ---------------------------------------------------------------------------
// Model families
// ---------------------------------------------------------------------------

/// Which streamflow model a request is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ModelFamily {
    /// ECMWF-RAPID, served by the streamflow prediction tool API.
    Ecmwf,
    /// LIS-RAPID, served from local Qout archives.
    Lis,
    /// HIWAT-RAPID, served from local Qout archives.
    Hiwat,
}

/// Where a model family's data lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    RemoteApi,
    LocalArchive,
}

impl ModelFamily {
    pub const ALL: [ModelFamily; 3] = [ModelFamily::Ecmwf, ModelFamily::Lis, ModelFamily::Hiwat];

    pub fn backend(&self) -> Backend {
        match self {
            ModelFamily::Ecmwf => Backend::RemoteApi,
            ModelFamily::Lis | ModelFamily::Hiwat => Backend::LocalArchive,
        }
    }

    /// Name used by the front end's model selector.
    pub fn display_name(&self) -> &'static str {
        match self {
            ModelFamily::Ecmwf => "ECMWF-RAPID",
            ModelFamily::Lis => "LIS-RAPID",
            ModelFamily::Hiwat => "HIWAT-RAPID",
        }
    }

    /// Legend name of the chart trace for archive series.
    pub fn trace_name(&self) -> &'static str {
        match self {
            ModelFamily::Ecmwf => "ECMWF",
            ModelFamily::Lis => "LDAS",
            ModelFamily::Hiwat => "HIWAT",
        }
    }

    /// Leading component of CSV export filenames.
    pub fn csv_prefix(&self) -> &'static str {
        match self {
            ModelFamily::Ecmwf => "forecast",
            ModelFamily::Lis => "lis",
            ModelFamily::Hiwat => "hiwat",
        }
    }

    /// Static message shown when a time series request fails.
    pub fn no_data_message(&self) -> &'static str {
        match self {
            ModelFamily::Ecmwf => "No data found for the selected reach.",
            ModelFamily::Lis => "No LIS data found for the selected reach.",
            ModelFamily::Hiwat => "No HIWAT data found for the selected reach.",
        }
    }
}

impl fmt::Display for ModelFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

impl FromStr for ModelFamily {
    type Err = HydroError;

    /// Accepts both selector names ("LIS-RAPID") and short forms ("lis").
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ecmwf" | "ecmwf-rapid" => Ok(ModelFamily::Ecmwf),
            "lis" | "lis-rapid" => Ok(ModelFamily::Lis),
            "hiwat" | "hiwat-rapid" => Ok(ModelFamily::Hiwat),
            other => Err(HydroError::InvalidLocation(format!("unknown model '{}'", other))),
        }
    }
}

// ---------------------------------------------------------------------------
// Location keys
// ---------------------------------------------------------------------------

/// Identifies one forecast point: the (watershed, subbasin) pair picks an
/// archive folder or API route, the reach id a column within it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocationKey {
    pub watershed: String,
    pub subbasin: String,
    pub reach_id: i64,
}

impl LocationKey {
    /// Builds a key, rejecting names that could not form a folder name.
    pub fn new(watershed: &str, subbasin: &str, reach_id: i64) -> Result<Self, HydroError> {
        validate_name("watershed", watershed)?;
        validate_name("subbasin", subbasin)?;
        Ok(LocationKey {
            watershed: watershed.to_string(),
            subbasin: subbasin.to_string(),
            reach_id,
        })
    }

    /// Builds a key from raw query parameter values.
    pub fn parse(watershed: &str, subbasin: &str, reach_id: &str) -> Result<Self, HydroError> {
        let reach_id: i64 = reach_id.trim().parse().map_err(|_| {
            HydroError::InvalidLocation(format!("reach id '{}' is not an integer", reach_id))
        })?;
        LocationKey::new(watershed, subbasin, reach_id)
    }

    /// Archive folder name, `"{watershed}-{subbasin}"`.
    pub fn folder_name(&self) -> String {
        format!("{}-{}", self.watershed, self.subbasin)
    }
}

/// Watershed and subbasin names are joined with '-' into a folder name,
/// so they may only hold ASCII alphanumerics and underscores.
pub fn validate_name(field: &str, value: &str) -> Result<(), HydroError> {
    if value.is_empty() {
        return Err(HydroError::InvalidLocation(format!("{} is missing", field)));
    }
    if !value.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(HydroError::InvalidLocation(format!(
            "{} '{}' contains characters other than letters, digits and '_'",
            field, value
        )));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Date selection
// ---------------------------------------------------------------------------

/// Which run of a model to read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DateSelector {
    /// Latest forecast folder.
    MostRecent,
    /// Explicit forecast folder token, e.g. `"20200101.00"`.
    ForecastFolder(String),
    /// Long-term historic simulation rather than a forecast.
    Historic,
}

impl DateSelector {
    /// Interprets the `startdate` query parameter; absent or empty means
    /// the most recent forecast.
    pub fn from_query(startdate: Option<&str>) -> Result<Self, HydroError> {
        match startdate.map(str::trim) {
            None | Some("") | Some("most_recent") => Ok(DateSelector::MostRecent),
            Some(token) => {
                let valid = token.split_once('.').is_some_and(|(day, time)| {
                    day.len() == 8
                        && day.chars().all(|c| c.is_ascii_digit())
                        && !time.is_empty()
                        && time.len() <= 4
                        && time.chars().all(|c| c.is_ascii_digit())
                });
                if valid {
                    Ok(DateSelector::ForecastFolder(token.to_string()))
                } else {
                    Err(HydroError::InvalidLocation(format!(
                        "forecast date '{}' is not of the form YYYYMMDD.HH",
                        token
                    )))
                }
            }
        }
    }

    /// Value of the API's `forecast_folder` parameter.
    pub fn forecast_folder(&self) -> &str {
        match self {
            DateSelector::ForecastFolder(folder) => folder,
            DateSelector::MostRecent | DateSelector::Historic => "most_recent",
        }
    }
}

// ---------------------------------------------------------------------------
// Source descriptors
// ---------------------------------------------------------------------------

/// Payload format returned by a remote endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadFormat {
    Csv,
    Json,
}

/// A concrete data source resolved for one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceDescriptor {
    Remote { url: String, format: PayloadFormat },
    Archive { path: PathBuf },
}

// ---------------------------------------------------------------------------
// Series types
// ---------------------------------------------------------------------------

/// A point in time with the UTC offset it is displayed in. Ordering and
/// equality compare instants, so the repeated local hour at a clock
/// change stays two distinct timestamps.
pub type Timestamp = DateTime<FixedOffset>;

/// One decoded row before normalization. `values` lines up with
/// `RawSeries::columns`; `None` marks a blank cell.
#[derive(Debug, Clone, PartialEq)]
pub struct RawRow {
    pub timestamp: Timestamp,
    pub values: Vec<Option<f64>>,
}

/// Extracted data as it came out of the backend.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RawSeries {
    pub columns: Vec<String>,
    pub rows: Vec<RawRow>,
}

/// Display unit requested by the front end. Values are always stored in
/// m³/s; this only changes axis labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DisplayUnit {
    #[default]
    Metric,
    English,
}

impl DisplayUnit {
    pub fn from_query(units: Option<&str>) -> Self {
        match units {
            Some(u) if u.eq_ignore_ascii_case("english") => DisplayUnit::English,
            _ => DisplayUnit::Metric,
        }
    }

    /// Length unit used in the "(m³/s)" style axis label.
    pub fn length_label(&self) -> &'static str {
        match self {
            DisplayUnit::Metric => "m",
            DisplayUnit::English => "ft",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SeriesPoint {
    pub timestamp: Timestamp,
    pub value: f64,
}

/// A canonical series: strictly ascending timestamps, discharge in m³/s.
/// An empty series means "no data".
#[derive(Debug, Clone, PartialEq)]
pub struct TimeSeries {
    pub name: String,
    pub unit: DisplayUnit,
    pub points: Vec<SeriesPoint>,
}

impl TimeSeries {
    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn first_timestamp(&self) -> Option<Timestamp> {
        self.points.first().map(|p| p.timestamp)
    }

    pub fn last_timestamp(&self) -> Option<Timestamp> {
        self.points.last().map(|p| p.timestamp)
    }

    pub fn max_value(&self) -> Option<f64> {
        self.points.iter().map(|p| p.value).reduce(f64::max)
    }

    pub fn values(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.value).collect()
    }
}

// ---------------------------------------------------------------------------
// Return periods
// ---------------------------------------------------------------------------

/// Flood recurrence flows for a reach, in m³/s.
///
/// The API has served these both as numbers and as numeric strings, so
/// both are accepted.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ReturnPeriodThresholds {
    #[serde(deserialize_with = "number_or_string")]
    pub two: f64,
    #[serde(deserialize_with = "number_or_string")]
    pub ten: f64,
    #[serde(deserialize_with = "number_or_string")]
    pub twenty: f64,
    #[serde(deserialize_with = "number_or_string")]
    pub max: f64,
}

fn number_or_string<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum NumberOrString {
        Number(f64),
        Text(String),
    }

    let value: f64 = match NumberOrString::deserialize(deserializer)? {
        NumberOrString::Number(n) => n,
        NumberOrString::Text(s) => s.trim().parse().map_err(serde::de::Error::custom)?,
    };
    if !value.is_finite() {
        return Err(serde::de::Error::custom(format!(
            "return period must be a finite number, got {}",
            value
        )));
    }
    Ok(value)
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Coarse error classification, kept for logging and tests while the
/// user-facing message stays generic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    InvalidLocation,
    NotFound,
    ReachNotFound,
    ExtractionFailed,
    UpstreamUnavailable,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::InvalidLocation => "InvalidLocation",
            ErrorKind::NotFound => "NotFound",
            ErrorKind::ReachNotFound => "ReachNotFound",
            ErrorKind::ExtractionFailed => "ExtractionFailed",
            ErrorKind::UpstreamUnavailable => "UpstreamUnavailable",
        };
        f.write_str(name)
    }
}

/// Errors raised while locating, extracting or normalizing a series.
#[derive(Debug, Error)]
pub enum HydroError {
    /// Missing or malformed watershed, subbasin, reach id, model or date.
    #[error("invalid location: {0}")]
    InvalidLocation(String),

    /// No archive root, folder or Qout file matches.
    #[error("not found: {0}")]
    NotFound(String),

    /// The reach id is absent from the archive's reach axis.
    #[error("reach {reach_id} not found in {archive}")]
    ReachNotFound { reach_id: i64, archive: String },

    /// I/O or decode failure; the original cause is attached.
    #[error("extraction failed: {context}")]
    ExtractionFailed {
        context: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// The remote API could not be reached or answered non-2xx.
    #[error("upstream unavailable: {0}")]
    UpstreamUnavailable(String),
}

impl HydroError {
    pub fn extraction(
        context: impl Into<String>,
        cause: impl Into<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        HydroError::ExtractionFailed {
            context: context.into(),
            source: cause.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            HydroError::InvalidLocation(_) => ErrorKind::InvalidLocation,
            HydroError::NotFound(_) => ErrorKind::NotFound,
            HydroError::ReachNotFound { .. } => ErrorKind::ReachNotFound,
            HydroError::ExtractionFailed { .. } => ErrorKind::ExtractionFailed,
            HydroError::UpstreamUnavailable(_) => ErrorKind::UpstreamUnavailable,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
