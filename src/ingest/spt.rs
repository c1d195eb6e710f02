/// Streamflow Prediction Tool (SPT) API client.
///
/// Serves ECMWF-RAPID forecasts, the historic simulation, return periods,
/// available forecast dates and warning points:
///   {source}/apps/streamflow-prediction-tool/api/<Method>/?...
///
/// Requests carry `Authorization: Token <token>`. Series endpoints are
/// asked for CSV; the rest answer JSON. All payloads are parsed strictly
/// with serde_json / csv. See `fixtures.rs` for sample responses.

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::config::ApiConfig;
use crate::model::{
    DateSelector, HydroError, LocationKey, RawRow, RawSeries, ReturnPeriodThresholds, Timestamp,
};

const API_PATH: &str = "/apps/streamflow-prediction-tool/api";

// ---------------------------------------------------------------------------
// URL construction
// ---------------------------------------------------------------------------

/// `GetForecast` for a reach, CSV, either the latest or a given folder.
pub fn build_forecast_url(base: &str, location: &LocationKey, selector: &DateSelector) -> String {
    format!(
        "{}{}/GetForecast/?watershed_name={}&subbasin_name={}&reach_id={}&forecast_folder={}&return_format=csv",
        base,
        API_PATH,
        urlencoding::encode(&location.watershed),
        urlencoding::encode(&location.subbasin),
        location.reach_id,
        urlencoding::encode(selector.forecast_folder()),
    )
}

/// `GetHistoricData` for a reach, CSV.
pub fn build_historic_url(base: &str, location: &LocationKey) -> String {
    format!(
        "{}{}/GetHistoricData/?watershed_name={}&subbasin_name={}&reach_id={}&return_format=csv",
        base,
        API_PATH,
        urlencoding::encode(&location.watershed),
        urlencoding::encode(&location.subbasin),
        location.reach_id,
    )
}

/// `GetReturnPeriods` for a reach, JSON.
pub fn build_return_periods_url(base: &str, location: &LocationKey) -> String {
    format!(
        "{}{}/GetReturnPeriods/?watershed_name={}&subbasin_name={}&reach_id={}",
        base,
        API_PATH,
        urlencoding::encode(&location.watershed),
        urlencoding::encode(&location.subbasin),
        location.reach_id,
    )
}

/// `GetAvailableDates` for a watershed/subbasin, JSON.
pub fn build_available_dates_url(base: &str, watershed: &str, subbasin: &str) -> String {
    format!(
        "{}{}/GetAvailableDates/?watershed_name={}&subbasin_name={}",
        base,
        API_PATH,
        urlencoding::encode(watershed),
        urlencoding::encode(subbasin),
    )
}

/// `GetWarningPoints` for one return period (2, 10 or 20), GeoJSON.
pub fn build_warning_points_url(
    base: &str,
    watershed: &str,
    subbasin: &str,
    return_period: u32,
) -> String {
    format!(
        "{}{}/GetWarningPoints/?watershed_name={}&subbasin_name={}&return_period={}",
        base,
        API_PATH,
        urlencoding::encode(watershed),
        urlencoding::encode(subbasin),
        return_period,
    )
}

// ---------------------------------------------------------------------------
// Fetching
// ---------------------------------------------------------------------------

/// Fetches a URL's body as text.
pub trait RemoteFetch: Send + Sync {
    fn get_text(&self, url: &str) -> Result<String, HydroError>;
}

/// Outcome of one failed attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchFailure {
    /// Connection error, timeout or 5xx; worth one more try.
    Transient(String),
    /// Anything else; retrying will not help.
    Permanent(String),
}

/// Runs `attempt` until it succeeds, fails permanently, or has been
/// retried `retries` times.
pub fn with_retry<F>(retries: u32, url: &str, mut attempt: F) -> Result<String, HydroError>
where
    F: FnMut() -> Result<String, FetchFailure>,
{
    let mut retried = 0;
    loop {
        match attempt() {
            Ok(body) => return Ok(body),
            Err(FetchFailure::Transient(msg)) if retried < retries => {
                retried += 1;
                log::warn!("SPT request failed ({}), retry {}/{}: {}", msg, retried, retries, url);
            }
            Err(FetchFailure::Transient(msg)) | Err(FetchFailure::Permanent(msg)) => {
                return Err(HydroError::UpstreamUnavailable(msg));
            }
        }
    }
}

/// Blocking SPT client with a bounded timeout and a transient retry.
pub struct SptClient {
    client: reqwest::blocking::Client,
    token: String,
    retries: u32,
}

impl SptClient {
    pub fn new(config: &ApiConfig) -> Result<Self, HydroError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(config.timeout())
            .danger_accept_invalid_certs(config.accept_invalid_certs)
            .build()
            .map_err(|e| HydroError::UpstreamUnavailable(format!("failed to build HTTP client: {}", e)))?;

        Ok(SptClient {
            client,
            token: config.token.clone(),
            retries: config.retries,
        })
    }

    fn attempt(&self, url: &str) -> Result<String, FetchFailure> {
        let response = self
            .client
            .get(url)
            .header("Authorization", format!("Token {}", self.token))
            .send()
            .map_err(|e| {
                if e.is_timeout() || e.is_connect() {
                    FetchFailure::Transient(format!("request error: {}", e))
                } else {
                    FetchFailure::Permanent(format!("request error: {}", e))
                }
            })?;

        let status = response.status();
        if status.is_server_error() {
            return Err(FetchFailure::Transient(format!("SPT API error: {}", status)));
        }
        if !status.is_success() {
            return Err(FetchFailure::Permanent(format!("SPT API error: {}", status)));
        }

        response
            .text()
            .map_err(|e| FetchFailure::Permanent(format!("failed to read response body: {}", e)))
    }
}

impl RemoteFetch for SptClient {
    fn get_text(&self, url: &str) -> Result<String, HydroError> {
        log::debug!("Fetching: {}", url);
        with_retry(self.retries, url, || self.attempt(url))
    }
}

// ---------------------------------------------------------------------------
// Response parsing
// ---------------------------------------------------------------------------

/// Parses an SPT timestamp. The API has used several layouts over time,
/// none with a zone, so the result carries a zero offset.
pub fn parse_timestamp(text: &str) -> Option<Timestamp> {
    let text = text.trim();
    const LAYOUTS: [&str; 3] = ["%Y-%m-%d %H:%M:%S", "%Y-%m-%d %H:%M", "%Y-%m-%dT%H:%M:%S"];
    LAYOUTS
        .iter()
        .find_map(|layout| NaiveDateTime::parse_from_str(text, layout).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(text, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
        .map(|naive| naive.and_utc().fixed_offset())
}

/// Parses a CSV series payload: one header row naming the columns, then
/// `datetime,value[,value...]` rows. Blank cells become `None`.
///
/// # Errors
/// `ExtractionFailed` for malformed CSV, unparseable timestamps or values,
/// or a payload without a header.
pub fn parse_series_csv(body: &str) -> Result<RawSeries, HydroError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(body.as_bytes());

    let headers = reader
        .headers()
        .map_err(|e| HydroError::extraction("reading CSV header", e))?
        .clone();
    if headers.len() < 2 {
        return Err(HydroError::extraction(
            "reading CSV header",
            format!("expected a datetime column and at least one value column, got {:?}", headers),
        ));
    }

    let columns: Vec<String> = headers.iter().skip(1).map(column_name).collect();
    let mut rows = Vec::new();

    for (line, record) in reader.records().enumerate() {
        let record = record.map_err(|e| HydroError::extraction("reading CSV row", e))?;
        let stamp = record.get(0).unwrap_or_default();
        let timestamp = parse_timestamp(stamp).ok_or_else(|| {
            HydroError::extraction(
                format!("parsing CSV row {}", line + 1),
                format!("invalid timestamp '{}'", stamp),
            )
        })?;

        let mut values = Vec::with_capacity(columns.len());
        for col in 0..columns.len() {
            let cell = record.get(col + 1).unwrap_or_default();
            if cell.is_empty() {
                values.push(None);
                continue;
            }
            let value: f64 = cell.parse().map_err(|e| {
                HydroError::extraction(format!("parsing CSV row {} value '{}'", line + 1, cell), e)
            })?;
            values.push(Some(value));
        }

        rows.push(RawRow { timestamp, values });
    }

    Ok(RawSeries { columns, rows })
}

/// Parses a JSON series payload: an array of records, each holding a
/// `datetime` string plus one numeric (or null) field per column. Columns
/// come from the first record's keys in sorted order.
pub fn parse_series_json(body: &str) -> Result<RawSeries, HydroError> {
    let records: Vec<serde_json::Map<String, serde_json::Value>> = serde_json::from_str(body)
        .map_err(|e| HydroError::extraction("parsing JSON series", e))?;

    let mut columns: Vec<String> = records
        .first()
        .map(|first| first.keys().filter(|k| k.as_str() != "datetime").cloned().collect())
        .unwrap_or_default();
    columns.sort();

    let mut rows = Vec::with_capacity(records.len());
    for (index, record) in records.iter().enumerate() {
        let stamp = record.get("datetime").and_then(|v| v.as_str()).unwrap_or_default();
        let timestamp = parse_timestamp(stamp).ok_or_else(|| {
            HydroError::extraction(
                format!("parsing JSON record {}", index),
                format!("invalid or missing datetime '{}'", stamp),
            )
        })?;

        let mut values = Vec::with_capacity(columns.len());
        for col in &columns {
            match record.get(col) {
                None | Some(serde_json::Value::Null) => values.push(None),
                Some(v) => {
                    let value = v.as_f64().ok_or_else(|| {
                        HydroError::extraction(
                            format!("parsing JSON record {}", index),
                            format!("field '{}' is not a number: {}", col, v),
                        )
                    })?;
                    values.push(Some(value));
                }
            }
        }
        rows.push(RawRow { timestamp, values });
    }

    Ok(RawSeries { columns, rows })
}

/// Strips a trailing unit, e.g. `"mean (m3/s)"` → `"mean"`.
fn column_name(header: &str) -> String {
    match header.rsplit_once(" (") {
        Some((name, unit)) if unit.ends_with(')') => name.to_string(),
        _ => header.to_string(),
    }
}

/// One selectable forecast run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AvailableDate {
    /// `YYYY-MM-DD HH:MM`
    pub display: String,
    /// Folder token to pass back as `startdate`, e.g. `"20200101.12"`.
    pub folder: String,
}

/// Parses a `GetAvailableDates` JSON array into runs, most recent first.
///
/// Tokens look like `YYYYMMDD.H`, `YYYYMMDD.HH` or `YYYYMMDD.HHMM`; the
/// time part is right-padded with zeros to `HHMM`.
pub fn parse_available_dates(json: &str) -> Result<Vec<AvailableDate>, HydroError> {
    let tokens: Vec<String> = serde_json::from_str(json)
        .map_err(|e| HydroError::extraction("parsing available dates", e))?;

    let mut dated = Vec::with_capacity(tokens.len());
    for token in tokens {
        let when = parse_folder_token(&token).ok_or_else(|| {
            HydroError::extraction(
                "parsing available dates",
                format!("invalid forecast folder '{}'", token),
            )
        })?;
        dated.push((when, token));
    }

    dated.sort_by(|a, b| b.0.cmp(&a.0));
    Ok(dated
        .into_iter()
        .map(|(when, folder)| AvailableDate {
            display: when.format("%Y-%m-%d %H:%M").to_string(),
            folder,
        })
        .collect())
}

fn parse_folder_token(token: &str) -> Option<NaiveDateTime> {
    let (day, time) = token.trim().split_once('.')?;
    if time.is_empty() || time.len() > 4 {
        return None;
    }
    let padded = format!("{}.{:0<4}", day, time);
    NaiveDateTime::parse_from_str(&padded, "%Y%m%d.%H%M").ok()
}

/// Parses a `GetReturnPeriods` JSON object.
pub fn parse_return_periods(json: &str) -> Result<ReturnPeriodThresholds, HydroError> {
    serde_json::from_str(json).map_err(|e| HydroError::extraction("parsing return periods", e))
}

#[derive(Deserialize)]
struct FeatureCollection {
    features: Vec<serde_json::Value>,
}

/// Extracts the `features` array of a `GetWarningPoints` GeoJSON response.
pub fn parse_warning_features(json: &str) -> Result<Vec<serde_json::Value>, HydroError> {
    let collection: FeatureCollection = serde_json::from_str(json)
        .map_err(|e| HydroError::extraction("parsing warning points", e))?;
    Ok(collection.features)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
