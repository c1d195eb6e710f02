/// Integration tests for the LIS/HIWAT archive pipeline and its routes
///
/// These tests verify:
/// 1. Folder layout → Qout file resolution on a real directory tree
/// 2. Reach lookup and Qout extraction through the public service API
/// 3. Route replies: chart JSON, CSV attachments and static error messages
/// 4. Archive handles are released on every path
///
/// The archive and API backends are in-memory fakes, so no NetCDF library
/// or network access is needed.
///
/// Run with: cargo test --test archive_pipeline

use hydroviewer_service::config::{AppConfig, ArchiveTimezone};
use hydroviewer_service::endpoint::handle_request;
use hydroviewer_service::ingest::archive::{ArchiveDataset, ArchiveOpener};
use hydroviewer_service::ingest::spt::RemoteFetch;
use hydroviewer_service::model::{
    DateSelector, DisplayUnit, ErrorKind, HydroError, LocationKey, ModelFamily,
};
use hydroviewer_service::service::HydroService;

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

// ---------------------------------------------------------------------------
// Fakes
// ---------------------------------------------------------------------------

/// Scenario archive: reaches 101..=103, daily steps from 2020-01-01 UTC.
struct SampleBasin {
    name: String,
    released: Arc<AtomicUsize>,
}

impl ArchiveDataset for SampleBasin {
    fn name(&self) -> &str {
        &self.name
    }

    fn time_axis(&self) -> Result<Vec<f64>, HydroError> {
        Ok(vec![1_577_836_800.0, 1_577_923_200.0, 1_578_009_600.0])
    }

    fn reach_axis(&self) -> Result<Vec<i64>, HydroError> {
        Ok(vec![101, 102, 103])
    }

    fn reach_column(&self, index: usize) -> Result<Vec<f64>, HydroError> {
        let qout = [[1.0, 10.5, 100.0], [2.0, 20.25, 200.0], [3.0, 30.125, 300.0]];
        Ok(qout.iter().map(|row| row[index]).collect())
    }
}

impl Drop for SampleBasin {
    fn drop(&mut self) {
        self.released.fetch_add(1, Ordering::SeqCst);
    }
}

/// Serves `SampleBasin` for any path ending in `.nc`, counting opens.
#[derive(Clone, Default)]
struct SampleOpener {
    opened: Arc<AtomicUsize>,
    released: Arc<AtomicUsize>,
}

impl ArchiveOpener for SampleOpener {
    fn open(&self, path: &Path) -> Result<Box<dyn ArchiveDataset>, HydroError> {
        self.opened.fetch_add(1, Ordering::SeqCst);
        if path.extension().and_then(|e| e.to_str()) != Some("nc") {
            return Err(HydroError::extraction(format!("opening {}", path.display()), "not NetCDF"));
        }
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Ok(Box::new(SampleBasin {
            name,
            released: Arc::clone(&self.released),
        }))
    }
}

/// An API that is always down.
struct OfflineApi;

impl RemoteFetch for OfflineApi {
    fn get_text(&self, url: &str) -> Result<String, HydroError> {
        Err(HydroError::UpstreamUnavailable(format!("connection refused: {}", url)))
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// `{root}/Sample-Basin1/` with a Qout archive and an unrelated file that
/// sorts first.
fn lay_out_archives(root: &Path) -> PathBuf {
    let folder = root.join("Sample-Basin1");
    fs::create_dir_all(&folder).unwrap();
    fs::write(folder.join("README.txt"), b"not an archive").unwrap();
    fs::write(folder.join("SampleBasin_Qout_2020.nc"), b"").unwrap();
    fs::create_dir_all(root.join("central_america-guatemala")).unwrap();
    folder
}

fn build_service(root: &Path, opener: SampleOpener) -> HydroService {
    lay_out_archives(root);
    let mut config = AppConfig::default();
    config.archives.lis_path = Some(root.to_path_buf());
    config.archives.hiwat_path = Some(root.to_path_buf());
    config.archives.timezone = ArchiveTimezone::Utc;
    config.api.source = "https://spt.example".to_string();
    HydroService::new(config, Box::new(opener), Box::new(OfflineApi))
}

fn sample_key(reach_id: i64) -> LocationKey {
    LocationKey::new("Sample", "Basin1", reach_id).unwrap()
}

// ---------------------------------------------------------------------------
// Pipeline
// ---------------------------------------------------------------------------

#[test]
fn test_present_reach_preserves_length_and_values() {
    let dir = tempfile::tempdir().unwrap();
    let opener = SampleOpener::default();
    let service = build_service(dir.path(), opener.clone());

    let series = service
        .series(ModelFamily::Lis, &sample_key(102), &DateSelector::MostRecent, DisplayUnit::Metric)
        .expect("reach 102 should extract");

    assert_eq!(series.len(), 1);
    assert_eq!(series[0].len(), 3);
    assert_eq!(series[0].values(), vec![10.5, 20.25, 30.125]);
    assert_eq!(
        series[0].first_timestamp().map(|t| t.naive_local().to_string()),
        Some("2020-01-01 00:00:00".to_string())
    );
    assert_eq!(opener.opened.load(Ordering::SeqCst), 1);
    assert_eq!(opener.released.load(Ordering::SeqCst), 1);
}

#[test]
fn test_absent_reach_returns_no_partial_series() {
    let dir = tempfile::tempdir().unwrap();
    let opener = SampleOpener::default();
    let service = build_service(dir.path(), opener.clone());

    let err = service
        .series(ModelFamily::Hiwat, &sample_key(999), &DateSelector::MostRecent, DisplayUnit::Metric)
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::ReachNotFound);
    assert_eq!(err.to_string(), "reach 999 not found in SampleBasin_Qout_2020.nc");
    assert_eq!(opener.released.load(Ordering::SeqCst), 1);
}

#[test]
fn test_missing_folder_is_not_found_without_opening() {
    let dir = tempfile::tempdir().unwrap();
    let opener = SampleOpener::default();
    let service = build_service(dir.path(), opener.clone());

    let key = LocationKey::new("Other", "Basin9", 102).unwrap();
    let err = service
        .series(ModelFamily::Lis, &key, &DateSelector::MostRecent, DisplayUnit::Metric)
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert_eq!(opener.opened.load(Ordering::SeqCst), 0);
}

#[test]
fn test_folder_without_qout_file_is_not_found() {
    let dir = tempfile::tempdir().unwrap();
    let service = build_service(dir.path(), SampleOpener::default());

    let key = LocationKey::new("central_america", "guatemala", 1).unwrap();
    let err = service
        .series(ModelFamily::Lis, &key, &DateSelector::MostRecent, DisplayUnit::Metric)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[test]
fn test_csv_reparses_to_same_series() {
    let dir = tempfile::tempdir().unwrap();
    let service = build_service(dir.path(), SampleOpener::default());

    let series = service
        .series(ModelFamily::Lis, &sample_key(103), &DateSelector::MostRecent, DisplayUnit::Metric)
        .unwrap()
        .remove(0);
    let export = service
        .csv_export(ModelFamily::Lis, &sample_key(103), &DateSelector::MostRecent)
        .unwrap();

    let mut reader = csv::Reader::from_reader(export.body.as_slice());
    let rows: Vec<(String, f64)> = reader
        .records()
        .map(|r| {
            let r = r.unwrap();
            (r[0].to_string(), r[1].parse().unwrap())
        })
        .collect();

    let expected: Vec<(String, f64)> = series
        .points
        .iter()
        .map(|p| (p.timestamp.format("%Y-%m-%d %H:%M:%S").to_string(), p.value))
        .collect();
    assert_eq!(rows, expected);
}

// ---------------------------------------------------------------------------
// Routes
// ---------------------------------------------------------------------------

#[test]
fn test_lis_route_scenario_reach_102() {
    let dir = tempfile::tempdir().unwrap();
    let service = build_service(dir.path(), SampleOpener::default());

    let reply = handle_request(
        &service,
        "/get-time-series?model=LIS-RAPID&watershed=Sample&subbasin=Basin1&comid=102&units=english",
    );
    let body: serde_json::Value = serde_json::from_slice(&reply.body).unwrap();

    assert_eq!(reply.status, 200);
    assert_eq!(body["plot"]["data"][0]["name"], "LDAS");
    assert_eq!(body["plot"]["data"][0]["y"], serde_json::json!([10.5, 20.25, 30.125]));
    assert_eq!(body["plot"]["layout"]["yaxis"]["title"], "Streamflow (ft<sup>3</sup>/s)");
}

#[test]
fn test_lis_route_scenario_reach_999() {
    let dir = tempfile::tempdir().unwrap();
    let service = build_service(dir.path(), SampleOpener::default());

    let reply = handle_request(
        &service,
        "/get-time-series?model=LIS-RAPID&watershed=Sample&subbasin=Basin1&comid=999",
    );
    let body: serde_json::Value = serde_json::from_slice(&reply.body).unwrap();
    assert_eq!(body, serde_json::json!({ "error": "No LIS data found for the selected reach." }));
}

#[test]
fn test_lis_csv_route_scenario() {
    let dir = tempfile::tempdir().unwrap();
    let service = build_service(dir.path(), SampleOpener::default());

    let reply = handle_request(
        &service,
        "/get-lis-data-csv?watershed_name=Sample&subbasin_name=Basin1&reach_id=102",
    );

    assert_eq!(reply.content_type, "text/csv");
    assert_eq!(
        reply.attachment.as_deref(),
        Some("lis_streamflow_Sample_Basin1_102_2020-01-01.csv")
    );
    let text = String::from_utf8(reply.body).unwrap();
    assert_eq!(
        text,
        "datetime,flow (m3/s)\n\
         2020-01-01 00:00:00,10.5\n\
         2020-01-02 00:00:00,20.25\n\
         2020-01-03 00:00:00,30.125\n"
    );
}

#[test]
fn test_hiwat_csv_filename_dated_by_first_row() {
    let dir = tempfile::tempdir().unwrap();
    let service = build_service(dir.path(), SampleOpener::default());

    let reply = handle_request(
        &service,
        "/get-hiwat-data-csv?watershed_name=Sample&subbasin_name=Basin1&reach_id=101&startdate=20991231.12",
    );
    assert_eq!(
        reply.attachment.as_deref(),
        Some("hiwat_streamflow_Sample_Basin1_101_2020-01-01.csv")
    );
}

#[test]
fn test_remote_routes_report_static_messages_when_api_is_down() {
    let dir = tempfile::tempdir().unwrap();
    let service = build_service(dir.path(), SampleOpener::default());

    let cases = [
        (
            "/ecmwf-get-time-series?watershed=central_america&subbasin=guatemala&comid=9021454",
            "No data found for the selected reach.",
        ),
        (
            "/get-historic-data?watershed=central_america&subbasin=guatemala&comid=9021454",
            "No historic data found for the selected reach.",
        ),
        (
            "/get-forecast-data-csv?watershed_name=central_america&subbasin_name=guatemala&reach_id=9021454",
            "No forecast data found.",
        ),
        (
            "/get-available-dates?watershed=central_america&subbasin=guatemala&comid=9021454",
            "No data found for the selected reach.",
        ),
    ];

    for (url, message) in cases {
        let reply = handle_request(&service, url);
        let body: serde_json::Value = serde_json::from_slice(&reply.body).unwrap();
        assert_eq!(reply.status, 200, "{}", url);
        assert_eq!(body["error"], message, "{}", url);
    }
}

#[test]
fn test_invalid_location_rejected_before_any_lookup() {
    let dir = tempfile::tempdir().unwrap();
    let opener = SampleOpener::default();
    let service = build_service(dir.path(), opener.clone());

    let reply = handle_request(
        &service,
        "/lis-get-time-series?watershed=..%2Fetc&subbasin=Basin1&comid=102",
    );
    let body: serde_json::Value = serde_json::from_slice(&reply.body).unwrap();
    assert_eq!(body["error"], "No LIS data found for the selected reach.");
    assert_eq!(opener.opened.load(Ordering::SeqCst), 0);
}

#[test]
fn test_watershed_listing() {
    let dir = tempfile::tempdir().unwrap();
    let service = build_service(dir.path(), SampleOpener::default());

    let reply = handle_request(&service, "/watersheds?model=HIWAT-RAPID");
    let body: serde_json::Value = serde_json::from_slice(&reply.body).unwrap();
    assert_eq!(
        body["watersheds"],
        serde_json::json!([
            { "display": "Central America (Guatemala)", "folder": "central_america-guatemala" },
            { "display": "Sample (Basin1)", "folder": "Sample-Basin1" },
        ])
    );
}
