/// HTTP endpoint for the hydroviewer front end
///
/// Serves chart JSON, CSV downloads and forecast lookups over plain GET
/// requests. Requests are handed to a fixed worker pool; each worker runs
/// one request through `HydroService` from start to finish.
///
/// Endpoints:
/// - GET /health - Service health check
/// - GET /watersheds?model= - Archive watershed folders
/// - GET /get-time-series, /{ecmwf,lis,hiwat}-get-time-series - Chart JSON
/// - GET /get-historic-data - Historic chart with return period bands
/// - GET /get-available-dates, /get-return-periods, /get-warning-points
/// - GET /get-{historic,forecast,lis,hiwat}-data-csv - CSV downloads
///
/// Failures answer 200 with `{"error": <message>}`; the front end reads
/// the body, not the status.

use std::collections::HashMap;
use std::sync::Arc;

use threadpool::ThreadPool;

use crate::model::{DateSelector, DisplayUnit, HydroError, LocationKey, ModelFamily};
use crate::output::csv_export::CsvExport;
use crate::service::HydroService;

const HISTORIC_CHART_ERROR: &str = "No historic data found for the selected reach.";
const HISTORIC_CSV_ERROR: &str = "No historic data found.";
const FORECAST_CSV_ERROR: &str = "No forecast data found.";
const LOOKUP_ERROR: &str = "No data found for the selected reach.";
const WATERSHEDS_ERROR: &str = "No watersheds found.";

const ENDPOINTS: [&str; 14] = [
    "/health",
    "/watersheds",
    "/get-time-series",
    "/ecmwf-get-time-series",
    "/lis-get-time-series",
    "/hiwat-get-time-series",
    "/get-historic-data",
    "/get-available-dates",
    "/get-return-periods",
    "/get-warning-points",
    "/get-historic-data-csv",
    "/get-forecast-data-csv",
    "/get-lis-data-csv",
    "/get-hiwat-data-csv",
];

// ---------------------------------------------------------------------------
// Replies
// ---------------------------------------------------------------------------

/// A transport-independent response.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpReply {
    pub status: u16,
    pub content_type: &'static str,
    pub body: Vec<u8>,
    /// Download filename for `Content-Disposition: attachment`.
    pub attachment: Option<String>,
}

impl HttpReply {
    pub fn json(status: u16, value: serde_json::Value) -> Self {
        HttpReply {
            status,
            content_type: "application/json",
            body: value.to_string().into_bytes(),
            attachment: None,
        }
    }

    pub fn csv(export: CsvExport) -> Self {
        HttpReply {
            status: 200,
            content_type: "text/csv",
            body: export.body,
            attachment: Some(export.filename),
        }
    }

    /// Body parsed as JSON; `Null` for CSV or malformed bodies.
    pub fn json_body(&self) -> serde_json::Value {
        serde_json::from_slice(&self.body).unwrap_or(serde_json::Value::Null)
    }
}

// ---------------------------------------------------------------------------
// Query parsing
// ---------------------------------------------------------------------------

/// Query parameters of one request, percent-decoded with `+` as space.
#[derive(Debug, Default)]
pub struct Query {
    params: HashMap<String, String>,
}

impl Query {
    pub fn get(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }

    /// A parameter that must be present and non-blank.
    pub fn required(&self, key: &str) -> Result<&str, HydroError> {
        self.get(key)
            .filter(|v| !v.trim().is_empty())
            .ok_or_else(|| HydroError::InvalidLocation(format!("missing parameter '{}'", key)))
    }
}

/// Splits a request URL into its path and decoded query.
pub fn parse_url(url: &str) -> (&str, Query) {
    let (path, query) = url.split_once('?').unwrap_or((url, ""));
    let params = query
        .split('&')
        .filter(|pair| !pair.is_empty())
        .map(|pair| {
            let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
            (decode_component(key), decode_component(value))
        })
        .collect();
    (path, Query { params })
}

fn decode_component(raw: &str) -> String {
    let spaced = raw.replace('+', " ");
    match urlencoding::decode(&spaced) {
        Ok(decoded) => decoded.into_owned(),
        Err(_) => spaced,
    }
}

// ---------------------------------------------------------------------------
// Routing
// ---------------------------------------------------------------------------

/// Routes one request URL to the service and renders the reply.
pub fn handle_request(service: &HydroService, url: &str) -> HttpReply {
    let (path, query) = parse_url(url);
    let path = path.trim_end_matches('/');

    let reply = match path {
        "/health" => handle_health(),
        "/watersheds" => handle_watersheds(service, &query),
        "/get-time-series" => handle_time_series(service, path, &query, None),
        "/ecmwf-get-time-series" => {
            handle_time_series(service, path, &query, Some(ModelFamily::Ecmwf))
        }
        "/lis-get-time-series" => handle_time_series(service, path, &query, Some(ModelFamily::Lis)),
        "/hiwat-get-time-series" => {
            handle_time_series(service, path, &query, Some(ModelFamily::Hiwat))
        }
        "/get-historic-data" => handle_historic(service, &query),
        "/get-available-dates" => handle_available_dates(service, &query),
        "/get-return-periods" => handle_return_periods(service, &query),
        "/get-warning-points" => handle_warning_points(service, &query),
        "/get-historic-data-csv" => handle_historic_csv(service, &query),
        "/get-forecast-data-csv" => handle_csv(service, &query, ModelFamily::Ecmwf),
        "/get-lis-data-csv" => handle_csv(service, &query, ModelFamily::Lis),
        "/get-hiwat-data-csv" => handle_csv(service, &query, ModelFamily::Hiwat),
        _ => HttpReply::json(
            404,
            serde_json::json!({
                "error": "Not found",
                "available_endpoints": ENDPOINTS,
            }),
        ),
    };

    log::info!("GET {} -> {}", path, reply.status);
    reply
}

/// Logs the error kind and replaces the error with the route's message.
fn failure(path: &str, message: &str, err: HydroError) -> HttpReply {
    log::warn!("{} failed [{}]: {}", path, err.kind(), err);
    HttpReply::json(200, serde_json::json!({ "error": message }))
}

fn handle_health() -> HttpReply {
    HttpReply::json(
        200,
        serde_json::json!({
            "status": "ok",
            "service": "hydroviewer_service",
            "version": env!("CARGO_PKG_VERSION"),
        }),
    )
}

fn handle_watersheds(service: &HydroService, query: &Query) -> HttpReply {
    let result = query
        .required("model")
        .and_then(|m| m.parse::<ModelFamily>())
        .and_then(|family| service.list_watersheds(family));
    match result {
        Ok(watersheds) => HttpReply::json(200, serde_json::json!({ "watersheds": watersheds })),
        Err(e) => failure("/watersheds", WATERSHEDS_ERROR, e),
    }
}

/// `watershed`, `subbasin`, `comid` as used by the chart routes.
fn chart_location(query: &Query) -> Result<LocationKey, HydroError> {
    LocationKey::parse(
        query.required("watershed")?,
        query.required("subbasin")?,
        query.required("comid")?,
    )
}

/// `watershed_name`, `subbasin_name`, `reach_id` as used by the CSV routes.
fn csv_location(query: &Query) -> Result<LocationKey, HydroError> {
    LocationKey::parse(
        query.required("watershed_name")?,
        query.required("subbasin_name")?,
        query.required("reach_id")?,
    )
}

/// The `model` parameter, falling back to the configured default model.
fn requested_family(service: &HydroService, query: &Query) -> Result<ModelFamily, HydroError> {
    match query.get("model").filter(|m| !m.trim().is_empty()) {
        Some(model) => model.parse(),
        None => service
            .config()
            .app
            .default_model
            .as_deref()
            .ok_or_else(|| HydroError::InvalidLocation("missing parameter 'model'".to_string()))?
            .parse(),
    }
}

/// Shared by the generic and per-family chart routes. `route` is the path
/// that was requested, used in failure logs.
fn handle_time_series(
    service: &HydroService,
    route: &str,
    query: &Query,
    fixed: Option<ModelFamily>,
) -> HttpReply {
    let family = match fixed.map_or_else(|| requested_family(service, query), Ok) {
        Ok(family) => family,
        Err(e) => return failure(route, LOOKUP_ERROR, e),
    };

    let result = chart_location(query).and_then(|location| {
        let selector = DateSelector::from_query(query.get("startdate"))?;
        let unit = DisplayUnit::from_query(query.get("units"));
        service.time_series_chart(family, &location, &selector, unit)
    });
    match result {
        Ok(chart) => HttpReply::json(200, serde_json::json!({ "plot": chart })),
        Err(e) => failure(route, family.no_data_message(), e),
    }
}

fn handle_historic(service: &HydroService, query: &Query) -> HttpReply {
    let result = chart_location(query).and_then(|location| {
        service.historic_chart(&location, DisplayUnit::from_query(query.get("units")))
    });
    match result {
        Ok(chart) => HttpReply::json(200, serde_json::json!({ "plot": chart })),
        Err(e) => failure("/get-historic-data", HISTORIC_CHART_ERROR, e),
    }
}

fn handle_available_dates(service: &HydroService, query: &Query) -> HttpReply {
    let result = query.required("watershed").and_then(|watershed| {
        service.available_dates(watershed, query.required("subbasin")?)
    });
    match result {
        Ok(dates) => HttpReply::json(
            200,
            serde_json::json!({
                "success": "Data analysis complete!",
                "available_dates": dates,
            }),
        ),
        Err(e) => failure("/get-available-dates", LOOKUP_ERROR, e),
    }
}

fn handle_return_periods(service: &HydroService, query: &Query) -> HttpReply {
    let result = chart_location(query).and_then(|location| service.return_periods(&location));
    match result {
        Ok(thresholds) => HttpReply::json(200, serde_json::json!(thresholds)),
        Err(e) => failure("/get-return-periods", LOOKUP_ERROR, e),
    }
}

fn handle_warning_points(service: &HydroService, query: &Query) -> HttpReply {
    let result = (|| {
        if let Some(model) = query.get("model").filter(|m| !m.trim().is_empty()) {
            let family: ModelFamily = model.parse()?;
            if family != ModelFamily::Ecmwf {
                return Err(HydroError::InvalidLocation(format!(
                    "{} has no warning points",
                    family
                )));
            }
        }
        service.warning_points(query.required("watershed")?, query.required("subbasin")?)
    })();
    match result {
        Ok(points) => HttpReply::json(
            200,
            serde_json::json!({
                "success": "Data analysis complete!",
                "warning20": points.warning20,
                "warning10": points.warning10,
                "warning2": points.warning2,
            }),
        ),
        Err(e) => failure("/get-warning-points", LOOKUP_ERROR, e),
    }
}

fn handle_historic_csv(service: &HydroService, query: &Query) -> HttpReply {
    match csv_location(query).and_then(|location| service.historic_csv(&location)) {
        Ok(export) => HttpReply::csv(export),
        Err(e) => failure("/get-historic-data-csv", HISTORIC_CSV_ERROR, e),
    }
}

fn handle_csv(service: &HydroService, query: &Query, family: ModelFamily) -> HttpReply {
    let result = csv_location(query).and_then(|location| {
        let selector = DateSelector::from_query(query.get("startdate"))?;
        service.csv_export(family, &location, &selector)
    });
    match result {
        Ok(export) => HttpReply::csv(export),
        Err(e) => failure(
            &format!("/get-{}-data-csv", family.csv_prefix()),
            FORECAST_CSV_ERROR,
            e,
        ),
    }
}

// ---------------------------------------------------------------------------
// HTTP Server
// ---------------------------------------------------------------------------

/// Start the HTTP endpoint on `port`, serving requests on `workers`
/// threads. Blocks for the life of the server.
pub fn start_endpoint_server(
    service: Arc<HydroService>,
    port: u16,
    workers: usize,
) -> Result<(), String> {
    let server = tiny_http::Server::http(format!("0.0.0.0:{}", port))
        .map_err(|e| format!("Failed to start HTTP server: {}", e))?;
    let pool = ThreadPool::new(workers.max(1));

    println!("📡 HTTP endpoint listening on http://0.0.0.0:{}", port);
    println!("   GET /get-time-series?model=&watershed=&subbasin=&comid= - Chart JSON");
    println!("   GET /get-lis-data-csv?watershed_name=&subbasin_name=&reach_id= - CSV download");
    println!("   GET /health - Service health check\n");

    for request in server.incoming_requests() {
        let service = Arc::clone(&service);
        pool.execute(move || {
            let reply = handle_request(&service, request.url());
            if let Err(e) = request.respond(create_response(reply)) {
                log::error!("Failed to send response: {}", e);
            }
        });
    }

    pool.join();
    Ok(())
}

/// Convert a reply into a tiny_http response with its headers.
fn create_response(reply: HttpReply) -> tiny_http::Response<std::io::Cursor<Vec<u8>>> {
    let mut response = tiny_http::Response::from_data(reply.body)
        .with_status_code(tiny_http::StatusCode::from(reply.status));

    if let Ok(header) = tiny_http::Header::from_bytes(&b"Content-Type"[..], reply.content_type.as_bytes()) {
        response.add_header(header);
    }
    if let Some(filename) = reply.attachment {
        let value = format!("attachment; filename={}", filename);
        if let Ok(header) = tiny_http::Header::from_bytes(&b"Content-Disposition"[..], value.as_bytes()) {
            response.add_header(header);
        }
    }
    response
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
