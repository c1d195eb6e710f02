/// hydroviewer_service: streamflow forecast and historic data viewer backend.
///
/// # Module structure
///
/// ```text
/// hydroviewer_service
/// ├── model       - shared data types (ModelFamily, LocationKey, TimeSeries, HydroError, …)
/// ├── config      - service configuration loader (hydroviewer.toml + environment)
/// ├── locator     - resolves a model/location/date to an API URL or Qout archive
/// ├── extract     - reads a resolved source into a raw series
/// ├── service     - per-request pipeline: locate → extract → normalize → render
/// ├── endpoint    - tiny_http routes for the front end
/// ├── ingest
/// │   ├── spt     - streamflow prediction tool API: URLs, client, payload parsing
/// │   ├── archive - Qout archive access (NetCDF behind the `netcdf` feature)
/// │   └── fixtures (test only) - representative payloads and in-memory backends
/// ├── analysis
/// │   └── normalize - canonical, ordered time series from raw backend output
/// └── output
///     ├── chart      - plotly chart JSON and return period bands
///     └── csv_export - CSV downloads and filenames
/// ```

/// Public modules
pub mod analysis;
pub mod config;
pub mod endpoint;
pub mod extract;
pub mod ingest;
pub mod locator;
pub mod model;
pub mod output;
pub mod service;
