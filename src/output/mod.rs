/// Output adapters for normalized series.
///
/// Submodules:
/// - `chart` - plotly-shaped chart JSON with return period overlays.
/// - `csv_export` - tabular CSV downloads and their filenames.

pub mod chart;
pub mod csv_export;
