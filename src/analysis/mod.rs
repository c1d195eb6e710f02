/// Series processing for the hydroviewer service.
///
/// Submodules:
/// - `normalize` - canonical, ordered, gap-preserving time series from
///   backend output.
///
/// Forecast statistics, flow duration curves and probability tables are
/// produced upstream and are not computed here.

pub mod normalize;
