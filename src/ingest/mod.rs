/// Data source adapters.
///
/// - `spt`     - streamflow prediction tool API: URLs, fetching, parsing
/// - `archive` - local Qout archives (NetCDF) and epoch conversion
/// - `fixtures` (test only) - sample payloads and in-memory backends

pub mod archive;
pub mod spt;

#[cfg(test)]
pub(crate) mod fixtures;
