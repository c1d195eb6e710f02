/// Local Qout archive access for LIS-RAPID and HIWAT-RAPID.
///
/// A RAPID Qout file holds three variables:
///   time  (time)         - POSIX epoch seconds
///   rivid (rivid)        - integer reach identifiers
///   Qout  (time, rivid)  - discharge in m³/s
///
/// Readers are reached through the `ArchiveOpener` / `ArchiveDataset` traits
/// so the extractor does not care whether a dataset comes from NetCDF or
/// from memory. A dataset is released when it is dropped, which covers
/// every exit path of the extractor.

use chrono::{DateTime, Local, TimeZone};
use std::path::Path;

use crate::config::ArchiveTimezone;
use crate::model::{HydroError, Timestamp};

pub const TIME_VAR: &str = "time";
pub const REACH_VAR: &str = "rivid";
pub const QOUT_VAR: &str = "Qout";

// ---------------------------------------------------------------------------
// Reader traits
// ---------------------------------------------------------------------------

/// An open, read-only archive.
pub trait ArchiveDataset {
    /// Name used in error messages (usually the file name).
    fn name(&self) -> &str;

    /// Time axis as epoch seconds.
    fn time_axis(&self) -> Result<Vec<f64>, HydroError>;

    /// Reach identifier axis.
    fn reach_axis(&self) -> Result<Vec<i64>, HydroError>;

    /// Discharge for every time step at one reach index.
    fn reach_column(&self, index: usize) -> Result<Vec<f64>, HydroError>;
}

/// Opens archives by path.
pub trait ArchiveOpener: Send + Sync {
    fn open(&self, path: &Path) -> Result<Box<dyn ArchiveDataset>, HydroError>;
}

// ---------------------------------------------------------------------------
// NetCDF reader
// ---------------------------------------------------------------------------

/// Opens Qout files with the system NetCDF library.
#[derive(Debug, Default, Clone, Copy)]
pub struct NetCdfOpener;

impl NetCdfOpener {
    /// Whether this build can read Qout files at all.
    pub const AVAILABLE: bool = cfg!(feature = "netcdf");
}

#[cfg(feature = "netcdf")]
impl ArchiveOpener for NetCdfOpener {
    fn open(&self, path: &Path) -> Result<Box<dyn ArchiveDataset>, HydroError> {
        let file = netcdf::open(path)
            .map_err(|e| HydroError::extraction(format!("opening {}", path.display()), e))?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        Ok(Box::new(NetCdfDataset { file, name }))
    }
}

#[cfg(not(feature = "netcdf"))]
impl ArchiveOpener for NetCdfOpener {
    fn open(&self, path: &Path) -> Result<Box<dyn ArchiveDataset>, HydroError> {
        Err(HydroError::extraction(
            format!("opening {}", path.display()),
            "built without NetCDF support (enable the `netcdf` feature)",
        ))
    }
}

#[cfg(feature = "netcdf")]
struct NetCdfDataset {
    file: netcdf::File,
    name: String,
}

#[cfg(feature = "netcdf")]
impl NetCdfDataset {
    fn variable(&self, var: &str) -> Result<netcdf::Variable<'_>, HydroError> {
        self.file.variable(var).ok_or_else(|| {
            HydroError::extraction(
                format!("reading {}", self.name),
                format!("variable '{}' missing", var),
            )
        })
    }

    fn read_error(&self, var: &str, e: netcdf::error::Error) -> HydroError {
        HydroError::extraction(format!("reading '{}' from {}", var, self.name), e)
    }
}

#[cfg(feature = "netcdf")]
impl ArchiveDataset for NetCdfDataset {
    fn name(&self) -> &str {
        &self.name
    }

    fn time_axis(&self) -> Result<Vec<f64>, HydroError> {
        self.variable(TIME_VAR)?
            .get_values::<f64, _>(..)
            .map_err(|e| self.read_error(TIME_VAR, e))
    }

    fn reach_axis(&self) -> Result<Vec<i64>, HydroError> {
        self.variable(REACH_VAR)?
            .get_values::<i64, _>(..)
            .map_err(|e| self.read_error(REACH_VAR, e))
    }

    fn reach_column(&self, index: usize) -> Result<Vec<f64>, HydroError> {
        let qout = self.variable(QOUT_VAR)?;
        let dims = qout.dimensions();
        if dims.len() != 2 {
            return Err(HydroError::extraction(
                format!("reading '{}' from {}", QOUT_VAR, self.name),
                format!("expected 2 dimensions (time, rivid), found {}", dims.len()),
            ));
        }
        let steps = dims[0].len();
        qout.get_values::<f64, _>([0..steps, index..index + 1])
            .map_err(|e| self.read_error(QOUT_VAR, e))
    }
}

// ---------------------------------------------------------------------------
// Epoch conversion
// ---------------------------------------------------------------------------

/// Converts archive epoch seconds to a timestamp in the configured zone.
///
/// `Local` shows server-local wall-clock time and keeps the offset in
/// effect at that instant, so the hour repeated when clocks fall back
/// still converts to two distinct timestamps.
pub fn epoch_to_datetime(seconds: f64, tz: ArchiveTimezone) -> Result<Timestamp, HydroError> {
    if !seconds.is_finite() {
        return Err(HydroError::extraction(
            "converting archive time axis",
            format!("non-finite epoch value {}", seconds),
        ));
    }
    let secs = seconds.floor() as i64;
    let nanos = ((seconds - seconds.floor()) * 1e9).round().min(999_999_999.0) as u32;

    let converted = match tz {
        ArchiveTimezone::Utc => DateTime::from_timestamp(secs, nanos).map(|dt| dt.fixed_offset()),
        ArchiveTimezone::Local => Local
            .timestamp_opt(secs, nanos)
            .single()
            .map(|dt| dt.fixed_offset()),
    };

    converted.ok_or_else(|| {
        HydroError::extraction(
            "converting archive time axis",
            format!("epoch value {} out of range", seconds),
        )
    })
}
