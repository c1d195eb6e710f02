/// Test fixtures: representative payloads from the SPT API and an in-memory
/// Qout archive.
///
/// SPT CSV responses start with a header row; forecast payloads carry six
/// value columns and the high resolution member ends earlier than the
/// ensemble statistics, leaving blank cells. Return periods are sometimes
/// served as numeric strings.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::ingest::archive::{ArchiveDataset, ArchiveOpener};
use crate::ingest::spt::RemoteFetch;
use crate::model::HydroError;

/// Historic simulation, one value column.
#[cfg(test)]
pub(crate) fn fixture_historic_csv() -> &'static str {
    "datetime,streamflow (m3/s)\n\
     1980-01-01 00:00:00,35.5\n\
     1980-01-02 00:00:00,36.0\n\
     \n\
     1980-01-03 00:00:00,120.75\n\
     1980-01-04 00:00:00,41.25\n"
}

/// Forecast statistics, six value columns with a short high_res member.
#[cfg(test)]
pub(crate) fn fixture_forecast_csv() -> &'static str {
    "datetime,high_res (m3/s),max (m3/s),mean (m3/s),min (m3/s),std_dev_range_lower (m3/s),std_dev_range_upper (m3/s)\n\
     2020-01-01 00:00:00,12.0,15.0,13.0,11.0,12.0,14.0\n\
     2020-01-01 06:00:00,12.5,16.0,13.5,11.2,12.4,14.6\n\
     2020-01-01 12:00:00,,17.5,14.5,11.5,13.0,16.0\n"
}

/// `GetAvailableDates`: folder tokens in the API's ascending order.
#[cfg(test)]
pub(crate) fn fixture_available_dates_json() -> &'static str {
    r#"["20200101.00", "20200101.1200", "20200102.0", "20200102.12"]"#
}

/// `GetReturnPeriods`: mixed numbers and numeric strings.
#[cfg(test)]
pub(crate) fn fixture_return_periods_json() -> &'static str {
    r#"{"max": "655.1", "twenty": 402.75, "ten": "310.0", "two": 120.4}"#
}

/// `GetWarningPoints` GeoJSON with two points.
#[cfg(test)]
pub(crate) fn fixture_warning_points_json() -> &'static str {
    r#"{
      "type": "FeatureCollection",
      "features": [
        {
          "type": "Feature",
          "geometry": { "type": "Point", "coordinates": [-90.51, 14.63] },
          "properties": { "comid": 9021454, "peak_date": "2020-01-03", "size": 1 }
        },
        {
          "type": "Feature",
          "geometry": { "type": "Point", "coordinates": [-89.98, 14.12] },
          "properties": { "comid": 9021460, "peak_date": "2020-01-04", "size": 1 }
        }
      ]
    }"#
}

// ---------------------------------------------------------------------------
// In-memory backends
// ---------------------------------------------------------------------------

/// Qout archive held in memory: `qout[t][r]` is discharge at time step `t`
/// for reach index `r`.
#[cfg(test)]
#[derive(Clone)]
pub(crate) struct MemoryArchive {
    pub name: String,
    pub time: Vec<f64>,
    pub rivid: Vec<i64>,
    pub qout: Vec<Vec<f64>>,
    /// Incremented when the dataset handle is dropped.
    pub released: Arc<AtomicUsize>,
}

#[cfg(test)]
impl MemoryArchive {
    /// The `SampleBasin_Qout_2020.nc` scenario: reaches 101..=103, three
    /// daily steps starting 2020-01-01 00:00 UTC.
    pub fn sample_basin() -> Self {
        MemoryArchive {
            name: "SampleBasin_Qout_2020.nc".to_string(),
            time: vec![1_577_836_800.0, 1_577_923_200.0, 1_578_009_600.0],
            rivid: vec![101, 102, 103],
            qout: vec![
                vec![1.0, 10.5, 100.0],
                vec![2.0, 20.25, 200.0],
                vec![3.0, 30.125, 300.0],
            ],
            released: Arc::new(AtomicUsize::new(0)),
        }
    }
}

#[cfg(test)]
impl Drop for MemoryArchive {
    fn drop(&mut self) {
        self.released.fetch_add(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
impl ArchiveDataset for MemoryArchive {
    fn name(&self) -> &str {
        &self.name
    }

    fn time_axis(&self) -> Result<Vec<f64>, HydroError> {
        Ok(self.time.clone())
    }

    fn reach_axis(&self) -> Result<Vec<i64>, HydroError> {
        Ok(self.rivid.clone())
    }

    fn reach_column(&self, index: usize) -> Result<Vec<f64>, HydroError> {
        self.qout
            .iter()
            .map(|row| {
                row.get(index).copied().ok_or_else(|| {
                    HydroError::extraction("reading Qout", format!("reach index {} out of bounds", index))
                })
            })
            .collect()
    }
}

/// Archive data for `MemoryOpener`, keyed by full path. Plain data so the
/// opener stays `Send + Sync`.
#[cfg(test)]
#[derive(Clone)]
pub(crate) struct ArchiveContents {
    pub time: Vec<f64>,
    pub rivid: Vec<i64>,
    pub qout: Vec<Vec<f64>>,
}

#[cfg(test)]
impl From<&MemoryArchive> for ArchiveContents {
    fn from(archive: &MemoryArchive) -> Self {
        ArchiveContents {
            time: archive.time.clone(),
            rivid: archive.rivid.clone(),
            qout: archive.qout.clone(),
        }
    }
}

/// Opener that serves registered in-memory archives, recording opens and
/// counting released handles.
#[cfg(test)]
#[derive(Default)]
pub(crate) struct MemoryOpener {
    pub archives: HashMap<PathBuf, ArchiveContents>,
    pub opened: Mutex<Vec<PathBuf>>,
    pub released: Arc<AtomicUsize>,
}

#[cfg(test)]
impl MemoryOpener {
    pub fn with_archive(path: PathBuf, contents: ArchiveContents) -> Self {
        let mut opener = MemoryOpener::default();
        opener.archives.insert(path, contents);
        opener
    }

    pub fn open_count(&self) -> usize {
        self.opened.lock().map(|o| o.len()).unwrap_or(0)
    }

    pub fn release_count(&self) -> usize {
        self.released.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
impl ArchiveOpener for MemoryOpener {
    fn open(&self, path: &Path) -> Result<Box<dyn ArchiveDataset>, HydroError> {
        if let Ok(mut opened) = self.opened.lock() {
            opened.push(path.to_path_buf());
        }
        let contents = self.archives.get(path).ok_or_else(|| {
            HydroError::extraction(format!("opening {}", path.display()), "no such archive")
        })?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Ok(Box::new(MemoryArchive {
            name,
            time: contents.time.clone(),
            rivid: contents.rivid.clone(),
            qout: contents.qout.clone(),
            released: Arc::clone(&self.released),
        }))
    }
}

/// Remote fetcher answering from a URL → body map; unknown URLs fail as
/// an unavailable upstream.
#[cfg(test)]
#[derive(Default, Clone)]
pub(crate) struct CannedFetch {
    pub responses: Arc<HashMap<String, String>>,
}

#[cfg(test)]
impl CannedFetch {
    pub fn with(pairs: Vec<(String, &str)>) -> Self {
        CannedFetch {
            responses: Arc::new(pairs.into_iter().map(|(u, b)| (u, b.to_string())).collect()),
        }
    }
}

#[cfg(test)]
impl RemoteFetch for CannedFetch {
    fn get_text(&self, url: &str) -> Result<String, HydroError> {
        self.responses
            .get(url)
            .cloned()
            .ok_or_else(|| HydroError::UpstreamUnavailable(format!("SPT API error: 404 for {}", url)))
    }
}
