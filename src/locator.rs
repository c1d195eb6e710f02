/// Source Locator: turns a model family, location and date selector into a
/// concrete data source.
///
/// ECMWF-RAPID resolves to an SPT API URL. LIS-RAPID and HIWAT-RAPID resolve
/// to the Qout file inside `{archive_root}/{watershed}-{subbasin}/`.
/// Resolution only reads directory listings; it never opens archives.

use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};

use crate::config::AppConfig;
use crate::ingest::spt;
use crate::model::{
    Backend, DateSelector, HydroError, LocationKey, ModelFamily, PayloadFormat, SourceDescriptor,
};

/// Substring identifying the discharge file inside an archive folder.
pub const QOUT_MARKER: &str = "Qout";

/// One entry of a watershed selector.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WatershedOption {
    /// e.g. `"Central America (Guatemala)"`
    pub display: String,
    /// Folder name, e.g. `"central_america-guatemala"`
    pub folder: String,
}

pub struct SourceLocator<'a> {
    config: &'a AppConfig,
}

impl<'a> SourceLocator<'a> {
    pub fn new(config: &'a AppConfig) -> Self {
        SourceLocator { config }
    }

    /// Resolves where the series for `location` lives.
    ///
    /// # Errors
    /// - `InvalidLocation` - historic data requested from an archive family.
    /// - `NotFound` - archive root unset, folder missing, or no Qout file.
    pub fn resolve(
        &self,
        family: ModelFamily,
        location: &LocationKey,
        selector: &DateSelector,
    ) -> Result<SourceDescriptor, HydroError> {
        match family.backend() {
            Backend::RemoteApi => {
                let base = self.config.api_base();
                if base.is_empty() {
                    return Err(HydroError::NotFound("SPT API source is not configured".to_string()));
                }
                let url = match selector {
                    DateSelector::Historic => spt::build_historic_url(base, location),
                    _ => spt::build_forecast_url(base, location, selector),
                };
                Ok(SourceDescriptor::Remote { url, format: PayloadFormat::Csv })
            }
            Backend::LocalArchive => {
                if *selector == DateSelector::Historic {
                    return Err(HydroError::InvalidLocation(format!(
                        "{} has no historic simulation",
                        family
                    )));
                }
                let root = self.archive_root(family)?;
                let folder = root.join(location.folder_name());
                let file = find_qout_file(&folder)?;
                Ok(SourceDescriptor::Archive { path: folder.join(file) })
            }
        }
    }

    /// Lists the watershed/subbasin folders of an archive family. Unset
    /// roots and the remote family yield an empty list.
    pub fn list_watersheds(&self, family: ModelFamily) -> Result<Vec<WatershedOption>, HydroError> {
        let Some(root) = self.config.archives.root_for(family) else {
            return Ok(Vec::new());
        };

        let entries = fs::read_dir(root).map_err(|e| {
            HydroError::NotFound(format!("cannot list archive root {}: {}", root.display(), e))
        })?;

        let mut options: Vec<WatershedOption> = entries
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.path().is_dir())
            .filter_map(|entry| {
                let folder = entry.file_name().to_string_lossy().into_owned();
                let (watershed, subbasin) = folder.split_once('-')?;
                Some(WatershedOption {
                    display: format!("{} ({})", title_case(watershed), title_case(subbasin)),
                    folder,
                })
            })
            .collect();

        // Folders differing only in case share a display label but stay
        // separately selectable.
        options.sort_by(|a, b| a.display.cmp(&b.display).then(a.folder.cmp(&b.folder)));
        Ok(options)
    }

    fn archive_root(&self, family: ModelFamily) -> Result<&Path, HydroError> {
        self.config.archives.root_for(family).ok_or_else(|| {
            HydroError::NotFound(format!("archive root for {} is not configured", family))
        })
    }
}

/// First file in `folder` (by name) whose name contains "Qout".
fn find_qout_file(folder: &Path) -> Result<PathBuf, HydroError> {
    let entries = fs::read_dir(folder).map_err(|e| {
        HydroError::NotFound(format!("archive folder {}: {}", folder.display(), e))
    })?;

    let mut candidates: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.path().is_file())
        .map(|entry| PathBuf::from(entry.file_name()))
        .filter(|name| name.to_string_lossy().contains(QOUT_MARKER))
        .collect();

    candidates.sort();
    candidates.into_iter().next().ok_or_else(|| {
        HydroError::NotFound(format!("no {} file in {}", QOUT_MARKER, folder.display()))
    })
}

/// `"central_america"` → `"Central America"`.
fn title_case(name: &str) -> String {
    name.split('_')
        .filter(|word| !word.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => {
                    first.to_uppercase().collect::<String>() + &chars.as_str().to_lowercase()
                }
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}
