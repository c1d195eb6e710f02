/// Per-request pipeline for the hydroviewer service.
///
/// `HydroService` owns the immutable configuration and the two backend
/// seams (archive opener, remote fetcher). Every operation runs the same
/// chain on the calling thread: locate → extract → normalize → render.
/// It is shared between HTTP workers behind an `Arc`.

use serde::Serialize;

use crate::config::AppConfig;
use crate::extract::SeriesExtractor;
use crate::ingest::archive::{ArchiveOpener, NetCdfOpener};
use crate::ingest::spt::{self, AvailableDate, RemoteFetch, SptClient};
use crate::locator::{SourceLocator, WatershedOption};
use crate::analysis::normalize::{normalize, normalize_single};
use crate::model::{
    Backend, DateSelector, DisplayUnit, HydroError, LocationKey, ModelFamily,
    ReturnPeriodThresholds, TimeSeries, validate_name,
};
use crate::output::chart::{self, ChartLabels, ChartSpec};
use crate::output::csv_export::{
    self, ARCHIVE_HEADER, CsvExport, FORECAST_COLUMNS, FORECAST_HEADER, HISTORIC_HEADER,
};

/// Legend name of the historic simulation trace.
pub const HISTORIC_TRACE: &str = "Historic Simulation";

/// Warning point features for the 20, 10 and 2 year return periods.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WarningPoints {
    pub warning20: Vec<serde_json::Value>,
    pub warning10: Vec<serde_json::Value>,
    pub warning2: Vec<serde_json::Value>,
}

pub struct HydroService {
    config: AppConfig,
    opener: Box<dyn ArchiveOpener>,
    fetcher: Box<dyn RemoteFetch>,
}

impl HydroService {
    pub fn new(
        config: AppConfig,
        opener: Box<dyn ArchiveOpener>,
        fetcher: Box<dyn RemoteFetch>,
    ) -> Self {
        HydroService { config, opener, fetcher }
    }

    /// Production wiring: NetCDF archives and the SPT HTTP client.
    pub fn from_config(config: AppConfig) -> Result<Self, HydroError> {
        let client = SptClient::new(&config.api)?;
        Ok(HydroService::new(config, Box::new(NetCdfOpener), Box::new(client)))
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    fn locator(&self) -> SourceLocator<'_> {
        SourceLocator::new(&self.config)
    }

    fn extractor(&self) -> SeriesExtractor<'_> {
        SeriesExtractor::new(
            self.opener.as_ref(),
            self.fetcher.as_ref(),
            self.config.archives.timezone,
        )
    }

    fn api_base(&self) -> Result<&str, HydroError> {
        let base = self.config.api_base();
        if base.is_empty() {
            return Err(HydroError::NotFound("SPT API source is not configured".to_string()));
        }
        Ok(base)
    }

    // -----------------------------------------------------------------------
    // Series pipeline
    // -----------------------------------------------------------------------

    /// Locates, extracts and normalizes every column of a series.
    pub fn series(
        &self,
        family: ModelFamily,
        location: &LocationKey,
        selector: &DateSelector,
        unit: DisplayUnit,
    ) -> Result<Vec<TimeSeries>, HydroError> {
        let source = self.locator().resolve(family, location, selector)?;
        let raw = self.extractor().extract(&source, location.reach_id)?;
        normalize(raw, unit)
    }

    /// Single-column variant of `series`, with the trace renamed.
    fn single_series(
        &self,
        family: ModelFamily,
        location: &LocationKey,
        selector: &DateSelector,
        unit: DisplayUnit,
        name: &str,
    ) -> Result<TimeSeries, HydroError> {
        let source = self.locator().resolve(family, location, selector)?;
        let raw = self.extractor().extract(&source, location.reach_id)?;
        let mut series = normalize_single(raw, unit)?;
        series.name = name.to_string();
        Ok(series)
    }

    /// Chart for a forecast (ECMWF) or archive (LIS, HIWAT) time series.
    ///
    /// ECMWF charts carry the reach's return period bands when the API
    /// has them; a failed threshold lookup only drops the overlay.
    pub fn time_series_chart(
        &self,
        family: ModelFamily,
        location: &LocationKey,
        selector: &DateSelector,
        unit: DisplayUnit,
    ) -> Result<ChartSpec, HydroError> {
        let heading = format!("{} Streamflow", family.trace_name());
        let labels = ChartLabels::for_location(&heading, location, unit);

        match family.backend() {
            Backend::LocalArchive => {
                let series =
                    self.single_series(family, location, selector, unit, family.trace_name())?;
                Ok(chart::to_chart_spec(&[series], &labels, None))
            }
            Backend::RemoteApi => {
                let series = self.series(family, location, selector, unit)?;
                let overlay = match self.return_periods(location) {
                    Ok(thresholds) => chart::plotted_window(&series).map(|(start, end, top)| {
                        chart::return_period_overlay(&thresholds, start, end, top)
                    }),
                    Err(e) => {
                        log::warn!("return periods unavailable for reach {}: {}", location.reach_id, e);
                        None
                    }
                };
                Ok(chart::to_chart_spec(&series, &labels, overlay))
            }
        }
    }

    /// Historic simulation chart with return period bands.
    pub fn historic_chart(
        &self,
        location: &LocationKey,
        unit: DisplayUnit,
    ) -> Result<ChartSpec, HydroError> {
        let series = self.single_series(
            ModelFamily::Ecmwf,
            location,
            &DateSelector::Historic,
            unit,
            HISTORIC_TRACE,
        )?;
        let thresholds = self.return_periods(location)?;

        let labels = ChartLabels::for_location("Historic Streamflow", location, unit);
        let series = [series];
        let overlay = chart::plotted_window(&series)
            .map(|(start, end, top)| chart::return_period_overlay(&thresholds, start, end, top));
        Ok(chart::to_chart_spec(&series, &labels, overlay))
    }

    // -----------------------------------------------------------------------
    // CSV downloads
    // -----------------------------------------------------------------------

    /// CSV download of a forecast (ECMWF) or archive (LIS, HIWAT) series.
    ///
    /// The filename carries the date of the first data row, which is the
    /// run actually exported whatever `startdate` asked for.
    pub fn csv_export(
        &self,
        family: ModelFamily,
        location: &LocationKey,
        selector: &DateSelector,
    ) -> Result<CsvExport, HydroError> {
        let unit = DisplayUnit::Metric;
        let (series, header): (Vec<TimeSeries>, &[&str]) = match family.backend() {
            Backend::LocalArchive => (
                vec![self.single_series(family, location, selector, unit, family.trace_name())?],
                &ARCHIVE_HEADER[..],
            ),
            Backend::RemoteApi => {
                let columns = self.series(family, location, selector, unit)?;
                (forecast_columns(columns, unit), &FORECAST_HEADER[..])
            }
        };

        let date = first_date(&series);
        let rows = csv_export::to_csv_rows(&series, header);
        Ok(CsvExport {
            filename: csv_export::export_filename(family.csv_prefix(), location, date.as_deref()),
            body: csv_export::write_csv(&rows)?,
        })
    }

    /// CSV download of the historic simulation.
    pub fn historic_csv(&self, location: &LocationKey) -> Result<CsvExport, HydroError> {
        let series = self.single_series(
            ModelFamily::Ecmwf,
            location,
            &DateSelector::Historic,
            DisplayUnit::Metric,
            HISTORIC_TRACE,
        )?;
        let rows = csv_export::to_csv_rows(&[series], &HISTORIC_HEADER);
        Ok(CsvExport {
            filename: csv_export::export_filename("historic", location, None),
            body: csv_export::write_csv(&rows)?,
        })
    }

    // -----------------------------------------------------------------------
    // Remote lookups
    // -----------------------------------------------------------------------

    /// Forecast runs available for a watershed, most recent first.
    pub fn available_dates(
        &self,
        watershed: &str,
        subbasin: &str,
    ) -> Result<Vec<AvailableDate>, HydroError> {
        validate_name("watershed", watershed)?;
        validate_name("subbasin", subbasin)?;
        let url = spt::build_available_dates_url(self.api_base()?, watershed, subbasin);
        spt::parse_available_dates(&self.fetcher.get_text(&url)?)
    }

    pub fn return_periods(&self, location: &LocationKey) -> Result<ReturnPeriodThresholds, HydroError> {
        let url = spt::build_return_periods_url(self.api_base()?, location);
        spt::parse_return_periods(&self.fetcher.get_text(&url)?)
    }

    /// Forecast warning points for the 20, 10 and 2 year return periods.
    pub fn warning_points(&self, watershed: &str, subbasin: &str) -> Result<WarningPoints, HydroError> {
        validate_name("watershed", watershed)?;
        validate_name("subbasin", subbasin)?;
        let base = self.api_base()?;
        let fetch = |period: u32| -> Result<Vec<serde_json::Value>, HydroError> {
            let url = spt::build_warning_points_url(base, watershed, subbasin, period);
            spt::parse_warning_features(&self.fetcher.get_text(&url)?)
        };
        Ok(WarningPoints {
            warning20: fetch(20)?,
            warning10: fetch(10)?,
            warning2: fetch(2)?,
        })
    }

    pub fn list_watersheds(&self, family: ModelFamily) -> Result<Vec<WatershedOption>, HydroError> {
        self.locator().list_watersheds(family)
    }
}

/// Orders forecast statistics by the CSV header, substituting an empty
/// column for any statistic the API left out.
fn forecast_columns(mut columns: Vec<TimeSeries>, unit: DisplayUnit) -> Vec<TimeSeries> {
    FORECAST_COLUMNS
        .iter()
        .map(|name| match columns.iter().position(|s| s.name == *name) {
            Some(index) => columns.swap_remove(index),
            None => TimeSeries {
                name: name.to_string(),
                unit,
                points: Vec::new(),
            },
        })
        .collect()
}

fn first_date(series: &[TimeSeries]) -> Option<String> {
    series
        .iter()
        .filter_map(|s| s.first_timestamp())
        .min()
        .map(|t| t.format("%Y-%m-%d").to_string())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
