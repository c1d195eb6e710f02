/// Series Extractor: reads a resolved source into a `RawSeries`.
///
/// Remote sources are fetched through `RemoteFetch` and decoded as CSV or
/// JSON. Archive sources are opened through `ArchiveOpener`; the reach is
/// located by exact match on the reach axis and its Qout column is paired
/// with the converted time axis. The dataset handle is dropped on every
/// exit path, success or failure.

use crate::config::ArchiveTimezone;
use crate::ingest::archive::{self, ArchiveOpener, QOUT_VAR};
use crate::ingest::spt::{self, RemoteFetch};
use crate::model::{HydroError, PayloadFormat, RawRow, RawSeries, SourceDescriptor};

pub struct SeriesExtractor<'a> {
    opener: &'a dyn ArchiveOpener,
    fetcher: &'a dyn RemoteFetch,
    timezone: ArchiveTimezone,
}

impl<'a> SeriesExtractor<'a> {
    pub fn new(
        opener: &'a dyn ArchiveOpener,
        fetcher: &'a dyn RemoteFetch,
        timezone: ArchiveTimezone,
    ) -> Self {
        SeriesExtractor { opener, fetcher, timezone }
    }

    /// Extracts the raw series for `reach_id` from `source`.
    ///
    /// Remote URLs already name the reach, so `reach_id` only selects the
    /// archive column.
    ///
    /// # Errors
    /// - `ReachNotFound` - `reach_id` is not on the archive's reach axis.
    /// - `ExtractionFailed` - I/O, decode or shape errors.
    /// - `UpstreamUnavailable` - the remote API failed.
    pub fn extract(&self, source: &SourceDescriptor, reach_id: i64) -> Result<RawSeries, HydroError> {
        match source {
            SourceDescriptor::Remote { url, format } => {
                let body = self.fetcher.get_text(url)?;
                match format {
                    PayloadFormat::Csv => spt::parse_series_csv(&body),
                    PayloadFormat::Json => spt::parse_series_json(&body),
                }
            }
            SourceDescriptor::Archive { path } => {
                let dataset = self.opener.open(path)?;

                let reaches = dataset.reach_axis()?;
                let index = reaches.iter().position(|&r| r == reach_id).ok_or_else(|| {
                    HydroError::ReachNotFound {
                        reach_id,
                        archive: dataset.name().to_string(),
                    }
                })?;

                let times = dataset.time_axis()?;
                let values = dataset.reach_column(index)?;
                if times.len() != values.len() {
                    return Err(HydroError::extraction(
                        format!("reading {}", dataset.name()),
                        format!(
                            "time axis has {} steps but {} column has {}",
                            times.len(),
                            QOUT_VAR,
                            values.len()
                        ),
                    ));
                }

                let rows = times
                    .iter()
                    .zip(values)
                    .map(|(&t, v)| {
                        Ok(RawRow {
                            timestamp: archive::epoch_to_datetime(t, self.timezone)?,
                            values: vec![Some(v)],
                        })
                    })
                    .collect::<Result<Vec<_>, HydroError>>()?;

                Ok(RawSeries {
                    columns: vec![QOUT_VAR.to_string()],
                    rows,
                })
            }
        }
    }
}
