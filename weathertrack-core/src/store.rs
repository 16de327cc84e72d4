//! CSV-backed history of every persisted observation.
//!
//! The file is the only source of truth between cycles. Each merge loads it,
//! folds the new batch in, and replaces it wholesale through a temporary file
//! in the same directory, so a failed write leaves the previous file intact.
//!
//! Timestamps are written as UTC without an offset (`%Y-%m-%d %H:%M:%S`), and
//! offset-free values are read back as UTC. Files that recorded local wall time
//! without an offset load shifted by the local UTC offset, and those rows will
//! not dedupe against refetched readings.
//!
//! A missing numeric field is kept as NaN and written back as an empty cell.
//! Only rows without a usable timestamp, or with the wrong number of columns,
//! are dropped. A header that does not match, or a non-empty file where no
//! row can be read, is a [`StoreError`] and the file is left untouched.

use std::{
    collections::HashMap,
    fs,
    path::{Path, PathBuf},
};

use chrono::{DateTime, FixedOffset, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use tempfile::NamedTempFile;
use tracing::{debug, info, instrument, warn};

use crate::{error::StoreError, model::Observation};

const HEADER: [&str; 7] = [
    "City",
    "State",
    "Description",
    "Temperature (°F)",
    "Humidity (%)",
    "Wind Speed (mph)",
    "Timestamp",
];

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug, Serialize, Deserialize)]
struct Row {
    #[serde(rename = "City")]
    city: String,
    #[serde(rename = "State")]
    state: String,
    #[serde(rename = "Description")]
    description: String,
    #[serde(rename = "Temperature (°F)", deserialize_with = "lenient_f64")]
    temperature_f: Option<f64>,
    #[serde(rename = "Humidity (%)", deserialize_with = "lenient_f64")]
    humidity_pct: Option<f64>,
    #[serde(rename = "Wind Speed (mph)", deserialize_with = "lenient_f64")]
    wind_speed_mph: Option<f64>,
    #[serde(rename = "Timestamp")]
    timestamp: String,
}

impl From<&Observation> for Row {
    fn from(obs: &Observation) -> Self {
        Row {
            city: obs.location.clone(),
            state: obs.region.clone(),
            description: obs.description.clone(),
            temperature_f: present(obs.temperature_f),
            humidity_pct: present(obs.humidity_pct),
            wind_speed_mph: present(obs.wind_speed_mph),
            timestamp: obs.observed_at.naive_utc().format(TIMESTAMP_FORMAT).to_string(),
        }
    }
}

impl Row {
    fn into_observation(self) -> Option<Observation> {
        let observed_at = parse_timestamp(&self.timestamp)?;
        Some(Observation {
            location: self.city,
            region: self.state,
            description: self.description,
            temperature_f: self.temperature_f.unwrap_or(f64::NAN),
            humidity_pct: self.humidity_pct.unwrap_or(f64::NAN),
            wind_speed_mph: self.wind_speed_mph.unwrap_or(f64::NAN),
            observed_at,
        })
    }
}

fn present(value: f64) -> Option<f64> {
    Some(value).filter(|v| !v.is_nan())
}

/// Blank or non-numeric cells read as `None` instead of failing the row.
fn lenient_f64<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    Ok(raw.and_then(|s| s.trim().parse::<f64>().ok()).filter(|v| !v.is_nan()))
}

/// Parse a stored timestamp into a UTC instant.
///
/// Offset-free values are UTC. Values with an offset are converted.
fn parse_timestamp(raw: &str) -> Option<DateTime<FixedOffset>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    for format in ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(naive.and_utc().fixed_offset());
        }
    }

    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|dt| dt.with_timezone(&Utc).fixed_offset())
}

fn canonical(mut obs: Observation) -> Observation {
    obs.observed_at = obs.observed_at.with_timezone(&Utc).fixed_offset();
    obs
}

fn dedupe_key(obs: &Observation) -> (String, NaiveDateTime) {
    (obs.location.clone(), obs.observed_at.naive_utc())
}

/// Union `existing` and `incoming`, keep the last record per
/// `(location, observed_at)`, and sort ascending by time.
///
/// `incoming` wins over `existing` on a key collision. Timestamps come back
/// normalized to UTC. Ties on time are ordered by location, then region.
pub fn merge(existing: Vec<Observation>, incoming: Vec<Observation>) -> Vec<Observation> {
    let mut by_key = HashMap::with_capacity(existing.len() + incoming.len());
    for obs in existing.into_iter().chain(incoming) {
        let obs = canonical(obs);
        by_key.insert(dedupe_key(&obs), obs);
    }

    let mut merged: Vec<Observation> = by_key.into_values().collect();
    merged.sort_by(|a, b| {
        a.observed_at
            .cmp(&b.observed_at)
            .then_with(|| a.location.cmp(&b.location))
            .then_with(|| a.region.cmp(&b.region))
    });
    merged
}

/// Records read from the store, plus how many rows were discarded.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Loaded {
    pub observations: Vec<Observation>,
    pub dropped: usize,
}

/// Counts from one load-merge-rewrite pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeSummary {
    /// Valid rows read from the existing store.
    pub loaded: usize,
    /// Rows discarded on load for a bad timestamp or a malformed record.
    pub dropped: usize,
    pub incoming: usize,
    pub written: usize,
}

/// Read-side filter for [`HistoryStore::query`].
#[derive(Debug, Clone, Default)]
pub struct HistoryQuery {
    pub location: Option<String>,
    pub since: Option<DateTime<Utc>>,
}

impl HistoryQuery {
    pub fn matches(&self, obs: &Observation) -> bool {
        let location_ok = self
            .location
            .as_deref()
            .is_none_or(|loc| obs.location.eq_ignore_ascii_case(loc));
        let time_ok = self.since.is_none_or(|since| obs.observed_at >= since);
        location_ok && time_ok
    }
}

/// The persisted, deduplicated, time-sorted observation history.
///
/// Not safe for concurrent writers; callers serialize merges.
#[derive(Debug, Clone)]
pub struct HistoryStore {
    path: PathBuf,
}

impl HistoryStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Create a header-only store if none exists. Returns whether it was created.
    pub fn ensure_exists(&self) -> Result<bool, StoreError> {
        if self.path.exists() {
            return Ok(false);
        }
        self.write_all(&[])?;
        info!("created empty history store at {}", self.path.display());
        Ok(true)
    }

    /// Read every valid record. A missing or zero-byte store reads as empty.
    ///
    /// Rows with a missing or unparseable timestamp, or with the wrong number
    /// of columns, are skipped and counted. A mismatched header, or a file
    /// whose rows are all skipped, is an error.
    pub fn load(&self) -> Result<Loaded, StoreError> {
        if !self.path.exists() {
            return Ok(Loaded::default());
        }

        let mut reader = csv::Reader::from_path(&self.path)
            .map_err(|e| StoreError::csv(&self.path, e))?;

        let headers = reader
            .headers()
            .map_err(|e| StoreError::csv(&self.path, e))?;
        if headers.is_empty() {
            return Ok(Loaded::default());
        }
        if !headers.iter().map(str::trim).eq(HEADER) {
            return Err(StoreError::Schema {
                path: self.path.clone(),
                found: headers.iter().collect::<Vec<_>>().join(","),
            });
        }

        let mut loaded = Loaded::default();
        for (i, row) in reader.deserialize::<Row>().enumerate() {
            let row = match row {
                Ok(row) => row,
                Err(e) if e.is_io_error() => return Err(StoreError::csv(&self.path, e)),
                Err(e) => {
                    warn!("dropping malformed row {}: {e}", i + 1);
                    loaded.dropped += 1;
                    continue;
                }
            };

            let raw = row.timestamp.clone();
            match row.into_observation() {
                Some(obs) => loaded.observations.push(obs),
                None => {
                    warn!("dropping row {} with invalid timestamp {raw:?}", i + 1);
                    loaded.dropped += 1;
                }
            }
        }

        if loaded.observations.is_empty() && loaded.dropped > 0 {
            return Err(StoreError::Unreadable {
                path: self.path.clone(),
                rows: loaded.dropped,
            });
        }

        Ok(loaded)
    }

    /// Records matching `query`, oldest first. Never touches the network.
    pub fn query(&self, query: &HistoryQuery) -> Result<Vec<Observation>, StoreError> {
        let loaded = self.load()?;
        Ok(loaded
            .observations
            .into_iter()
            .filter(|obs| query.matches(obs))
            .collect())
    }

    /// Load the store, merge `batch` into it, and atomically rewrite it.
    ///
    /// An empty batch still rewrites, normalizing any existing data.
    #[instrument(skip_all, fields(path = %self.path.display(), incoming = batch.len()))]
    pub fn merge_and_persist(&self, batch: Vec<Observation>) -> Result<MergeSummary, StoreError> {
        let Loaded { observations, dropped } = self.load()?;
        let mut summary = MergeSummary {
            loaded: observations.len(),
            dropped,
            incoming: batch.len(),
            written: 0,
        };

        let merged = merge(observations, batch);
        self.write_all(&merged)?;
        summary.written = merged.len();

        debug!(?summary, "history store rewritten");
        Ok(summary)
    }

    fn write_all(&self, observations: &[Observation]) -> Result<(), StoreError> {
        let dir = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        fs::create_dir_all(dir).map_err(|e| StoreError::io(dir, e))?;

        let mut tmp = NamedTempFile::new_in(dir).map_err(|e| StoreError::io(dir, e))?;
        let tmp_path = tmp.path().to_path_buf();
        {
            let mut writer = csv::WriterBuilder::new()
                .has_headers(false)
                .from_writer(tmp.as_file_mut());

            writer
                .write_record(HEADER)
                .map_err(|e| StoreError::csv(&tmp_path, e))?;
            for obs in observations {
                writer
                    .serialize(Row::from(obs))
                    .map_err(|e| StoreError::csv(&tmp_path, e))?;
            }
            writer.flush().map_err(|e| StoreError::io(&tmp_path, e))?;
        }

        tmp.as_file()
            .sync_all()
            .map_err(|e| StoreError::io(&tmp_path, e))?;

        tmp.persist(&self.path)
            .map_err(|e| StoreError::io(&self.path, e.error))?;

        Ok(())
    }
}
