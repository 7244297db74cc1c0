use crate::core::{ApId, SignalStrength};
use crate::fingerprint::store::{FingerprintRecord, SceneKey};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("fingerprint source '{path}' unavailable: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("fingerprint source '{path}' unreadable: {message}")]
    Format { path: String, message: String },
}

/// Provider of raw fingerprint records, read once per (re)load
pub trait FingerprintSource {
    fn read_records(&self) -> Result<Vec<FingerprintRecord>, SourceError>;

    /// Human-readable name used in log output
    fn describe(&self) -> String;
}

/// Capture entry as written by the tagging workflow (extra fields such as `ssid` are ignored)
#[derive(Debug, Deserialize)]
struct CaptureEntry {
    timestamp: i64,
    latitude: f64,
    longitude: f64,
    floor: i32,
    mac: String,
    rssi: SignalStrength,
}

impl From<CaptureEntry> for FingerprintRecord {
    fn from(entry: CaptureEntry) -> Self {
        FingerprintRecord {
            scene_key: SceneKey(entry.timestamp),
            latitude: entry.latitude,
            longitude: entry.longitude,
            floor: entry.floor,
            ap_id: ApId::new(entry.mac),
            signal_strength: entry.rssi,
        }
    }
}

/// JSON array of capture entries; the capture timestamp is the scene key
#[derive(Debug, Clone)]
pub struct JsonFileSource {
    path: PathBuf,
}

impl JsonFileSource {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }
}

impl FingerprintSource for JsonFileSource {
    fn read_records(&self) -> Result<Vec<FingerprintRecord>, SourceError> {
        let path = self.path.display().to_string();

        let content = fs::read_to_string(&self.path).map_err(|source| SourceError::Io {
            path: path.clone(),
            source,
        })?;

        let entries: Vec<CaptureEntry> =
            serde_json::from_str(&content).map_err(|e| SourceError::Format {
                path,
                message: e.to_string(),
            })?;

        Ok(entries.into_iter().map(FingerprintRecord::from).collect())
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

/// In-memory records, for tests and embedding callers
#[derive(Debug, Clone, Default)]
pub struct VecSource {
    records: Vec<FingerprintRecord>,
}

impl VecSource {
    pub fn new(records: Vec<FingerprintRecord>) -> Self {
        Self { records }
    }
}

impl FingerprintSource for VecSource {
    fn read_records(&self) -> Result<Vec<FingerprintRecord>, SourceError> {
        Ok(self.records.clone())
    }

    fn describe(&self) -> String {
        format!("memory ({} records)", self.records.len())
    }
}
