//! Reference fingerprint database
//!
//! Raw capture records are grouped by scene key into one [`Fingerprint`] per
//! physical stop. The resulting collection is immutable; a reload builds a
//! new store and replaces the old one wholesale.

use crate::core::{ApId, Fingerprint, Position, SignalMap, SignalStrength};
use crate::fingerprint::source::{FingerprintSource, SourceError};
use crate::utils::config::SceneConflictPolicy;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{info, warn};

/// Groups raw records recorded during the same capture
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SceneKey(pub i64);

/// One AP reading captured at a known position
#[derive(Debug, Clone, PartialEq)]
pub struct FingerprintRecord {
    pub scene_key: SceneKey,
    pub latitude: f64,
    pub longitude: f64,
    pub floor: i32,
    pub ap_id: ApId,
    pub signal_strength: SignalStrength,
}

/// Counters gathered while grouping records
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadStats {
    pub records: usize,
    pub scenes: usize,
    pub conflicting_scenes: usize,
    pub rejected_scenes: usize,
}

struct SceneBuilder {
    key: SceneKey,
    position: Position,
    signals: SignalMap,
    conflicting: bool,
}

/// Immutable collection of fingerprints, in first-seen scene order
#[derive(Debug, Clone, Default)]
pub struct FingerprintStore {
    fingerprints: Vec<Fingerprint>,
    stats: LoadStats,
}

impl FingerprintStore {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Group `records` by scene key into fingerprints.
    ///
    /// Within a scene a repeated AP overwrites the earlier signal. Position
    /// fields are taken from the last processed record; when they disagree the
    /// scene is kept or dropped according to `policy`.
    pub fn load<I>(records: I, policy: SceneConflictPolicy) -> Self
    where
        I: IntoIterator<Item = FingerprintRecord>,
    {
        let mut scenes: Vec<SceneBuilder> = Vec::new();
        let mut index: HashMap<SceneKey, usize> = HashMap::new();
        let mut stats = LoadStats::default();

        for record in records {
            stats.records += 1;
            let position = Position::new(record.latitude, record.longitude, record.floor);

            let slot = *index.entry(record.scene_key).or_insert_with(|| {
                scenes.push(SceneBuilder {
                    key: record.scene_key,
                    position,
                    signals: SignalMap::new(),
                    conflicting: false,
                });
                scenes.len() - 1
            });

            let scene = &mut scenes[slot];
            if scene.position != position {
                scene.conflicting = true;
                scene.position = position;
            }
            scene.signals.insert(record.ap_id, record.signal_strength);
        }

        let mut fingerprints = Vec::with_capacity(scenes.len());
        for scene in scenes {
            if scene.conflicting {
                stats.conflicting_scenes += 1;
                match policy {
                    SceneConflictPolicy::LastWriteWins => {
                        warn!(scene = scene.key.0, "scene records disagree on position, keeping last");
                    }
                    SceneConflictPolicy::RejectScene => {
                        warn!(scene = scene.key.0, "scene records disagree on position, scene rejected");
                        stats.rejected_scenes += 1;
                        continue;
                    }
                }
            }
            if let Some(fingerprint) = Fingerprint::new(scene.position, scene.signals) {
                fingerprints.push(fingerprint);
            }
        }
        stats.scenes = fingerprints.len();

        info!(
            records = stats.records,
            scenes = stats.scenes,
            rejected = stats.rejected_scenes,
            "fingerprint database loaded"
        );

        Self {
            fingerprints,
            stats,
        }
    }

    /// Load from `source`, propagating source failures
    pub fn try_from_source(
        source: &dyn FingerprintSource,
        policy: SceneConflictPolicy,
    ) -> Result<Self, SourceError> {
        let records = source.read_records()?;
        Ok(Self::load(records, policy))
    }

    /// Load from `source`; an unavailable source yields an empty store
    pub fn from_source(source: &dyn FingerprintSource, policy: SceneConflictPolicy) -> Self {
        Self::try_from_source(source, policy).unwrap_or_else(|e| {
            warn!(source = %source.describe(), error = %e, "fingerprint source unavailable, starting with empty database");
            Self::empty()
        })
    }

    pub fn all(&self) -> &[Fingerprint] {
        &self.fingerprints
    }

    pub fn stats(&self) -> LoadStats {
        self.stats
    }

    pub fn len(&self) -> usize {
        self.fingerprints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fingerprints.is_empty()
    }
}
