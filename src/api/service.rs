//! Process-wide positioning state and its request handlers
//!
//! One `PositioningService` is built at startup and shared (behind an `Arc`)
//! by every ingestion and query handler. The live buffer and the history each
//! sit behind their own mutex; the fingerprint store is immutable and only
//! ever replaced as a whole.

use crate::algorithms::wknn::{WknnConfig, WknnEstimator};
use crate::api::types::{ApiResult, EstimateResponse};
use crate::core::{ApId, PositionEstimate, SignalStrength};
use crate::fingerprint::{FingerprintSource, FingerprintStore, JsonFileSource};
use crate::processing::{IngestOutcome, LiveSignalBuffer, PositionHistory, RawIngest};
use crate::utils::config::{ConfigurationManager, IngestionMode, SystemConfig};
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;
use tracing::{debug, info, warn};

pub struct PositioningService {
    config: SystemConfig,
    estimator: WknnEstimator,
    fingerprints: RwLock<Arc<FingerprintStore>>,
    buffer: Mutex<LiveSignalBuffer>,
    history: Mutex<PositionHistory>,
}

impl PositioningService {
    /// Build the service around an already loaded store
    pub fn new(config: SystemConfig, store: FingerprintStore) -> ApiResult<Self> {
        let validation = ConfigurationManager::validate_system_config(&config);
        if let Some(error) = validation.errors.into_iter().next() {
            return Err(error.into());
        }

        info!(
            mode = ?config.ingestion_mode,
            k = config.k_neighbors,
            fingerprints = store.len(),
            "positioning service ready"
        );

        Ok(Self {
            estimator: WknnEstimator::new(WknnConfig::from(&config)),
            buffer: Mutex::new(LiveSignalBuffer::from_config(&config)),
            history: Mutex::new(PositionHistory::new(config.history_capacity)),
            fingerprints: RwLock::new(Arc::new(store)),
            config,
        })
    }

    /// Build the service, loading fingerprints from `config.database_path`.
    ///
    /// A missing or unreadable database leaves the store empty.
    pub fn from_config(config: SystemConfig) -> ApiResult<Self> {
        let store = match &config.database_path {
            Some(path) => {
                FingerprintStore::from_source(&JsonFileSource::new(path), config.scene_conflict_policy)
            }
            None => {
                warn!("no fingerprint database configured, starting with empty database");
                FingerprintStore::empty()
            }
        };
        Self::new(config, store)
    }

    pub fn config(&self) -> &SystemConfig {
        &self.config
    }

    pub fn ingestion_mode(&self) -> IngestionMode {
        self.config.ingestion_mode
    }

    pub fn ingest(&self, raw: RawIngest) -> ApiResult<IngestOutcome> {
        let outcome = self.buffer.lock().ingest(raw)?;
        Ok(outcome)
    }

    pub fn ingest_reading(
        &self,
        ap_id: ApId,
        signal_strength: SignalStrength,
        arrival_ms: u64,
    ) -> ApiResult<IngestOutcome> {
        let outcome = self
            .buffer
            .lock()
            .ingest_reading(ap_id, signal_strength, arrival_ms)?;
        Ok(outcome)
    }

    pub fn ingest_batch(&self, payload: Vec<u8>, arrival_ms: u64) -> ApiResult<IngestOutcome> {
        let outcome = self.buffer.lock().ingest_batch(payload, arrival_ms)?;
        Ok(outcome)
    }

    /// Answer a position query at `now_ms`.
    ///
    /// Offline when the live buffer is stale, calibrating when no estimate
    /// can be formed, tracking otherwise. A tracking answer records the new
    /// estimate in the history before returning it.
    pub fn get_estimate(&self, now_ms: u64) -> EstimateResponse {
        let live = {
            let buffer = self.buffer.lock();
            if buffer.is_offline(now_ms) {
                return EstimateResponse::offline();
            }
            buffer.snapshot()
        };

        let store = self.fingerprints();
        let estimate = match self.estimator.estimate_at(&live, store.all(), now_ms) {
            Some(estimate) => Arc::new(estimate),
            None => {
                debug!(
                    live_aps = live.len(),
                    fingerprints = store.len(),
                    "not enough data for an estimate"
                );
                return EstimateResponse::calibrating();
            }
        };

        let history = {
            let mut history = self.history.lock();
            history.record(Arc::clone(&estimate));
            history.all()
        };

        EstimateResponse::tracking(estimate, history)
    }

    /// Current fingerprint collection
    pub fn fingerprints(&self) -> Arc<FingerprintStore> {
        Arc::clone(&self.fingerprints.read())
    }

    /// Replace the fingerprint collection with a fresh load from `source`.
    ///
    /// On failure the current collection stays in place. Returns the new fingerprint count.
    pub fn reload_fingerprints(&self, source: &dyn FingerprintSource) -> ApiResult<usize> {
        let store = FingerprintStore::try_from_source(source, self.config.scene_conflict_policy)?;
        let count = store.len();
        *self.fingerprints.write() = Arc::new(store);
        info!(source = %source.describe(), fingerprints = count, "fingerprint database reloaded");
        Ok(count)
    }

    pub fn history(&self) -> Vec<Arc<PositionEstimate>> {
        self.history.lock().all()
    }
}
