//! Live observation buffer and its two ingestion disciplines
//!
//! The buffer holds the single current live scan of a deployment. How raw
//! input mutates it is decided by an [`IngestionStrategy`] chosen once from
//! configuration: incremental readings merged within a reset window, or
//! batch payloads that replace the whole scan.

use crate::core::{ApId, SignalMap, SignalStrength};
use crate::processing::parser::{BatchParser, ParseError};
use crate::utils::config::{IngestionMode, SystemConfig};
use std::fmt;
use thiserror::Error;
use tracing::{debug, warn};

/// A single incremental reading
#[derive(Debug, Clone, PartialEq)]
pub struct ApReading {
    pub ap_id: ApId,
    pub signal_strength: SignalStrength,
    /// Arrival time in milliseconds since the Unix epoch
    pub arrival_ms: u64,
}

/// Raw input delivered to the buffer by the transport layer
#[derive(Debug, Clone, PartialEq)]
pub enum RawIngest {
    Reading(ApReading),
    Batch { payload: Vec<u8>, arrival_ms: u64 },
    HexBatch { payload: String, arrival_ms: u64 },
}

impl RawIngest {
    fn kind(&self) -> &'static str {
        match self {
            RawIngest::Reading(_) => "reading",
            RawIngest::Batch { .. } => "batch",
            RawIngest::HexBatch { .. } => "hex batch",
        }
    }
}

/// What an accepted ingestion did to the buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestOutcome {
    /// Reading merged into the current scan
    Merged { entries: usize },
    /// Gap exceeded the reset window; the scan restarted with this reading
    Reset { entries: usize },
    /// Batch decoded and swapped in as the whole scan
    Replaced { entries: usize },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IngestError {
    #[error("malformed batch payload: {0}")]
    Parse(#[from] ParseError),
    #[error("{input} input is not accepted in {mode:?} mode")]
    UnsupportedInput {
        mode: IngestionMode,
        input: &'static str,
    },
}

/// The mutable scan state guarded by the buffer
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LiveScan {
    signals: SignalMap,
    last_update_ms: Option<u64>,
}

impl LiveScan {
    pub fn signals(&self) -> &SignalMap {
        &self.signals
    }

    pub fn last_update_ms(&self) -> Option<u64> {
        self.last_update_ms
    }
}

/// Ingestion discipline applied to every raw input
pub trait IngestionStrategy: Send + Sync + fmt::Debug {
    fn mode(&self) -> IngestionMode;

    /// Silence after which the buffer is considered offline
    fn stale_threshold_ms(&self) -> u64;

    /// Apply `raw` to `scan`. On error `scan` must be left untouched.
    fn ingest(&self, scan: &mut LiveScan, raw: RawIngest) -> Result<IngestOutcome, IngestError>;
}

/// One reading per call, merged unless the gap since the last call exceeds the reset window
#[derive(Debug, Clone)]
pub struct IncrementalIngestion {
    reset_window_ms: u64,
    stale_threshold_ms: u64,
}

impl IncrementalIngestion {
    pub fn new(reset_window_ms: u64, stale_threshold_ms: u64) -> Self {
        Self {
            reset_window_ms,
            stale_threshold_ms,
        }
    }
}

impl IngestionStrategy for IncrementalIngestion {
    fn mode(&self) -> IngestionMode {
        IngestionMode::Incremental
    }

    fn stale_threshold_ms(&self) -> u64 {
        self.stale_threshold_ms
    }

    fn ingest(&self, scan: &mut LiveScan, raw: RawIngest) -> Result<IngestOutcome, IngestError> {
        let reading = match raw {
            RawIngest::Reading(reading) => reading,
            other => {
                return Err(IngestError::UnsupportedInput {
                    mode: self.mode(),
                    input: other.kind(),
                })
            }
        };

        let new_cycle = match scan.last_update_ms {
            Some(last) => reading.arrival_ms.saturating_sub(last) > self.reset_window_ms,
            None => true,
        };

        if new_cycle && !scan.signals.is_empty() {
            debug!(
                dropped = scan.signals.len(),
                "reading gap exceeded reset window, starting new scan"
            );
        }
        if new_cycle {
            scan.signals.clear();
        }

        scan.signals.insert(reading.ap_id, reading.signal_strength);
        scan.last_update_ms = Some(reading.arrival_ms);

        let entries = scan.signals.len();
        Ok(if new_cycle {
            IngestOutcome::Reset { entries }
        } else {
            IngestOutcome::Merged { entries }
        })
    }
}

/// Whole-scan payloads in the 7-byte record format, replacing the buffer atomically
#[derive(Debug, Clone)]
pub struct BatchIngestion {
    parser: BatchParser,
    stale_threshold_ms: u64,
}

impl BatchIngestion {
    pub fn new(stale_threshold_ms: u64) -> Self {
        Self::with_parser(BatchParser::new(), stale_threshold_ms)
    }

    pub fn with_parser(parser: BatchParser, stale_threshold_ms: u64) -> Self {
        Self {
            parser,
            stale_threshold_ms,
        }
    }
}

impl IngestionStrategy for BatchIngestion {
    fn mode(&self) -> IngestionMode {
        IngestionMode::Batch
    }

    fn stale_threshold_ms(&self) -> u64 {
        self.stale_threshold_ms
    }

    fn ingest(&self, scan: &mut LiveScan, raw: RawIngest) -> Result<IngestOutcome, IngestError> {
        let (decoded, arrival_ms) = match raw {
            RawIngest::Batch {
                payload,
                arrival_ms,
            } => (self.parser.parse_payload(&payload), arrival_ms),
            RawIngest::HexBatch {
                payload,
                arrival_ms,
            } => (self.parser.parse_hex(&payload), arrival_ms),
            other => {
                return Err(IngestError::UnsupportedInput {
                    mode: self.mode(),
                    input: other.kind(),
                })
            }
        };

        let records = decoded.map_err(|e| {
            warn!(error = %e, "rejecting batch payload, live scan unchanged");
            IngestError::from(e)
        })?;

        // scan is only touched after a successful decode
        let signals: SignalMap = records
            .into_iter()
            .map(|record| (record.ap_id, record.signal_strength))
            .collect();

        scan.signals = signals;
        scan.last_update_ms = Some(arrival_ms);

        debug!(entries = scan.signals.len(), "live scan replaced by batch");
        Ok(IngestOutcome::Replaced {
            entries: scan.signals.len(),
        })
    }
}

/// Current live observation plus the strategy that feeds it
///
/// Not synchronized on its own; the service keeps it behind a mutex.
#[derive(Debug)]
pub struct LiveSignalBuffer {
    strategy: Box<dyn IngestionStrategy>,
    scan: LiveScan,
}

impl LiveSignalBuffer {
    pub fn new(strategy: Box<dyn IngestionStrategy>) -> Self {
        Self {
            strategy,
            scan: LiveScan::default(),
        }
    }

    /// Build the buffer with the strategy selected by `config.ingestion_mode`
    pub fn from_config(config: &SystemConfig) -> Self {
        let stale_threshold_ms = config.stale_threshold_ms();
        let strategy: Box<dyn IngestionStrategy> = match config.ingestion_mode {
            IngestionMode::Incremental => Box::new(IncrementalIngestion::new(
                config.reset_window_ms,
                stale_threshold_ms,
            )),
            IngestionMode::Batch => {
                let mut parser = BatchParser::new();
                parser.set_strict_validation(config.strict_batch_validation);
                Box::new(BatchIngestion::with_parser(parser, stale_threshold_ms))
            }
        };
        Self::new(strategy)
    }

    pub fn mode(&self) -> IngestionMode {
        self.strategy.mode()
    }

    pub fn ingest(&mut self, raw: RawIngest) -> Result<IngestOutcome, IngestError> {
        self.strategy.ingest(&mut self.scan, raw)
    }

    pub fn ingest_reading(
        &mut self,
        ap_id: ApId,
        signal_strength: SignalStrength,
        arrival_ms: u64,
    ) -> Result<IngestOutcome, IngestError> {
        self.ingest(RawIngest::Reading(ApReading {
            ap_id,
            signal_strength,
            arrival_ms,
        }))
    }

    pub fn ingest_batch(&mut self, payload: Vec<u8>, arrival_ms: u64) -> Result<IngestOutcome, IngestError> {
        self.ingest(RawIngest::Batch {
            payload,
            arrival_ms,
        })
    }

    /// Isolated copy of the live signals for estimation
    pub fn snapshot(&self) -> SignalMap {
        self.scan.signals.clone()
    }

    pub fn is_stale(&self, now_ms: u64, threshold_ms: u64) -> bool {
        match self.scan.last_update_ms {
            Some(last) => now_ms.saturating_sub(last) > threshold_ms,
            None => true,
        }
    }

    /// Staleness against the threshold of the configured mode
    pub fn is_offline(&self, now_ms: u64) -> bool {
        self.is_stale(now_ms, self.strategy.stale_threshold_ms())
    }

    pub fn last_update_ms(&self) -> Option<u64> {
        self.scan.last_update_ms
    }

    pub fn len(&self) -> usize {
        self.scan.signals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scan.signals.is_empty()
    }
}
