//! WiFi Indoor Positioning
//!
//! Estimates a device position from live WiFi scans by weighted k-nearest
//! neighbor matching against a database of surveyed fingerprints.

pub mod core;
pub mod algorithms;
pub mod processing;
pub mod fingerprint;
pub mod utils;
pub mod api;

// Re-export commonly used types
pub use core::{ApId, Fingerprint, Position, PositionEstimate, SignalMap, SignalStrength};
pub use algorithms::wknn::{WknnConfig, WknnEstimator};
pub use processing::{BatchParser, LiveSignalBuffer, PositionHistory, RawIngest};
pub use fingerprint::{FingerprintSource, FingerprintStore, JsonFileSource};
pub use utils::config::{ConfigurationManager, IngestionMode, SceneConflictPolicy, SystemConfig};
pub use api::{ApiError, ApiResult, EstimateResponse, PositioningService, TrackingStatus};
