//! Positioning constants and default system parameters

/// Squared distance charged for a live AP absent from a fingerprint (100 dB gap, squared)
pub const MISMATCH_PENALTY: f64 = 10_000.0;

/// Distance assigned to a fingerprint sharing no AP with the live observation
pub const NO_MATCH_DISTANCE: f64 = 9_999_999.0;

/// Added to every neighbor distance before inverting it into a weight
pub const WEIGHT_EPSILON: f64 = 0.001;

/// Local linear degrees-to-meters scale (valid near mid latitudes only)
pub const DEGREES_TO_METERS: f64 = 111_000.0;

/// Default number of neighbors used by the estimator
pub const DEFAULT_K_NEIGHBORS: usize = 3;

/// Gap between incremental readings that starts a new scan cycle (milliseconds)
pub const RESET_WINDOW_MS: u64 = 2_000;

/// Offline threshold for incremental ingestion (milliseconds)
pub const INCREMENTAL_STALE_MS: u64 = 10_000;

/// Offline threshold for batch ingestion (milliseconds)
pub const BATCH_STALE_MS: u64 = 35_000;

/// Default number of estimates kept in the position history
pub const DEFAULT_HISTORY_CAPACITY: usize = 50;
