//! Common API types and data structures

use crate::core::PositionEstimate;
use crate::fingerprint::SourceError;
use crate::processing::IngestError;
use crate::utils::config::ConfigError;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

/// Result type for API operations
pub type ApiResult<T> = Result<T, ApiError>;

/// API error types
#[derive(Debug, Error)]
pub enum ApiError {
    /// Ingestion rejected; the live buffer is unchanged
    #[error(transparent)]
    Ingest(#[from] IngestError),
    /// Fingerprint source could not be read
    #[error(transparent)]
    Source(#[from] SourceError),
    /// Invalid configuration
    #[error(transparent)]
    Configuration(#[from] ConfigError),
}

/// Tracking state reported to consumers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackingStatus {
    /// No live data within the stale threshold
    Offline,
    /// Live data present but no estimate could be formed
    Calibrating,
    /// A fresh estimate was produced
    Tracking,
}

/// Answer to a position query
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EstimateResponse {
    pub status: TrackingStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current: Option<Arc<PositionEstimate>>,
    /// Oldest first
    #[serde(skip_serializing_if = "Option::is_none")]
    pub history: Option<Vec<Arc<PositionEstimate>>>,
}

impl EstimateResponse {
    pub fn offline() -> Self {
        Self {
            status: TrackingStatus::Offline,
            current: None,
            history: None,
        }
    }

    pub fn calibrating() -> Self {
        Self {
            status: TrackingStatus::Calibrating,
            current: None,
            history: None,
        }
    }

    pub fn tracking(current: Arc<PositionEstimate>, history: Vec<Arc<PositionEstimate>>) -> Self {
        Self {
            status: TrackingStatus::Tracking,
            current: Some(current),
            history: Some(history),
        }
    }

    pub fn is_tracking(&self) -> bool {
        self.status == TrackingStatus::Tracking
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Position;

    #[test]
    fn test_offline_serialization() {
        let json = serde_json::to_value(EstimateResponse::offline()).unwrap();
        assert_eq!(json, serde_json::json!({ "status": "offline" }));
    }

    #[test]
    fn test_tracking_serialization() {
        let estimate = Arc::new(PositionEstimate {
            timestamp_ms: 1_000,
            position: Position::new(48.8462, 2.3572, 2),
            accuracy_m: 4.5,
            neighbor_distances: vec![0.0, 7.5],
        });
        let response = EstimateResponse::tracking(estimate.clone(), vec![estimate]);
        let json = serde_json::to_value(&response).unwrap();

        assert_eq!(json["status"], "tracking");
        assert_eq!(json["current"]["position"]["floor"], 2);
        assert_eq!(json["current"]["neighbor_distances"][1], 7.5);
        assert_eq!(json["history"].as_array().map(Vec::len), Some(1));
    }
}
