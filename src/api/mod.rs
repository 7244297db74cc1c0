//! Positioning API
//!
//! The service object owns all shared state; handlers of whatever transport
//! the deployment uses call into it for ingestion and position queries.

pub mod service;
pub mod types;

pub use service::PositioningService;
pub use types::{ApiError, ApiResult, EstimateResponse, TrackingStatus};
