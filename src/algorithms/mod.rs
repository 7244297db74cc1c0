//! Core positioning algorithms

pub mod wknn;

pub use wknn::{RankedNeighbor, WknnConfig, WknnEstimator};
