//! Fingerprint database and the sources it is loaded from

pub mod store;
pub mod source;

pub use store::{FingerprintRecord, FingerprintStore, LoadStats, SceneKey};
pub use source::{FingerprintSource, JsonFileSource, SourceError, VecSource};
