use crate::core::{
    BATCH_STALE_MS, DEFAULT_HISTORY_CAPACITY, DEFAULT_K_NEIGHBORS, DEGREES_TO_METERS,
    INCREMENTAL_STALE_MS, MISMATCH_PENALTY, RESET_WINDOW_MS, WEIGHT_EPSILON,
};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::warn;

/// How live readings reach the buffer; fixed for the lifetime of a deployment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IngestionMode {
    /// One reading per message (WiFi scanner streaming its results)
    Incremental,
    /// Whole scans in the 7-byte record format (LoRa uplinks)
    Batch,
}

/// What to do when records of one scene report different positions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SceneConflictPolicy {
    /// Keep the position of the last processed record
    LastWriteWins,
    /// Drop the whole scene from the usable set
    RejectScene,
}

/// System-wide configuration parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SystemConfig {
    /// Ingestion discipline of the live buffer
    pub ingestion_mode: IngestionMode,
    /// Gap between incremental readings that starts a new scan (milliseconds)
    pub reset_window_ms: u64,
    /// Offline threshold in incremental mode (milliseconds)
    pub incremental_stale_ms: u64,
    /// Offline threshold in batch mode (milliseconds)
    pub batch_stale_ms: u64,
    /// Reject batch payloads shorter than one record instead of decoding them to an empty scan
    pub strict_batch_validation: bool,
    /// Number of neighbors averaged by the estimator
    pub k_neighbors: usize,
    /// Added to neighbor distances before weighting; must be positive
    pub weight_epsilon: f64,
    /// Squared penalty for a live AP missing from a fingerprint
    pub mismatch_penalty: f64,
    /// Degrees to meters scale used for the accuracy figure
    pub degrees_to_meters: f64,
    /// Number of estimates kept in the history
    pub history_capacity: usize,
    /// Handling of scenes with inconsistent positions
    pub scene_conflict_policy: SceneConflictPolicy,
    /// Fingerprint database file
    pub database_path: Option<PathBuf>,
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            ingestion_mode: IngestionMode::Incremental,
            reset_window_ms: RESET_WINDOW_MS,
            incremental_stale_ms: INCREMENTAL_STALE_MS,
            batch_stale_ms: BATCH_STALE_MS,
            strict_batch_validation: false,
            k_neighbors: DEFAULT_K_NEIGHBORS,
            weight_epsilon: WEIGHT_EPSILON,
            mismatch_penalty: MISMATCH_PENALTY,
            degrees_to_meters: DEGREES_TO_METERS,
            history_capacity: DEFAULT_HISTORY_CAPACITY,
            scene_conflict_policy: SceneConflictPolicy::LastWriteWins,
            database_path: None,
        }
    }
}

impl SystemConfig {
    /// Offline threshold of the configured ingestion mode
    pub fn stale_threshold_ms(&self) -> u64 {
        match self.ingestion_mode {
            IngestionMode::Incremental => self.incremental_stale_ms,
            IngestionMode::Batch => self.batch_stale_ms,
        }
    }
}

/// Configuration errors
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("Invalid parameter {parameter} = {value}: {reason}")]
    InvalidParameter {
        parameter: String,
        value: String,
        reason: String,
    },
    #[error("Configuration I/O error: {message}")]
    IoError { message: String },
    #[error("Configuration serialization error: {message}")]
    SerializationError { message: String },
}

/// Configuration validation result
#[derive(Debug)]
pub struct ValidationResult {
    pub is_valid: bool,
    pub errors: Vec<ConfigError>,
    pub warnings: Vec<String>,
}

/// Loads, validates and adjusts the system configuration
pub struct ConfigurationManager {
    system_config: SystemConfig,
    config_file_path: Option<PathBuf>,
    is_modified: bool,
}

fn invalid(parameter: &str, value: impl ToString, reason: &str) -> ConfigError {
    ConfigError::InvalidParameter {
        parameter: parameter.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

impl ConfigurationManager {
    /// Create a new configuration manager with default settings
    pub fn new() -> Self {
        Self {
            system_config: SystemConfig::default(),
            config_file_path: None,
            is_modified: false,
        }
    }

    /// Create configuration manager and load from file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let mut manager = Self::new();
        manager.load_from_file(path)?;
        Ok(manager)
    }

    pub fn get_system_config(&self) -> &SystemConfig {
        &self.system_config
    }

    /// Replace the whole configuration after validating it
    pub fn update_system_config(&mut self, config: SystemConfig) -> Result<(), ConfigError> {
        let validation = Self::validate_system_config(&config);
        if let Some(error) = validation.errors.into_iter().next() {
            return Err(error);
        }

        self.system_config = config;
        self.is_modified = true;
        Ok(())
    }

    /// Load configuration from a JSON file; missing fields take their defaults
    pub fn load_from_file<P: AsRef<Path>>(&mut self, path: P) -> Result<(), ConfigError> {
        let path = path.as_ref();

        let content = fs::read_to_string(path).map_err(|e| ConfigError::IoError {
            message: format!("Failed to read config file '{}': {}", path.display(), e),
        })?;

        let config: SystemConfig =
            serde_json::from_str(&content).map_err(|e| ConfigError::SerializationError {
                message: format!("Failed to parse config file '{}': {}", path.display(), e),
            })?;

        let validation = Self::validate_system_config(&config);
        for warning in &validation.warnings {
            warn!(path = %path.display(), "{}", warning);
        }
        if let Some(error) = validation.errors.into_iter().next() {
            return Err(error);
        }

        self.system_config = config;
        self.config_file_path = Some(path.to_path_buf());
        self.is_modified = false;
        Ok(())
    }

    /// Save configuration to a JSON file
    pub fn save_to_file<P: AsRef<Path>>(&mut self, path: P) -> Result<(), ConfigError> {
        let path = path.as_ref();

        let content = serde_json::to_string_pretty(&self.system_config).map_err(|e| {
            ConfigError::SerializationError {
                message: format!("Failed to serialize config: {}", e),
            }
        })?;

        fs::write(path, content).map_err(|e| ConfigError::IoError {
            message: format!("Failed to write config file '{}': {}", path.display(), e),
        })?;

        self.config_file_path = Some(path.to_path_buf());
        self.is_modified = false;
        Ok(())
    }

    /// Save to the currently loaded file path
    pub fn save(&mut self) -> Result<(), ConfigError> {
        match self.config_file_path.clone() {
            Some(path) => self.save_to_file(path),
            None => Err(ConfigError::IoError {
                message: "No file path set for saving configuration".to_string(),
            }),
        }
    }

    pub fn is_modified(&self) -> bool {
        self.is_modified
    }

    /// Update the neighbor count, returning the previous value
    pub fn set_k_neighbors(&mut self, k: usize) -> Result<usize, ConfigError> {
        if k == 0 {
            return Err(invalid("k_neighbors", k, "At least one neighbor is required"));
        }
        let old_value = self.system_config.k_neighbors;
        self.system_config.k_neighbors = k;
        self.is_modified = true;
        Ok(old_value)
    }

    /// Update the weighting epsilon, returning the previous value
    pub fn set_weight_epsilon(&mut self, epsilon: f64) -> Result<f64, ConfigError> {
        if !(epsilon.is_finite() && epsilon > 0.0) {
            return Err(invalid(
                "weight_epsilon",
                epsilon,
                "Weight epsilon must be a positive finite number",
            ));
        }
        let old_value = self.system_config.weight_epsilon;
        self.system_config.weight_epsilon = epsilon;
        self.is_modified = true;
        Ok(old_value)
    }

    /// Update the history capacity, returning the previous value
    pub fn set_history_capacity(&mut self, capacity: usize) -> Result<usize, ConfigError> {
        if capacity == 0 {
            return Err(invalid(
                "history_capacity",
                capacity,
                "History must hold at least one estimate",
            ));
        }
        let old_value = self.system_config.history_capacity;
        self.system_config.history_capacity = capacity;
        self.is_modified = true;
        Ok(old_value)
    }

    /// Update the offline threshold of one ingestion mode, returning the previous value
    pub fn set_stale_threshold(&mut self, mode: IngestionMode, threshold_ms: u64) -> Result<u64, ConfigError> {
        if threshold_ms == 0 {
            return Err(invalid("stale_threshold_ms", threshold_ms, "Stale threshold must be positive"));
        }
        let slot = match mode {
            IngestionMode::Incremental => &mut self.system_config.incremental_stale_ms,
            IngestionMode::Batch => &mut self.system_config.batch_stale_ms,
        };
        let old_value = std::mem::replace(slot, threshold_ms);
        self.is_modified = true;
        Ok(old_value)
    }

    /// Validate a system configuration
    pub fn validate_system_config(config: &SystemConfig) -> ValidationResult {
        let mut errors = Vec::new();
        let mut warnings = Vec::new();

        if config.k_neighbors == 0 {
            errors.push(invalid(
                "k_neighbors",
                config.k_neighbors,
                "At least one neighbor is required",
            ));
        }

        if !(config.weight_epsilon.is_finite() && config.weight_epsilon > 0.0) {
            errors.push(invalid(
                "weight_epsilon",
                config.weight_epsilon,
                "Weight epsilon must be a positive finite number",
            ));
        } else if config.weight_epsilon > 1.0 {
            warnings.push("Large weight epsilon flattens neighbor weighting".to_string());
        }

        if !(config.mismatch_penalty.is_finite() && config.mismatch_penalty >= 0.0) {
            errors.push(invalid(
                "mismatch_penalty",
                config.mismatch_penalty,
                "Mismatch penalty must be a non-negative finite number",
            ));
        }

        if !(config.degrees_to_meters.is_finite() && config.degrees_to_meters > 0.0) {
            errors.push(invalid(
                "degrees_to_meters",
                config.degrees_to_meters,
                "Degrees to meters scale must be positive",
            ));
        }

        if config.history_capacity == 0 {
            errors.push(invalid(
                "history_capacity",
                config.history_capacity,
                "History must hold at least one estimate",
            ));
        }

        if config.incremental_stale_ms == 0 || config.batch_stale_ms == 0 {
            errors.push(invalid(
                "stale_threshold_ms",
                config.incremental_stale_ms.min(config.batch_stale_ms),
                "Stale thresholds must be positive",
            ));
        }

        if config.ingestion_mode == IngestionMode::Incremental
            && config.reset_window_ms >= config.incremental_stale_ms
        {
            warnings.push(
                "Reset window is not shorter than the offline threshold; scans never accumulate before going offline"
                    .to_string(),
            );
        }

        ValidationResult {
            is_valid: errors.is_empty(),
            errors,
            warnings,
        }
    }
}

impl Default for ConfigurationManager {
    fn default() -> Self {
        Self::new()
    }
}
