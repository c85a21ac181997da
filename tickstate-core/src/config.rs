//! Machine configuration.
//!
//! Configuration is loaded in the following order (later overrides earlier):
//! 1. Default values
//! 2. YAML config file (if specified via TICKSTATE_CONFIG or an explicit path)
//! 3. Environment variables

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;

/// When capabilities are delivered on the auto-cached transition path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CapabilityDelivery {
    /// Deliver on every entry.
    #[default]
    EveryEntry,
    /// Deliver only when a cached instance is first created (or cached
    /// explicitly). Assumes every capability a state needs is bound before
    /// that state is first entered.
    FirstCreation,
}

impl FromStr for CapabilityDelivery {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "every-entry" | "every_entry" | "always" => Ok(CapabilityDelivery::EveryEntry),
            "first-creation" | "first_creation" | "once" => Ok(CapabilityDelivery::FirstCreation),
            other => Err(ConfigError::ValidationError(format!(
                "unknown capability delivery mode '{}'",
                other
            ))),
        }
    }
}

/// Runtime configuration of a [`StateMachine`](crate::StateMachine).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MachineConfig {
    /// Capability delivery mode for `change_state::<S>()`.
    pub capability_delivery: CapabilityDelivery,
    /// Side-track domains larger than this log a warning at construction.
    pub side_track_warn_threshold: usize,
    /// Start with updates paused.
    pub start_paused: bool,
}

impl Default for MachineConfig {
    fn default() -> Self {
        Self {
            capability_delivery: CapabilityDelivery::EveryEntry,
            side_track_warn_threshold: 8,
            start_paused: false,
        }
    }
}

impl MachineConfig {
    /// Loads configuration from file, then applies environment variable overrides.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_with(|key| std::env::var(key).ok())
    }

    /// Same as [`MachineConfig::load`] with an arbitrary key lookup in place
    /// of the process environment.
    pub fn load_with<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = match lookup("TICKSTATE_CONFIG") {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };

        config.apply_overrides(lookup)?;
        Ok(config)
    }

    /// Loads configuration from a YAML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::IoError(path.to_path_buf(), e))?;
        let config: MachineConfig = serde_yaml::from_str(&content)
            .map_err(|e| ConfigError::ParseError(path.to_path_buf(), e.to_string()))?;
        Ok(config)
    }

    /// Saves configuration to a YAML file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let content = serde_yaml::to_string(self)
            .map_err(|e| ConfigError::ParseError(path.to_path_buf(), e.to_string()))?;
        std::fs::write(path, content).map_err(|e| ConfigError::IoError(path.to_path_buf(), e))?;
        Ok(())
    }

    /// Applies overrides from an arbitrary key lookup.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(mode) = lookup("TICKSTATE_CAPABILITY_DELIVERY") {
            self.capability_delivery = mode.parse()?;
        }

        if let Some(threshold) = lookup("TICKSTATE_SIDE_TRACK_WARN") {
            self.side_track_warn_threshold = threshold.trim().parse().map_err(|_| {
                ConfigError::ValidationError(format!(
                    "TICKSTATE_SIDE_TRACK_WARN must be a number, got '{}'",
                    threshold
                ))
            })?;
        }

        if let Some(paused) = lookup("TICKSTATE_START_PAUSED") {
            self.start_paused = paused == "1" || paused.to_lowercase() == "true";
        }

        Ok(())
    }

    pub fn with_capability_delivery(mut self, mode: CapabilityDelivery) -> Self {
        self.capability_delivery = mode;
        self
    }

    pub fn with_side_track_warn_threshold(mut self, threshold: usize) -> Self {
        self.side_track_warn_threshold = threshold;
        self
    }

    pub fn with_start_paused(mut self, paused: bool) -> Self {
        self.start_paused = paused;
        self
    }
}

/// Configuration error.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file '{}': {}", .0.display(), .1)]
    IoError(PathBuf, #[source] std::io::Error),

    #[error("failed to parse config file '{}': {}", .0.display(), .1)]
    ParseError(PathBuf, String),

    #[error("configuration validation failed: {0}")]
    ValidationError(String),
}
