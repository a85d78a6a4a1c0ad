//! Code for the configuration of the application.

use std::{path::PathBuf, time::Duration};

use anyhow::Result;
use serde::{Deserialize, Serialize};

/// The configuration of the application.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    /// The Spoolman instance consumption is reported to.
    pub spoolman: SpoolmanConfig,
    /// Where the tracker keeps its state.
    #[serde(default)]
    pub tracker: TrackerConfig,
    /// How project archives are retrieved.
    #[serde(default)]
    pub models: ModelsConfig,
}

impl Config {
    /// Parse a configuration from a toml file.
    pub fn from_file(file: &PathBuf) -> Result<Self> {
        let config = std::fs::read_to_string(file)?;
        Self::from_str(&config)
    }

    /// Parse a configuration from a toml string.
    pub fn from_str(config: &str) -> Result<Self> {
        Ok(toml::from_str(config)?)
    }
}

/// The configuration for the Spoolman inventory.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SpoolmanConfig {
    /// Base url of the Spoolman server, without the `/api/v1` suffix.
    pub url: String,
    /// Verify the server certificate.
    #[serde(default = "default_true")]
    pub verify_tls: bool,
    /// Request timeout, in seconds.
    #[serde(default = "default_spoolman_timeout")]
    pub timeout_secs: u64,
    /// Extra field of the spools holding the tag the AMS reads. Trays are
    /// assigned automatically when set.
    #[serde(default)]
    pub tray_uuid_field: Option<String>,
}

impl SpoolmanConfig {
    /// Request timeout for Spoolman calls.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// The configuration for the tracker's local state.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TrackerConfig {
    /// Directory holding the checkpoint of the print in flight.
    #[serde(default = "default_checkpoint_dir")]
    pub checkpoint_dir: PathBuf,
    /// JSON file assigning spools to trays.
    #[serde(default = "default_settings_file")]
    pub settings_file: PathBuf,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            checkpoint_dir: default_checkpoint_dir(),
            settings_file: default_settings_file(),
        }
    }
}

/// The configuration for project archive retrieval.
#[derive(Debug, Clone, Copy, Deserialize, Serialize)]
pub struct ModelsConfig {
    /// Download timeout, in seconds.
    #[serde(default = "default_models_timeout")]
    pub timeout_secs: u64,
}

impl ModelsConfig {
    /// Download timeout for project archives.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for ModelsConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_models_timeout(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_spoolman_timeout() -> u64 {
    30
}

fn default_models_timeout() -> u64 {
    120
}

fn default_checkpoint_dir() -> PathBuf {
    PathBuf::from("checkpoint")
}

fn default_settings_file() -> PathBuf {
    PathBuf::from("settings.json")
}
