//! Configuration loading
//!
//! Config file resolution priority:
//! 1. Explicit path (command-line argument)
//! 2. `WAVEOUT_CONFIG` environment variable
//! 3. Platform config directory (`<config_dir>/waveout/config.toml`)
//! 4. Compiled defaults
//!
//! A missing or unreadable file is never fatal: a warning is logged and the
//! compiled defaults are used. A file that parses but holds invalid values
//! is rejected.

use crate::format::WaveFormat;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Environment variable naming a config file
pub const CONFIG_ENV_VAR: &str = "WAVEOUT_CONFIG";

/// Player configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerConfig {
    /// Feed granularity: length of one device fragment in milliseconds
    pub fragment_ms: u32,

    /// Capacity of a sink's internal buffer in milliseconds
    pub device_buffer_ms: u32,

    /// Command ring growth step, in messages
    pub ring_increment: usize,

    /// Default tracing filter when RUST_LOG is not set
    pub log_level: String,

    /// Preferred output device name (None = system default)
    pub device: Option<String>,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            fragment_ms: 20,
            device_buffer_ms: 200,
            ring_increment: 64,
            log_level: "info".to_string(),
            device: None,
        }
    }
}

impl PlayerConfig {
    /// Parse a TOML document and validate it.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: PlayerConfig = toml::from_str(content)
            .map_err(|e| Error::Config(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Read and validate a config file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Reject values the player cannot schedule with.
    pub fn validate(&self) -> Result<()> {
        if self.fragment_ms == 0 {
            return Err(Error::Config("fragment_ms must be non-zero".to_string()));
        }
        if self.device_buffer_ms < self.fragment_ms.saturating_mul(2) {
            return Err(Error::Config(format!(
                "device_buffer_ms ({}) must hold at least two fragments of {}ms",
                self.device_buffer_ms, self.fragment_ms
            )));
        }
        if self.ring_increment == 0 {
            return Err(Error::Config("ring_increment must be non-zero".to_string()));
        }
        Ok(())
    }

    /// Duration of one fragment
    pub fn fragment_duration(&self) -> Duration {
        Duration::from_millis(u64::from(self.fragment_ms))
    }

    /// Fragment size in bytes for the given stream, at least one frame
    pub fn fragment_bytes(&self, format: &WaveFormat) -> usize {
        let bytes = format.duration_to_bytes(self.fragment_duration());
        bytes.max(u64::from(format.block_align().max(1))) as usize
    }

    /// Sink buffer size in bytes for the given stream
    pub fn device_buffer_bytes(&self, format: &WaveFormat) -> usize {
        let bytes =
            format.duration_to_bytes(Duration::from_millis(u64::from(self.device_buffer_ms)));
        bytes.max(2 * self.fragment_bytes(format) as u64) as usize
    }
}

/// Resolves and loads the player configuration
pub struct ConfigResolver {
    explicit: Option<PathBuf>,
}

impl ConfigResolver {
    pub fn new(explicit: Option<PathBuf>) -> Self {
        Self { explicit }
    }

    /// Path of the config file to use, if any exists
    pub fn resolve_path(&self) -> Option<PathBuf> {
        if let Some(path) = &self.explicit {
            return Some(path.clone());
        }

        if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
            if !path.is_empty() {
                return Some(PathBuf::from(path));
            }
        }

        default_config_path().filter(|p| p.exists())
    }

    /// Load the configuration, falling back to defaults when no file can be read.
    pub fn load(&self) -> Result<PlayerConfig> {
        let Some(path) = self.resolve_path() else {
            debug!("No config file found, using compiled defaults");
            return Ok(PlayerConfig::default());
        };

        match std::fs::read_to_string(&path) {
            Ok(content) => {
                let config = PlayerConfig::from_toml_str(&content)?;
                info!("Loaded configuration from {}", path.display());
                Ok(config)
            }
            Err(e) => {
                warn!(
                    "Config file {} unreadable ({}), using compiled defaults",
                    path.display(),
                    e
                );
                Ok(PlayerConfig::default())
            }
        }
    }
}

/// Platform config file location
fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("waveout").join("config.toml"))
}
