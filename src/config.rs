//! Scan configuration and startup settings.
//!
//! `ScanConfig` is what the engine runs with; changing any field invalidates
//! every cluster. `Settings` only seeds startup defaults from an optional TOML
//! file and is never written back.

use crate::error::{LogSpamError, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_GRANULARITY: f64 = 1.0;
pub const DEFAULT_LIVE_INTERVAL_MS: u64 = 500;

/// Clamp into [0, 1]. NaN is rejected since it would match nothing and
/// compare unordered against every score.
pub fn clamp_granularity(granularity: f64) -> Result<f64> {
    if granularity.is_nan() {
        return Err(LogSpamError::InvalidGranularity(granularity));
    }
    Ok(granularity.clamp(0.0, 1.0))
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScanConfig {
    pub file_path: PathBuf,
    pub filter: String,
    granularity: f64,
}

impl ScanConfig {
    pub fn new(file_path: impl Into<PathBuf>, filter: impl Into<String>, granularity: f64) -> Result<Self> {
        Ok(Self {
            file_path: file_path.into(),
            filter: filter.into(),
            granularity: clamp_granularity(granularity)?,
        })
    }

    pub fn granularity(&self) -> f64 {
        self.granularity
    }

    pub fn set_granularity(&mut self, granularity: f64) -> Result<()> {
        self.granularity = clamp_granularity(granularity)?;
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub granularity: f64,
    pub filter: String,
    pub live_interval_ms: u64,
    pub follow: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            granularity: DEFAULT_GRANULARITY,
            filter: String::new(),
            live_interval_ms: DEFAULT_LIVE_INTERVAL_MS,
            follow: false,
        }
    }
}

impl Settings {
    pub fn from_toml_str(s: &str) -> Result<Self> {
        Ok(toml::from_str(s)?)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => LogSpamError::FileNotFound { path: path.to_path_buf() },
            _ => LogSpamError::io(e, format!("reading settings {}", path.display())),
        })?;
        Self::from_toml_str(&raw)
    }

    pub fn live_interval(&self) -> Duration {
        Duration::from_millis(self.live_interval_ms)
    }
}
