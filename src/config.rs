//! Engine and per-tree configuration (spec.md §6 "Configuration options").

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{MavibotError, Result};

pub const DEFAULT_PAGE_SIZE: usize = 512;
pub const MIN_PAGE_SIZE: usize = 64;
pub const DEFAULT_CACHE_SIZE: usize = 1024;
pub const DEFAULT_READ_TIMEOUT_MS: u64 = 30_000;

pub const DEFAULT_FAN_OUT: usize = 16;
pub const DEFAULT_VALUE_THRESHOLD_UP: usize = 8;
pub const DEFAULT_VALUE_THRESHOLD_LOW: usize = 1;

/// Engine-wide configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MavibotConfig {
    pub page_size: usize,
    pub cache_size: usize,
    /// `None` or `u64::MAX` means a read snapshot never expires on its own.
    pub read_timeout_ms: Option<u64>,
}

impl Default for MavibotConfig {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            cache_size: DEFAULT_CACHE_SIZE,
            read_timeout_ms: Some(DEFAULT_READ_TIMEOUT_MS),
        }
    }
}

impl MavibotConfig {
    /// # Errors
    /// Returns an error if the file cannot be read or does not parse as TOML.
    pub fn from_toml_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        toml::from_str(&text).map_err(|e| MavibotError::Config(e.to_string()))
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if self.page_size < MIN_PAGE_SIZE {
            return Err(MavibotError::Config(format!(
                "page_size must be >= {MIN_PAGE_SIZE}, got {}",
                self.page_size
            )));
        }
        Ok(())
    }
}

/// Per-tree configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TreeConfig {
    pub page_nb_elem: usize,
    pub allow_duplicates: bool,
    pub value_threshold_up: usize,
    pub value_threshold_low: usize,
    pub key_codec_id: String,
    pub value_codec_id: String,
}

impl Default for TreeConfig {
    fn default() -> Self {
        Self {
            page_nb_elem: DEFAULT_FAN_OUT,
            allow_duplicates: false,
            value_threshold_up: DEFAULT_VALUE_THRESHOLD_UP,
            value_threshold_low: DEFAULT_VALUE_THRESHOLD_LOW,
            key_codec_id: "bytes".to_string(),
            value_codec_id: "bytes".to_string(),
        }
    }
}

impl TreeConfig {
    /// Fan-out rounded up to the next power of two, minimum 2 (spec.md §4.3).
    #[must_use]
    pub fn fan_out(&self) -> usize {
        self.page_nb_elem.max(2).next_power_of_two()
    }
}
