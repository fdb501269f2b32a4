//! Session configuration.

use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::codec::DEFAULT_JPEG_QUALITY;
use crate::params::ParameterPolicy;

/// Default number of history snapshots retained.
pub const DEFAULT_HISTORY_CAPACITY: usize = 50;

/// What undo and redo restore.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UndoPolicy {
    /// Restore the rendered image only; the parameters stay where they are.
    #[default]
    RestorePixels,
    /// Restore the rendered image and the parameters it was rendered with.
    RestoreParameters,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid configuration: history_capacity must be at least 1")]
    ZeroHistoryCapacity,

    #[error("Invalid configuration: jpeg_quality must be within 1-100, got {0}")]
    JpegQuality(u8),

    #[error("Failed to parse configuration: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Tunables for an [`EditSession`](crate::EditSession).
///
/// Missing fields take their defaults, so `{}` is a valid configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SessionConfig {
    /// Maximum history snapshots, including the freshly loaded image.
    pub history_capacity: usize,
    /// Treatment of out-of-range slider values.
    pub parameter_policy: ParameterPolicy,
    pub undo_policy: UndoPolicy,
    /// Run the sharpen stage after blur.
    pub include_sharpen: bool,
    pub jpeg_quality: u8,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            history_capacity: DEFAULT_HISTORY_CAPACITY,
            parameter_policy: ParameterPolicy::default(),
            undo_policy: UndoPolicy::default(),
            include_sharpen: false,
            jpeg_quality: DEFAULT_JPEG_QUALITY,
        }
    }
}

impl SessionConfig {
    /// Parse and validate a JSON document.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a JSON file.
    pub fn from_json_file(path: &Path) -> Result<Self, ConfigError> {
        let json = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&json)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.history_capacity()?;
        if !(1..=100).contains(&self.jpeg_quality) {
            return Err(ConfigError::JpegQuality(self.jpeg_quality));
        }
        Ok(())
    }

    /// History capacity as a non-zero count.
    pub fn history_capacity(&self) -> Result<NonZeroUsize, ConfigError> {
        NonZeroUsize::new(self.history_capacity).ok_or(ConfigError::ZeroHistoryCapacity)
    }
}
