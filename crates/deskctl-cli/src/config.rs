//! Driver file for the `deskctl` binary.
//!
//! The file is optional.  Every section and field has a default, so an empty
//! file (or none at all) drives the protocol backend at `localhost:5900`.
//!
//! ```toml
//! [computer]
//! host = "10.0.0.7"
//! port = 5901
//! password = "secret"
//! display = ":99"        # exec backend only
//! container = "computer" # exec backend only
//!
//! [reconnect]            # all values in seconds
//! connect_timeout = 10
//! retry_backoff = 2
//! encoding_backoff = 5
//! liveness_interval = 1
//! frame_timeout = 5
//!
//! [screenshots]
//! dir = "./screenshots"
//! ```
//!
//! Command-line flags and `DESKCTL_*` variables are applied on top of the
//! file by `main`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use deskctl_core::{ComputerConfig, ReconnectPolicy};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors from loading the driver file.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error reading driver file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse driver file: {0}")]
    Parse(#[from] toml::de::Error),
}

// ── Schema ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DriverConfig {
    #[serde(default)]
    pub computer: ComputerConfig,
    #[serde(default)]
    pub reconnect: ReconnectSection,
    #[serde(default)]
    pub screenshots: ScreenshotSection,
}

/// Supervisor timings, in whole seconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconnectSection {
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout: u64,
    #[serde(default = "default_retry_backoff")]
    pub retry_backoff: u64,
    #[serde(default = "default_encoding_backoff")]
    pub encoding_backoff: u64,
    #[serde(default = "default_liveness_interval")]
    pub liveness_interval: u64,
    #[serde(default = "default_frame_timeout")]
    pub frame_timeout: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScreenshotSection {
    /// Directory screenshots are written to.
    #[serde(default = "default_screenshot_dir")]
    pub dir: PathBuf,
}

fn default_connect_timeout() -> u64 {
    10
}
fn default_retry_backoff() -> u64 {
    2
}
fn default_encoding_backoff() -> u64 {
    5
}
fn default_liveness_interval() -> u64 {
    1
}
fn default_frame_timeout() -> u64 {
    5
}
fn default_screenshot_dir() -> PathBuf {
    PathBuf::from(".")
}

impl Default for ReconnectSection {
    fn default() -> Self {
        Self {
            connect_timeout: default_connect_timeout(),
            retry_backoff: default_retry_backoff(),
            encoding_backoff: default_encoding_backoff(),
            liveness_interval: default_liveness_interval(),
            frame_timeout: default_frame_timeout(),
        }
    }
}

impl Default for ScreenshotSection {
    fn default() -> Self {
        Self {
            dir: default_screenshot_dir(),
        }
    }
}

impl ReconnectSection {
    /// Converts the section into the supervisor's policy.  A zero liveness
    /// interval is raised to one second; tokio intervals reject zero periods.
    pub fn to_policy(&self) -> ReconnectPolicy {
        ReconnectPolicy {
            connect_timeout: Duration::from_secs(self.connect_timeout),
            retry_backoff: Duration::from_secs(self.retry_backoff),
            encoding_backoff: Duration::from_secs(self.encoding_backoff),
            liveness_interval: Duration::from_secs(self.liveness_interval.max(1)),
            frame_timeout: Duration::from_secs(self.frame_timeout),
        }
    }
}

// ── Loading ───────────────────────────────────────────────────────────────────

impl DriverConfig {
    /// Parses a driver file's contents.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] if the TOML is malformed.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Reads `path`, or returns the defaults when no path is given.
    ///
    /// An explicitly named file that does not exist is an error.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read and
    /// [`ConfigError::Parse`] if it is malformed.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
