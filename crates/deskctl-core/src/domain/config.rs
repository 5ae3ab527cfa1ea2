//! Configuration types consumed by the backends.
//!
//! [`ComputerConfig`] and [`ReconnectPolicy`] are plain structs built by the
//! external driver and passed into backend constructors.  Nothing in the core
//! reads environment variables or files; the CLI crate is responsible for
//! populating these from its own configuration sources.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// X display used by the exec backend when none is configured.
pub const DEFAULT_DISPLAY: &str = ":99";

/// Compose service name used by the exec backend when none is configured.
pub const DEFAULT_CONTAINER: &str = "computer";

/// Default RFB port (display `:0`).
pub const DEFAULT_RFB_PORT: u16 = 5900;

/// Connection settings for one controller.
///
/// Immutable once handed to a backend; each controller owns its own copy.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComputerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    /// X display inside the container (exec backend only).
    #[serde(default)]
    pub display: Option<String>,
    /// Compose service hosting the display (exec backend only).
    #[serde(default)]
    pub container: Option<String>,
}

fn default_host() -> String {
    "localhost".to_string()
}

fn default_port() -> u16 {
    DEFAULT_RFB_PORT
}

impl ComputerConfig {
    /// Settings for a direct RFB session to `host:port`.
    pub fn protocol(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            username: None,
            password: None,
            display: None,
            container: None,
        }
    }

    /// Settings for the exec backend driving `display` inside `container`.
    pub fn exec(display: impl Into<String>, container: impl Into<String>) -> Self {
        Self {
            display: Some(display.into()),
            container: Some(container.into()),
            ..Self::default()
        }
    }

    pub fn with_username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }

    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    /// `host:port`, suitable for `TcpStream::connect`.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn display_or_default(&self) -> &str {
        self.display.as_deref().unwrap_or(DEFAULT_DISPLAY)
    }

    pub fn container_or_default(&self) -> &str {
        self.container.as_deref().unwrap_or(DEFAULT_CONTAINER)
    }
}

impl Default for ComputerConfig {
    fn default() -> Self {
        Self::protocol(default_host(), DEFAULT_RFB_PORT)
    }
}

// Manual impl so the password never ends up in logs.
impl fmt::Debug for ComputerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComputerConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("display", &self.display)
            .field("container", &self.container)
            .finish()
    }
}

/// Timing knobs for the protocol backend's connection supervisor.
///
/// | Field               | Default | Meaning                                         |
/// |---------------------|---------|-------------------------------------------------|
/// | `connect_timeout`   | 10 s    | how long an operation waits for a live session  |
/// | `retry_backoff`     | 2 s     | delay after a transient connect/transport error |
/// | `encoding_backoff`  | 5 s     | delay after an encoding-negotiation error       |
/// | `liveness_interval` | 1 s     | how often a published session is re-checked     |
/// | `frame_timeout`     | 5 s     | how long a screenshot waits for a frame update  |
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub connect_timeout: Duration,
    pub retry_backoff: Duration,
    pub encoding_backoff: Duration,
    pub liveness_interval: Duration,
    pub frame_timeout: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            retry_backoff: Duration::from_secs(2),
            encoding_backoff: Duration::from_secs(5),
            liveness_interval: Duration::from_secs(1),
            frame_timeout: Duration::from_secs(5),
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
