//! Protocol backend: a direct RFB session to a VNC server.
//!
//! Architecture:
//! - [`SessionConnector`] performs the handshake and yields a
//!   [`RemoteSession`].  [`RfbConnector`] does this over TCP; the
//!   [`mock`] module provides a scripted one for tests.
//! - [`ConnectionSupervisor`] owns the reconnect loop.  It publishes the
//!   current session (or its absence) on a `watch` channel that operations
//!   wait on.
//! - [`ProtocolBackedComputer`] turns normalized events into `PointerEvent`
//!   and `KeyEvent` messages on whichever session is current.

pub mod computer;
pub mod mock;
pub mod session;
pub mod supervisor;

use std::time::Duration;

use async_trait::async_trait;
use deskctl_core::{Dimensions, ProtocolError};
use thiserror::Error;
use uuid::Uuid;

pub use computer::ProtocolBackedComputer;
pub use session::{RfbConnector, RfbSession};
pub use supervisor::{ConnectionSupervisor, SupervisorState};

/// How a session failure affects the reconnect delay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Network or handshake trouble; retried after the short backoff.
    Transient,
    /// The server insists on an encoding or pixel format the client cannot
    /// decode; retried after the long backoff.
    Encoding,
}

/// Errors raised while establishing or using an RFB session.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// The server rejected the connection or the credentials.
    #[error("authentication failed: {0}")]
    Authentication(String),

    /// No framebuffer update arrived in time.
    #[error("timed out waiting for a framebuffer update after {0:?}")]
    FrameTimeout(Duration),

    /// The session has ended (server hung up, decoding failed, or it was
    /// shut down).
    #[error("session ended: {reason}")]
    Ended { kind: FailureKind, reason: String },
}

impl SessionError {
    pub fn failure_kind(&self) -> FailureKind {
        match self {
            SessionError::Protocol(
                ProtocolError::UnsupportedEncoding(_) | ProtocolError::UnsupportedPixelFormat(_),
            ) => FailureKind::Encoding,
            SessionError::Ended { kind, .. } => *kind,
            _ => FailureKind::Transient,
        }
    }
}

/// One raw framebuffer snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub width: u32,
    pub height: u32,
    /// Row-major RGBA.
    pub rgba: Vec<u8>,
}

/// A live, initialised RFB session.
#[async_trait]
pub trait RemoteSession: Send + Sync + 'static {
    /// Unique per established session.
    fn id(&self) -> Uuid;

    /// Framebuffer size as last announced by the server.
    fn dimensions(&self) -> Dimensions;

    /// Sends one `PointerEvent`.
    async fn pointer(&self, x: u16, y: u16, button_mask: u8) -> Result<(), SessionError>;

    /// Sends one `KeyEvent`.
    async fn key(&self, keysym: u32, down: bool) -> Result<(), SessionError>;

    /// Requests a full update and returns the framebuffer once it arrives.
    async fn capture(&self, timeout: Duration) -> Result<Frame, SessionError>;

    /// Why the session died, if it has.  Polled by the supervisor.
    fn failure(&self) -> Option<FailureKind>;

    /// Closes the session.  Idempotent.
    async fn shutdown(&self);
}

/// Establishes new sessions.
#[async_trait]
pub trait SessionConnector: Send + Sync + 'static {
    type Session: RemoteSession;

    async fn connect(&self) -> Result<Self::Session, SessionError>;
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encoding_errors_use_long_backoff() {
        let err = SessionError::Protocol(ProtocolError::UnsupportedEncoding(7));
        assert_eq!(err.failure_kind(), FailureKind::Encoding);

        let err = SessionError::Protocol(ProtocolError::UnsupportedPixelFormat("8 bpp".into()));
        assert_eq!(err.failure_kind(), FailureKind::Encoding);
    }

    #[test]
    fn test_other_errors_are_transient() {
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused");
        assert_eq!(SessionError::Io(io).failure_kind(), FailureKind::Transient);
        assert_eq!(
            SessionError::Authentication("bad password".into()).failure_kind(),
            FailureKind::Transient
        );
    }

    #[test]
    fn test_ended_session_keeps_its_kind() {
        let err = SessionError::Ended {
            kind: FailureKind::Encoding,
            reason: "unsupported encoding 16".into(),
        };
        assert_eq!(err.failure_kind(), FailureKind::Encoding);
    }
}
