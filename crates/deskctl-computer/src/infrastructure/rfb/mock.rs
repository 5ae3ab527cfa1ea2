//! Scripted RFB connector and recording session for testing.
//!
//! # Why a mock session?
//!
//! The real [`RfbSession`](super::RfbSession) needs a VNC server on the other
//! end of a socket.  The supervisor's reconnect policy and the protocol
//! backend's event translation can be checked without one: [`MockConnector`]
//! follows a script of connect outcomes, and every [`MockSession`] it hands
//! out records the `PointerEvent` / `KeyEvent` / capture calls made on it.
//!
//! # Usage in tests
//!
//! ```ignore
//! let connector = MockConnector::new(Dimensions::new(64, 48))
//!     .then(Script::Refuse(FailureKind::Transient))
//!     .then(Script::Accept);
//! let computer = ProtocolBackedComputer::new(connector.clone(), policy);
//!
//! computer.apply(&event).await?;
//!
//! let session = connector.sessions().pop().unwrap();
//! assert_eq!(session.calls(), vec![SessionCall::Pointer { x: 10, y: 20, mask: 0 }]);
//! ```
//!
//! Both handles are cheap clones of shared state, so a test keeps one copy
//! while the supervisor owns the other.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use deskctl_core::{Dimensions, ProtocolError};
use uuid::Uuid;

use super::{FailureKind, Frame, RemoteSession, SessionConnector, SessionError};

/// ZRLE: a real encoding the client does not implement.
const ZRLE: i32 = 16;

/// Grey level of every pixel in a mock frame.
pub const MOCK_PIXEL: [u8; 4] = [0x80, 0x80, 0x80, 0xFF];

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

/// One scripted connect outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Script {
    /// Hand out a healthy session.
    Accept,
    /// Hand out a session whose server only speaks an unsupported encoding.
    AcceptUndecodable,
    /// Fail the attempt.
    Refuse(FailureKind),
    /// Never complete the attempt.
    Hang,
}

// ── Session ───────────────────────────────────────────────────────────────────

/// A call recorded by [`MockSession`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionCall {
    Pointer { x: u16, y: u16, mask: u8 },
    Key { keysym: u32, down: bool },
    Capture,
}

struct SessionInner {
    id: Uuid,
    dimensions: Dimensions,
    undecodable: bool,
    calls: Mutex<Vec<SessionCall>>,
    failure: Mutex<Option<FailureKind>>,
    shut_down: AtomicBool,
}

/// A recording session handle.
#[derive(Clone)]
pub struct MockSession {
    inner: Arc<SessionInner>,
}

impl MockSession {
    pub fn new(dimensions: Dimensions) -> Self {
        Self::build(dimensions, false)
    }

    fn build(dimensions: Dimensions, undecodable: bool) -> Self {
        Self {
            inner: Arc::new(SessionInner {
                id: Uuid::new_v4(),
                dimensions,
                undecodable,
                calls: Mutex::new(Vec::new()),
                failure: Mutex::new(None),
                shut_down: AtomicBool::new(false),
            }),
        }
    }

    /// Everything sent on this session so far, in order.
    pub fn calls(&self) -> Vec<SessionCall> {
        lock(&self.inner.calls).clone()
    }

    /// Only the pointer events, as `(x, y, mask)`.
    pub fn pointer_events(&self) -> Vec<(u16, u16, u8)> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                SessionCall::Pointer { x, y, mask } => Some((x, y, mask)),
                _ => None,
            })
            .collect()
    }

    /// Only the key events, as `(keysym, down)`.
    pub fn key_events(&self) -> Vec<(u32, bool)> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                SessionCall::Key { keysym, down } => Some((keysym, down)),
                _ => None,
            })
            .collect()
    }

    /// Simulates the server dropping the session.
    pub fn fail(&self, kind: FailureKind) {
        lock(&self.inner.failure).get_or_insert(kind);
    }

    pub fn is_shut_down(&self) -> bool {
        self.inner.shut_down.load(Ordering::SeqCst)
    }

    fn check_alive(&self) -> Result<(), SessionError> {
        match *lock(&self.inner.failure) {
            Some(kind) => Err(SessionError::Ended {
                kind,
                reason: "mock session failed".to_string(),
            }),
            None => Ok(()),
        }
    }

    fn record(&self, call: SessionCall) {
        lock(&self.inner.calls).push(call);
    }
}

#[async_trait]
impl RemoteSession for MockSession {
    fn id(&self) -> Uuid {
        self.inner.id
    }

    fn dimensions(&self) -> Dimensions {
        self.inner.dimensions
    }

    async fn pointer(&self, x: u16, y: u16, button_mask: u8) -> Result<(), SessionError> {
        self.check_alive()?;
        self.record(SessionCall::Pointer {
            x,
            y,
            mask: button_mask,
        });
        Ok(())
    }

    async fn key(&self, keysym: u32, down: bool) -> Result<(), SessionError> {
        self.check_alive()?;
        self.record(SessionCall::Key { keysym, down });
        Ok(())
    }

    async fn capture(&self, _timeout: Duration) -> Result<Frame, SessionError> {
        self.check_alive()?;
        self.record(SessionCall::Capture);
        if self.inner.undecodable {
            // The real session's reader dies on the first undecodable rectangle.
            self.fail(FailureKind::Encoding);
            return Err(ProtocolError::UnsupportedEncoding(ZRLE).into());
        }
        let Dimensions { width, height } = self.inner.dimensions;
        Ok(Frame {
            width,
            height,
            rgba: MOCK_PIXEL.repeat((width * height) as usize),
        })
    }

    fn failure(&self) -> Option<FailureKind> {
        *lock(&self.inner.failure)
    }

    async fn shutdown(&self) {
        self.inner.shut_down.store(true, Ordering::SeqCst);
        self.fail(FailureKind::Transient);
    }
}

// ── Connector ─────────────────────────────────────────────────────────────────

struct ConnectorInner {
    dimensions: Dimensions,
    script: Mutex<VecDeque<Script>>,
    fallback: Script,
    attempts: AtomicUsize,
    sessions: Mutex<Vec<MockSession>>,
}

/// A connector that follows a script of outcomes, then repeats a fallback.
#[derive(Clone)]
pub struct MockConnector {
    inner: Arc<ConnectorInner>,
}

impl MockConnector {
    /// Accepts every attempt with sessions of the given size.
    pub fn new(dimensions: Dimensions) -> Self {
        Self::with_fallback(dimensions, Script::Accept)
    }

    /// Uses `fallback` once the script runs out.
    pub fn with_fallback(dimensions: Dimensions, fallback: Script) -> Self {
        Self {
            inner: Arc::new(ConnectorInner {
                dimensions,
                script: Mutex::new(VecDeque::new()),
                fallback,
                attempts: AtomicUsize::new(0),
                sessions: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Appends one outcome to the script.
    pub fn then(self, step: Script) -> Self {
        lock(&self.inner.script).push_back(step);
        self
    }

    /// Connect attempts made so far.
    pub fn attempts(&self) -> usize {
        self.inner.attempts.load(Ordering::SeqCst)
    }

    /// Every session handed out, oldest first.
    pub fn sessions(&self) -> Vec<MockSession> {
        lock(&self.inner.sessions).clone()
    }

    /// The most recently handed-out session.
    pub fn latest(&self) -> Option<MockSession> {
        lock(&self.inner.sessions).last().cloned()
    }
}

#[async_trait]
impl SessionConnector for MockConnector {
    type Session = MockSession;

    async fn connect(&self) -> Result<MockSession, SessionError> {
        self.inner.attempts.fetch_add(1, Ordering::SeqCst);
        let step = lock(&self.inner.script)
            .pop_front()
            .unwrap_or(self.inner.fallback);
        match step {
            Script::Accept | Script::AcceptUndecodable => {
                let session =
                    MockSession::build(self.inner.dimensions, step == Script::AcceptUndecodable);
                lock(&self.inner.sessions).push(session.clone());
                Ok(session)
            }
            Script::Refuse(FailureKind::Transient) => Err(SessionError::Io(std::io::Error::from(
                std::io::ErrorKind::ConnectionRefused,
            ))),
            Script::Refuse(FailureKind::Encoding) => {
                Err(ProtocolError::UnsupportedPixelFormat("colour-mapped pixels".to_string()).into())
            }
            Script::Hang => std::future::pending().await,
        }
    }
}
