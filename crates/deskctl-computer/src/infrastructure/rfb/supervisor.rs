//! ConnectionSupervisor: keeps one RFB session alive in the background.
//!
//! One supervisor task per controller runs the reconnect loop:
//!
//! ```text
//!   Connecting ──ok──▶ Connected ──session failed──▶ Backoff ──▶ Connecting
//!       │                                              ▲
//!       └────────────────────error────────────────────┘
//! ```
//!
//! The current session is published on a `watch` channel as a `Link`.
//! Operations call [`ConnectionSupervisor::ensure_connected`], which starts
//! the task on first use and waits (up to the connect timeout) for the link
//! to leave `Down`.  [`ConnectionSupervisor::close`] moves the link to
//! `Closed`, which wakes every waiter with [`ComputerError::ConnectionClosed`].
//!
//! Every session that gets published bumps the epoch, so callers can tell a
//! reconnect from the same session.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex as StdMutex, PoisonError};
use std::time::Duration;

use deskctl_core::ReconnectPolicy;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use super::{FailureKind, RemoteSession, SessionConnector};
use crate::application::computer::ComputerError;

/// Where the supervisor loop currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorState {
    /// No task has been started yet.
    Disconnected,
    Connecting,
    Connected,
    /// Waiting out the delay after a failure.
    Backoff,
    Closing,
    Closed,
}

/// The session slot operations wait on.
enum Link<S> {
    Down,
    Up(Arc<S>),
    Closed,
}

// Manual impl: `S` itself need not be `Clone`.
impl<S> Clone for Link<S> {
    fn clone(&self) -> Self {
        match self {
            Link::Down => Link::Down,
            Link::Up(session) => Link::Up(Arc::clone(session)),
            Link::Closed => Link::Closed,
        }
    }
}

/// State shared between the supervisor handle and its task.
struct Shared<S> {
    link: watch::Sender<Link<S>>,
    state: watch::Sender<SupervisorState>,
    shutdown: watch::Sender<bool>,
    epoch: AtomicU64,
    last_failure: StdMutex<Option<FailureKind>>,
}

impl<S> Shared<S> {
    fn set_state(&self, state: SupervisorState) {
        self.state.send_replace(state);
    }

    /// Makes `session` current and returns its epoch.  The epoch is bumped
    /// while the link is still locked, so a woken waiter never pairs the new
    /// session with the old epoch.  Refused once the supervisor is closed.
    fn publish(&self, session: Arc<S>) -> Option<u64> {
        let mut epoch = None;
        self.link.send_if_modified(|link| {
            if matches!(link, Link::Closed) {
                return false;
            }
            epoch = Some(self.epoch.fetch_add(1, Ordering::SeqCst) + 1);
            *link = Link::Up(session);
            true
        });
        epoch
    }

    /// Takes the current session down, unless the supervisor is closed.
    fn retract(&self) {
        self.link.send_if_modified(|link| {
            if matches!(link, Link::Up(_)) {
                *link = Link::Down;
                return true;
            }
            false
        });
    }

    fn set_last_failure(&self, failure: Option<FailureKind>) {
        *self
            .last_failure
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = failure;
    }
}

/// Owns the reconnect loop for one controller.
pub struct ConnectionSupervisor<C: SessionConnector> {
    connector: Arc<C>,
    policy: ReconnectPolicy,
    shared: Arc<Shared<C::Session>>,
    task: Mutex<Option<JoinHandle<()>>>,
    tasks_started: AtomicUsize,
}

impl<C: SessionConnector> ConnectionSupervisor<C> {
    /// Creates an idle supervisor.  No connection is attempted until the
    /// first [`ensure_connected`](Self::ensure_connected) or
    /// [`start`](Self::start).
    pub fn new(connector: C, policy: ReconnectPolicy) -> Self {
        Self {
            connector: Arc::new(connector),
            policy,
            shared: Arc::new(Shared {
                link: watch::channel(Link::Down).0,
                state: watch::channel(SupervisorState::Disconnected).0,
                shutdown: watch::channel(false).0,
                epoch: AtomicU64::new(0),
                last_failure: StdMutex::new(None),
            }),
            task: Mutex::new(None),
            tasks_started: AtomicUsize::new(0),
        }
    }

    pub fn policy(&self) -> &ReconnectPolicy {
        &self.policy
    }

    pub fn connector(&self) -> &C {
        &self.connector
    }

    /// Spawns the supervisor task unless it is already running or the
    /// supervisor has been closed.
    pub async fn start(&self) {
        let mut task = self.task.lock().await;
        if task.is_some() || *self.shared.shutdown.borrow() {
            return;
        }
        self.tasks_started.fetch_add(1, Ordering::SeqCst);
        info!("starting connection supervisor");
        *task = Some(tokio::spawn(supervise(
            Arc::clone(&self.connector),
            Arc::clone(&self.shared),
            self.policy,
        )));
    }

    /// Returns the live session, waiting up to the connect timeout for one.
    ///
    /// # Errors
    ///
    /// Returns [`ComputerError::ConnectionTimeout`] if no session is published
    /// in time and [`ComputerError::ConnectionClosed`] if the supervisor is
    /// closed before or while waiting.
    pub async fn ensure_connected(&self) -> Result<Arc<C::Session>, ComputerError> {
        let current = self.shared.link.borrow().clone();
        match current {
            Link::Up(session) if session.failure().is_none() => return Ok(session),
            Link::Closed => return Err(ComputerError::ConnectionClosed),
            // A failed session stays published until the liveness check
            // retracts it; wait for its replacement.
            Link::Up(_) | Link::Down => {}
        }

        self.start().await;
        let mut rx = self.shared.link.subscribe();
        let after = self.policy.connect_timeout;
        let waited = tokio::time::timeout(after, rx.wait_for(is_ready)).await;
        let link = match waited {
            Err(_) => {
                warn!(?after, "no RFB session became ready in time");
                return Err(ComputerError::ConnectionTimeout { after });
            }
            Ok(Err(_)) => return Err(ComputerError::ConnectionClosed),
            Ok(Ok(link)) => link.clone(),
        };
        match link {
            Link::Up(session) => Ok(session),
            Link::Down | Link::Closed => Err(ComputerError::ConnectionClosed),
        }
    }

    /// The published session, if any and not yet failed.  Never waits or
    /// connects.
    pub fn current(&self) -> Option<Arc<C::Session>> {
        match &*self.shared.link.borrow() {
            Link::Up(session) if session.failure().is_none() => Some(Arc::clone(session)),
            Link::Up(_) | Link::Down | Link::Closed => None,
        }
    }

    /// Number of sessions published so far.
    pub fn epoch(&self) -> u64 {
        self.shared.epoch.load(Ordering::SeqCst)
    }

    /// Kind of the most recent failure, cleared when a session is published.
    pub fn last_failure(&self) -> Option<FailureKind> {
        *self
            .shared
            .last_failure
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    pub fn state(&self) -> SupervisorState {
        *self.shared.state.borrow()
    }

    /// Follows state changes.
    pub fn watch_state(&self) -> watch::Receiver<SupervisorState> {
        self.shared.state.subscribe()
    }

    /// How many supervisor tasks have ever been spawned (at most one).
    pub fn tasks_started(&self) -> usize {
        self.tasks_started.load(Ordering::SeqCst)
    }

    /// Stops the loop, releases waiters and shuts the session down.
    /// Idempotent.
    pub async fn close(&self) {
        if *self.shared.shutdown.borrow() && self.state() == SupervisorState::Closed {
            return;
        }
        self.shared.shutdown.send_replace(true);
        self.shared.set_state(SupervisorState::Closing);
        let previous = self.shared.link.send_replace(Link::Closed);

        if let Some(handle) = self.task.lock().await.take() {
            handle.abort();
            let _ = handle.await;
        }
        if let Link::Up(session) = previous {
            session.shutdown().await;
        }
        self.shared.set_state(SupervisorState::Closed);
        info!("connection supervisor closed");
    }
}

impl<C: SessionConnector> Drop for ConnectionSupervisor<C> {
    fn drop(&mut self) {
        self.shared.shutdown.send_replace(true);
        if let Some(handle) = self.task.get_mut().take() {
            handle.abort();
        }
    }
}

// ── Supervisor task ───────────────────────────────────────────────────────────

async fn supervise<C: SessionConnector>(
    connector: Arc<C>,
    shared: Arc<Shared<C::Session>>,
    policy: ReconnectPolicy,
) {
    let mut shutdown = shared.shutdown.subscribe();
    loop {
        if *shutdown.borrow() {
            break;
        }
        shared.set_state(SupervisorState::Connecting);
        let attempt = tokio::select! {
            _ = shutdown_requested(&mut shutdown) => break,
            attempt = tokio::time::timeout(policy.connect_timeout, connector.connect()) => attempt,
        };

        let kind = match attempt {
            Ok(Ok(session)) => {
                let session = Arc::new(session);
                let Some(epoch) = shared.publish(Arc::clone(&session)) else {
                    session.shutdown().await;
                    break;
                };
                shared.set_last_failure(None);
                shared.set_state(SupervisorState::Connected);
                info!(id = %session.id(), epoch, "RFB session ready");

                let kind = tokio::select! {
                    _ = shutdown_requested(&mut shutdown) => break,
                    kind = watch_liveness(session.as_ref(), policy.liveness_interval) => kind,
                };
                // Record the failure before retracting, so nobody sees an
                // empty slot without a reason.
                shared.set_last_failure(Some(kind));
                shared.retract();
                session.shutdown().await;
                warn!(id = %session.id(), ?kind, "RFB session lost");
                kind
            }
            Ok(Err(e)) => {
                let kind = e.failure_kind();
                warn!(?kind, "RFB connection attempt failed: {e}");
                kind
            }
            Err(_) => {
                warn!(after = ?policy.connect_timeout, "RFB connection attempt timed out");
                FailureKind::Transient
            }
        };

        shared.set_last_failure(Some(kind));
        let delay = match kind {
            FailureKind::Transient => policy.retry_backoff,
            FailureKind::Encoding => policy.encoding_backoff,
        };
        shared.set_state(SupervisorState::Backoff);
        debug!(?delay, "backing off before reconnecting");
        tokio::select! {
            _ = shutdown_requested(&mut shutdown) => break,
            _ = tokio::time::sleep(delay) => {}
        }
    }
    debug!("supervisor loop stopped");
}

/// A waiter may proceed once the link holds a healthy session or is closed.
fn is_ready<S: RemoteSession>(link: &Link<S>) -> bool {
    match link {
        Link::Up(session) => session.failure().is_none(),
        Link::Down => false,
        Link::Closed => true,
    }
}

async fn shutdown_requested(rx: &mut watch::Receiver<bool>) {
    let _ = rx.wait_for(|closing| *closing).await;
}

/// Resolves with the failure kind once `session` reports one.
async fn watch_liveness<S: RemoteSession>(session: &S, every: Duration) -> FailureKind {
    let mut ticker = tokio::time::interval(every.max(Duration::from_millis(1)));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    loop {
        ticker.tick().await;
        if let Some(kind) = session.failure() {
            return kind;
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::rfb::mock::{MockConnector, MockSession, Script};
    use deskctl_core::Dimensions;

    fn fast_policy() -> ReconnectPolicy {
        ReconnectPolicy {
            connect_timeout: Duration::from_secs(10),
            retry_backoff: Duration::from_secs(2),
            encoding_backoff: Duration::from_secs(5),
            liveness_interval: Duration::from_millis(10),
            frame_timeout: Duration::from_secs(5),
        }
    }

    fn dims() -> Dimensions {
        Dimensions::new(64, 48)
    }

    #[tokio::test]
    async fn test_first_call_connects_and_publishes() {
        // Arrange
        let connector = MockConnector::new(dims());
        let supervisor = ConnectionSupervisor::new(connector.clone(), fast_policy());
        assert_eq!(supervisor.state(), SupervisorState::Disconnected);

        // Act
        let session = supervisor.ensure_connected().await.unwrap();

        // Assert
        assert_eq!(session.dimensions(), dims());
        assert_eq!(supervisor.epoch(), 1);
        assert_eq!(connector.attempts(), 1);
        assert_eq!(supervisor.tasks_started(), 1);
        assert!(supervisor.current().is_some());
    }

    #[tokio::test]
    async fn test_concurrent_callers_share_one_task_and_session() {
        let connector = MockConnector::new(dims());
        let supervisor = Arc::new(ConnectionSupervisor::new(connector.clone(), fast_policy()));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let sup = Arc::clone(&supervisor);
            handles.push(tokio::spawn(async move { sup.ensure_connected().await.map(|s| s.id()) }));
        }
        let mut ids = Vec::new();
        for handle in handles {
            ids.push(handle.await.unwrap().unwrap());
        }

        ids.dedup();
        assert_eq!(ids.len(), 1);
        assert_eq!(supervisor.tasks_started(), 1);
        assert_eq!(connector.attempts(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_failure_retries_after_short_backoff() {
        // Arrange – first attempt refused, second accepted
        let connector = MockConnector::new(dims()).then(Script::Refuse(FailureKind::Transient));
        let supervisor = ConnectionSupervisor::new(connector.clone(), fast_policy());
        let started = tokio::time::Instant::now();

        // Act
        supervisor.ensure_connected().await.unwrap();

        // Assert
        assert_eq!(connector.attempts(), 2);
        let waited = started.elapsed();
        assert!(waited >= Duration::from_secs(2), "waited {waited:?}");
        assert!(waited < Duration::from_secs(5), "waited {waited:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn test_encoding_failure_retries_after_long_backoff() {
        let connector = MockConnector::new(dims()).then(Script::Refuse(FailureKind::Encoding));
        let supervisor = ConnectionSupervisor::new(connector.clone(), fast_policy());
        let started = tokio::time::Instant::now();

        supervisor.ensure_connected().await.unwrap();

        assert_eq!(connector.attempts(), 2);
        assert!(started.elapsed() >= Duration::from_secs(5));
    }

    #[tokio::test(start_paused = true)]
    async fn test_times_out_when_server_never_answers() {
        // Arrange
        let connector = MockConnector::with_fallback(dims(), Script::Refuse(FailureKind::Transient));
        let supervisor = ConnectionSupervisor::new(connector.clone(), fast_policy());

        // Act
        let result = supervisor.ensure_connected().await;

        // Assert
        assert!(matches!(
            result,
            Err(ComputerError::ConnectionTimeout { after }) if after == Duration::from_secs(10)
        ));
        assert_eq!(supervisor.last_failure(), Some(FailureKind::Transient));
        assert!(connector.attempts() >= 4, "attempts: {}", connector.attempts());
    }

    #[tokio::test(start_paused = true)]
    async fn test_lost_session_is_replaced_with_new_epoch() {
        // Arrange
        let connector = MockConnector::new(dims());
        let supervisor = ConnectionSupervisor::new(connector.clone(), fast_policy());
        let first = supervisor.ensure_connected().await.unwrap();

        // Act – the server drops the session
        connector.latest().unwrap().fail(FailureKind::Transient);
        let mut state = supervisor.watch_state();
        state
            .wait_for(|s| *s == SupervisorState::Backoff)
            .await
            .unwrap();
        assert!(supervisor.current().is_none());
        let second = supervisor.ensure_connected().await.unwrap();

        // Assert
        assert_ne!(first.id(), second.id());
        assert_eq!(supervisor.epoch(), 2);
        assert!(connector.sessions()[0].is_shut_down());
        assert_eq!(supervisor.tasks_started(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_session_is_not_handed_out() {
        // Arrange
        let connector = MockConnector::new(dims());
        let supervisor = ConnectionSupervisor::new(connector.clone(), fast_policy());
        let first = supervisor.ensure_connected().await.unwrap();

        // Act – fail the session and ask again before the liveness check runs
        connector.latest().unwrap().fail(FailureKind::Transient);
        assert!(supervisor.current().is_none());
        let second = supervisor.ensure_connected().await.unwrap();

        // Assert
        assert_ne!(first.id(), second.id());
        assert!(second.failure().is_none());
        assert_eq!(supervisor.epoch(), 2);
        assert_eq!(connector.attempts(), 2);
    }

    #[tokio::test]
    async fn test_publish_bumps_epoch_before_waiters_see_session() {
        // Arrange
        let supervisor = ConnectionSupervisor::new(MockConnector::new(dims()), fast_policy());
        let shared = Arc::clone(&supervisor.shared);
        let mut rx = shared.link.subscribe();

        // Act
        let epoch = shared.publish(Arc::new(MockSession::new(dims())));

        // Assert
        assert_eq!(epoch, Some(1));
        assert!(rx.has_changed().unwrap());
        let seen = rx.borrow_and_update().clone();
        assert!(matches!(seen, Link::Up(_)));
        assert_eq!(supervisor.epoch(), 1);
    }

    #[tokio::test]
    async fn test_publish_after_close_is_refused_without_bumping_epoch() {
        let supervisor = ConnectionSupervisor::new(MockConnector::new(dims()), fast_policy());
        supervisor.close().await;

        let epoch = supervisor.shared.publish(Arc::new(MockSession::new(dims())));

        assert_eq!(epoch, None);
        assert_eq!(supervisor.epoch(), 0);
        assert!(supervisor.current().is_none());
    }

    #[tokio::test]
    async fn test_close_releases_waiters() {
        // Arrange – connect attempts never complete
        let connector = MockConnector::with_fallback(dims(), Script::Hang);
        let supervisor = Arc::new(ConnectionSupervisor::new(connector, fast_policy()));
        let waiter = {
            let sup = Arc::clone(&supervisor);
            tokio::spawn(async move { sup.ensure_connected().await })
        };
        let mut state = supervisor.watch_state();
        state
            .wait_for(|s| *s == SupervisorState::Connecting)
            .await
            .unwrap();

        // Act
        supervisor.close().await;

        // Assert
        let result = waiter.await.unwrap();
        assert!(matches!(result, Err(ComputerError::ConnectionClosed)));
        assert_eq!(supervisor.state(), SupervisorState::Closed);
    }

    #[tokio::test]
    async fn test_close_shuts_session_down_and_blocks_reuse() {
        let connector = MockConnector::new(dims());
        let supervisor = ConnectionSupervisor::new(connector.clone(), fast_policy());
        supervisor.ensure_connected().await.unwrap();

        supervisor.close().await;
        supervisor.close().await;

        assert!(connector.latest().unwrap().is_shut_down());
        assert!(matches!(
            supervisor.ensure_connected().await,
            Err(ComputerError::ConnectionClosed)
        ));
        assert_eq!(connector.attempts(), 1);
    }
}
