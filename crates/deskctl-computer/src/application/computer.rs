//! ComputerController: the public operation surface.
//!
//! The controller owns one [`ComputerBackend`] and exposes the fixed
//! operation contract (`screenshot`, `click`, `double_click`, `scroll`,
//! `type_text`, `move_to`, `keypress`, `drag`, `wait`, `dimensions`,
//! `environment`).  Each operation:
//!
//! 1. takes the operation lock, so calls against one controller never
//!    interleave on the wire;
//! 2. logs one `info!` line describing the action;
//! 3. builds a [`NormalizedInputEvent`] and hands it to the backend.
//!
//! The operation lock also guards the dimension cache.

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use deskctl_core::keymap::UnknownKey;
use deskctl_core::{Dimensions, NormalizedInputEvent, Point, PointerButton, FALLBACK_DIMENSIONS};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::application::screenshot::{RawCapture, Screenshot, ScreenshotPipeline};

/// Errors surfaced by controller operations.
#[derive(Debug, Error)]
pub enum ComputerError {
    /// No session became ready within the patience window.
    #[error("no remote session became ready within {after:?}")]
    ConnectionTimeout { after: Duration },

    /// The controller was closed while the operation was pending.
    #[error("controller closed")]
    ConnectionClosed,

    /// The backend call failed after a session existed.
    #[error("transport error: {0}")]
    Transport(String),

    /// The remote display uses an encoding the client cannot decode.
    #[error("unsupported encoding: {0}")]
    UnsupportedEncoding(String),

    /// The button has no mapping on the active backend.  No backend call was issued.
    #[error("button {button} is not supported by the {backend} backend")]
    UnsupportedButton {
        button: PointerButton,
        backend: &'static str,
    },

    /// A key name could not be translated for the active backend.
    #[error(transparent)]
    UnknownKey(#[from] UnknownKey),

    /// The exec backend's container is not running.
    #[error("container {0} is not running; start it with docker compose")]
    ContainerNotRunning(String),

    /// The screenshot could not be encoded as PNG.
    #[error("failed to encode screenshot: {0}")]
    Image(#[from] image::ImageError),

    /// The screenshot file could not be written.
    #[error("failed to write screenshot {}: {source}", path.display())]
    Artifact {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// One transport that can carry normalized operations to a remote display.
#[async_trait]
pub trait ComputerBackend: Send + Sync {
    /// Short backend name used in logs and errors.
    fn name(&self) -> &'static str;

    /// The environment string reported to drivers.
    fn environment(&self) -> &'static str {
        "linux"
    }

    /// Performs one input action.
    async fn apply(&self, event: &NormalizedInputEvent) -> Result<(), ComputerError>;

    /// Grabs the current frame in whatever form the transport delivers it.
    async fn capture(&self) -> Result<RawCapture, ComputerError>;

    /// Pauses for `ms` milliseconds.
    async fn wait(&self, ms: u64) -> Result<(), ComputerError>;

    /// Asks the display for its size.  `Ok(None)` means no observation is
    /// possible right now (e.g. no live session).
    async fn query_dimensions(&self) -> Result<Option<Dimensions>, ComputerError>;

    /// Changes whenever a new remote session is established.  Dimensions
    /// cached under an older epoch are re-queried.
    fn session_epoch(&self) -> u64 {
        0
    }

    /// Releases the transport.
    async fn close(&self) -> Result<(), ComputerError>;
}

#[async_trait]
impl<B: ComputerBackend + ?Sized> ComputerBackend for Box<B> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn environment(&self) -> &'static str {
        (**self).environment()
    }

    async fn apply(&self, event: &NormalizedInputEvent) -> Result<(), ComputerError> {
        (**self).apply(event).await
    }

    async fn capture(&self) -> Result<RawCapture, ComputerError> {
        (**self).capture().await
    }

    async fn wait(&self, ms: u64) -> Result<(), ComputerError> {
        (**self).wait(ms).await
    }

    async fn query_dimensions(&self) -> Result<Option<Dimensions>, ComputerError> {
        (**self).query_dimensions().await
    }

    fn session_epoch(&self) -> u64 {
        (**self).session_epoch()
    }

    async fn close(&self) -> Result<(), ComputerError> {
        (**self).close().await
    }
}

/// Most recent display size and the session epoch it was observed under.
#[derive(Debug, Default)]
struct DimensionCache {
    observed: Option<Dimensions>,
    epoch: u64,
}

impl DimensionCache {
    fn fresh(&self, epoch: u64) -> Option<Dimensions> {
        self.observed.filter(|_| self.epoch == epoch)
    }

    fn observe(&mut self, epoch: u64, dims: Dimensions) {
        self.observed = Some(dims);
        self.epoch = epoch;
    }

    fn last_or_fallback(&self) -> Dimensions {
        self.observed.unwrap_or(FALLBACK_DIMENSIONS)
    }
}

/// The operation facade, generic over the backend.
pub struct ComputerController<B> {
    backend: B,
    pipeline: ScreenshotPipeline,
    op_lock: Mutex<DimensionCache>,
}

impl<B: ComputerBackend> ComputerController<B> {
    pub fn new(backend: B, pipeline: ScreenshotPipeline) -> Self {
        Self {
            backend,
            pipeline,
            op_lock: Mutex::new(DimensionCache::default()),
        }
    }

    /// The wrapped backend.
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Captures the current frame, persists it and returns it base64-encoded.
    ///
    /// Undecodable frames come back as a placeholder image, never as an error.
    ///
    /// # Errors
    ///
    /// Returns [`ComputerError`] if no session is available, the transport
    /// fails, or the artifact cannot be written.
    pub async fn screenshot(&self) -> Result<Screenshot, ComputerError> {
        let mut cache = self.op_lock.lock().await;
        info!(backend = self.backend.name(), "taking screenshot");

        let capture = self.backend.capture().await;
        let shot = self.pipeline.process(capture).await?;
        if !shot.placeholder {
            cache.observe(self.backend.session_epoch(), shot.dimensions);
        }
        info!(
            path = %shot.path.display(),
            dimensions = %shot.dimensions,
            placeholder = shot.placeholder,
            "screenshot saved"
        );
        Ok(shot)
    }

    /// Moves to `(x, y)` and clicks `button`.
    ///
    /// # Errors
    ///
    /// Returns [`ComputerError::UnsupportedButton`] if the backend has no
    /// mapping for `button`, or a connection/transport error.
    pub async fn click(&self, x: i32, y: i32, button: PointerButton) -> Result<(), ComputerError> {
        info!(x, y, %button, "clicking");
        self.dispatch(NormalizedInputEvent::Click {
            at: Point::new(x, y),
            button,
        })
        .await
    }

    /// Moves to `(x, y)` and left-clicks twice.
    pub async fn double_click(&self, x: i32, y: i32) -> Result<(), ComputerError> {
        info!(x, y, "double-clicking");
        self.dispatch(NormalizedInputEvent::DoubleClick {
            at: Point::new(x, y),
        })
        .await
    }

    /// Moves the pointer to `(x, y)`.
    pub async fn move_to(&self, x: i32, y: i32) -> Result<(), ComputerError> {
        info!(x, y, "moving pointer");
        self.dispatch(NormalizedInputEvent::Move {
            to: Point::new(x, y),
        })
        .await
    }

    /// Scrolls at `(x, y)`.  Deltas are in pixels; positive `dy` scrolls down.
    pub async fn scroll(&self, x: i32, y: i32, dx: i32, dy: i32) -> Result<(), ComputerError> {
        info!(x, y, dx, dy, "scrolling");
        self.dispatch(NormalizedInputEvent::Scroll {
            at: Point::new(x, y),
            dx,
            dy,
        })
        .await
    }

    /// Types `text` literally.
    pub async fn type_text(&self, text: &str) -> Result<(), ComputerError> {
        info!(chars = text.chars().count(), "typing");
        self.dispatch(NormalizedInputEvent::Type {
            text: text.to_string(),
        })
        .await
    }

    /// Presses `keys` together as one combination, in order.
    ///
    /// # Errors
    ///
    /// Returns [`ComputerError::UnknownKey`] if the protocol backend cannot
    /// resolve a key name.
    pub async fn keypress<S: AsRef<str>>(&self, keys: &[S]) -> Result<(), ComputerError> {
        let keys: Vec<String> = keys.iter().map(|k| k.as_ref().to_string()).collect();
        info!(keys = ?keys, "pressing keys");
        self.dispatch(NormalizedInputEvent::KeyPress { keys }).await
    }

    /// Presses the left button at `path[0]`, moves through the remaining
    /// points and releases at the last one.  Paths shorter than two points
    /// are ignored.
    pub async fn drag(&self, path: &[Point]) -> Result<(), ComputerError> {
        if path.len() < 2 {
            return Ok(());
        }
        info!(
            from = ?path[0],
            to = ?path[path.len() - 1],
            points = path.len(),
            "dragging"
        );
        self.dispatch(NormalizedInputEvent::Drag {
            path: path.to_vec(),
        })
        .await
    }

    /// Applies one event while holding the operation lock, so its wire
    /// messages never interleave with another operation's.
    async fn dispatch(&self, event: NormalizedInputEvent) -> Result<(), ComputerError> {
        let _guard = self.op_lock.lock().await;
        let kind = event.kind();
        debug!(backend = self.backend.name(), kind, "applying input event");
        self.backend.apply(&event).await.map_err(|e| {
            warn!(backend = self.backend.name(), kind, "input event failed: {e}");
            e
        })
    }

    /// Pauses for `ms` milliseconds.
    pub async fn wait(&self, ms: u64) -> Result<(), ComputerError> {
        let _guard = self.op_lock.lock().await;
        info!(ms, "waiting");
        self.backend.wait(ms).await
    }

    /// Display size: the cached value when it belongs to the current session,
    /// otherwise a fresh query.  Falls back to the most recent observation, or
    /// 1024×768 when the display has never been observed.
    pub async fn dimensions(&self) -> Dimensions {
        let mut cache = self.op_lock.lock().await;
        let epoch = self.backend.session_epoch();
        if let Some(dims) = cache.fresh(epoch) {
            return dims;
        }
        self.query_into(&mut cache, epoch).await
    }

    async fn query_into(&self, cache: &mut DimensionCache, epoch: u64) -> Dimensions {
        match self.backend.query_dimensions().await {
            Ok(Some(dims)) => {
                cache.observe(epoch, dims);
                dims
            }
            Ok(None) => cache.last_or_fallback(),
            Err(e) => {
                warn!(backend = self.backend.name(), "display size query failed: {e}");
                cache.last_or_fallback()
            }
        }
    }

    /// Always `"linux"`.
    pub fn environment(&self) -> &'static str {
        self.backend.environment()
    }

    /// Shuts the backend down.  Does not wait for the operation lock, so a
    /// call blocked waiting for a session is released with
    /// [`ComputerError::ConnectionClosed`].
    pub async fn close(&self) -> Result<(), ComputerError> {
        info!(backend = self.backend.name(), "closing controller");
        self.backend.close().await
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
    use std::sync::Mutex as StdMutex;

    // ── Recording backend ─────────────────────────────────────────────────────

    #[derive(Default)]
    struct RecordingBackend {
        events: StdMutex<Vec<NormalizedInputEvent>>,
        waits: StdMutex<Vec<u64>>,
        queries: AtomicUsize,
        epoch: AtomicU64,
        reported: StdMutex<Option<Dimensions>>,
        query_fails: bool,
        apply_fails: bool,
    }

    #[async_trait]
    impl ComputerBackend for RecordingBackend {
        fn name(&self) -> &'static str {
            "recording"
        }

        async fn apply(&self, event: &NormalizedInputEvent) -> Result<(), ComputerError> {
            if self.apply_fails {
                return Err(ComputerError::Transport("connection reset".to_string()));
            }
            self.events.lock().unwrap().push(event.clone());
            Ok(())
        }

        async fn capture(&self) -> Result<RawCapture, ComputerError> {
            Ok(RawCapture::Pixels {
                width: 2,
                height: 2,
                rgba: vec![0x80; 16],
            })
        }

        async fn wait(&self, ms: u64) -> Result<(), ComputerError> {
            self.waits.lock().unwrap().push(ms);
            Ok(())
        }

        async fn query_dimensions(&self) -> Result<Option<Dimensions>, ComputerError> {
            self.queries.fetch_add(1, Ordering::SeqCst);
            if self.query_fails {
                return Err(ComputerError::Transport("xdpyinfo missing".to_string()));
            }
            Ok(*self.reported.lock().unwrap())
        }

        fn session_epoch(&self) -> u64 {
            self.epoch.load(Ordering::SeqCst)
        }

        async fn close(&self) -> Result<(), ComputerError> {
            Ok(())
        }
    }

    fn controller(backend: RecordingBackend) -> (ComputerController<RecordingBackend>, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = ScreenshotPipeline::new(dir.path());
        (ComputerController::new(backend, pipeline), dir)
    }

    // ── Operations ────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_click_dispatches_one_click_event() {
        // Arrange
        let (ctl, _dir) = controller(RecordingBackend::default());

        // Act
        ctl.click(100, 200, PointerButton::Right).await.unwrap();

        // Assert
        let events = ctl.backend().events.lock().unwrap();
        assert_eq!(
            *events,
            vec![NormalizedInputEvent::Click {
                at: Point::new(100, 200),
                button: PointerButton::Right
            }]
        );
    }

    #[tokio::test]
    async fn test_drag_with_one_point_never_reaches_backend() {
        let (ctl, _dir) = controller(RecordingBackend::default());

        ctl.drag(&[Point::new(5, 5)]).await.unwrap();
        ctl.drag(&[]).await.unwrap();

        assert!(ctl.backend().events.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_keypress_preserves_key_order() {
        let (ctl, _dir) = controller(RecordingBackend::default());

        ctl.keypress(&["CTRL", "SHIFT", "T"]).await.unwrap();

        let events = ctl.backend().events.lock().unwrap();
        assert_eq!(
            *events,
            vec![NormalizedInputEvent::KeyPress {
                keys: vec!["CTRL".into(), "SHIFT".into(), "T".into()]
            }]
        );
    }

    #[tokio::test]
    async fn test_backend_failure_reaches_caller_and_releases_lock() {
        // Arrange
        let (ctl, _dir) = controller(RecordingBackend {
            apply_fails: true,
            ..Default::default()
        });

        // Act
        let first = ctl.move_to(1, 1).await;
        let second = ctl.double_click(2, 2).await;

        // Assert
        assert!(matches!(first, Err(ComputerError::Transport(ref m)) if m == "connection reset"));
        assert!(matches!(second, Err(ComputerError::Transport(_))));
    }

    #[tokio::test]
    async fn test_wait_goes_to_backend() {
        let (ctl, _dir) = controller(RecordingBackend::default());
        ctl.wait(250).await.unwrap();
        assert_eq!(*ctl.backend().waits.lock().unwrap(), vec![250]);
    }

    #[test]
    fn test_environment_is_linux() {
        let (ctl, _dir) = controller(RecordingBackend::default());
        assert_eq!(ctl.environment(), "linux");
    }

    // ── Dimensions ────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_dimensions_fall_back_before_any_observation() {
        let (ctl, _dir) = controller(RecordingBackend::default());
        assert_eq!(ctl.dimensions().await, Dimensions::new(1024, 768));
    }

    #[tokio::test]
    async fn test_dimensions_are_cached_within_one_epoch() {
        // Arrange
        let backend = RecordingBackend::default();
        *backend.reported.lock().unwrap() = Some(Dimensions::new(1280, 800));
        let (ctl, _dir) = controller(backend);

        // Act
        let first = ctl.dimensions().await;
        let second = ctl.dimensions().await;

        // Assert
        assert_eq!(first, Dimensions::new(1280, 800));
        assert_eq!(second, first);
        assert_eq!(ctl.backend().queries.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_new_epoch_invalidates_cached_dimensions() {
        // Arrange
        let backend = RecordingBackend::default();
        *backend.reported.lock().unwrap() = Some(Dimensions::new(1280, 800));
        let (ctl, _dir) = controller(backend);
        ctl.dimensions().await;

        // Act – a new session reports a different size
        *ctl.backend().reported.lock().unwrap() = Some(Dimensions::new(1920, 1080));
        ctl.backend().epoch.store(1, Ordering::SeqCst);
        let dims = ctl.dimensions().await;

        // Assert
        assert_eq!(dims, Dimensions::new(1920, 1080));
        assert_eq!(ctl.backend().queries.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_unobservable_display_keeps_last_observation() {
        let backend = RecordingBackend::default();
        *backend.reported.lock().unwrap() = Some(Dimensions::new(800, 600));
        let (ctl, _dir) = controller(backend);
        ctl.dimensions().await;

        *ctl.backend().reported.lock().unwrap() = None;
        ctl.backend().epoch.store(7, Ordering::SeqCst);

        assert_eq!(ctl.dimensions().await, Dimensions::new(800, 600));
    }

    #[tokio::test]
    async fn test_failed_query_falls_back_without_error() {
        let (ctl, _dir) = controller(RecordingBackend {
            query_fails: true,
            ..Default::default()
        });
        assert_eq!(ctl.dimensions().await, FALLBACK_DIMENSIONS);
    }

    #[tokio::test]
    async fn test_screenshot_records_observed_dimensions() {
        // Arrange
        let (ctl, _dir) = controller(RecordingBackend::default());

        // Act
        let shot = ctl.screenshot().await.unwrap();
        let dims = ctl.dimensions().await;

        // Assert – the frame size counts as an observation; no query needed
        assert!(!shot.placeholder);
        assert_eq!(dims, Dimensions::new(2, 2));
        assert_eq!(ctl.backend().queries.load(Ordering::SeqCst), 0);
    }
}
