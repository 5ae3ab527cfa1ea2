//! deskctl-computer library entry point.
//!
//! Re-exports all public modules so that integration tests in `tests/`
//! and the `deskctl` binary share the same module tree.
//!
//! # What does deskctl-computer do?
//!
//! It turns a handful of high-level operations (`screenshot`, `click`,
//! `type`, `scroll`, `drag`, ...) into real input on a remote Linux desktop.
//!
//! 1. The caller builds a [`ComputerController`] around one backend.
//! 2. Every operation becomes a [`deskctl_core::NormalizedInputEvent`] and is
//!    handed to the backend under a per-controller operation lock.
//! 3. The **exec backend** turns the event into an `xdotool` command line and
//!    runs it inside a container with `docker compose exec`.
//! 4. The **protocol backend** turns it into RFB `PointerEvent` / `KeyEvent`
//!    messages on a live VNC session.  A [`ConnectionSupervisor`] keeps that
//!    session alive in a background task and reconnects after failures.
//! 5. Screenshots flow through the [`ScreenshotPipeline`], which writes a
//!    timestamped PNG and returns it base64-encoded.  Frames that cannot be
//!    decoded are replaced by a diagnostic placeholder image.

/// Application layer: the controller facade, backend contract and screenshots.
pub mod application;

/// Infrastructure layer: process execution and the RFB session.
pub mod infrastructure;

pub use application::computer::{ComputerBackend, ComputerController, ComputerError};
pub use application::screenshot::{RawCapture, Screenshot, ScreenshotPipeline};
pub use infrastructure::exec::{ExecBackedComputer, TokioCommandRunner};
pub use infrastructure::rfb::{ConnectionSupervisor, ProtocolBackedComputer, RfbConnector};
