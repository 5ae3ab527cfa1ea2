//! Infrastructure layer: the two transports.
//!
//! **Dependency rule**: this layer may depend on `application` and
//! `deskctl_core`, but MUST NOT be imported by the `application` layer.
//!
//! # Sub-modules
//!
//! - **`exec`** – Runs `xdotool` command lines inside a container through
//!   `docker compose exec`.  One awaited command per operation; no session.
//!
//! - **`rfb`** – Speaks RFB directly to a VNC server.  Owns the TCP session,
//!   the connection supervisor that keeps it alive, and a recording mock
//!   session for tests.

pub mod exec;
pub mod rfb;
