//! Domain entities for deskctl.
//!
//! Pure value types shared by both control backends.  Nothing in here touches
//! a socket, a process, or the clock, so every type can be unit-tested without
//! a display server.
//!
//! Outer layers (the backends, the facade, the CLI) depend on the domain; the
//! domain never depends on them.

/// Backend and reconnect configuration supplied by the external driver.
pub mod config;

/// Normalized input events and pointer buttons.
pub mod event;

/// Screen dimensions and pointer coordinates.
pub mod geometry;
