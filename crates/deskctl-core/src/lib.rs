//! # deskctl-core
//!
//! Shared library for deskctl containing the backend-agnostic domain types,
//! the input translation tables, and the RFB (remote framebuffer) wire codec.
//!
//! This crate has no dependencies on sockets, processes, or an async runtime.
//! The backends in `deskctl-computer` build on it.
//!
//! # Architecture overview
//!
//! deskctl lets an external driver (usually an LLM agent loop) operate a
//! remote Linux desktop through a small, fixed set of operations: take a
//! screenshot, click, type, scroll, drag, press keys.  Two transports can
//! carry those operations:
//!
//! - an **exec channel**: `xdotool` commands run inside a container that hosts
//!   a virtual X display;
//! - a **protocol session**: a direct RFB/VNC connection to the display server.
//!
//! This crate defines what both transports share:
//!
//! - **`domain`** – Pure value types: [`Dimensions`], [`Point`],
//!   [`PointerButton`], [`NormalizedInputEvent`], and the configuration structs.
//!
//! - **`keymap`** – The input translator.  Converts normalized key names
//!   (`"ENTER"`, `"CTRL"`, `"a"`) and buttons into what each backend expects:
//!   xdotool key names and button numbers, or X11 KeySyms and RFB button masks.
//!
//! - **`protocol`** – How RFB bytes look on the wire.  Client messages are
//!   encoded into byte vectors, server messages are decoded from byte slices.

pub mod domain;
pub mod keymap;
pub mod protocol;

pub use domain::config::{ComputerConfig, ReconnectPolicy};
pub use domain::event::{NormalizedInputEvent, PointerButton};
pub use domain::geometry::{Dimensions, Point, FALLBACK_DIMENSIONS};
pub use keymap::KeyMapper;
pub use protocol::codec::ProtocolError;
