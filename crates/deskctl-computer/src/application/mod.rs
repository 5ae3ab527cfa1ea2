//! Application layer.
//!
//! - **`computer`** – The [`computer::ComputerBackend`] contract both
//!   transports implement, and the [`computer::ComputerController`] facade that
//!   serializes operations and caches display dimensions.
//!
//! - **`screenshot`** – Capture → decode → persist → base64.  Falls back to a
//!   placeholder image when a frame cannot be decoded.
//!
//! - **`placeholder`** – Renders that placeholder with a built-in bitmap font.

pub mod computer;
pub mod placeholder;
pub mod screenshot;
