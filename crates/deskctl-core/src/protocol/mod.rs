//! RFB wire protocol: message types, the byte codec, VNC authentication and
//! the client-side framebuffer.

pub mod auth;
pub mod codec;
pub mod framebuffer;
pub mod messages;

pub use auth::vnc_auth_response;
pub use codec::{decode_version, encode_client_message, ProtocolError};
pub use framebuffer::Framebuffer;
pub use messages::*;
