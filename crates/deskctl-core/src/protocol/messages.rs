//! RFB (remote framebuffer) message types.
//!
//! Covers the subset of RFC 6143 a screenshot-and-input client needs:
//! the version and security handshake, `ServerInit`, the client messages
//! `SetPixelFormat` / `SetEncodings` / `FramebufferUpdateRequest` /
//! `KeyEvent` / `PointerEvent`, and the headers of the four server messages.
//! All multi-byte integers are big-endian.

// ── Handshake constants ───────────────────────────────────────────────────────

/// Length of the `RFB xxx.yyy\n` version string.
pub const VERSION_LEN: usize = 12;

/// Length of an encoded pixel format.
pub const PIXEL_FORMAT_LEN: usize = 16;

/// Fixed part of `ServerInit` (everything before the desktop name).
pub const SERVER_INIT_HEADER_LEN: usize = 24;

/// Length of the VNC authentication challenge and response.
pub const VNC_AUTH_CHALLENGE_LEN: usize = 16;

// ── Server message header lengths (excluding the type byte) ───────────────────

/// `FramebufferUpdate`: padding (1) + rectangle count (2).
pub const UPDATE_HEADER_LEN: usize = 3;

/// Rectangle header: x, y, width, height (2 each) + encoding (4).
pub const RECT_HEADER_LEN: usize = 12;

/// `SetColourMapEntries`: padding (1) + first colour (2) + colour count (2).
pub const COLOUR_MAP_HEADER_LEN: usize = 5;

/// Size of one colour map entry: red, green, blue (2 each).
pub const COLOUR_MAP_ENTRY_LEN: usize = 6;

/// `ServerCutText`: padding (3) + text length (4).
pub const CUT_TEXT_HEADER_LEN: usize = 7;

/// Refuse server strings longer than this (desktop names, failure reasons).
pub const MAX_SERVER_STRING_LEN: usize = 64 * 1024;

// ── Protocol versions ─────────────────────────────────────────────────────────

/// Protocol versions the client can speak.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ProtocolVersion {
    V3_3,
    V3_7,
    V3_8,
}

impl ProtocolVersion {
    /// The 12-byte version string sent to the server.
    pub fn as_bytes(self) -> &'static [u8; VERSION_LEN] {
        match self {
            ProtocolVersion::V3_3 => b"RFB 003.003\n",
            ProtocolVersion::V3_7 => b"RFB 003.007\n",
            ProtocolVersion::V3_8 => b"RFB 003.008\n",
        }
    }
}

// ── Security ──────────────────────────────────────────────────────────────────

/// Security types the client can complete.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SecurityType {
    None = 1,
    VncAuthentication = 2,
}

impl TryFrom<u8> for SecurityType {
    type Error = ();

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(SecurityType::None),
            2 => Ok(SecurityType::VncAuthentication),
            _ => Err(()),
        }
    }
}

/// `SecurityResult` value meaning the handshake succeeded.
pub const SECURITY_RESULT_OK: u32 = 0;

// ── Encodings ─────────────────────────────────────────────────────────────────

/// Rectangle encoding identifiers.
pub mod encoding {
    pub const RAW: i32 = 0;
    pub const COPY_RECT: i32 = 1;
    /// Pseudo-encoding: the rectangle announces a new framebuffer size.
    pub const DESKTOP_SIZE: i32 = -223;
}

/// The encodings advertised in `SetEncodings`, in preference order.
pub const SUPPORTED_ENCODINGS: [i32; 3] = [
    encoding::COPY_RECT,
    encoding::RAW,
    encoding::DESKTOP_SIZE,
];

// ── Pixel format ──────────────────────────────────────────────────────────────

/// How the server lays out one pixel on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelFormat {
    pub bits_per_pixel: u8,
    pub depth: u8,
    pub big_endian: bool,
    pub true_colour: bool,
    pub red_max: u16,
    pub green_max: u16,
    pub blue_max: u16,
    pub red_shift: u8,
    pub green_shift: u8,
    pub blue_shift: u8,
}

impl PixelFormat {
    /// 32 bpp little-endian true colour, 8 bits per channel.  The client
    /// requests this format when the server's own cannot be decoded.
    pub const fn rgb888() -> Self {
        Self {
            bits_per_pixel: 32,
            depth: 24,
            big_endian: false,
            true_colour: true,
            red_max: 255,
            green_max: 255,
            blue_max: 255,
            red_shift: 16,
            green_shift: 8,
            blue_shift: 0,
        }
    }

    /// Bytes per pixel on the wire.
    pub fn bytes_per_pixel(&self) -> usize {
        usize::from(self.bits_per_pixel / 8)
    }
}

// ── ServerInit ────────────────────────────────────────────────────────────────

/// The server's description of its framebuffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerInit {
    pub width: u16,
    pub height: u16,
    pub pixel_format: PixelFormat,
    pub name: String,
}

// ── Client messages ───────────────────────────────────────────────────────────

/// Messages the client sends after initialisation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientMessage {
    SetPixelFormat(PixelFormat),
    SetEncodings(Vec<i32>),
    FramebufferUpdateRequest {
        incremental: bool,
        x: u16,
        y: u16,
        width: u16,
        height: u16,
    },
    KeyEvent {
        down: bool,
        keysym: u32,
    },
    PointerEvent {
        button_mask: u8,
        x: u16,
        y: u16,
    },
}

// ── Server messages ───────────────────────────────────────────────────────────

/// Server-to-client message type bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ServerMessageType {
    FramebufferUpdate = 0,
    SetColourMapEntries = 1,
    Bell = 2,
    ServerCutText = 3,
}

impl TryFrom<u8> for ServerMessageType {
    type Error = ();

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(ServerMessageType::FramebufferUpdate),
            1 => Ok(ServerMessageType::SetColourMapEntries),
            2 => Ok(ServerMessageType::Bell),
            3 => Ok(ServerMessageType::ServerCutText),
            _ => Err(()),
        }
    }
}

/// Header of one rectangle inside a `FramebufferUpdate`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RectangleHeader {
    pub x: u16,
    pub y: u16,
    pub width: u16,
    pub height: u16,
    pub encoding: i32,
}

impl RectangleHeader {
    /// Number of pixels covered by the rectangle.
    pub fn area(&self) -> usize {
        usize::from(self.width) * usize::from(self.height)
    }
}
