//! Binary codec for the RFB messages in [`crate::protocol::messages`].
//!
//! Everything here works on byte slices.  The session layer reads exactly the
//! number of bytes a header announces, then hands them to these functions, so
//! nothing in this module touches a socket.

use thiserror::Error;

use crate::protocol::messages::{
    ClientMessage, PixelFormat, ProtocolVersion, RectangleHeader, SecurityType, ServerInit,
    COLOUR_MAP_ENTRY_LEN, COLOUR_MAP_HEADER_LEN, CUT_TEXT_HEADER_LEN, MAX_SERVER_STRING_LEN,
    PIXEL_FORMAT_LEN, RECT_HEADER_LEN, SERVER_INIT_HEADER_LEN, UPDATE_HEADER_LEN, VERSION_LEN,
};

/// Errors that can occur during message encoding or decoding.
#[derive(Debug, Error, PartialEq)]
pub enum ProtocolError {
    /// The byte slice is shorter than the minimum required length.
    #[error("insufficient data: need at least {needed} bytes, got {available}")]
    InsufficientData { needed: usize, available: usize },

    /// The server's version string is not an RFB 3.x version.
    #[error("unsupported protocol version: {0:?}")]
    UnsupportedVersion(String),

    /// The server offered no security type the client can complete.
    #[error("no supported security type among {0:?}")]
    UnsupportedSecurity(Vec<u8>),

    /// The server message type byte is not a recognized value.
    #[error("unknown server message type: {0}")]
    UnknownMessageType(u8),

    /// A rectangle used an encoding the client never advertised.
    #[error("unsupported rectangle encoding: {0}")]
    UnsupportedEncoding(i32),

    /// The pixel format cannot be converted to RGBA.
    #[error("unsupported pixel format: {0}")]
    UnsupportedPixelFormat(String),

    /// The payload could not be parsed (field value out of range, UTF-8 error, etc.).
    #[error("malformed payload: {0}")]
    MalformedPayload(String),
}

// ── Handshake ─────────────────────────────────────────────────────────────────

/// Parses the server's `RFB xxx.yyy\n` greeting and picks the version the
/// client will answer with.
///
/// Minor versions below 7 fall back to 3.3 and anything from 8 up is answered
/// with 3.8, as RFC 6143 §7.1.1 requires.
///
/// # Errors
///
/// Returns [`ProtocolError::UnsupportedVersion`] if the greeting is not a
/// well-formed 3.x version string.
///
/// # Examples
///
/// ```rust
/// use deskctl_core::protocol::{decode_version, ProtocolVersion};
///
/// assert_eq!(decode_version(b"RFB 003.008\n").unwrap(), ProtocolVersion::V3_8);
/// assert_eq!(decode_version(b"RFB 003.889\n").unwrap(), ProtocolVersion::V3_8);
/// ```
pub fn decode_version(bytes: &[u8]) -> Result<ProtocolVersion, ProtocolError> {
    require_len(bytes, VERSION_LEN)?;
    let greeting = &bytes[..VERSION_LEN];
    let unsupported = || ProtocolError::UnsupportedVersion(String::from_utf8_lossy(greeting).into_owned());

    if &greeting[..4] != b"RFB " || greeting[7] != b'.' || greeting[11] != b'\n' {
        return Err(unsupported());
    }
    let major = parse_decimal(&greeting[4..7]).ok_or_else(unsupported)?;
    let minor = parse_decimal(&greeting[8..11]).ok_or_else(unsupported)?;
    if major != 3 {
        return Err(unsupported());
    }
    Ok(match minor {
        0..=6 => ProtocolVersion::V3_3,
        7 => ProtocolVersion::V3_7,
        _ => ProtocolVersion::V3_8,
    })
}

/// Picks the security type to use from the list a 3.7+ server offers.
///
/// `None` is preferred over VNC authentication.
///
/// # Errors
///
/// Returns [`ProtocolError::UnsupportedSecurity`] if neither is offered.
pub fn choose_security_type(offered: &[u8]) -> Result<SecurityType, ProtocolError> {
    [SecurityType::None, SecurityType::VncAuthentication]
        .into_iter()
        .find(|wanted| offered.contains(&(*wanted as u8)))
        .ok_or_else(|| ProtocolError::UnsupportedSecurity(offered.to_vec()))
}

/// Decodes a 3.3 server's single security type word.
///
/// Zero means the server refused the connection; the caller must then read a
/// failure reason.  Returns `Ok(None)` in that case.
///
/// # Errors
///
/// Returns [`ProtocolError::UnsupportedSecurity`] for types other than 1 and 2.
pub fn decode_security_word(bytes: &[u8]) -> Result<Option<SecurityType>, ProtocolError> {
    let word = read_u32(bytes, 0)?;
    if word == 0 {
        return Ok(None);
    }
    u8::try_from(word)
        .ok()
        .and_then(|b| SecurityType::try_from(b).ok())
        .map(Some)
        .ok_or_else(|| ProtocolError::UnsupportedSecurity(word.to_be_bytes().to_vec()))
}

/// Decodes the fixed 24-byte part of `ServerInit`.
///
/// Returns the message with an empty name and the length of the name that
/// follows on the wire.
///
/// # Errors
///
/// Returns [`ProtocolError`] if the slice is short or the name length is
/// implausibly large.
pub fn decode_server_init_header(bytes: &[u8]) -> Result<(ServerInit, usize), ProtocolError> {
    require_len(bytes, SERVER_INIT_HEADER_LEN)?;
    let width = read_u16(bytes, 0)?;
    let height = read_u16(bytes, 2)?;
    let pixel_format = decode_pixel_format(&bytes[4..4 + PIXEL_FORMAT_LEN])?;
    let name_len = read_string_len(bytes, 20)?;
    Ok((
        ServerInit {
            width,
            height,
            pixel_format,
            name: String::new(),
        },
        name_len,
    ))
}

/// Reads a 4-byte string length prefix (failure reasons, desktop names,
/// cut text) and rejects values above the client's limit.
///
/// # Errors
///
/// Returns [`ProtocolError::MalformedPayload`] if the length exceeds the limit.
pub fn read_string_len(bytes: &[u8], offset: usize) -> Result<usize, ProtocolError> {
    let len = read_u32(bytes, offset)? as usize;
    if len > MAX_SERVER_STRING_LEN {
        return Err(ProtocolError::MalformedPayload(format!(
            "string length {len} exceeds limit of {MAX_SERVER_STRING_LEN}"
        )));
    }
    Ok(len)
}

// ── Pixel format ──────────────────────────────────────────────────────────────

/// Encodes a pixel format into its 16-byte wire form.
pub fn encode_pixel_format(buf: &mut Vec<u8>, pf: &PixelFormat) {
    buf.push(pf.bits_per_pixel);
    buf.push(pf.depth);
    buf.push(u8::from(pf.big_endian));
    buf.push(u8::from(pf.true_colour));
    buf.extend_from_slice(&pf.red_max.to_be_bytes());
    buf.extend_from_slice(&pf.green_max.to_be_bytes());
    buf.extend_from_slice(&pf.blue_max.to_be_bytes());
    buf.push(pf.red_shift);
    buf.push(pf.green_shift);
    buf.push(pf.blue_shift);
    buf.extend_from_slice(&[0, 0, 0]); // padding
}

/// Decodes a 16-byte pixel format.
///
/// # Errors
///
/// Returns [`ProtocolError::InsufficientData`] if fewer than 16 bytes are given.
pub fn decode_pixel_format(bytes: &[u8]) -> Result<PixelFormat, ProtocolError> {
    require_len(bytes, PIXEL_FORMAT_LEN)?;
    Ok(PixelFormat {
        bits_per_pixel: bytes[0],
        depth: bytes[1],
        big_endian: bytes[2] != 0,
        true_colour: bytes[3] != 0,
        red_max: read_u16(bytes, 4)?,
        green_max: read_u16(bytes, 6)?,
        blue_max: read_u16(bytes, 8)?,
        red_shift: bytes[10],
        green_shift: bytes[11],
        blue_shift: bytes[12],
    })
}

/// Checks that pixels in `pf` can be converted to RGBA.
///
/// # Errors
///
/// Returns [`ProtocolError::UnsupportedPixelFormat`] for colour-mapped formats
/// and bit depths other than 8, 16 and 32.
pub fn validate_pixel_format(pf: &PixelFormat) -> Result<(), ProtocolError> {
    if !pf.true_colour {
        return Err(ProtocolError::UnsupportedPixelFormat(
            "colour-mapped pixels".to_string(),
        ));
    }
    if !matches!(pf.bits_per_pixel, 8 | 16 | 32) {
        return Err(ProtocolError::UnsupportedPixelFormat(format!(
            "{} bits per pixel",
            pf.bits_per_pixel
        )));
    }
    Ok(())
}

/// Converts one wire pixel to RGBA, scaling each channel to 0–255.
///
/// `pixel` must hold exactly [`PixelFormat::bytes_per_pixel`] bytes of a
/// format accepted by [`validate_pixel_format`].
pub fn pixel_to_rgba(pf: &PixelFormat, pixel: &[u8]) -> [u8; 4] {
    let value = match (pixel.len(), pf.big_endian) {
        (1, _) => u32::from(pixel[0]),
        (2, true) => u32::from(u16::from_be_bytes([pixel[0], pixel[1]])),
        (2, false) => u32::from(u16::from_le_bytes([pixel[0], pixel[1]])),
        (4, true) => u32::from_be_bytes([pixel[0], pixel[1], pixel[2], pixel[3]]),
        (4, false) => u32::from_le_bytes([pixel[0], pixel[1], pixel[2], pixel[3]]),
        _ => 0,
    };
    [
        scale_channel(value, pf.red_shift, pf.red_max),
        scale_channel(value, pf.green_shift, pf.green_max),
        scale_channel(value, pf.blue_shift, pf.blue_max),
        0xFF,
    ]
}

fn scale_channel(value: u32, shift: u8, max: u16) -> u8 {
    if max == 0 {
        return 0;
    }
    let max = u32::from(max);
    let raw = value.checked_shr(u32::from(shift)).unwrap_or(0) & max;
    (raw * 255 / max) as u8
}

// ── Client messages ───────────────────────────────────────────────────────────

/// Encodes a [`ClientMessage`] into its wire form.
///
/// # Examples
///
/// ```rust
/// use deskctl_core::protocol::{encode_client_message, ClientMessage};
///
/// let bytes = encode_client_message(&ClientMessage::PointerEvent { button_mask: 4, x: 100, y: 200 });
/// assert_eq!(bytes, vec![5, 4, 0, 100, 0, 200]);
/// ```
pub fn encode_client_message(msg: &ClientMessage) -> Vec<u8> {
    let mut buf = Vec::with_capacity(20);
    match msg {
        ClientMessage::SetPixelFormat(pf) => {
            buf.push(0);
            buf.extend_from_slice(&[0, 0, 0]); // padding
            encode_pixel_format(&mut buf, pf);
        }
        ClientMessage::SetEncodings(encodings) => {
            buf.push(2);
            buf.push(0); // padding
            let count = encodings.len().min(usize::from(u16::MAX)) as u16;
            buf.extend_from_slice(&count.to_be_bytes());
            for encoding in encodings.iter().take(usize::from(count)) {
                buf.extend_from_slice(&encoding.to_be_bytes());
            }
        }
        ClientMessage::FramebufferUpdateRequest {
            incremental,
            x,
            y,
            width,
            height,
        } => {
            buf.push(3);
            buf.push(u8::from(*incremental));
            buf.extend_from_slice(&x.to_be_bytes());
            buf.extend_from_slice(&y.to_be_bytes());
            buf.extend_from_slice(&width.to_be_bytes());
            buf.extend_from_slice(&height.to_be_bytes());
        }
        ClientMessage::KeyEvent { down, keysym } => {
            buf.push(4);
            buf.push(u8::from(*down));
            buf.extend_from_slice(&[0, 0]); // padding
            buf.extend_from_slice(&keysym.to_be_bytes());
        }
        ClientMessage::PointerEvent { button_mask, x, y } => {
            buf.push(5);
            buf.push(*button_mask);
            buf.extend_from_slice(&x.to_be_bytes());
            buf.extend_from_slice(&y.to_be_bytes());
        }
    }
    buf
}

// ── Server message headers ────────────────────────────────────────────────────

/// Decodes the `FramebufferUpdate` header that follows the type byte and
/// returns the number of rectangles.
///
/// # Errors
///
/// Returns [`ProtocolError::InsufficientData`] if the slice is short.
pub fn decode_update_header(bytes: &[u8]) -> Result<u16, ProtocolError> {
    require_len(bytes, UPDATE_HEADER_LEN)?;
    read_u16(bytes, 1)
}

/// Decodes a 12-byte rectangle header.
///
/// # Errors
///
/// Returns [`ProtocolError::InsufficientData`] if the slice is short.
pub fn decode_rectangle_header(bytes: &[u8]) -> Result<RectangleHeader, ProtocolError> {
    require_len(bytes, RECT_HEADER_LEN)?;
    Ok(RectangleHeader {
        x: read_u16(bytes, 0)?,
        y: read_u16(bytes, 2)?,
        width: read_u16(bytes, 4)?,
        height: read_u16(bytes, 6)?,
        encoding: read_u32(bytes, 8)? as i32,
    })
}

/// Decodes the `SetColourMapEntries` header that follows the type byte and
/// returns how many bytes of colour entries follow it.
///
/// # Errors
///
/// Returns [`ProtocolError::InsufficientData`] if the slice is short.
pub fn colour_map_payload_len(bytes: &[u8]) -> Result<usize, ProtocolError> {
    require_len(bytes, COLOUR_MAP_HEADER_LEN)?;
    let count = read_u16(bytes, 3)?;
    Ok(usize::from(count) * COLOUR_MAP_ENTRY_LEN)
}

/// Decodes the `ServerCutText` header that follows the type byte and returns
/// the length of the text that follows it.
///
/// # Errors
///
/// Returns [`ProtocolError`] if the slice is short or the length is too large.
pub fn cut_text_payload_len(bytes: &[u8]) -> Result<usize, ProtocolError> {
    require_len(bytes, CUT_TEXT_HEADER_LEN)?;
    read_string_len(bytes, 3)
}

// ── Primitive helpers ─────────────────────────────────────────────────────────

fn require_len(buf: &[u8], needed: usize) -> Result<(), ProtocolError> {
    if buf.len() < needed {
        Err(ProtocolError::InsufficientData {
            needed,
            available: buf.len(),
        })
    } else {
        Ok(())
    }
}

fn read_u16(buf: &[u8], offset: usize) -> Result<u16, ProtocolError> {
    require_len(buf, offset + 2)?;
    Ok(u16::from_be_bytes([buf[offset], buf[offset + 1]]))
}

fn read_u32(buf: &[u8], offset: usize) -> Result<u32, ProtocolError> {
    require_len(buf, offset + 4)?;
    Ok(u32::from_be_bytes([
        buf[offset],
        buf[offset + 1],
        buf[offset + 2],
        buf[offset + 3],
    ]))
}

fn parse_decimal(digits: &[u8]) -> Option<u32> {
    digits.iter().try_fold(0u32, |acc, &d| {
        d.is_ascii_digit().then(|| acc * 10 + u32::from(d - b'0'))
    })
}

// ── Tests ─────────────────────────────────────────────────────────────────────
