//! RFB over TCP: the client handshake and one live session.
//!
//! Handshake, in order:
//! 1. version exchange (3.3, 3.7 or 3.8, whichever the server offers);
//! 2. security negotiation, `None` preferred over VNC authentication;
//! 3. `SecurityResult` (always after VNC auth, and after `None` on 3.8);
//! 4. `ClientInit` (shared) and `ServerInit`;
//! 5. `SetPixelFormat` and `SetEncodings`.  The server's own pixel format is
//!    kept when it is true colour at 8, 16 or 32 bpp; otherwise the client
//!    asks for 32 bpp true colour.
//!
//! After the handshake a reader task owns the read half of the socket.  It
//! applies `FramebufferUpdate` rectangles to a shared [`Framebuffer`] and
//! publishes an update counter on a `watch` channel, so `capture` can wait for
//! the next completed update without polling.

use std::sync::{Arc, Mutex as StdMutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use deskctl_core::protocol::codec::{
    choose_security_type, colour_map_payload_len, cut_text_payload_len, decode_rectangle_header,
    decode_security_word, decode_server_init_header, decode_update_header, read_string_len,
    validate_pixel_format,
};
use deskctl_core::protocol::{
    decode_version, encode_client_message, encoding, vnc_auth_response, ClientMessage, Framebuffer,
    PixelFormat, ProtocolVersion, SecurityType, ServerMessageType, COLOUR_MAP_HEADER_LEN,
    CUT_TEXT_HEADER_LEN, RECT_HEADER_LEN, SECURITY_RESULT_OK, SERVER_INIT_HEADER_LEN,
    SUPPORTED_ENCODINGS, UPDATE_HEADER_LEN, VERSION_LEN, VNC_AUTH_CHALLENGE_LEN,
};
use deskctl_core::{ComputerConfig, Dimensions, ProtocolError};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::{FailureKind, Frame, RemoteSession, SessionConnector, SessionError};

// ── Connector ─────────────────────────────────────────────────────────────────

/// Opens RFB sessions to the configured `host:port`.
#[derive(Debug, Clone)]
pub struct RfbConnector {
    config: ComputerConfig,
}

impl RfbConnector {
    pub fn new(config: ComputerConfig) -> Self {
        if config.username.is_some() {
            debug!("username is configured but RFB security types 1 and 2 do not use it");
        }
        Self { config }
    }

    pub fn config(&self) -> &ComputerConfig {
        &self.config
    }
}

#[async_trait]
impl SessionConnector for RfbConnector {
    type Session = RfbSession;

    async fn connect(&self) -> Result<RfbSession, SessionError> {
        let addr = self.config.address();
        debug!(%addr, "opening RFB connection");
        let stream = TcpStream::connect(&addr).await?;
        stream.set_nodelay(true)?;
        RfbSession::handshake(stream, self.config.password.as_deref()).await
    }
}

// ── Session ───────────────────────────────────────────────────────────────────

/// What the reader task has observed so far.
#[derive(Debug, Clone, Default)]
struct ReaderState {
    /// Completed `FramebufferUpdate` messages.
    updates: u64,
    failure: Option<(FailureKind, String)>,
}

/// A live RFB session over TCP.
pub struct RfbSession {
    id: Uuid,
    name: String,
    writer: Mutex<OwnedWriteHalf>,
    framebuffer: Arc<StdMutex<Framebuffer>>,
    state: Arc<watch::Sender<ReaderState>>,
    reader: JoinHandle<()>,
}

impl RfbSession {
    /// Runs the client handshake on a connected stream and starts the reader.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Authentication`] if the server refuses the
    /// connection or the password, and [`SessionError::Protocol`] for
    /// anything the client cannot speak.
    pub async fn handshake(stream: TcpStream, password: Option<&str>) -> Result<Self, SessionError> {
        let (mut reader, mut writer) = stream.into_split();

        let mut greeting = [0u8; VERSION_LEN];
        reader.read_exact(&mut greeting).await?;
        let version = decode_version(&greeting)?;
        writer.write_all(version.as_bytes()).await?;
        debug!(?version, "protocol version agreed");

        let security = negotiate_security(&mut reader, &mut writer, version).await?;
        if security == SecurityType::VncAuthentication {
            let password = password.ok_or_else(|| {
                SessionError::Authentication(
                    "server requires VNC authentication but no password is configured".to_string(),
                )
            })?;
            let mut challenge = [0u8; VNC_AUTH_CHALLENGE_LEN];
            reader.read_exact(&mut challenge).await?;
            writer
                .write_all(&vnc_auth_response(password, &challenge))
                .await?;
        }
        if security == SecurityType::VncAuthentication || version == ProtocolVersion::V3_8 {
            read_security_result(&mut reader, version).await?;
        }

        // ClientInit: shared-flag = 1, so other viewers stay connected.
        writer.write_all(&[1]).await?;

        let mut header = [0u8; SERVER_INIT_HEADER_LEN];
        reader.read_exact(&mut header).await?;
        let (mut init, name_len) = decode_server_init_header(&header)?;
        init.name = read_text(&mut reader, name_len).await?;

        let pixel_format = negotiated_pixel_format(&init.pixel_format);
        let mut setup = encode_client_message(&ClientMessage::SetPixelFormat(pixel_format));
        setup.extend(encode_client_message(&ClientMessage::SetEncodings(
            SUPPORTED_ENCODINGS.to_vec(),
        )));
        writer.write_all(&setup).await?;

        let id = Uuid::new_v4();
        info!(
            %id,
            name = %init.name,
            width = init.width,
            height = init.height,
            "RFB session established"
        );

        let framebuffer = Arc::new(StdMutex::new(Framebuffer::new(init.width, init.height)));
        let (state, _) = watch::channel(ReaderState::default());
        let state = Arc::new(state);
        let reader = tokio::spawn(read_loop(
            reader,
            Arc::clone(&framebuffer),
            Arc::clone(&state),
            pixel_format,
        ));

        Ok(Self {
            id,
            name: init.name,
            writer: Mutex::new(writer),
            framebuffer,
            state,
            reader,
        })
    }

    /// The desktop name from `ServerInit`.
    pub fn name(&self) -> &str {
        &self.name
    }

    fn ended(&self) -> Option<SessionError> {
        self.state
            .borrow()
            .failure
            .as_ref()
            .map(|(kind, reason)| SessionError::Ended {
                kind: *kind,
                reason: reason.clone(),
            })
    }

    fn mark_failed(&self, kind: FailureKind, reason: String) {
        self.state.send_if_modified(|s| {
            if s.failure.is_some() {
                return false;
            }
            s.failure = Some((kind, reason));
            true
        });
    }

    async fn send(&self, msg: &ClientMessage) -> Result<(), SessionError> {
        if let Some(err) = self.ended() {
            return Err(err);
        }
        let bytes = encode_client_message(msg);
        let mut writer = self.writer.lock().await;
        if let Err(e) = writer.write_all(&bytes).await {
            self.mark_failed(FailureKind::Transient, format!("write failed: {e}"));
            return Err(e.into());
        }
        Ok(())
    }
}

impl Drop for RfbSession {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

#[async_trait]
impl RemoteSession for RfbSession {
    fn id(&self) -> Uuid {
        self.id
    }

    fn dimensions(&self) -> Dimensions {
        let fb = lock(&self.framebuffer);
        Dimensions::new(u32::from(fb.width()), u32::from(fb.height()))
    }

    async fn pointer(&self, x: u16, y: u16, button_mask: u8) -> Result<(), SessionError> {
        self.send(&ClientMessage::PointerEvent { button_mask, x, y })
            .await
    }

    async fn key(&self, keysym: u32, down: bool) -> Result<(), SessionError> {
        self.send(&ClientMessage::KeyEvent { down, keysym }).await
    }

    async fn capture(&self, timeout: Duration) -> Result<Frame, SessionError> {
        let mut rx = self.state.subscribe();
        let seen = rx.borrow_and_update().updates;
        let (width, height) = {
            let fb = lock(&self.framebuffer);
            (fb.width(), fb.height())
        };
        self.send(&ClientMessage::FramebufferUpdateRequest {
            incremental: false,
            x: 0,
            y: 0,
            width,
            height,
        })
        .await?;

        let waited = tokio::time::timeout(
            timeout,
            rx.wait_for(|s| s.updates > seen || s.failure.is_some()),
        )
        .await;
        let failure = match waited {
            Err(_) => return Err(SessionError::FrameTimeout(timeout)),
            Ok(Err(_)) => Some((FailureKind::Transient, "reader stopped".to_string())),
            Ok(Ok(state)) => state.failure.clone(),
        };
        if let Some((kind, reason)) = failure {
            return Err(SessionError::Ended { kind, reason });
        }

        let fb = lock(&self.framebuffer);
        Ok(Frame {
            width: u32::from(fb.width()),
            height: u32::from(fb.height()),
            rgba: fb.rgba().to_vec(),
        })
    }

    fn failure(&self) -> Option<FailureKind> {
        self.state.borrow().failure.as_ref().map(|(kind, _)| *kind)
    }

    async fn shutdown(&self) {
        self.reader.abort();
        self.mark_failed(FailureKind::Transient, "session shut down".to_string());
        let mut writer = self.writer.lock().await;
        if let Err(e) = writer.shutdown().await {
            debug!(id = %self.id, "socket shutdown: {e}");
        }
    }
}

// ── Handshake helpers ─────────────────────────────────────────────────────────

async fn negotiate_security<R, W>(
    reader: &mut R,
    writer: &mut W,
    version: ProtocolVersion,
) -> Result<SecurityType, SessionError>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    if version == ProtocolVersion::V3_3 {
        let mut word = [0u8; 4];
        reader.read_exact(&mut word).await?;
        return match decode_security_word(&word)? {
            Some(security) => Ok(security),
            None => Err(SessionError::Authentication(read_reason(reader).await?)),
        };
    }

    let mut count = [0u8; 1];
    reader.read_exact(&mut count).await?;
    if count[0] == 0 {
        return Err(SessionError::Authentication(read_reason(reader).await?));
    }
    let mut offered = vec![0u8; usize::from(count[0])];
    reader.read_exact(&mut offered).await?;
    let security = choose_security_type(&offered)?;
    writer.write_all(&[security as u8]).await?;
    debug!(?offered, ?security, "security type chosen");
    Ok(security)
}

async fn read_security_result<R>(reader: &mut R, version: ProtocolVersion) -> Result<(), SessionError>
where
    R: AsyncRead + Unpin,
{
    let mut result = [0u8; 4];
    reader.read_exact(&mut result).await?;
    if u32::from_be_bytes(result) == SECURITY_RESULT_OK {
        return Ok(());
    }
    // Only 3.8 servers explain a failed SecurityResult.
    let reason = if version == ProtocolVersion::V3_8 {
        read_reason(reader).await?
    } else {
        "security handshake rejected".to_string()
    };
    Err(SessionError::Authentication(reason))
}

/// Reads a length-prefixed failure reason.
async fn read_reason<R: AsyncRead + Unpin>(reader: &mut R) -> Result<String, SessionError> {
    let mut len = [0u8; 4];
    reader.read_exact(&mut len).await?;
    let len = read_string_len(&len, 0)?;
    read_text(reader, len).await
}

async fn read_text<R: AsyncRead + Unpin>(reader: &mut R, len: usize) -> Result<String, SessionError> {
    let mut text = vec![0u8; len];
    reader.read_exact(&mut text).await?;
    Ok(String::from_utf8_lossy(&text).into_owned())
}

// ── Reader task ───────────────────────────────────────────────────────────────

fn lock(fb: &StdMutex<Framebuffer>) -> MutexGuard<'_, Framebuffer> {
    fb.lock().unwrap_or_else(PoisonError::into_inner)
}

async fn read_loop(
    mut reader: OwnedReadHalf,
    framebuffer: Arc<StdMutex<Framebuffer>>,
    state: Arc<watch::Sender<ReaderState>>,
    pixel_format: PixelFormat,
) {
    let err = loop {
        match read_server_message(&mut reader, &framebuffer, &pixel_format).await {
            Ok(true) => state.send_modify(|s| s.updates += 1),
            Ok(false) => {}
            Err(e) => break e,
        }
    };
    let kind = err.failure_kind();
    warn!(?kind, "RFB session ended: {err}");
    state.send_if_modified(|s| {
        if s.failure.is_some() {
            return false;
        }
        s.failure = Some((kind, err.to_string()));
        true
    });
}

/// Reads one server message.  Returns `true` once a `FramebufferUpdate` has
/// been fully applied.
async fn read_server_message(
    reader: &mut OwnedReadHalf,
    framebuffer: &StdMutex<Framebuffer>,
    pixel_format: &PixelFormat,
) -> Result<bool, SessionError> {
    let mut kind = [0u8; 1];
    reader.read_exact(&mut kind).await?;
    match ServerMessageType::try_from(kind[0]) {
        Ok(ServerMessageType::FramebufferUpdate) => {
            read_update(reader, framebuffer, pixel_format).await?;
            Ok(true)
        }
        Ok(ServerMessageType::SetColourMapEntries) => {
            let mut header = [0u8; COLOUR_MAP_HEADER_LEN];
            reader.read_exact(&mut header).await?;
            skip(reader, colour_map_payload_len(&header)?).await?;
            Ok(false)
        }
        Ok(ServerMessageType::Bell) => Ok(false),
        Ok(ServerMessageType::ServerCutText) => {
            let mut header = [0u8; CUT_TEXT_HEADER_LEN];
            reader.read_exact(&mut header).await?;
            skip(reader, cut_text_payload_len(&header)?).await?;
            Ok(false)
        }
        Err(()) => Err(ProtocolError::UnknownMessageType(kind[0]).into()),
    }
}

async fn read_update(
    reader: &mut OwnedReadHalf,
    framebuffer: &StdMutex<Framebuffer>,
    pixel_format: &PixelFormat,
) -> Result<(), SessionError> {
    let mut header = [0u8; UPDATE_HEADER_LEN];
    reader.read_exact(&mut header).await?;
    let rects = decode_update_header(&header)?;

    for _ in 0..rects {
        let mut rect_header = [0u8; RECT_HEADER_LEN];
        reader.read_exact(&mut rect_header).await?;
        let rect = decode_rectangle_header(&rect_header)?;

        match rect.encoding {
            encoding::RAW => {
                let fits = lock(framebuffer).contains(&rect);
                if !fits {
                    return Err(ProtocolError::MalformedPayload(format!(
                        "raw rectangle {}x{}+{}+{} outside framebuffer",
                        rect.width, rect.height, rect.x, rect.y
                    ))
                    .into());
                }
                let mut pixels = vec![0u8; rect.area() * pixel_format.bytes_per_pixel()];
                reader.read_exact(&mut pixels).await?;
                lock(framebuffer).apply_raw(&rect, &pixels, pixel_format)?;
            }
            encoding::COPY_RECT => {
                let mut src = [0u8; 4];
                reader.read_exact(&mut src).await?;
                let src_x = u16::from_be_bytes([src[0], src[1]]);
                let src_y = u16::from_be_bytes([src[2], src[3]]);
                lock(framebuffer).copy_rect(&rect, src_x, src_y)?;
            }
            encoding::DESKTOP_SIZE => {
                debug!(width = rect.width, height = rect.height, "desktop resized");
                lock(framebuffer).resize(rect.width, rect.height);
            }
            other => return Err(ProtocolError::UnsupportedEncoding(other).into()),
        }
    }
    Ok(())
}

/// Discards `len` bytes of a payload the client does not use.
async fn skip(reader: &mut OwnedReadHalf, len: usize) -> Result<(), SessionError> {
    let copied = tokio::io::copy(&mut reader.take(len as u64), &mut tokio::io::sink()).await?;
    if copied < len as u64 {
        return Err(std::io::Error::from(std::io::ErrorKind::UnexpectedEof).into());
    }
    Ok(())
}

/// The pixel format to request: the server's native one if frames in it can
/// be decoded, else 32 bpp true colour.
fn negotiated_pixel_format(native: &PixelFormat) -> PixelFormat {
    match validate_pixel_format(native) {
        Ok(()) => *native,
        Err(e) => {
            debug!("server pixel format not usable ({e}); requesting 32 bpp true colour");
            PixelFormat::rgb888()
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
