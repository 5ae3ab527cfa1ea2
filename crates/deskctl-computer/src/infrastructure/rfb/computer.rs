//! ProtocolBackedComputer: normalized operations as RFB input messages.
//!
//! Pointer actions become sequences of `PointerEvent`s (move with no buttons,
//! then press, then release); key actions become `KeyEvent` pairs.  Buttons
//! and key names are translated before a session is requested, so a request
//! the protocol cannot express fails without touching the network.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use deskctl_core::keymap::x11_keysym::keysym_from_char;
use deskctl_core::keymap::{rfb_button_mask, wheel_steps};
use deskctl_core::{
    ComputerConfig, Dimensions, KeyMapper, NormalizedInputEvent, Point, PointerButton,
    ReconnectPolicy,
};
use tracing::debug;

use super::session::RfbConnector;
use super::supervisor::ConnectionSupervisor;
use super::{FailureKind, RemoteSession, SessionConnector, SessionError};
use crate::application::computer::{ComputerBackend, ComputerError};
use crate::application::screenshot::RawCapture;

const BACKEND: &str = "protocol";

/// Pause between the two clicks of a double click.
const DOUBLE_CLICK_DELAY: Duration = Duration::from_millis(100);

/// Pause between pointer moves while dragging.
const DRAG_STEP_DELAY: Duration = Duration::from_millis(10);

/// Left button held during a drag.
const DRAG_MASK: u8 = 0x01;

impl From<SessionError> for ComputerError {
    fn from(e: SessionError) -> Self {
        match e.failure_kind() {
            FailureKind::Encoding => ComputerError::UnsupportedEncoding(e.to_string()),
            FailureKind::Transient => ComputerError::Transport(e.to_string()),
        }
    }
}

/// Drives a remote display over a supervised RFB session.
pub struct ProtocolBackedComputer<C: SessionConnector = RfbConnector> {
    supervisor: ConnectionSupervisor<C>,
    frame_timeout: Duration,
}

impl ProtocolBackedComputer<RfbConnector> {
    /// Connects over TCP to `config.host:config.port`.
    pub fn from_config(config: ComputerConfig, policy: ReconnectPolicy) -> Self {
        Self::new(RfbConnector::new(config), policy)
    }
}

impl<C: SessionConnector> ProtocolBackedComputer<C> {
    pub fn new(connector: C, policy: ReconnectPolicy) -> Self {
        Self {
            supervisor: ConnectionSupervisor::new(connector, policy),
            frame_timeout: policy.frame_timeout,
        }
    }

    pub fn supervisor(&self) -> &ConnectionSupervisor<C> {
        &self.supervisor
    }

    async fn session(&self) -> Result<Arc<C::Session>, ComputerError> {
        self.supervisor.ensure_connected().await
    }

    async fn click(&self, at: Point, button: PointerButton) -> Result<(), ComputerError> {
        let mask = button_mask(button)?;
        let session = self.session().await?;
        let (x, y) = at.to_wire();
        session.pointer(x, y, 0).await?;
        session.pointer(x, y, mask).await?;
        session.pointer(x, y, 0).await?;
        Ok(())
    }

    async fn double_click(&self, at: Point) -> Result<(), ComputerError> {
        let mask = button_mask(PointerButton::Left)?;
        let session = self.session().await?;
        let (x, y) = at.to_wire();
        session.pointer(x, y, 0).await?;
        session.pointer(x, y, mask).await?;
        session.pointer(x, y, 0).await?;
        tokio::time::sleep(DOUBLE_CLICK_DELAY).await;
        session.pointer(x, y, mask).await?;
        session.pointer(x, y, 0).await?;
        Ok(())
    }

    async fn scroll(&self, at: Point, dx: i32, dy: i32) -> Result<(), ComputerError> {
        let session = self.session().await?;
        let (x, y) = at.to_wire();
        session.pointer(x, y, 0).await?;
        for step in wheel_steps(dx, dy) {
            let mask = step.direction.rfb_mask();
            for _ in 0..step.ticks {
                session.pointer(x, y, mask).await?;
                session.pointer(x, y, 0).await?;
            }
        }
        Ok(())
    }

    async fn type_text(&self, text: &str) -> Result<(), ComputerError> {
        let session = self.session().await?;
        for ch in text.chars() {
            let keysym = keysym_from_char(ch);
            session.key(keysym, true).await?;
            session.key(keysym, false).await?;
        }
        Ok(())
    }

    async fn keypress(&self, keys: &[String]) -> Result<(), ComputerError> {
        if keys.is_empty() {
            return Ok(());
        }
        let keysyms = KeyMapper::rfb_combo(keys)?;
        let session = self.session().await?;
        for &keysym in &keysyms {
            session.key(keysym, true).await?;
        }
        for &keysym in keysyms.iter().rev() {
            session.key(keysym, false).await?;
        }
        Ok(())
    }

    async fn drag(&self, path: &[Point]) -> Result<(), ComputerError> {
        let (Some(first), Some(last)) = (path.first(), path.last()) else {
            return Ok(());
        };
        if path.len() < 2 {
            return Ok(());
        }
        let session = self.session().await?;
        let (x, y) = first.to_wire();
        session.pointer(x, y, 0).await?;
        session.pointer(x, y, DRAG_MASK).await?;
        for point in &path[1..] {
            let (x, y) = point.to_wire();
            session.pointer(x, y, DRAG_MASK).await?;
            tokio::time::sleep(DRAG_STEP_DELAY).await;
        }
        let (x, y) = last.to_wire();
        session.pointer(x, y, 0).await?;
        Ok(())
    }
}

fn button_mask(button: PointerButton) -> Result<u8, ComputerError> {
    rfb_button_mask(button).ok_or(ComputerError::UnsupportedButton {
        button,
        backend: BACKEND,
    })
}

#[async_trait]
impl<C: SessionConnector> ComputerBackend for ProtocolBackedComputer<C> {
    fn name(&self) -> &'static str {
        BACKEND
    }

    async fn apply(&self, event: &NormalizedInputEvent) -> Result<(), ComputerError> {
        match event {
            NormalizedInputEvent::Click { at, button } => self.click(*at, *button).await,
            NormalizedInputEvent::DoubleClick { at } => self.double_click(*at).await,
            NormalizedInputEvent::Move { to } => {
                let session = self.session().await?;
                let (x, y) = to.to_wire();
                Ok(session.pointer(x, y, 0).await?)
            }
            NormalizedInputEvent::Scroll { at, dx, dy } => self.scroll(*at, *dx, *dy).await,
            NormalizedInputEvent::Type { text } => self.type_text(text).await,
            NormalizedInputEvent::KeyPress { keys } => self.keypress(keys).await,
            NormalizedInputEvent::Drag { path } => self.drag(path).await,
        }
    }

    async fn capture(&self) -> Result<RawCapture, ComputerError> {
        // While the supervisor is backing off from an encoding failure there
        // is nothing to wait for: the next session would fail the same way.
        if self.supervisor.current().is_none()
            && self.supervisor.last_failure() == Some(FailureKind::Encoding)
        {
            debug!("last session failed on encoding; skipping capture");
            return Err(ComputerError::UnsupportedEncoding(
                "the VNC server only offers encodings the client cannot decode".to_string(),
            ));
        }
        let session = self.session().await?;
        let frame = session.capture(self.frame_timeout).await?;
        Ok(RawCapture::Pixels {
            width: frame.width,
            height: frame.height,
            rgba: frame.rgba,
        })
    }

    async fn wait(&self, ms: u64) -> Result<(), ComputerError> {
        tokio::time::sleep(Duration::from_millis(ms)).await;
        Ok(())
    }

    async fn query_dimensions(&self) -> Result<Option<Dimensions>, ComputerError> {
        Ok(self.supervisor.current().map(|session| session.dimensions()))
    }

    fn session_epoch(&self) -> u64 {
        self.supervisor.epoch()
    }

    async fn close(&self) -> Result<(), ComputerError> {
        self.supervisor.close().await;
        Ok(())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::rfb::mock::{MockConnector, MockSession, Script, SessionCall};

    fn policy() -> ReconnectPolicy {
        ReconnectPolicy {
            liveness_interval: Duration::from_millis(10),
            ..ReconnectPolicy::default()
        }
    }

    fn computer() -> (ProtocolBackedComputer<MockConnector>, MockConnector) {
        let connector = MockConnector::new(Dimensions::new(64, 48));
        (
            ProtocolBackedComputer::new(connector.clone(), policy()),
            connector,
        )
    }

    fn session_of(connector: &MockConnector) -> MockSession {
        connector.latest().expect("a session was opened")
    }

    #[tokio::test]
    async fn test_right_click_moves_presses_and_releases() {
        // Arrange
        let (pc, connector) = computer();

        // Act
        pc.apply(&NormalizedInputEvent::Click {
            at: Point::new(100, 200),
            button: PointerButton::Right,
        })
        .await
        .unwrap();

        // Assert
        assert_eq!(
            session_of(&connector).pointer_events(),
            vec![(100, 200, 0), (100, 200, 0x04), (100, 200, 0)]
        );
    }

    #[tokio::test]
    async fn test_back_button_fails_without_connecting() {
        let (pc, connector) = computer();

        let result = pc
            .apply(&NormalizedInputEvent::Click {
                at: Point::new(1, 1),
                button: PointerButton::Back,
            })
            .await;

        assert!(matches!(
            result,
            Err(ComputerError::UnsupportedButton {
                button: PointerButton::Back,
                backend: "protocol"
            })
        ));
        assert_eq!(connector.attempts(), 0);
    }

    #[tokio::test]
    async fn test_unknown_key_fails_without_connecting() {
        let (pc, connector) = computer();

        let result = pc
            .apply(&NormalizedInputEvent::KeyPress {
                keys: vec!["CTRL".into(), "NOT_A_KEY".into()],
            })
            .await;

        assert!(matches!(result, Err(ComputerError::UnknownKey(_))));
        assert_eq!(connector.attempts(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_double_click_is_two_left_clicks() {
        let (pc, connector) = computer();

        pc.apply(&NormalizedInputEvent::DoubleClick {
            at: Point::new(5, 6),
        })
        .await
        .unwrap();

        assert_eq!(
            session_of(&connector).pointer_events(),
            vec![(5, 6, 0), (5, 6, 1), (5, 6, 0), (5, 6, 1), (5, 6, 0)]
        );
    }

    #[tokio::test]
    async fn test_scroll_down_presses_wheel_bit_per_tick() {
        // Arrange
        let (pc, connector) = computer();

        // Act
        pc.apply(&NormalizedInputEvent::Scroll {
            at: Point::new(10, 20),
            dx: 0,
            dy: 25,
        })
        .await
        .unwrap();

        // Assert – two ticks of button 5 (mask 0x10)
        assert_eq!(
            session_of(&connector).pointer_events(),
            vec![
                (10, 20, 0),
                (10, 20, 0x10),
                (10, 20, 0),
                (10, 20, 0x10),
                (10, 20, 0)
            ]
        );
    }

    #[tokio::test]
    async fn test_type_sends_press_release_per_character() {
        let (pc, connector) = computer();

        pc.apply(&NormalizedInputEvent::Type {
            text: "Hi\n".to_string(),
        })
        .await
        .unwrap();

        assert_eq!(
            session_of(&connector).key_events(),
            vec![
                (0x48, true),
                (0x48, false),
                (0x69, true),
                (0x69, false),
                (0xFF0D, true),
                (0xFF0D, false)
            ]
        );
    }

    #[tokio::test]
    async fn test_keypress_releases_in_reverse_order() {
        let (pc, connector) = computer();

        pc.apply(&NormalizedInputEvent::KeyPress {
            keys: vec!["CTRL".into(), "C".into()],
        })
        .await
        .unwrap();

        assert_eq!(
            session_of(&connector).key_events(),
            vec![(0xFFE3, true), (0x63, true), (0x63, false), (0xFFE3, false)]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_drag_holds_left_button_along_path() {
        let (pc, connector) = computer();

        pc.apply(&NormalizedInputEvent::Drag {
            path: vec![Point::new(0, 0), Point::new(5, 5), Point::new(10, 10)],
        })
        .await
        .unwrap();

        assert_eq!(
            session_of(&connector).pointer_events(),
            vec![(0, 0, 0), (0, 0, 1), (5, 5, 1), (10, 10, 1), (10, 10, 0)]
        );
    }

    #[tokio::test]
    async fn test_negative_coordinates_clamp_to_zero() {
        let (pc, connector) = computer();

        pc.apply(&NormalizedInputEvent::Move {
            to: Point::new(-5, 70_000),
        })
        .await
        .unwrap();

        assert_eq!(
            session_of(&connector).pointer_events(),
            vec![(0, u16::MAX, 0)]
        );
    }

    #[tokio::test]
    async fn test_capture_returns_framebuffer_pixels() {
        let (pc, connector) = computer();

        let capture = pc.capture().await.unwrap();

        match capture {
            RawCapture::Pixels {
                width,
                height,
                rgba,
            } => {
                assert_eq!((width, height), (64, 48));
                assert_eq!(rgba.len(), 64 * 48 * 4);
            }
            other => panic!("expected pixels, got {other:?}"),
        }
        assert_eq!(session_of(&connector).calls(), vec![SessionCall::Capture]);
    }

    #[tokio::test]
    async fn test_undecodable_capture_is_unsupported_encoding() {
        let connector =
            MockConnector::with_fallback(Dimensions::new(64, 48), Script::AcceptUndecodable);
        let pc = ProtocolBackedComputer::new(connector, policy());

        let first = pc.capture().await;
        let second = pc.capture().await;

        assert!(matches!(first, Err(ComputerError::UnsupportedEncoding(_))));
        assert!(matches!(second, Err(ComputerError::UnsupportedEncoding(_))));
    }

    #[tokio::test]
    async fn test_dimensions_unknown_until_connected() {
        let (pc, _connector) = computer();
        assert_eq!(pc.query_dimensions().await.unwrap(), None);
        assert_eq!(pc.session_epoch(), 0);

        pc.apply(&NormalizedInputEvent::Move {
            to: Point::new(1, 1),
        })
        .await
        .unwrap();

        assert_eq!(
            pc.query_dimensions().await.unwrap(),
            Some(Dimensions::new(64, 48))
        );
        assert_eq!(pc.session_epoch(), 1);
    }

    #[tokio::test]
    async fn test_wait_does_not_connect() {
        let (pc, connector) = computer();
        pc.wait(1).await.unwrap();
        assert_eq!(connector.attempts(), 0);
    }
}
