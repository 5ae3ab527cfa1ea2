//! Normalized input events.
//!
//! A [`NormalizedInputEvent`] describes one user-input action in
//! backend-agnostic terms.  The facade builds one per operation call and hands
//! it to the active backend, which translates it with
//! [`crate::keymap::KeyMapper`] into xdotool commands or RFB messages.  Events
//! are never persisted.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::geometry::Point;

/// The pointer buttons a driver may name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PointerButton {
    Left,
    Right,
    Middle,
    Back,
    Forward,
}

impl PointerButton {
    /// All buttons in the normalized set.
    pub const ALL: [PointerButton; 5] = [
        PointerButton::Left,
        PointerButton::Right,
        PointerButton::Middle,
        PointerButton::Back,
        PointerButton::Forward,
    ];

    /// The lowercase name drivers use for this button.
    pub fn name(self) -> &'static str {
        match self {
            PointerButton::Left => "left",
            PointerButton::Right => "right",
            PointerButton::Middle => "middle",
            PointerButton::Back => "back",
            PointerButton::Forward => "forward",
        }
    }

    /// Resolves a driver-supplied button name, falling back to
    /// [`PointerButton::Left`] for names outside the normalized set.
    pub fn from_name_or_left(name: &str) -> Self {
        name.parse().unwrap_or_else(|_| {
            tracing::warn!(button = name, "unknown pointer button; using left");
            PointerButton::Left
        })
    }
}

impl fmt::Display for PointerButton {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Returned by [`PointerButton::from_str`] for names outside the normalized set.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown pointer button: {0}")]
pub struct UnknownButton(pub String);

impl FromStr for PointerButton {
    type Err = UnknownButton;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "left" => Ok(PointerButton::Left),
            "right" => Ok(PointerButton::Right),
            "middle" | "wheel" => Ok(PointerButton::Middle),
            "back" => Ok(PointerButton::Back),
            "forward" => Ok(PointerButton::Forward),
            _ => Err(UnknownButton(s.to_string())),
        }
    }
}

/// One backend-agnostic input action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum NormalizedInputEvent {
    Click { at: Point, button: PointerButton },
    DoubleClick { at: Point },
    Move { to: Point },
    /// Scroll deltas are in pixels; positive `dy` scrolls down, positive `dx` right.
    Scroll { at: Point, dx: i32, dy: i32 },
    Type { text: String },
    KeyPress { keys: Vec<String> },
    Drag { path: Vec<Point> },
}

impl NormalizedInputEvent {
    /// Short lowercase name of the action, used as a structured log field.
    pub fn kind(&self) -> &'static str {
        match self {
            NormalizedInputEvent::Click { .. } => "click",
            NormalizedInputEvent::DoubleClick { .. } => "double_click",
            NormalizedInputEvent::Move { .. } => "move",
            NormalizedInputEvent::Scroll { .. } => "scroll",
            NormalizedInputEvent::Type { .. } => "type",
            NormalizedInputEvent::KeyPress { .. } => "keypress",
            NormalizedInputEvent::Drag { .. } => "drag",
        }
    }
}

impl fmt::Display for NormalizedInputEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NormalizedInputEvent::Click { at, button } => {
                write!(f, "click x={}, y={}, button={button}", at.x, at.y)
            }
            NormalizedInputEvent::DoubleClick { at } => {
                write!(f, "double-click x={}, y={}", at.x, at.y)
            }
            NormalizedInputEvent::Move { to } => write!(f, "move to x={}, y={}", to.x, to.y),
            NormalizedInputEvent::Scroll { at, dx, dy } => {
                write!(f, "scroll at ({}, {}) by ({dx}, {dy})", at.x, at.y)
            }
            NormalizedInputEvent::Type { text } => write!(f, "type {text:?}"),
            NormalizedInputEvent::KeyPress { keys } => write!(f, "keypress {keys:?}"),
            NormalizedInputEvent::Drag { path } => match (path.first(), path.last()) {
                (Some(from), Some(to)) => write!(
                    f,
                    "drag from ({}, {}) to ({}, {})",
                    from.x, from.y, to.x, to.y
                ),
                _ => f.write_str("drag (empty path)"),
            },
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
