//! Screen dimensions and pointer coordinates.
//!
//! The exec backend learns the display size by running a geometry query inside
//! the container; the parsers for those outputs live here so they can be
//! tested without a container.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Dimensions reported before any successful observation of the display.
pub const FALLBACK_DIMENSIONS: Dimensions = Dimensions {
    width: 1024,
    height: 768,
};

/// Width and height of a display or frame, in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

impl Dimensions {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Returns `(width, height)`, the shape the operation contract exposes.
    pub fn as_tuple(self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Parses the output of `xdotool getdisplaygeometry`, e.g. `"1280 800\n"`.
    ///
    /// Returns `None` for empty or malformed output.
    pub fn parse_xdotool_geometry(output: &str) -> Option<Self> {
        let mut parts = output.split_whitespace();
        let width = parts.next()?.parse().ok()?;
        let height = parts.next()?.parse().ok()?;
        if parts.next().is_some() {
            return None;
        }
        Some(Self { width, height })
    }

    /// Parses the `dimensions:` line printed by `xdpyinfo`, e.g.
    /// `"  dimensions:    1280x800 pixels (338x211 millimeters)"`.
    pub fn parse_xdpyinfo(output: &str) -> Option<Self> {
        let rest = output.split("dimensions:").nth(1)?;
        let geometry = rest.split("pixels").next()?.trim();
        let (w, h) = geometry.split_once('x')?;
        Some(Self {
            width: w.trim().parse().ok()?,
            height: h.trim().parse().ok()?,
        })
    }
}

impl Default for Dimensions {
    fn default() -> Self {
        FALLBACK_DIMENSIONS
    }
}

impl fmt::Display for Dimensions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// An absolute pointer position in display pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// Clamps the point into the 16-bit unsigned range RFB pointer events use.
    pub fn to_wire(self) -> (u16, u16) {
        (clamp_u16(self.x), clamp_u16(self.y))
    }
}

impl From<(i32, i32)> for Point {
    fn from((x, y): (i32, i32)) -> Self {
        Self { x, y }
    }
}

fn clamp_u16(v: i32) -> u16 {
    v.clamp(0, i32::from(u16::MAX)) as u16
}

// ── Tests ─────────────────────────────────────────────────────────────────────
