//! Client-side copy of the remote framebuffer.
//!
//! `FramebufferUpdate` rectangles are applied here in RGBA form so that a
//! screenshot is just a snapshot of this buffer.

use crate::protocol::codec::{pixel_to_rgba, ProtocolError};
use crate::protocol::messages::{PixelFormat, RectangleHeader};

/// RGBA pixels, row-major, four bytes per pixel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Framebuffer {
    width: u16,
    height: u16,
    rgba: Vec<u8>,
}

impl Framebuffer {
    /// A black framebuffer of the given size.
    pub fn new(width: u16, height: u16) -> Self {
        Self {
            width,
            height,
            rgba: vec![0; Self::byte_len(width, height)],
        }
    }

    pub fn width(&self) -> u16 {
        self.width
    }

    pub fn height(&self) -> u16 {
        self.height
    }

    pub fn rgba(&self) -> &[u8] {
        &self.rgba
    }

    /// Whether `rect` lies entirely inside the buffer.
    pub fn contains(&self, rect: &RectangleHeader) -> bool {
        u32::from(rect.x) + u32::from(rect.width) <= u32::from(self.width)
            && u32::from(rect.y) + u32::from(rect.height) <= u32::from(self.height)
    }

    /// Discards the contents and resizes (DesktopSize pseudo-rectangle).
    pub fn resize(&mut self, width: u16, height: u16) {
        *self = Self::new(width, height);
    }

    /// Writes a Raw-encoded rectangle.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError`] if the rectangle falls outside the buffer or
    /// `pixels` does not hold exactly one wire pixel per covered pixel.
    pub fn apply_raw(
        &mut self,
        rect: &RectangleHeader,
        pixels: &[u8],
        pf: &PixelFormat,
    ) -> Result<(), ProtocolError> {
        self.check_bounds(rect.x, rect.y, rect.width, rect.height)?;
        let bpp = pf.bytes_per_pixel();
        let expected = rect.area() * bpp;
        if pixels.len() != expected {
            return Err(ProtocolError::InsufficientData {
                needed: expected,
                available: pixels.len(),
            });
        }
        if bpp == 0 {
            return Ok(());
        }

        let row_pixels = usize::from(rect.width);
        for (row, src_row) in pixels.chunks_exact(row_pixels.max(1) * bpp).enumerate() {
            let dst_start = self.offset(rect.x, rect.y + row as u16);
            let dst_row = &mut self.rgba[dst_start..dst_start + row_pixels * 4];
            for (dst, src) in dst_row.chunks_exact_mut(4).zip(src_row.chunks_exact(bpp)) {
                dst.copy_from_slice(&pixel_to_rgba(pf, src));
            }
        }
        Ok(())
    }

    /// Copies an already-received region to `rect` (CopyRect encoding).
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::MalformedPayload`] if either region falls
    /// outside the buffer.
    pub fn copy_rect(
        &mut self,
        rect: &RectangleHeader,
        src_x: u16,
        src_y: u16,
    ) -> Result<(), ProtocolError> {
        self.check_bounds(rect.x, rect.y, rect.width, rect.height)?;
        self.check_bounds(src_x, src_y, rect.width, rect.height)?;

        let row_bytes = usize::from(rect.width) * 4;
        let rows: Vec<u16> = if src_y < rect.y {
            // Overlapping downward copy: walk bottom-up.
            (0..rect.height).rev().collect()
        } else {
            (0..rect.height).collect()
        };
        for row in rows {
            let src = self.offset(src_x, src_y + row);
            let dst = self.offset(rect.x, rect.y + row);
            self.rgba.copy_within(src..src + row_bytes, dst);
        }
        Ok(())
    }

    fn check_bounds(&self, x: u16, y: u16, width: u16, height: u16) -> Result<(), ProtocolError> {
        let fits = u32::from(x) + u32::from(width) <= u32::from(self.width)
            && u32::from(y) + u32::from(height) <= u32::from(self.height);
        if fits {
            Ok(())
        } else {
            Err(ProtocolError::MalformedPayload(format!(
                "rectangle {width}x{height}+{x}+{y} outside {}x{} framebuffer",
                self.width, self.height
            )))
        }
    }

    fn offset(&self, x: u16, y: u16) -> usize {
        (usize::from(y) * usize::from(self.width) + usize::from(x)) * 4
    }

    fn byte_len(width: u16, height: u16) -> usize {
        usize::from(width) * usize::from(height) * 4
    }
}
