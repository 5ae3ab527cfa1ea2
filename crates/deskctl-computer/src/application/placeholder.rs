//! Diagnostic placeholder image.
//!
//! Substituted for a screenshot whose frame could not be decoded, so the
//! driver still receives a valid PNG that explains what went wrong.

use font8x8::{UnicodeFonts, BASIC_FONTS};
use image::{Rgba, RgbaImage};

use deskctl_core::Dimensions;

/// Size of the placeholder image.
pub const PLACEHOLDER_DIMENSIONS: Dimensions = Dimensions::new(640, 480);

const BACKGROUND: Rgba<u8> = Rgba([30, 30, 30, 255]);
const FOREGROUND: Rgba<u8> = Rgba([255, 255, 255, 255]);

const GLYPH_SIZE: u32 = 8;
const SCALE: u32 = 2;
const ADVANCE: u32 = GLYPH_SIZE * SCALE;
const LINE_HEIGHT: u32 = (GLYPH_SIZE + 4) * SCALE;
const MARGIN: u32 = 10;

/// The first line drawn on every placeholder.
pub const HEADLINE: &str = "VNC ERROR: UNSUPPORTED ENCODING";

/// The second line, unless the caller supplies its own hint.
pub const DEFAULT_HINT: &str = "CHECK VNC SERVER CONFIGURATION";

/// Renders the placeholder: dark background, white headline and hint.
pub fn render(hint: &str) -> RgbaImage {
    let mut img = RgbaImage::from_pixel(
        PLACEHOLDER_DIMENSIONS.width,
        PLACEHOLDER_DIMENSIONS.height,
        BACKGROUND,
    );
    draw_text(&mut img, MARGIN, MARGIN, HEADLINE);
    draw_text(&mut img, MARGIN, MARGIN + LINE_HEIGHT, hint);
    img
}

/// Draws `text` with its top-left corner at `(x, y)` using the 8×8
/// `font8x8` basic set.  Characters outside it are drawn as `?`.  Text
/// running past the right edge is clipped.
fn draw_text(img: &mut RgbaImage, x: u32, y: u32, text: &str) {
    for (i, ch) in text.chars().enumerate() {
        let origin_x = x + i as u32 * ADVANCE;
        if origin_x + ADVANCE > img.width() {
            break;
        }
        let Some(rows) = BASIC_FONTS.get(ch).or_else(|| BASIC_FONTS.get('?')) else {
            continue;
        };
        for (row, bits) in rows.iter().enumerate() {
            for col in 0..GLYPH_SIZE {
                // Bit 0 is the leftmost pixel.
                if (bits >> col) & 1 == 0 {
                    continue;
                }
                fill_cell(img, origin_x + col * SCALE, y + row as u32 * SCALE);
            }
        }
    }
}

fn fill_cell(img: &mut RgbaImage, x: u32, y: u32) {
    for dy in 0..SCALE {
        for dx in 0..SCALE {
            if x + dx < img.width() && y + dy < img.height() {
                img.put_pixel(x + dx, y + dy, FOREGROUND);
            }
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
