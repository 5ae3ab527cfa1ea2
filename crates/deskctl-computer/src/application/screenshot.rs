//! ScreenshotPipeline: capture → decode → persist → base64.
//!
//! The pipeline takes the result of a backend capture and always produces a
//! PNG artifact on disk plus its base64 text (no `data:` prefix).  When the
//! frame cannot be decoded, a fixed-size placeholder image takes its place.
//! Connection and transport failures are not decode failures and propagate.

use std::io::Cursor;
use std::path::{Path, PathBuf};

use base64::{engine::general_purpose, Engine};
use deskctl_core::Dimensions;
use image::codecs::png::PngEncoder;
use image::{ExtendedColorType, ImageEncoder, ImageFormat, RgbaImage};
use serde::Serialize;
use tracing::{debug, warn};

use crate::application::computer::ComputerError;
use crate::application::placeholder;

/// A frame as a backend delivers it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawCapture {
    /// An encoded image file (the exec backend transfers a PNG).
    Encoded(Vec<u8>),
    /// Raw RGBA pixels, row-major (the protocol backend's framebuffer).
    Pixels { width: u32, height: u32, rgba: Vec<u8> },
    /// The transfer itself was mangled before it could be decoded.
    Corrupt(String),
}

/// One captured screenshot.
#[derive(Debug, Clone, Serialize)]
pub struct Screenshot {
    /// Where the PNG artifact was written.
    pub path: PathBuf,
    pub dimensions: Dimensions,
    /// `true` when the frame could not be decoded and the placeholder was used.
    pub placeholder: bool,
    /// The PNG bytes, base64-encoded.
    pub base64: String,
}

/// Turns captures into persisted, encoded screenshots.
#[derive(Debug, Clone)]
pub struct ScreenshotPipeline {
    output_dir: PathBuf,
}

impl Default for ScreenshotPipeline {
    fn default() -> Self {
        Self::new(".")
    }
}

impl ScreenshotPipeline {
    /// Artifacts are written to `output_dir`, created on first use.
    pub fn new(output_dir: impl AsRef<Path>) -> Self {
        Self {
            output_dir: output_dir.as_ref().to_path_buf(),
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Runs one capture through the pipeline.
    ///
    /// # Errors
    ///
    /// Returns the capture error unless it is
    /// [`ComputerError::UnsupportedEncoding`], which yields a placeholder.
    /// Returns [`ComputerError::Artifact`] if the file cannot be written.
    pub async fn process(
        &self,
        capture: Result<RawCapture, ComputerError>,
    ) -> Result<Screenshot, ComputerError> {
        let (image, placeholder) = match capture.map(decode) {
            Ok(Ok(image)) => (image, false),
            Ok(Err(reason)) => {
                warn!("screenshot could not be decoded ({reason}); using placeholder");
                (placeholder::render(placeholder::DEFAULT_HINT), true)
            }
            Err(ComputerError::UnsupportedEncoding(reason)) => {
                warn!("remote display uses an unsupported encoding ({reason}); using placeholder");
                (placeholder::render(placeholder::DEFAULT_HINT), true)
            }
            Err(e) => return Err(e),
        };

        let png = encode_png(&image)?;
        let path = self.output_dir.join(artifact_name());
        self.persist(&path, &png).await?;
        debug!(path = %path.display(), bytes = png.len(), "screenshot artifact written");

        Ok(Screenshot {
            path,
            dimensions: Dimensions::new(image.width(), image.height()),
            placeholder,
            base64: general_purpose::STANDARD.encode(&png),
        })
    }

    async fn persist(&self, path: &Path, png: &[u8]) -> Result<(), ComputerError> {
        let artifact_err = |source| ComputerError::Artifact {
            path: path.to_path_buf(),
            source,
        };
        tokio::fs::create_dir_all(&self.output_dir)
            .await
            .map_err(artifact_err)?;
        tokio::fs::write(path, png).await.map_err(artifact_err)
    }
}

/// Decodes a capture to RGBA, or explains why it could not be decoded.
fn decode(capture: RawCapture) -> Result<RgbaImage, String> {
    match capture {
        RawCapture::Encoded(bytes) => image::load_from_memory_with_format(&bytes, ImageFormat::Png)
            .map(|img| img.to_rgba8())
            .map_err(|e| e.to_string()),
        RawCapture::Pixels {
            width,
            height,
            rgba,
        } => {
            let len = rgba.len();
            RgbaImage::from_raw(width, height, rgba).ok_or_else(|| {
                format!("{len} bytes do not fill a {width}x{height} RGBA frame")
            })
        }
        RawCapture::Corrupt(reason) => Err(reason),
    }
}

fn encode_png(image: &RgbaImage) -> Result<Vec<u8>, ComputerError> {
    let mut png = Vec::new();
    PngEncoder::new(Cursor::new(&mut png)).write_image(
        image.as_raw(),
        image.width(),
        image.height(),
        ExtendedColorType::Rgba8,
    )?;
    Ok(png)
}

/// `screenshot_<UTC timestamp with milliseconds>.png`
fn artifact_name() -> String {
    let ts = chrono::Utc::now().format("%Y%m%d_%H%M%S%3f");
    format!("screenshot_{ts}.png")
}

// ── Tests ─────────────────────────────────────────────────────────────────────
