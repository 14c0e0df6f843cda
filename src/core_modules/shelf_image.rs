// THEORY:
// `ShelfImage` is the decoded photograph every analysis stage reads from. It is
// a value owned by exactly one audit: stages borrow it immutably and any derived
// buffer (edge map, Laplacian response) is a new value, so the engine has no
// shared mutable state.
//
// Two loading tiers exist:
// - `decode` reads the full raster and keeps a grayscale copy for pixel-level
//   diagnostics and edge detection.
// - `probe` reads only the header (format and dimensions). This is the
//   reduced-capability tier that never touches pixel data.
//
// The reduced tier also tolerates bytes it cannot read at all: such an image
// is carried forward as `unreadable`, with no dimensions, so diagnostics can
// report the failure as a finding instead of aborting the audit.
//
// Grayscale uses the Rec. 601 luma weights (0.299, 0.587, 0.114), the same
// weighting used for single-pixel luminance elsewhere in this codebase.

use std::io::Cursor;

use image::{DynamicImage, GrayImage, ImageFormat, ImageReader, Luma};

use crate::error::AuditError;

/// A decoded shelf photograph.
#[derive(Debug, Clone, PartialEq)]
pub struct ShelfImage {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
    /// Length of the encoded input in bytes.
    pub byte_size: u64,
    /// The container format, when it could be recognised.
    pub format: Option<ImageFormat>,
    /// Grayscale intensities; `None` for header-only images.
    luma: Option<GrayImage>,
    /// Why the bytes could not be read, for images kept only as a placeholder.
    unreadable: Option<String>,
}

impl ShelfImage {
    /// Decodes the full raster.
    pub fn decode(bytes: &[u8]) -> Result<Self, AuditError> {
        let reader = ImageReader::new(Cursor::new(bytes))
            .with_guessed_format()
            .map_err(|e| AuditError::Decode(e.to_string()))?;
        let format = reader.format();
        let image = reader.decode()?;
        let luma = to_luma_rec601(&image);

        Ok(Self {
            width: luma.width(),
            height: luma.height(),
            byte_size: bytes.len() as u64,
            format,
            luma: Some(luma),
            unreadable: None,
        })
    }

    /// Reads only the format and dimensions from the header.
    pub fn probe(bytes: &[u8]) -> Result<Self, AuditError> {
        let reader = ImageReader::new(Cursor::new(bytes))
            .with_guessed_format()
            .map_err(|e| AuditError::Decode(e.to_string()))?;
        let format = reader
            .format()
            .ok_or_else(|| AuditError::Decode("unrecognised image format".to_string()))?;
        let (width, height) = reader.into_dimensions()?;

        Ok(Self {
            width,
            height,
            byte_size: bytes.len() as u64,
            format: Some(format),
            luma: None,
            unreadable: None,
        })
    }

    /// Stands in for bytes that are not a readable image.
    pub fn unreadable(byte_size: u64, cause: impl Into<String>) -> Self {
        Self {
            width: 0,
            height: 0,
            byte_size,
            format: None,
            luma: None,
            unreadable: Some(cause.into()),
        }
    }

    /// Wraps an already-grayscale buffer. `byte_size` stands in for the encoded size.
    pub fn from_luma(luma: GrayImage, byte_size: u64) -> Self {
        Self {
            width: luma.width(),
            height: luma.height(),
            byte_size,
            format: None,
            luma: Some(luma),
            unreadable: None,
        }
    }

    /// Grayscale pixels, if this image was fully decoded.
    pub fn luma(&self) -> Option<&GrayImage> {
        self.luma.as_ref()
    }

    pub fn has_pixels(&self) -> bool {
        self.luma.is_some()
    }

    /// The read failure, if this image is a stand-in for unreadable bytes.
    pub fn unreadable_cause(&self) -> Option<&str> {
        self.unreadable.as_deref()
    }
}

/// Rec. 601 luma of one RGB triple, rounded to the nearest integer.
pub fn luma_rec601(red: u8, green: u8, blue: u8) -> u8 {
    let weighted = 299 * red as u32 + 587 * green as u32 + 114 * blue as u32;
    ((weighted + 500) / 1000) as u8
}

fn to_luma_rec601(image: &DynamicImage) -> GrayImage {
    let rgb = image.to_rgb8();
    let mut luma = GrayImage::new(rgb.width(), rgb.height());
    for (src, dst) in rgb.pixels().zip(luma.pixels_mut()) {
        let [r, g, b] = src.0;
        *dst = Luma([luma_rec601(r, g, b)]);
    }
    luma
}
