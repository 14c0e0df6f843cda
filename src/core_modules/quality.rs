// THEORY:
// Quality diagnostics judge the photograph itself, independent of what is on
// the shelf. Each check is a fixed threshold on an objective metric and each
// produces at most one `QualityFinding`; findings are independent of one
// another, so a dark, blurry, low-resolution photo yields three.
//
// Two analyzers share the `QualityAnalyzer` interface:
// 1.  **Full pixel** (`FullPixelAnalyzer`): needs grayscale intensities.
//     - Blur: variance of the 4-neighbour Laplacian. Sharp edges give large,
//       widely spread second derivatives; an out-of-focus capture does not.
//     - Lighting: mean intensity outside [50, 200].
//     - Resolution: narrower than 800 or shorter than 600 pixels.
// 2.  **Dimensions only** (`DimensionsOnlyAnalyzer`): needs only the header.
//     - Resolution, as above.
//     - File size: an encoded file under 0.1 MB is suspiciously small.
//
// Diagnostics never abort an audit. Any internal failure is converted into a
// single `error` finding by `QualityAnalyzer::diagnose`.

use image::GrayImage;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::core_modules::severity::Severity;
use crate::core_modules::shelf_image::ShelfImage;

pub const BLUR_VARIANCE_THRESHOLD: f64 = 100.0;
pub const SEVERE_BLUR_VARIANCE_THRESHOLD: f64 = 50.0;
pub const DARK_MEAN_THRESHOLD: f64 = 50.0;
pub const BRIGHT_MEAN_THRESHOLD: f64 = 200.0;
pub const MIN_WIDTH: u32 = 800;
pub const MIN_HEIGHT: u32 = 600;
pub const MIN_FILE_SIZE_MB: f64 = 0.1;

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

/// What a finding is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FindingKind {
    Blur,
    Lighting,
    Resolution,
    FileSize,
    Error,
}

/// One defect in the photograph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityFinding {
    #[serde(rename = "type")]
    pub kind: FindingKind,
    pub severity: Severity,
    pub description: String,
}

impl QualityFinding {
    fn new(kind: FindingKind, severity: Severity, description: impl Into<String>) -> Self {
        Self {
            kind,
            severity,
            description: description.into(),
        }
    }

    /// The single finding that replaces a failed analysis.
    pub fn from_error(err: &DiagnosticsError) -> Self {
        Self::new(
            FindingKind::Error,
            Severity::High,
            format!("Error analyzing image: {err}"),
        )
    }
}

/// Internal diagnostics failures. Never leaves this module as an error.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DiagnosticsError {
    #[error("{0}")]
    Unreadable(String),

    #[error("pixel data is not available for this image")]
    MissingPixels,

    #[error("image has no pixels ({width}x{height})")]
    EmptyImage { width: u32, height: u32 },

    #[error("pixel buffer is {actual_width}x{actual_height} but the image reports {width}x{height}")]
    BufferMismatch {
        width: u32,
        height: u32,
        actual_width: u32,
        actual_height: u32,
    },
}

/// A strategy for judging photo quality.
pub trait QualityAnalyzer: Send + Sync {
    /// A short label for logs.
    fn name(&self) -> &'static str;

    /// Runs every check, failing on images this analyzer cannot read.
    fn analyze(&self, image: &ShelfImage) -> Result<Vec<QualityFinding>, DiagnosticsError>;

    /// Runs every check, turning a failure into a single `error` finding.
    fn diagnose(&self, image: &ShelfImage) -> Vec<QualityFinding> {
        match self.analyze(image) {
            Ok(findings) => findings,
            Err(err) => {
                warn!(analyzer = self.name(), error = %err, "quality analysis failed");
                vec![QualityFinding::from_error(&err)]
            }
        }
    }
}

/// Blur, lighting and resolution checks over grayscale pixels.
#[derive(Debug, Clone, Copy, Default)]
pub struct FullPixelAnalyzer;

impl QualityAnalyzer for FullPixelAnalyzer {
    fn name(&self) -> &'static str {
        "full_pixel"
    }

    fn analyze(&self, image: &ShelfImage) -> Result<Vec<QualityFinding>, DiagnosticsError> {
        check_readable(image)?;
        let luma = image.luma().ok_or(DiagnosticsError::MissingPixels)?;
        if luma.width() != image.width || luma.height() != image.height {
            return Err(DiagnosticsError::BufferMismatch {
                width: image.width,
                height: image.height,
                actual_width: luma.width(),
                actual_height: luma.height(),
            });
        }
        if luma.width() == 0 || luma.height() == 0 {
            return Err(DiagnosticsError::EmptyImage {
                width: image.width,
                height: image.height,
            });
        }

        let variance = laplacian_variance(luma);
        let brightness = mean_intensity(luma);
        debug!(variance, brightness, "full pixel metrics");

        let mut findings = Vec::new();
        if let Some(severity) = blur_severity(variance) {
            findings.push(QualityFinding::new(
                FindingKind::Blur,
                severity,
                format!("Image appears to be blurry (Laplacian variance {variance:.2})"),
            ));
        }
        if let Some(finding) = lighting_finding(brightness) {
            findings.push(finding);
        }
        if let Some(finding) = resolution_finding(image.width, image.height) {
            findings.push(finding);
        }
        Ok(findings)
    }
}

/// Resolution and file-size checks that never read pixel data.
#[derive(Debug, Clone, Copy, Default)]
pub struct DimensionsOnlyAnalyzer;

impl QualityAnalyzer for DimensionsOnlyAnalyzer {
    fn name(&self) -> &'static str {
        "dimensions_only"
    }

    fn analyze(&self, image: &ShelfImage) -> Result<Vec<QualityFinding>, DiagnosticsError> {
        check_readable(image)?;
        if image.width == 0 || image.height == 0 {
            return Err(DiagnosticsError::EmptyImage {
                width: image.width,
                height: image.height,
            });
        }

        let mut findings = Vec::new();
        if let Some(finding) = resolution_finding(image.width, image.height) {
            findings.push(finding);
        }

        let size_mb = image.byte_size as f64 / BYTES_PER_MB;
        if size_mb < MIN_FILE_SIZE_MB {
            findings.push(QualityFinding::new(
                FindingKind::FileSize,
                Severity::Low,
                format!("Small file size ({size_mb:.2} MB)"),
            ));
        }
        Ok(findings)
    }
}

fn check_readable(image: &ShelfImage) -> Result<(), DiagnosticsError> {
    match image.unreadable_cause() {
        Some(cause) => Err(DiagnosticsError::Unreadable(cause.to_string())),
        None => Ok(()),
    }
}

/// Severity of the blur finding for a given Laplacian variance, if any.
pub fn blur_severity(variance: f64) -> Option<Severity> {
    if variance >= BLUR_VARIANCE_THRESHOLD {
        None
    } else if variance < SEVERE_BLUR_VARIANCE_THRESHOLD {
        Some(Severity::High)
    } else {
        Some(Severity::Medium)
    }
}

fn lighting_finding(brightness: f64) -> Option<QualityFinding> {
    let description = if brightness < DARK_MEAN_THRESHOLD {
        "Image appears to be too dark"
    } else if brightness > BRIGHT_MEAN_THRESHOLD {
        "Image appears to be too bright"
    } else {
        return None;
    };
    Some(QualityFinding::new(FindingKind::Lighting, Severity::Medium, description))
}

fn resolution_finding(width: u32, height: u32) -> Option<QualityFinding> {
    (width < MIN_WIDTH || height < MIN_HEIGHT).then(|| {
        QualityFinding::new(
            FindingKind::Resolution,
            Severity::Medium,
            format!("Low resolution image ({width}x{height})"),
        )
    })
}

/// Mean grayscale intensity, 0.0 for an empty image.
pub fn mean_intensity(luma: &GrayImage) -> f64 {
    let count = luma.as_raw().len();
    if count == 0 {
        return 0.0;
    }
    let sum: u64 = luma.as_raw().iter().map(|&v| v as u64).sum();
    sum as f64 / count as f64
}

/// Population variance of the 4-neighbour Laplacian `[0 1 0; 1 -4 1; 0 1 0]`,
/// evaluated at every pixel with reflect-101 borders.
pub fn laplacian_variance(luma: &GrayImage) -> f64 {
    let (width, height) = luma.dimensions();
    if width == 0 || height == 0 {
        return 0.0;
    }
    let w = width as i64;
    let h = height as i64;
    let at = |x: i64, y: i64| -> f64 {
        luma.get_pixel(reflect_101(x, w) as u32, reflect_101(y, h) as u32).0[0] as f64
    };

    let mut sum = 0.0f64;
    let mut sum_sq = 0.0f64;
    for y in 0..h {
        for x in 0..w {
            let response = at(x, y - 1) + at(x, y + 1) + at(x - 1, y) + at(x + 1, y) - 4.0 * at(x, y);
            sum += response;
            sum_sq += response * response;
        }
    }

    let count = (w * h) as f64;
    let mean = sum / count;
    (sum_sq / count - mean * mean).max(0.0)
}

/// Mirrors an out-of-range index back into `0..len` without repeating the edge
/// sample (`-1 -> 1`, `len -> len - 2`).
fn reflect_101(index: i64, len: i64) -> i64 {
    if len == 1 {
        return 0;
    }
    if index < 0 {
        -index
    } else if index >= len {
        2 * (len - 1) - index
    } else {
        index
    }
}
