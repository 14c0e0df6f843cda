// THEORY:
// The `pipeline` module is the top-level API for the shelf audit engine. It
// wires the analysis stages into one call that a web handler, CLI or test can
// make with two inputs and get one `AuditResult` back.
//
// Stages, in order:
// 1.  **Manifest**: parse the declared inventory (never fails on content).
// 2.  **Image**: decode the photograph. In full mode an undecodable image
//     aborts the audit; in reduced mode it becomes an `error` finding and the
//     remaining stages still run.
// 3.  **Quality**: judge the photograph itself (never aborts).
// 4.  **Detection**: propose product regions (never fails).
// 5.  **Reconciliation**: compare declared items against detected regions.
//
// Stages 3 and 4 read the same decoded image independently. The strategy for
// each of them is chosen once, from `FidelityMode`, when the pipeline is built.
// An `AuditPipeline` holds no per-audit state, so one instance can serve any
// number of audits, including concurrently.

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::core_modules::detected_region::DetectedRegion;
use crate::core_modules::manifest::{parse_manifest_bytes, read_manifest, DeclaredItem};
use crate::core_modules::quality::{
    DimensionsOnlyAnalyzer, FullPixelAnalyzer, QualityAnalyzer, QualityFinding,
};
use crate::core_modules::reconciliation::{Anomaly, ReconciliationPolicy};
use crate::core_modules::region_detector::{ContourRegionDetector, PlaceholderLayout, RegionDetector};
use crate::core_modules::shelf_image::ShelfImage;
use crate::error::AuditError;

// Re-export key data structures for the public API.
pub use crate::core_modules::detected_region::BoundingBox;
pub use crate::core_modules::quality::FindingKind;
pub use crate::core_modules::reconciliation::{AnomalyEvidence, AnomalyKind};
pub use crate::core_modules::severity::Severity;

/// Which pair of strategies the pipeline runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FidelityMode {
    /// Pixel diagnostics, contour detection, count reconciliation.
    #[default]
    Full,
    /// Header-only diagnostics, placeholder layout, count plus placeholder
    /// position reconciliation.
    Reduced,
}

impl fmt::Display for FidelityMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FidelityMode::Full => f.write_str("full"),
            FidelityMode::Reduced => f.write_str("reduced"),
        }
    }
}

impl FromStr for FidelityMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "full" => Ok(FidelityMode::Full),
            "reduced" => Ok(FidelityMode::Reduced),
            other => Err(format!("unknown fidelity mode '{other}' (expected 'full' or 'reduced')")),
        }
    }
}

/// Configuration for the AuditPipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AuditConfig {
    pub mode: FidelityMode,
}

/// Everything one audit produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditResult {
    /// Where the analysed image can be found, as given by the caller.
    #[serde(rename = "image_url")]
    pub image_ref: String,
    #[serde(rename = "metadata")]
    pub declared_items: Vec<DeclaredItem>,
    #[serde(rename = "quality_issues")]
    pub quality_findings: Vec<QualityFinding>,
    #[serde(rename = "detected_products")]
    pub detected_regions: Vec<DetectedRegion>,
    pub anomalies: Vec<Anomaly>,
}

/// The main, top-level struct for the audit engine.
pub struct AuditPipeline {
    config: AuditConfig,
    quality: Box<dyn QualityAnalyzer>,
    detector: Box<dyn RegionDetector>,
    policy: ReconciliationPolicy,
}

impl fmt::Debug for AuditPipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuditPipeline")
            .field("config", &self.config)
            .field("quality", &self.quality.name())
            .field("detector", &self.detector.name())
            .field("policy", &self.policy)
            .finish()
    }
}

impl Default for AuditPipeline {
    fn default() -> Self {
        Self::new(AuditConfig::default())
    }
}

impl AuditPipeline {
    pub fn new(config: AuditConfig) -> Self {
        match config.mode {
            FidelityMode::Full => Self::with_strategies(
                config,
                Box::new(FullPixelAnalyzer),
                Box::new(ContourRegionDetector),
                ReconciliationPolicy::count_only(),
            ),
            FidelityMode::Reduced => Self::with_strategies(
                config,
                Box::new(DimensionsOnlyAnalyzer),
                Box::new(PlaceholderLayout),
                ReconciliationPolicy::with_placeholder_position(),
            ),
        }
    }

    /// Builds a pipeline from explicit strategies. The image is fully decoded
    /// unless `config.mode` is `Reduced`.
    pub fn with_strategies(
        config: AuditConfig,
        quality: Box<dyn QualityAnalyzer>,
        detector: Box<dyn RegionDetector>,
        policy: ReconciliationPolicy,
    ) -> Self {
        Self {
            config,
            quality,
            detector,
            policy,
        }
    }

    pub fn config(&self) -> &AuditConfig {
        &self.config
    }

    /// Audits in-memory inputs. `image_ref` is echoed into the result.
    pub fn run(
        &self,
        image_bytes: &[u8],
        manifest_bytes: &[u8],
        image_ref: impl Into<String>,
    ) -> Result<AuditResult, AuditError> {
        let declared_items = parse_manifest_bytes(manifest_bytes);
        self.audit(image_bytes, declared_items, image_ref.into())
    }

    /// Audits an image file against a manifest file.
    pub fn run_files(
        &self,
        image_path: impl AsRef<Path>,
        manifest_path: impl AsRef<Path>,
    ) -> Result<AuditResult, AuditError> {
        let image_path = image_path.as_ref();
        let declared_items = read_manifest(manifest_path)?;
        let image_bytes = std::fs::read(image_path)
            .map_err(|e| AuditError::Decode(format!("cannot read {}: {e}", image_path.display())))?;
        self.audit(&image_bytes, declared_items, image_path.display().to_string())
    }

    fn audit(
        &self,
        image_bytes: &[u8],
        declared_items: Vec<DeclaredItem>,
        image_ref: String,
    ) -> Result<AuditResult, AuditError> {
        let image = self.load_image(image_bytes)?;
        debug!(
            width = image.width,
            height = image.height,
            bytes = image.byte_size,
            "image loaded"
        );

        let quality_findings = self.quality.diagnose(&image);
        let detected_regions = self.detector.detect(&image);
        let anomalies = self.policy.reconcile(&declared_items, &detected_regions);

        info!(
            image = %image_ref,
            mode = %self.config.mode,
            declared = declared_items.len(),
            findings = quality_findings.len(),
            regions = detected_regions.len(),
            anomalies = anomalies.len(),
            "audit complete"
        );

        Ok(AuditResult {
            image_ref,
            declared_items,
            quality_findings,
            detected_regions,
            anomalies,
        })
    }

    fn load_image(&self, bytes: &[u8]) -> Result<ShelfImage, AuditError> {
        match self.config.mode {
            FidelityMode::Full => ShelfImage::decode(bytes),
            FidelityMode::Reduced => match ShelfImage::probe(bytes) {
                Ok(image) => Ok(image),
                Err(err) => {
                    warn!(error = %err, "image header unreadable, continuing without it");
                    let cause = match err {
                        AuditError::Decode(cause) => cause,
                        other => other.to_string(),
                    };
                    Ok(ShelfImage::unreadable(bytes.len() as u64, cause))
                }
            },
        }
    }
}

/// Audits two files in full-pixel mode.
pub fn run(image_path: impl AsRef<Path>, manifest_path: impl AsRef<Path>) -> Result<AuditResult, AuditError> {
    AuditPipeline::default().run_files(image_path, manifest_path)
}
