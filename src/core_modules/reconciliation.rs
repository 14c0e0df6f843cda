// THEORY:
// Reconciliation compares what the manifest claims against what the detector
// saw and records every disagreement as an `Anomaly`.
//
// The current policy is intentionally simple:
// 1.  **Count**: if the number of declared items differs from the number of
//     detected regions, emit one `count_mismatch` (high). At most one per audit.
// 2.  **Placeholder position** (reduced mode only): if anything was detected,
//     emit one `position_mismatch` (medium) pointing at the first region. No
//     spatial comparison is performed; the anomaly says so in its description.
//
// No per-SKU matching or section-to-region assignment exists yet. Manifest
// order is the hook for that: row N is meant to correspond to shelf position N.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::core_modules::detected_region::{BoundingBox, DetectedRegion};
use crate::core_modules::manifest::DeclaredItem;
use crate::core_modules::severity::Severity;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnomalyKind {
    CountMismatch,
    PositionMismatch,
}

/// Kind-specific data carried by an anomaly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AnomalyEvidence {
    Counts {
        metadata_count: usize,
        detected_count: usize,
    },
    Region {
        coordinates: BoundingBox,
    },
}

/// One disagreement between the manifest and the photograph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Anomaly {
    #[serde(rename = "type")]
    pub kind: AnomalyKind,
    pub severity: Severity,
    pub description: String,
    #[serde(flatten)]
    pub evidence: AnomalyEvidence,
}

impl Anomaly {
    pub fn count_mismatch(metadata_count: usize, detected_count: usize) -> Self {
        Self {
            kind: AnomalyKind::CountMismatch,
            severity: Severity::High,
            description: format!(
                "Metadata has {metadata_count} products, but {detected_count} were detected in the image"
            ),
            evidence: AnomalyEvidence::Counts {
                metadata_count,
                detected_count,
            },
        }
    }

    pub fn placeholder_position(region: &DetectedRegion) -> Self {
        Self {
            kind: AnomalyKind::PositionMismatch,
            severity: Severity::Medium,
            description: "Product position does not match metadata section (placeholder check, no spatial comparison performed)".to_string(),
            evidence: AnomalyEvidence::Region {
                coordinates: region.bounding_box(),
            },
        }
    }
}

/// Which comparisons reconciliation performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ReconciliationPolicy {
    /// Emit the demo `position_mismatch` for the first detected region.
    pub placeholder_position_check: bool,
}

impl ReconciliationPolicy {
    /// Count comparison only.
    pub fn count_only() -> Self {
        Self::default()
    }

    /// Count comparison plus the placeholder position anomaly.
    pub fn with_placeholder_position() -> Self {
        Self {
            placeholder_position_check: true,
        }
    }

    pub fn reconcile(&self, declared: &[DeclaredItem], detected: &[DetectedRegion]) -> Vec<Anomaly> {
        let mut anomalies = Vec::new();

        if declared.len() != detected.len() {
            anomalies.push(Anomaly::count_mismatch(declared.len(), detected.len()));
        }

        if self.placeholder_position_check {
            if let Some(first) = detected.first() {
                anomalies.push(Anomaly::placeholder_position(first));
            }
        }

        debug!(
            declared = declared.len(),
            detected = detected.len(),
            anomalies = anomalies.len(),
            "reconciled manifest against detections"
        );
        anomalies
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn items(n: usize) -> Vec<DeclaredItem> {
        (0..n)
            .map(|i| DeclaredItem {
                sku: format!("SKU{i}"),
                price: "1.00".to_string(),
                section: "A".to_string(),
                additional_info: Vec::new(),
            })
            .collect()
    }

    fn regions(n: u32) -> Vec<DetectedRegion> {
        (0..n)
            .map(|i| {
                DetectedRegion::new(
                    BoundingBox { x: 10 + i * 120, y: 20, width: 100, height: 80 },
                    8000.0,
                )
            })
            .collect()
    }

    #[test]
    fn five_declared_three_detected_is_one_count_mismatch() {
        let anomalies = ReconciliationPolicy::count_only().reconcile(&items(5), &regions(3));

        assert_eq!(anomalies.len(), 1);
        let anomaly = &anomalies[0];
        assert_eq!(anomaly.kind, AnomalyKind::CountMismatch);
        assert_eq!(anomaly.severity, Severity::High);
        assert_eq!(
            anomaly.evidence,
            AnomalyEvidence::Counts { metadata_count: 5, detected_count: 3 }
        );
        assert!(anomaly.description.contains('5') && anomaly.description.contains('3'));
    }

    #[test]
    fn count_mismatch_appears_iff_counts_differ() {
        let policy = ReconciliationPolicy::count_only();
        for declared in 0..4 {
            for detected in 0..4u32 {
                let anomalies = policy.reconcile(&items(declared), &regions(detected));
                let mismatches = anomalies.iter().filter(|a| a.kind == AnomalyKind::CountMismatch).count();
                assert_eq!(mismatches, usize::from(declared != detected as usize));
            }
        }
    }

    #[test]
    fn count_only_policy_never_reports_positions() {
        let anomalies = ReconciliationPolicy::count_only().reconcile(&items(2), &regions(2));
        assert!(anomalies.is_empty());
    }

    #[test]
    fn placeholder_policy_points_at_the_first_region() {
        let detected = regions(3);
        let anomalies = ReconciliationPolicy::with_placeholder_position().reconcile(&items(3), &detected);

        assert_eq!(anomalies.len(), 1);
        assert_eq!(anomalies[0].kind, AnomalyKind::PositionMismatch);
        assert_eq!(anomalies[0].severity, Severity::Medium);
        assert_eq!(
            anomalies[0].evidence,
            AnomalyEvidence::Region { coordinates: detected[0].bounding_box() }
        );
        assert!(anomalies[0].description.contains("placeholder"));
    }

    #[test]
    fn placeholder_policy_is_silent_without_detections() {
        let anomalies = ReconciliationPolicy::with_placeholder_position().reconcile(&items(2), &[]);
        assert_eq!(anomalies.len(), 1);
        assert_eq!(anomalies[0].kind, AnomalyKind::CountMismatch);
    }

    #[test]
    fn anomalies_serialize_with_flat_evidence() {
        let count = serde_json::to_value(Anomaly::count_mismatch(5, 3)).unwrap();
        assert_eq!(count["type"], "count_mismatch");
        assert_eq!(count["metadata_count"], 5);
        assert_eq!(count["detected_count"], 3);

        let position = serde_json::to_value(Anomaly::placeholder_position(&regions(1)[0])).unwrap();
        assert_eq!(position["type"], "position_mismatch");
        assert_eq!(position["coordinates"]["x"], 10);
        assert_eq!(position["coordinates"]["height"], 80);
    }
}
