use serde::Serialize;

use crate::detect::{BoundingBox, Detection};
use crate::mapping::Recyclability;

/// A detection enriched with its recyclability verdict.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct DetectedObject {
    pub detected_class: String,
    pub confidence: f32,
    pub recyclability: Recyclability,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bbox: Option<BoundingBox>,
}

impl DetectedObject {
    pub fn new(detection: Detection, recyclability: Recyclability) -> Self {
        Self {
            detected_class: detection.class,
            confidence: detection.confidence,
            recyclability,
            bbox: detection.bbox,
        }
    }
}

/// Per-verdict counts for one image.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ClassificationSummary {
    pub recyclable: usize,
    pub non_recyclable: usize,
    pub compostable: usize,
    pub special_handling: usize,
    pub unknown: usize,
    pub total: usize,
}

impl ClassificationSummary {
    pub fn from_objects(objects: &[DetectedObject]) -> Self {
        let mut summary = Self::default();
        for object in objects {
            *summary.slot(object.recyclability) += 1;
            summary.total += 1;
        }
        summary
    }

    pub fn count(&self, verdict: Recyclability) -> usize {
        match verdict {
            Recyclability::Recyclable => self.recyclable,
            Recyclability::NonRecyclable => self.non_recyclable,
            Recyclability::Compostable => self.compostable,
            Recyclability::SpecialHandling => self.special_handling,
            Recyclability::Unknown => self.unknown,
        }
    }

    fn slot(&mut self, verdict: Recyclability) -> &mut usize {
        match verdict {
            Recyclability::Recyclable => &mut self.recyclable,
            Recyclability::NonRecyclable => &mut self.non_recyclable,
            Recyclability::Compostable => &mut self.compostable,
            Recyclability::SpecialHandling => &mut self.special_handling,
            Recyclability::Unknown => &mut self.unknown,
        }
    }
}

/// Human-readable verdict for the whole image.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Assessment {
    pub message: String,
    pub recommendation: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recyclable_percentage: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub compostable_percentage: Option<f32>,
    pub total_items: usize,
}

const MAJORITY_PCT: f32 = 70.0;

impl Assessment {
    pub fn from_summary(summary: &ClassificationSummary) -> Self {
        if summary.total == 0 {
            return Self {
                message: "No waste items detected in the image".to_string(),
                recommendation: "Try a clearer image with visible waste items".to_string(),
                recyclable_percentage: None,
                compostable_percentage: None,
                total_items: 0,
            };
        }

        let total = summary.total as f32;
        let recyclable_pct = summary.recyclable as f32 / total * 100.0;
        let compostable_pct = summary.compostable as f32 / total * 100.0;

        let (message, recommendation) = if recyclable_pct > MAJORITY_PCT {
            (
                "Great! Most items in this image are recyclable.",
                "Make sure to clean containers and separate materials properly before recycling.",
            )
        } else if compostable_pct > MAJORITY_PCT {
            (
                "Most items are organic waste suitable for composting.",
                "Consider composting these items if you have access to composting facilities.",
            )
        } else if recyclable_pct + compostable_pct > MAJORITY_PCT {
            (
                "Good news! Most items can be diverted from landfill.",
                "Separate recyclable and compostable items appropriately.",
            )
        } else {
            (
                "Several items may need special handling or disposal.",
                "Check local guidelines for proper disposal methods.",
            )
        };

        Self {
            message: message.to_string(),
            recommendation: recommendation.to_string(),
            recyclable_percentage: Some(round_one_decimal(recyclable_pct)),
            compostable_percentage: Some(round_one_decimal(compostable_pct)),
            total_items: summary.total,
        }
    }
}

fn round_one_decimal(value: f32) -> f32 {
    (value * 10.0).round() / 10.0
}

/// Successful classification of one image.
///
/// Built only through `ClassificationReport::new`, so the summary and the
/// assessment always describe `detected_objects`.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ClassificationReport {
    detected_objects: Vec<DetectedObject>,
    summary: ClassificationSummary,
    total_objects_detected: usize,
    confidence_threshold: f32,
    overall_assessment: Assessment,
}

impl ClassificationReport {
    pub fn new(detected_objects: Vec<DetectedObject>, confidence_threshold: f32) -> Self {
        let summary = ClassificationSummary::from_objects(&detected_objects);
        let overall_assessment = Assessment::from_summary(&summary);
        Self {
            total_objects_detected: detected_objects.len(),
            detected_objects,
            summary,
            confidence_threshold,
            overall_assessment,
        }
    }

    pub fn detected_objects(&self) -> &[DetectedObject] {
        &self.detected_objects
    }

    pub fn summary(&self) -> &ClassificationSummary {
        &self.summary
    }

    pub fn assessment(&self) -> &Assessment {
        &self.overall_assessment
    }

    pub fn confidence_threshold(&self) -> f32 {
        self.confidence_threshold
    }
}

/// Outcome of classifying one image. Failures are data, not faults.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum ClassificationResult {
    Success(ClassificationReport),
    Error { error: String },
}

impl ClassificationResult {
    pub fn error(message: impl Into<String>) -> Self {
        ClassificationResult::Error {
            error: message.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ClassificationResult::Success(_))
    }

    pub fn report(&self) -> Option<&ClassificationReport> {
        match self {
            ClassificationResult::Success(report) => Some(report),
            ClassificationResult::Error { .. } => None,
        }
    }

    pub fn error_message(&self) -> Option<&str> {
        match self {
            ClassificationResult::Success(_) => None,
            ClassificationResult::Error { error } => Some(error),
        }
    }
}
