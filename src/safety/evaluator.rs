//! Per-frame guardrail authenticity check.
//!
//! A real guardrail sits in front of the scaffold platform it bounds, so its
//! bounding box covers less image area than the platform's. When the detector
//! labels a large scaffold surface as "Guardrail", the area relation inverts.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::detect::{Detection, DetectionFrame, TrackedClass};
use crate::frame::DepthImage;

pub const DEFAULT_AREA_RATIO_THRESHOLD: f64 = 1.0;
pub const DEFAULT_MIN_DETECTION_CONFIDENCE: f32 = 0.6;
pub const DEFAULT_MAX_DETECTION_DISTANCE_M: f32 = 10.0;

/// Outcome of the safety check for one frame (or the stable aggregate).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SafetyVerdict {
    Safe,
    GuardrailMisclassified,
    Indeterminate,
}

impl fmt::Display for SafetyVerdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            SafetyVerdict::Safe => "safe",
            SafetyVerdict::GuardrailMisclassified => "guardrail misclassified",
            SafetyVerdict::Indeterminate => "indeterminate",
        };
        f.write_str(label)
    }
}

#[derive(Clone, Debug)]
pub struct EvaluatorConfig {
    /// Class label per model class id.
    pub class_names: Vec<String>,
    /// `Safe` requires `area(scaffold) > area(guardrail) * threshold`.
    pub area_ratio_threshold: f64,
    pub min_detection_confidence: f32,
    pub enable_depth_check: bool,
    /// Meters.
    pub max_detection_distance: f32,
}

impl Default for EvaluatorConfig {
    fn default() -> Self {
        Self {
            class_names: vec![
                TrackedClass::Guardrail.label().to_string(),
                TrackedClass::SuspensionScaffold.label().to_string(),
            ],
            area_ratio_threshold: DEFAULT_AREA_RATIO_THRESHOLD,
            min_detection_confidence: DEFAULT_MIN_DETECTION_CONFIDENCE,
            enable_depth_check: true,
            max_detection_distance: DEFAULT_MAX_DETECTION_DISTANCE_M,
        }
    }
}

/// Everything the evaluator looked at to reach a verdict.
#[derive(Clone, Debug)]
pub struct SafetyAssessment {
    pub verdict: SafetyVerdict,
    pub guardrail: Option<Detection>,
    pub scaffold: Option<Detection>,
    /// `area(scaffold) / area(guardrail)` when both classes are present.
    pub area_ratio: Option<f64>,
    /// Median guardrail distance in meters when depth was consulted.
    pub guardrail_distance_m: Option<f32>,
}

pub struct SafetyEvaluator {
    config: EvaluatorConfig,
    class_map: Vec<Option<TrackedClass>>,
}

impl SafetyEvaluator {
    pub fn new(config: EvaluatorConfig) -> Self {
        let class_map = config
            .class_names
            .iter()
            .map(|name| TrackedClass::from_label(name))
            .collect();
        Self { config, class_map }
    }

    pub fn config(&self) -> &EvaluatorConfig {
        &self.config
    }

    pub fn evaluate(&self, frame: &DetectionFrame, depth: Option<&DepthImage>) -> SafetyVerdict {
        self.assess(frame, depth).verdict
    }

    pub fn assess(&self, frame: &DetectionFrame, depth: Option<&DepthImage>) -> SafetyAssessment {
        let guardrail = self.authoritative(frame, TrackedClass::Guardrail);
        let scaffold = self.authoritative(frame, TrackedClass::SuspensionScaffold);

        let (Some(g), Some(s)) = (guardrail, scaffold) else {
            return SafetyAssessment {
                verdict: SafetyVerdict::Indeterminate,
                guardrail,
                scaffold,
                area_ratio: None,
                guardrail_distance_m: None,
            };
        };

        let guardrail_area = g.bbox.area();
        let scaffold_area = s.bbox.area();
        let mut verdict = if scaffold_area > guardrail_area * self.config.area_ratio_threshold {
            SafetyVerdict::Safe
        } else {
            SafetyVerdict::GuardrailMisclassified
        };

        let mut guardrail_distance_m = None;
        if let (true, Some(depth)) = (self.config.enable_depth_check, depth) {
            guardrail_distance_m = depth.median_distance_in(&g.bbox);
            let in_range = guardrail_distance_m
                .is_some_and(|d| d <= self.config.max_detection_distance);
            // Out-of-range readings never back a safety-positive call.
            if verdict == SafetyVerdict::Safe && !in_range {
                verdict = SafetyVerdict::Indeterminate;
            }
        }

        SafetyAssessment {
            verdict,
            guardrail,
            scaffold,
            area_ratio: Some(scaffold_area / guardrail_area),
            guardrail_distance_m,
        }
    }

    /// Highest-confidence usable detection for `class`; ties keep the earliest.
    fn authoritative(&self, frame: &DetectionFrame, class: TrackedClass) -> Option<Detection> {
        let mut best: Option<Detection> = None;
        for det in &frame.detections {
            if self.class_of(det.class_id) != Some(class)
                || !det.is_well_formed()
                || det.confidence < self.config.min_detection_confidence
            {
                continue;
            }
            if best.map_or(true, |b| det.confidence > b.confidence) {
                best = Some(*det);
            }
        }
        best
    }

    fn class_of(&self, class_id: u32) -> Option<TrackedClass> {
        self.class_map.get(class_id as usize).copied().flatten()
    }
}
