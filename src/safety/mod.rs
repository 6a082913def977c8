//! Safety fusion.
//!
//! - `evaluator`: per-frame guardrail authenticity check (area ratio + depth gate)
//! - `aggregator`: hysteresis over consecutive per-frame verdicts
//! - `alert`: edge-triggered operator alerts
//!
//! Perception gaps are absorbed here as `Indeterminate`; nothing in this module
//! can fail or abort a flight.

mod aggregator;
mod alert;
mod evaluator;

pub use aggregator::{AggregatedVerdict, VerdictAggregator, DEFAULT_HYSTERESIS_FRAMES};
pub use alert::{Alert, AlertPolicy};
pub use evaluator::{
    EvaluatorConfig, SafetyAssessment, SafetyEvaluator, SafetyVerdict,
    DEFAULT_AREA_RATIO_THRESHOLD, DEFAULT_MAX_DETECTION_DISTANCE_M,
    DEFAULT_MIN_DETECTION_CONFIDENCE,
};
