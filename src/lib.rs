//! Scaffold Inspection Kernel
//!
//! Safety fusion and guarded flight sequencing for drone-based scaffold
//! inspection.
//!
//! # Architecture
//!
//! A camera frame flows through detection and a per-frame safety check, then
//! into a hysteresis filter. The flight sequencer consults the filtered
//! verdict before every displacement:
//!
//! 1. **Authenticity check**: a guardrail whose box covers more area than the
//!    scaffold platform it should bound is treated as misclassified.
//! 2. **Stable verdicts only**: a verdict changes after N consecutive
//!    agreeing frames, so a single noisy frame never moves the vehicle.
//! 3. **Guarded landing**: a stable misclassification skips the remaining
//!    displacements and lands through descent, RTL and disarm.
//! 4. **Bounded waits**: every vehicle transition polls telemetry with a
//!    timeout and aborts with a specific reason when it expires.
//!
//! # Module Structure
//!
//! - `frame`: color/depth images and frame pairs
//! - `ingest`: camera sources (synthetic `stub://` built in)
//! - `detect`: detector backends and detection records
//! - `safety`: evaluator, verdict aggregator, alert policy
//! - `pipeline`: camera -> detector -> evaluator -> aggregator
//! - `flight`: vehicle link, polling, maneuver plan, sequencer, simulator
//! - `overlay`: annotated frame rendering
//! - `run`: one inspection run with scoped teardown
//! - `config`: file + env configuration
//! - `report`: JSON inspection report

pub mod config;
pub mod detect;
pub mod flight;
pub mod frame;
pub mod ingest;
pub mod overlay;
pub mod pipeline;
pub mod report;
pub mod run;
pub mod safety;

pub use config::InspectionConfig;
pub use detect::{BoundingBox, Detection, DetectionFrame, DetectorBackend, TrackedClass};
pub use flight::{
    AbortReason, FlightSequencer, ManeuverPlan, SequenceReport, SequencerState, VehicleLink,
    VerdictSource,
};
pub use frame::{ColorImage, DepthImage, FramePair};
pub use ingest::CameraSource;
pub use pipeline::PerceptionPipeline;
pub use report::InspectionReport;
pub use run::InspectionRun;
pub use safety::{SafetyEvaluator, SafetyVerdict, VerdictAggregator};
