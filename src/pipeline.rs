//! Perception pipeline: camera -> detector -> evaluator -> aggregator.
//!
//! The sequencer pulls verdicts from this pipeline at decision points. Each
//! pull processes up to `frames_per_decision` frames. A frame that cannot be
//! captured or detected contributes `Indeterminate`; it never fails the pull.

use anyhow::Result;

use crate::detect::{DetectionFrame, DetectorBackend};
use crate::flight::VerdictSource;
use crate::frame::FramePair;
use crate::ingest::CameraSource;
use crate::overlay::OverlayWriter;
use crate::safety::{
    AggregatedVerdict, Alert, AlertPolicy, SafetyAssessment, SafetyEvaluator, SafetyVerdict,
    VerdictAggregator,
};

pub const DEFAULT_FRAMES_PER_DECISION: u32 = 5;

/// Running counters for one pipeline.
#[derive(Clone, Debug, Default, PartialEq, Eq, serde::Serialize)]
pub struct PipelineStats {
    pub frames_processed: u64,
    pub frames_failed: u64,
    pub safe_frames: u64,
    pub misclassified_frames: u64,
    pub indeterminate_frames: u64,
    pub verdict_changes: u64,
    pub alerts: Vec<String>,
    pub overlays_saved: u64,
}

impl PipelineStats {
    fn count(&mut self, verdict: SafetyVerdict) {
        match verdict {
            SafetyVerdict::Safe => self.safe_frames += 1,
            SafetyVerdict::GuardrailMisclassified => self.misclassified_frames += 1,
            SafetyVerdict::Indeterminate => self.indeterminate_frames += 1,
        }
    }
}

pub struct PerceptionPipeline<S: CameraSource, D: DetectorBackend> {
    camera: S,
    detector: D,
    evaluator: SafetyEvaluator,
    aggregator: VerdictAggregator,
    alerts: AlertPolicy,
    frames_per_decision: u32,
    max_frames: Option<u64>,
    overlay: Option<OverlayWriter>,
    stats: PipelineStats,
}

impl<S: CameraSource, D: DetectorBackend> PerceptionPipeline<S, D> {
    pub fn new(
        camera: S,
        detector: D,
        evaluator: SafetyEvaluator,
        aggregator: VerdictAggregator,
    ) -> Self {
        Self {
            camera,
            detector,
            evaluator,
            aggregator,
            alerts: AlertPolicy::default(),
            frames_per_decision: DEFAULT_FRAMES_PER_DECISION,
            max_frames: None,
            overlay: None,
            stats: PipelineStats::default(),
        }
    }

    pub fn with_alert_policy(mut self, alerts: AlertPolicy) -> Self {
        self.alerts = alerts;
        self
    }

    /// Frames processed per verdict pull (at least one).
    pub fn with_frames_per_decision(mut self, frames: u32) -> Self {
        self.frames_per_decision = frames.max(1);
        self
    }

    /// Stop capturing after `max` frames; later pulls return the last stable verdict.
    pub fn with_max_frames(mut self, max: Option<u64>) -> Self {
        self.max_frames = max;
        self
    }

    pub fn with_overlay(mut self, overlay: OverlayWriter) -> Self {
        self.overlay = Some(overlay);
        self
    }

    pub fn start(&mut self) -> Result<()> {
        self.detector.warm_up()?;
        self.camera.start()?;
        log::info!(
            "perception pipeline started (detector={}, {} frames per decision)",
            self.detector.name(),
            self.frames_per_decision
        );
        Ok(())
    }

    pub fn stop(&mut self) -> Result<()> {
        self.camera.stop()
    }

    pub fn stats(&self) -> &PipelineStats {
        &self.stats
    }

    pub fn aggregator(&self) -> &VerdictAggregator {
        &self.aggregator
    }

    pub fn camera(&self) -> &S {
        &self.camera
    }

    fn budget_exhausted(&self) -> bool {
        self.max_frames
            .is_some_and(|max| self.stats.frames_processed >= max)
    }

    /// Capture, detect and evaluate one frame, then feed the aggregator.
    pub fn process_frame(&mut self) -> AggregatedVerdict {
        let verdict = match self.capture_and_assess() {
            Ok((pair, record, assessment)) => {
                log::debug!(
                    "frame {}: {} detections -> {} (ratio {:?}, guardrail distance {:?})",
                    record.timestamp_ms,
                    record.detections.len(),
                    assessment.verdict,
                    assessment.area_ratio,
                    assessment.guardrail_distance_m
                );
                self.save_overlay(&pair, &record, &assessment);
                assessment.verdict
            }
            Err(e) => {
                self.stats.frames_failed += 1;
                log::warn!("perception failed for this frame: {:#}", e);
                SafetyVerdict::Indeterminate
            }
        };
        self.stats.frames_processed += 1;
        self.stats.count(verdict);

        let aggregated = self.aggregator.push(verdict);
        if aggregated.changed {
            self.stats.verdict_changes += 1;
            log::warn!("stable safety verdict changed to {}", aggregated.current);
        }
        if let Some(alert) = self.alerts.check(&aggregated) {
            let label = match alert {
                Alert::FakeGuardrail => "fake_guardrail",
                Alert::NoDetection => "no_detection",
            };
            self.stats.alerts.push(label.to_string());
        }
        aggregated
    }

    fn capture_and_assess(&mut self) -> Result<(FramePair, DetectionFrame, SafetyAssessment)> {
        let pair = self.camera.next_frame()?;
        let detections = self.detector.detect(&pair.color)?;
        let record = DetectionFrame::new(pair.timestamp_ms, detections);
        let assessment = self.evaluator.assess(&record, pair.depth.as_ref());
        Ok((pair, record, assessment))
    }

    fn save_overlay(
        &mut self,
        pair: &FramePair,
        record: &DetectionFrame,
        assessment: &SafetyAssessment,
    ) {
        if let Some(writer) = self.overlay.as_mut() {
            match writer.save(&pair.color, record, assessment) {
                Ok(path) => {
                    self.stats.overlays_saved += 1;
                    log::debug!("saved annotated frame {}", path.display());
                }
                Err(e) => log::warn!("annotated frame not saved: {:#}", e),
            }
        }
    }
}

impl<S: CameraSource, D: DetectorBackend> VerdictSource for PerceptionPipeline<S, D> {
    fn current_verdict(&mut self) -> AggregatedVerdict {
        for _ in 0..self.frames_per_decision {
            if self.budget_exhausted() {
                log::debug!(
                    "frame budget of {:?} reached, holding last verdict",
                    self.max_frames
                );
                break;
            }
            self.process_frame();
        }
        self.aggregator.snapshot()
    }
}
