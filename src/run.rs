//! One inspection run: owns the camera, detector and vehicle link for its
//! duration and releases them on every exit path.

use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use anyhow::Result;

use crate::config::InspectionConfig;
use crate::detect::DetectorBackend;
use crate::flight::{Clock, FlightSequencer, ManeuverPlan, SystemClock, VehicleLink};
use crate::ingest::CameraSource;
use crate::overlay::OverlayWriter;
use crate::pipeline::PerceptionPipeline;
use crate::report::InspectionReport;
use crate::safety::{SafetyEvaluator, VerdictAggregator};

pub struct InspectionRun<S, D, L, C = SystemClock>
where
    S: CameraSource,
    D: DetectorBackend,
    L: VehicleLink,
    C: Clock,
{
    pipeline: PerceptionPipeline<S, D>,
    sequencer: FlightSequencer<L, C>,
}

impl<S, D, L, C> InspectionRun<S, D, L, C>
where
    S: CameraSource,
    D: DetectorBackend,
    L: VehicleLink,
    C: Clock,
{
    pub fn new(pipeline: PerceptionPipeline<S, D>, sequencer: FlightSequencer<L, C>) -> Self {
        Self {
            pipeline,
            sequencer,
        }
    }

    /// Wire collaborators from configuration with the standard inspection plan.
    pub fn from_config(
        config: &InspectionConfig,
        camera: S,
        detector: D,
        link: L,
        clock: C,
    ) -> Result<Self> {
        let plan = ManeuverPlan::standard(&config.plan_params())?;
        let mut pipeline = PerceptionPipeline::new(
            camera,
            detector,
            SafetyEvaluator::new(config.evaluator_config()),
            VerdictAggregator::new(config.safety.hysteresis_frames),
        )
        .with_alert_policy(config.alerts)
        .with_frames_per_decision(config.safety.frames_per_decision);
        if let Some(dir) = &config.output.image_save_path {
            pipeline = pipeline.with_overlay(OverlayWriter::new(dir)?);
        }
        let sequencer =
            FlightSequencer::with_clock(link, plan, config.sequencer_config(), clock);
        Ok(Self::new(pipeline, sequencer))
    }

    pub fn with_stop_signal(mut self, stop: Arc<AtomicBool>) -> Self {
        self.sequencer = self.sequencer.with_stop_signal(stop);
        self
    }

    pub fn with_max_frames(mut self, max: Option<u64>) -> Self {
        self.pipeline = self.pipeline.with_max_frames(max);
        self
    }

    pub fn pipeline(&self) -> &PerceptionPipeline<S, D> {
        &self.pipeline
    }

    pub fn sequencer(&self) -> &FlightSequencer<L, C> {
        &self.sequencer
    }

    /// Start perception, fly the plan, then stop the camera.
    ///
    /// Fails only when perception cannot start; the vehicle is never
    /// contacted in that case. Flight aborts are reported, not returned as
    /// errors.
    pub fn execute(&mut self) -> Result<InspectionReport> {
        if let Err(e) = self.pipeline.start() {
            self.stop_camera();
            return Err(e.context("perception pipeline failed to start"));
        }

        let sequence = self.sequencer.run(&mut self.pipeline);
        self.stop_camera();

        let report = InspectionReport::new(
            self.sequencer.plan().clone(),
            sequence,
            self.pipeline.stats().clone(),
            self.pipeline.aggregator().current(),
        );
        match &report.abort_reason {
            Some(reason) => log::error!("inspection aborted: {}", reason),
            None => log::info!(
                "inspection complete: {} frames, final verdict {}",
                report.perception.frames_processed,
                report.final_verdict
            ),
        }
        Ok(report)
    }

    fn stop_camera(&mut self) {
        if let Err(e) = self.pipeline.stop() {
            log::warn!("camera stop failed: {:#}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::{Scenario, ScriptedBackend};
    use crate::flight::{LandingTrigger, ManualClock, SimulatedVehicle};
    use crate::ingest::SyntheticCamera;
    use crate::safety::SafetyVerdict;

    fn small_config() -> InspectionConfig {
        let mut cfg = InspectionConfig::default();
        cfg.camera.width = 64;
        cfg.camera.height = 48;
        cfg
    }

    fn run_for(
        scenario: Scenario,
        link: SimulatedVehicle,
    ) -> InspectionRun<SyntheticCamera, ScriptedBackend, SimulatedVehicle, ManualClock> {
        let cfg = small_config();
        InspectionRun::from_config(
            &cfg,
            SyntheticCamera::new(cfg.camera_config()),
            ScriptedBackend::from_scenario(scenario, 64, 48),
            link,
            ManualClock::new(),
        )
        .unwrap()
    }

    #[test]
    fn safe_scene_flies_full_plan_and_releases_resources() {
        let mut run = run_for(Scenario::Safe, SimulatedVehicle::default());
        let report = run.execute().unwrap();
        assert!(report.completed);
        assert_eq!(report.final_verdict, SafetyVerdict::Safe);
        assert!(report.sequence.skipped_steps.is_empty());
        assert_eq!(report.perception.frames_processed, 25);
        assert!(!run.pipeline().camera().is_healthy());
        assert!(run.sequencer().link().is_closed());
    }

    #[test]
    fn misclassified_scene_lands_early() {
        let mut run = run_for(Scenario::Misclassified, SimulatedVehicle::default());
        let report = run.execute().unwrap();
        assert!(report.completed);
        assert_eq!(
            report.sequence.landing_trigger,
            Some(LandingTrigger::Misclassification)
        );
        assert_eq!(report.perception.alerts, vec!["fake_guardrail".to_string()]);
    }

    #[test]
    fn abort_still_stops_camera() {
        let mut run = run_for(Scenario::Safe, SimulatedVehicle::default().refusing_arm());
        let report = run.execute().unwrap();
        assert!(!report.completed);
        assert!(report.abort_reason.is_some());
        assert!(!run.pipeline().camera().is_healthy());
        assert!(run.sequencer().link().is_closed());
    }

    #[test]
    fn report_serializes_to_json() {
        let mut run = run_for(Scenario::Safe, SimulatedVehicle::default());
        let report = run.execute().unwrap();
        let json: serde_json::Value = serde_json::from_str(&report.to_json().unwrap()).unwrap();
        assert_eq!(json["completed"], serde_json::Value::Bool(true));
        assert_eq!(json["sequence"]["final_state"], "Complete");

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out").join("report.json");
        report.write_to(&path).unwrap();
        assert!(path.exists());
    }
}
