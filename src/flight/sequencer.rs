//! Guarded flight sequencer.
//!
//! Executes a `ManeuverPlan` as a state machine:
//!
//! `Idle -> Arming -> TakingOff -> Holding -> Displacing(i)... -> Descending
//!  -> ReturningToLaunch -> Disarming -> Complete`, or terminal `Aborted`.
//!
//! Every transition that depends on the vehicle blocks on a telemetry
//! condition via `poll_until`. Before each displacement the sequencer reads the
//! stable safety verdict; a stable `GuardrailMisclassified` skips the remaining
//! displacements and lands through the normal descent/RTL/disarm path.
//!
//! The vehicle link is closed on every exit path.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;

use super::clock::{Clock, SystemClock};
use super::plan::{pulse_duration, Axis, DescentTarget, ManeuverKind, ManeuverPlan};
use super::poll::poll_until;
use super::telemetry::{FlightMode, GlobalPosition, TelemetrySnapshot, Velocity, VehicleLink};
use crate::safety::{AggregatedVerdict, SafetyVerdict, VerdictAggregator};

/// Fraction of the takeoff altitude that counts as "reached".
pub const TAKEOFF_REACHED_FRACTION: f64 = 0.95;
pub const DEFAULT_ALTITUDE_TOLERANCE_M: f64 = 0.5;
pub const DEFAULT_CONNECTION_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Supplies the stable safety verdict at sequencer decision points.
pub trait VerdictSource {
    fn current_verdict(&mut self) -> AggregatedVerdict;
}

impl VerdictSource for VerdictAggregator {
    fn current_verdict(&mut self) -> AggregatedVerdict {
        self.snapshot()
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub enum AbortReason {
    ConnectFailed(String),
    ArmTimeout,
    AltitudeTimeout,
    ModeChangeTimeout,
    DisarmTimeout,
    LinkFailure(String),
}

impl fmt::Display for AbortReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AbortReason::ConnectFailed(msg) => write!(f, "vehicle connection failed: {}", msg),
            AbortReason::ArmTimeout => f.write_str("vehicle did not arm before timeout"),
            AbortReason::AltitudeTimeout => {
                f.write_str("vehicle did not reach takeoff altitude before timeout")
            }
            AbortReason::ModeChangeTimeout => {
                f.write_str("vehicle did not enter the requested mode before timeout")
            }
            AbortReason::DisarmTimeout => f.write_str("vehicle did not disarm before timeout"),
            AbortReason::LinkFailure(msg) => write!(f, "vehicle link failure: {}", msg),
        }
    }
}

impl std::error::Error for AbortReason {}

fn link_failure(err: anyhow::Error) -> AbortReason {
    AbortReason::LinkFailure(format!("{:#}", err))
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub enum SequencerState {
    Idle,
    Arming,
    TakingOff,
    Holding,
    /// Plan index of the displacement step being flown.
    Displacing(usize),
    Descending,
    ReturningToLaunch,
    Disarming,
    Complete,
    Aborted(AbortReason),
}

impl SequencerState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, SequencerState::Complete | SequencerState::Aborted(_))
    }
}

impl fmt::Display for SequencerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SequencerState::Displacing(i) => write!(f, "Displacing(step {})", i),
            SequencerState::Aborted(reason) => write!(f, "Aborted({})", reason),
            other => write!(f, "{:?}", other),
        }
    }
}

/// Why the displacement phase was cut short.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum LandingTrigger {
    Misclassification,
    OperatorStop,
}

#[derive(Clone, Debug)]
pub struct SequencerConfig {
    pub connection_string: String,
    pub connect_timeout: Duration,
    pub arm_timeout: Duration,
    pub poll_interval: Duration,
    pub altitude_tolerance_m: f64,
}

impl Default for SequencerConfig {
    fn default() -> Self {
        Self {
            connection_string: "tcp:127.0.0.1:5760".to_string(),
            connect_timeout: DEFAULT_CONNECTION_TIMEOUT,
            arm_timeout: DEFAULT_CONNECTION_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
            altitude_tolerance_m: DEFAULT_ALTITUDE_TOLERANCE_M,
        }
    }
}

/// What happened during one sequencer run.
#[derive(Clone, Debug, Serialize)]
pub struct SequenceReport {
    pub final_state: SequencerState,
    /// Every state entered, starting at `Idle`.
    pub trace: Vec<SequencerState>,
    pub executed_steps: Vec<usize>,
    pub skipped_steps: Vec<usize>,
    pub landing_trigger: Option<LandingTrigger>,
    /// Stable verdict read before each displacement decision.
    pub verdicts_consulted: Vec<SafetyVerdict>,
    /// Descent wait expired before the target altitude was reached.
    pub descent_diverged: bool,
    pub last_telemetry: Option<TelemetrySnapshot>,
}

impl SequenceReport {
    pub fn is_complete(&self) -> bool {
        self.final_state == SequencerState::Complete
    }

    pub fn abort_reason(&self) -> Option<&AbortReason> {
        match &self.final_state {
            SequencerState::Aborted(reason) => Some(reason),
            _ => None,
        }
    }
}

pub struct FlightSequencer<L: VehicleLink, C: Clock = SystemClock> {
    link: L,
    clock: C,
    config: SequencerConfig,
    plan: ManeuverPlan,
    stop: Option<Arc<AtomicBool>>,
    state: SequencerState,
    trace: Vec<SequencerState>,
    executed_steps: Vec<usize>,
    skipped_steps: Vec<usize>,
    landing_trigger: Option<LandingTrigger>,
    verdicts_consulted: Vec<SafetyVerdict>,
    descent_diverged: bool,
    last_telemetry: Option<TelemetrySnapshot>,
}

impl<L: VehicleLink> FlightSequencer<L, SystemClock> {
    pub fn new(link: L, plan: ManeuverPlan, config: SequencerConfig) -> Self {
        Self::with_clock(link, plan, config, SystemClock::new())
    }
}

impl<L: VehicleLink, C: Clock> FlightSequencer<L, C> {
    pub fn with_clock(link: L, plan: ManeuverPlan, config: SequencerConfig, clock: C) -> Self {
        Self {
            link,
            clock,
            config,
            plan,
            stop: None,
            state: SequencerState::Idle,
            trace: vec![SequencerState::Idle],
            executed_steps: Vec::new(),
            skipped_steps: Vec::new(),
            landing_trigger: None,
            verdicts_consulted: Vec::new(),
            descent_diverged: false,
            last_telemetry: None,
        }
    }

    /// When the flag is set, the next displacement decision lands instead.
    pub fn with_stop_signal(mut self, stop: Arc<AtomicBool>) -> Self {
        self.stop = Some(stop);
        self
    }

    pub fn state(&self) -> &SequencerState {
        &self.state
    }

    pub fn plan(&self) -> &ManeuverPlan {
        &self.plan
    }

    pub fn link(&self) -> &L {
        &self.link
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    pub fn into_link(self) -> L {
        self.link
    }

    /// Run the plan to a terminal state. Always closes the vehicle link.
    ///
    /// A sequencer runs once; calling `run` again returns the same report
    /// without touching the vehicle.
    pub fn run(&mut self, verdicts: &mut dyn VerdictSource) -> SequenceReport {
        if !self.state.is_terminal() {
            let final_state = match self.execute(verdicts) {
                Ok(()) => {
                    log::info!("sequence complete");
                    SequencerState::Complete
                }
                Err(reason) => {
                    log::error!("sequence aborted in {}: {}", self.state, reason);
                    SequencerState::Aborted(reason)
                }
            };
            self.enter(final_state);
            if let Err(e) = self.link.close() {
                log::warn!("vehicle link close failed: {:#}", e);
            }
        }
        self.report()
    }

    fn report(&self) -> SequenceReport {
        SequenceReport {
            final_state: self.state.clone(),
            trace: self.trace.clone(),
            executed_steps: self.executed_steps.clone(),
            skipped_steps: self.skipped_steps.clone(),
            landing_trigger: self.landing_trigger,
            verdicts_consulted: self.verdicts_consulted.clone(),
            descent_diverged: self.descent_diverged,
            last_telemetry: self.last_telemetry,
        }
    }

    fn execute(&mut self, verdicts: &mut dyn VerdictSource) -> Result<(), AbortReason> {
        self.link
            .connect(&self.config.connection_string, self.config.connect_timeout)
            .map_err(|e| AbortReason::ConnectFailed(format!("{:#}", e)))?;

        self.enter(SequencerState::Arming);
        self.link.set_mode(FlightMode::Guided).map_err(link_failure)?;
        self.link.arm().map_err(link_failure)?;
        if !self.wait_for(self.config.arm_timeout, |t| t.armed)? {
            return Err(AbortReason::ArmTimeout);
        }

        let mut cursor = 0;
        while cursor < self.plan.len() {
            let step = self.plan.steps()[cursor];
            match step.kind {
                ManeuverKind::Takeoff { altitude_m } => {
                    self.enter(SequencerState::TakingOff);
                    self.link.takeoff(altitude_m).map_err(link_failure)?;
                    let reached = altitude_m * TAKEOFF_REACHED_FRACTION;
                    if !self.wait_for(step.timeout, |t| t.altitude_m >= reached)? {
                        return Err(AbortReason::AltitudeTimeout);
                    }
                }
                ManeuverKind::HoldAltitude { dwell } => {
                    self.enter(SequencerState::Holding);
                    self.clock.sleep(dwell);
                }
                ManeuverKind::Displace {
                    axis,
                    distance_m,
                    speed_mps,
                } => {
                    if let Some(trigger) = self.landing_trigger_for(verdicts) {
                        cursor = self.skip_to_landing(cursor, trigger);
                        continue;
                    }
                    self.enter(SequencerState::Displacing(cursor));
                    self.displace(axis, distance_m, speed_mps)?;
                }
                ManeuverKind::DescendTo(target) => {
                    self.enter(SequencerState::Descending);
                    self.descend(target, step.timeout)?;
                }
                ManeuverKind::ReturnToLaunch => {
                    self.enter(SequencerState::ReturningToLaunch);
                    self.link.set_mode(FlightMode::Rtl).map_err(link_failure)?;
                    if !self.wait_for(step.timeout, |t| t.mode == FlightMode::Rtl)? {
                        return Err(AbortReason::ModeChangeTimeout);
                    }
                }
                ManeuverKind::Disarm => {
                    self.enter(SequencerState::Disarming);
                    self.link.disarm().map_err(link_failure)?;
                    if !self.wait_for(step.timeout, |t| !t.armed)? {
                        return Err(AbortReason::DisarmTimeout);
                    }
                }
            }
            self.executed_steps.push(cursor);
            cursor += 1;
        }
        Ok(())
    }

    fn enter(&mut self, next: SequencerState) {
        log::info!("sequencer: {} -> {}", self.state, next);
        self.state = next.clone();
        self.trace.push(next);
    }

    fn landing_trigger_for(&mut self, verdicts: &mut dyn VerdictSource) -> Option<LandingTrigger> {
        if self
            .stop
            .as_ref()
            .is_some_and(|stop| stop.load(Ordering::SeqCst))
        {
            return Some(LandingTrigger::OperatorStop);
        }
        let aggregated = verdicts.current_verdict();
        self.verdicts_consulted.push(aggregated.current);
        log::info!(
            "safety verdict before displacement: {} (streak {})",
            aggregated.current,
            aggregated.streak
        );
        (aggregated.current == SafetyVerdict::GuardrailMisclassified)
            .then_some(LandingTrigger::Misclassification)
    }

    /// Skip every remaining step up to the first descent/RTL step.
    fn skip_to_landing(&mut self, cursor: usize, trigger: LandingTrigger) -> usize {
        let landing = self
            .plan
            .landing_index_from(cursor)
            .unwrap_or(self.plan.len() - 1);
        self.skipped_steps.extend(cursor..landing);
        self.landing_trigger = Some(trigger);
        log::warn!(
            "{:?}: skipping steps {}..{} and landing",
            trigger,
            cursor,
            landing
        );
        landing
    }

    fn displace(&mut self, axis: Axis, distance_m: f64, speed_mps: f64) -> Result<(), AbortReason> {
        // `ManeuverPlan::new` rejects steps without a representable pulse.
        let Some(duration) = pulse_duration(distance_m, speed_mps) else {
            log::error!(
                "displacement of {:.2} m at {:.2} m/s is not flyable, skipping",
                distance_m,
                speed_mps
            );
            return Ok(());
        };
        let velocity = axis.velocity(speed_mps.copysign(distance_m));
        log::info!(
            "displacing {:?} {:.2} m at {:.2} m/s for {:?}",
            axis,
            distance_m,
            speed_mps,
            duration
        );
        self.link.set_velocity(velocity).map_err(link_failure)?;
        self.clock.sleep(duration);
        self.link.set_velocity(Velocity::ZERO).map_err(link_failure)?;
        Ok(())
    }

    fn descend(&mut self, target: DescentTarget, timeout: Duration) -> Result<(), AbortReason> {
        let snapshot = self.link.read_telemetry().map_err(link_failure)?;
        self.last_telemetry = Some(snapshot);
        let target_alt = target.resolve(snapshot.altitude_m);
        log::info!(
            "descending from {:.2} m to {:.2} m",
            snapshot.altitude_m,
            target_alt
        );
        self.link
            .goto(GlobalPosition {
                lat: snapshot.position.lat,
                lon: snapshot.position.lon,
                alt: target_alt,
            })
            .map_err(link_failure)?;

        let ceiling = target_alt + self.config.altitude_tolerance_m;
        if !self.wait_for(timeout, |t| t.altitude_m <= ceiling)? {
            // RTL finishes the landing; the descent wait is best-effort.
            self.descent_diverged = true;
            log::warn!(
                "descent target {:.2} m not reached within {:?} (last altitude {:?})",
                target_alt,
                timeout,
                self.last_telemetry.map(|t| t.altitude_m)
            );
        }
        Ok(())
    }

    /// Poll telemetry until `condition` holds. `Ok(false)` on timeout.
    fn wait_for<F>(&mut self, timeout: Duration, condition: F) -> Result<bool, AbortReason>
    where
        F: Fn(&TelemetrySnapshot) -> bool,
    {
        let link = &mut self.link;
        let mut last = None;
        let outcome = poll_until(&self.clock, self.config.poll_interval, timeout, || {
            let snapshot = link.read_telemetry()?;
            last = Some(snapshot);
            Ok(condition(&snapshot))
        })
        .map_err(link_failure)?;
        if last.is_some() {
            self.last_telemetry = last;
        }
        log::debug!("telemetry wait finished: {:?}", outcome);
        Ok(outcome.is_satisfied())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flight::clock::ManualClock;
    use crate::flight::plan::PlanParams;
    use crate::flight::sim::{SimulatedVehicle, VehicleCommand};

    fn sequencer(link: SimulatedVehicle) -> FlightSequencer<SimulatedVehicle, ManualClock> {
        let plan = ManeuverPlan::standard(&PlanParams::default()).unwrap();
        FlightSequencer::with_clock(link, plan, SequencerConfig::default(), ManualClock::new())
    }

    fn stable(verdict: SafetyVerdict) -> VerdictAggregator {
        let mut agg = VerdictAggregator::new(1);
        agg.push(verdict);
        agg
    }

    #[test]
    fn displacement_is_a_timed_velocity_pulse() {
        let mut seq = sequencer(SimulatedVehicle::default());
        let report = seq.run(&mut stable(SafetyVerdict::Safe));
        assert!(report.is_complete());

        let velocities = seq.link().velocity_commands();
        assert_eq!(
            velocities,
            vec![
                Velocity::new(0.5, 0.0, 0.0),
                Velocity::new(-0.5, 0.0, 0.0),
                Velocity::new(0.0, -0.5, 0.0),
                Velocity::new(0.0, 0.5, 0.0),
                Velocity::new(0.0, 0.0, -0.3),
            ]
        );
        let zeroing = seq
            .link()
            .commands()
            .iter()
            .filter(|c| **c == VehicleCommand::SetVelocity(Velocity::ZERO))
            .count();
        assert_eq!(zeroing, 5);
    }

    #[test]
    fn misclassification_skips_displacements() {
        let mut seq = sequencer(SimulatedVehicle::default());
        let report = seq.run(&mut stable(SafetyVerdict::GuardrailMisclassified));
        assert!(report.is_complete());
        assert_eq!(report.landing_trigger, Some(LandingTrigger::Misclassification));
        assert_eq!(report.skipped_steps, vec![2, 3, 4, 5, 6]);
        assert!(seq.link().velocity_commands().is_empty());
    }

    #[test]
    fn indeterminate_proceeds() {
        let mut seq = sequencer(SimulatedVehicle::default());
        let report = seq.run(&mut stable(SafetyVerdict::Indeterminate));
        assert!(report.is_complete());
        assert!(report.skipped_steps.is_empty());
        assert_eq!(report.verdicts_consulted.len(), 5);
    }

    #[test]
    fn operator_stop_lands_without_consulting_verdicts() {
        let stop = Arc::new(AtomicBool::new(true));
        let mut seq = sequencer(SimulatedVehicle::default()).with_stop_signal(stop);
        let report = seq.run(&mut stable(SafetyVerdict::Safe));
        assert!(report.is_complete());
        assert_eq!(report.landing_trigger, Some(LandingTrigger::OperatorStop));
        assert!(report.verdicts_consulted.is_empty());
    }

    #[test]
    fn arm_timeout_respects_budget() {
        let mut seq = sequencer(SimulatedVehicle::default().refusing_arm());
        let report = seq.run(&mut stable(SafetyVerdict::Safe));
        assert_eq!(report.abort_reason(), Some(&AbortReason::ArmTimeout));
        assert_eq!(seq.clock().now(), DEFAULT_CONNECTION_TIMEOUT);
        assert!(seq.link().is_closed());
    }

    #[test]
    fn stalled_climb_is_altitude_timeout() {
        let mut seq = sequencer(SimulatedVehicle::default().with_altitude_ceiling(1.0));
        let report = seq.run(&mut stable(SafetyVerdict::Safe));
        assert_eq!(report.abort_reason(), Some(&AbortReason::AltitudeTimeout));
        assert!(seq.link().is_closed());
    }

    #[test]
    fn refused_rtl_is_mode_change_timeout() {
        let mut seq = sequencer(SimulatedVehicle::default().refusing_mode(FlightMode::Rtl));
        let report = seq.run(&mut stable(SafetyVerdict::Safe));
        assert_eq!(report.abort_reason(), Some(&AbortReason::ModeChangeTimeout));
    }

    #[test]
    fn ignored_disarm_is_disarm_timeout() {
        let mut seq = sequencer(SimulatedVehicle::default().ignoring_disarm());
        let report = seq.run(&mut stable(SafetyVerdict::Safe));
        assert_eq!(report.abort_reason(), Some(&AbortReason::DisarmTimeout));
        assert!(seq.link().is_closed());
    }

    #[test]
    fn connect_failure_is_reported_and_link_closed() {
        let mut seq = sequencer(SimulatedVehicle::default().failing_connect());
        let report = seq.run(&mut stable(SafetyVerdict::Safe));
        assert!(matches!(
            report.abort_reason(),
            Some(AbortReason::ConnectFailed(_))
        ));
        assert_eq!(report.trace, vec![SequencerState::Idle, report.final_state.clone()]);
        assert!(seq.link().is_closed());
    }

    #[test]
    fn lost_telemetry_is_link_failure() {
        let mut seq = sequencer(SimulatedVehicle::default().failing_telemetry_after(3));
        let report = seq.run(&mut stable(SafetyVerdict::Safe));
        assert!(matches!(
            report.abort_reason(),
            Some(AbortReason::LinkFailure(_))
        ));
        assert!(seq.link().is_closed());
    }

    #[test]
    fn second_run_does_not_touch_vehicle() {
        let mut seq = sequencer(SimulatedVehicle::default());
        let first = seq.run(&mut stable(SafetyVerdict::Safe));
        let commands = seq.link().commands().len();
        let second = seq.run(&mut stable(SafetyVerdict::Safe));
        assert_eq!(first.trace, second.trace);
        assert_eq!(seq.link().commands().len(), commands);
    }

    #[test]
    fn descent_targets_one_meter_below_current_altitude() {
        let mut seq = sequencer(SimulatedVehicle::default());
        seq.run(&mut stable(SafetyVerdict::Safe));
        let goto = seq
            .link()
            .commands()
            .iter()
            .find_map(|c| match c {
                VehicleCommand::Goto(p) => Some(*p),
                _ => None,
            })
            .unwrap();
        assert!((goto.alt - 1.0).abs() < 1e-9);
    }
}
