use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use scaffold_inspect::flight::{
    AbortReason, Clock, FlightSequencer, LandingTrigger, ManeuverPlan, ManualClock, PlanParams,
    SequencerConfig, SequencerState, SimulatedVehicle, VehicleCommand,
};
use scaffold_inspect::safety::{AggregatedVerdict, SafetyVerdict};
use scaffold_inspect::VerdictSource;

/// Replays a fixed list of stable verdicts, repeating the last one.
struct VerdictScript {
    verdicts: Vec<SafetyVerdict>,
    pulls: usize,
}

impl VerdictScript {
    fn new(verdicts: Vec<SafetyVerdict>) -> Self {
        Self { verdicts, pulls: 0 }
    }
}

impl VerdictSource for VerdictScript {
    fn current_verdict(&mut self) -> AggregatedVerdict {
        let idx = self.pulls.min(self.verdicts.len() - 1);
        self.pulls += 1;
        AggregatedVerdict {
            current: self.verdicts[idx],
            streak: 3,
            changed: false,
        }
    }
}

/// Reports `Safe` but raises the operator stop flag while doing so.
struct StoppingSource {
    stop: Arc<AtomicBool>,
    pulls: usize,
}

impl VerdictSource for StoppingSource {
    fn current_verdict(&mut self) -> AggregatedVerdict {
        self.pulls += 1;
        self.stop.store(true, Ordering::SeqCst);
        AggregatedVerdict {
            current: SafetyVerdict::Safe,
            streak: 3,
            changed: false,
        }
    }
}

fn sequencer(link: SimulatedVehicle) -> FlightSequencer<SimulatedVehicle, ManualClock> {
    let plan = ManeuverPlan::standard(&PlanParams::default()).expect("standard plan");
    FlightSequencer::with_clock(link, plan, SequencerConfig::default(), ManualClock::new())
}

#[test]
fn safe_run_visits_every_state_in_order() {
    let mut seq = sequencer(SimulatedVehicle::default());
    let report = seq.run(&mut VerdictScript::new(vec![SafetyVerdict::Safe]));

    assert_eq!(
        report.trace,
        vec![
            SequencerState::Idle,
            SequencerState::Arming,
            SequencerState::TakingOff,
            SequencerState::Holding,
            SequencerState::Displacing(2),
            SequencerState::Displacing(3),
            SequencerState::Displacing(4),
            SequencerState::Displacing(5),
            SequencerState::Displacing(6),
            SequencerState::Descending,
            SequencerState::ReturningToLaunch,
            SequencerState::Disarming,
            SequencerState::Complete,
        ]
    );
    assert_eq!(report.executed_steps, (0..10).collect::<Vec<_>>());
    assert!(!report.descent_diverged);
    assert!(seq.link().is_closed());
}

#[test]
fn misclassification_mid_plan_goes_straight_to_landing() {
    let mut seq = sequencer(SimulatedVehicle::default());
    let mut verdicts = VerdictScript::new(vec![
        SafetyVerdict::Safe,
        SafetyVerdict::Safe,
        SafetyVerdict::GuardrailMisclassified,
    ]);
    let report = seq.run(&mut verdicts);

    assert!(report.is_complete());
    assert_eq!(
        report.landing_trigger,
        Some(LandingTrigger::Misclassification)
    );
    assert_eq!(report.skipped_steps, vec![4, 5, 6]);

    let tail: Vec<_> = report
        .trace
        .iter()
        .skip_while(|s| **s != SequencerState::Displacing(3))
        .skip(1)
        .cloned()
        .collect();
    assert_eq!(
        tail,
        vec![
            SequencerState::Descending,
            SequencerState::ReturningToLaunch,
            SequencerState::Disarming,
            SequencerState::Complete,
        ]
    );
    assert_eq!(seq.link().velocity_commands().len(), 2);
}

#[test]
fn stalled_descent_is_recorded_and_landing_continues() {
    let mut seq = sequencer(SimulatedVehicle::default().ignoring_goto());
    let report = seq.run(&mut VerdictScript::new(vec![SafetyVerdict::Safe]));

    assert!(report.is_complete());
    assert!(report.descent_diverged);
    assert!(report.landing_trigger.is_none());

    let tail: Vec<_> = report
        .trace
        .iter()
        .skip_while(|s| **s != SequencerState::Descending)
        .cloned()
        .collect();
    assert_eq!(
        tail,
        vec![
            SequencerState::Descending,
            SequencerState::ReturningToLaunch,
            SequencerState::Disarming,
            SequencerState::Complete,
        ]
    );
    assert!(seq
        .link()
        .commands()
        .iter()
        .any(|c| matches!(c, VehicleCommand::Goto(_))));
    assert!(seq.link().is_closed());
}

#[test]
fn indeterminate_does_not_interrupt_the_plan() {
    let mut seq = sequencer(SimulatedVehicle::default());
    let report = seq.run(&mut VerdictScript::new(vec![
        SafetyVerdict::Indeterminate,
        SafetyVerdict::Safe,
    ]));
    assert!(report.is_complete());
    assert!(report.landing_trigger.is_none());
    assert_eq!(report.verdicts_consulted[0], SafetyVerdict::Indeterminate);
}

#[test]
fn operator_stop_during_flight_lands() {
    let stop = Arc::new(AtomicBool::new(false));
    let mut seq = sequencer(SimulatedVehicle::default()).with_stop_signal(Arc::clone(&stop));
    let mut source = StoppingSource { stop, pulls: 0 };
    let report = seq.run(&mut source);

    assert!(report.is_complete());
    assert_eq!(report.landing_trigger, Some(LandingTrigger::OperatorStop));
    assert_eq!(report.skipped_steps, vec![3, 4, 5, 6]);
    assert_eq!(source.pulls, 1);
}

#[test]
fn arm_timeout_aborts_and_closes_link() {
    let mut seq = sequencer(SimulatedVehicle::default().refusing_arm());
    let report = seq.run(&mut VerdictScript::new(vec![SafetyVerdict::Safe]));

    assert_eq!(report.abort_reason(), Some(&AbortReason::ArmTimeout));
    assert_eq!(
        report.trace,
        vec![
            SequencerState::Idle,
            SequencerState::Arming,
            SequencerState::Aborted(AbortReason::ArmTimeout),
        ]
    );
    assert!(seq.link().is_closed());
    assert!(!seq
        .link()
        .commands()
        .iter()
        .any(|c| matches!(c, VehicleCommand::Takeoff(_))));
}

#[test]
fn arm_wait_respects_configured_timeout() {
    let plan = ManeuverPlan::standard(&PlanParams::default()).expect("standard plan");
    let config = SequencerConfig {
        arm_timeout: Duration::from_secs(5),
        ..SequencerConfig::default()
    };
    let mut seq = FlightSequencer::with_clock(
        SimulatedVehicle::default().refusing_arm(),
        plan,
        config,
        ManualClock::new(),
    );
    seq.run(&mut VerdictScript::new(vec![SafetyVerdict::Safe]));
    assert_eq!(seq.clock().now(), Duration::from_secs(5));
    // One read per second plus the read at the deadline.
    assert_eq!(seq.link().telemetry_reads(), 6);
}
