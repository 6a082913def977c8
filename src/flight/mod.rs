//! Guarded flight control.
//!
//! - `telemetry`: vehicle link collaborator trait and telemetry snapshot types
//! - `poll`: generic poll-with-timeout primitive used by every transition
//! - `clock`: time source (system or virtual)
//! - `plan`: maneuver steps and the standard inspection plan
//! - `sequencer`: the state machine
//! - `sim`: deterministic simulated vehicle

pub mod clock;
pub mod plan;
pub mod poll;
pub mod sequencer;
pub mod sim;
pub mod telemetry;

pub use clock::{Clock, ManualClock, SystemClock};
pub use plan::{pulse_duration, Axis, DescentTarget, ManeuverKind, ManeuverPlan, ManeuverStep, PlanParams};
pub use poll::{poll_until, PollOutcome};
pub use sequencer::{
    AbortReason, FlightSequencer, LandingTrigger, SequenceReport, SequencerConfig,
    SequencerState, VerdictSource,
};
pub use sim::{SimConfig, SimulatedVehicle, VehicleCommand};
pub use telemetry::{FlightMode, GlobalPosition, TelemetrySnapshot, Velocity, VehicleLink};
