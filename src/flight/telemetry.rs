use std::fmt;
use std::time::Duration;

use anyhow::Result;
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum FlightMode {
    Stabilize,
    Guided,
    /// Return to launch.
    Rtl,
    Land,
}

impl fmt::Display for FlightMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FlightMode::Stabilize => "STABILIZE",
            FlightMode::Guided => "GUIDED",
            FlightMode::Rtl => "RTL",
            FlightMode::Land => "LAND",
        };
        f.write_str(name)
    }
}

/// Global position; `alt` is relative to the launch point in meters.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct GlobalPosition {
    pub lat: f64,
    pub lon: f64,
    pub alt: f64,
}

/// Read-only vehicle state at one poll.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct TelemetrySnapshot {
    pub armed: bool,
    pub mode: FlightMode,
    /// Altitude above launch, meters.
    pub altitude_m: f64,
    pub position: GlobalPosition,
}

/// Velocity setpoint in the local NED frame, m/s. Positive `down` descends.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Velocity {
    pub north: f64,
    pub east: f64,
    pub down: f64,
}

impl Velocity {
    pub const ZERO: Velocity = Velocity {
        north: 0.0,
        east: 0.0,
        down: 0.0,
    };

    pub fn new(north: f64, east: f64, down: f64) -> Self {
        Self { north, east, down }
    }
}

/// Vehicle link collaborator.
///
/// Every method is an observable command or a telemetry poll against the
/// vehicle. Implementations own transport and any retry policy; the sequencer
/// never retries a failed call.
pub trait VehicleLink {
    fn connect(&mut self, connection_string: &str, timeout: Duration) -> Result<()>;

    fn set_mode(&mut self, mode: FlightMode) -> Result<()>;

    fn arm(&mut self) -> Result<()>;

    fn disarm(&mut self) -> Result<()>;

    /// Climb to `altitude_m` above launch.
    fn takeoff(&mut self, altitude_m: f64) -> Result<()>;

    fn set_velocity(&mut self, velocity: Velocity) -> Result<()>;

    fn goto(&mut self, target: GlobalPosition) -> Result<()>;

    fn read_telemetry(&mut self) -> Result<TelemetrySnapshot>;

    fn close(&mut self) -> Result<()>;
}
