//! Simulated vehicle link.
//!
//! A tick-driven stand-in for SITL: vehicle state advances once per telemetry
//! read, never on wall-clock time, so runs are deterministic. Velocity
//! setpoints are recorded but not integrated into position.
//!
//! Fault knobs reproduce the failure modes the sequencer must handle (arming
//! refused, mode change ignored, stalled climb, dropped link).

use std::time::Duration;

use anyhow::{anyhow, bail, Result};

use super::telemetry::{FlightMode, GlobalPosition, TelemetrySnapshot, Velocity, VehicleLink};

/// Ground altitude below which the vehicle counts as landed.
const LANDED_ALTITUDE_M: f64 = 0.05;

/// Every command the link received, in order.
#[derive(Clone, Debug, PartialEq)]
pub enum VehicleCommand {
    Connect(String),
    SetMode(FlightMode),
    Arm,
    Disarm,
    Takeoff(f64),
    SetVelocity(Velocity),
    Goto(GlobalPosition),
    Close,
}

#[derive(Clone, Debug)]
pub struct SimConfig {
    /// Telemetry reads between an arm request and `armed == true`.
    pub arm_delay_ticks: u32,
    /// Telemetry reads between a mode request and the mode taking effect.
    pub mode_delay_ticks: u32,
    /// Vertical speed in meters per telemetry read.
    pub climb_per_tick_m: f64,
    pub home: GlobalPosition,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            arm_delay_ticks: 1,
            mode_delay_ticks: 1,
            climb_per_tick_m: 0.5,
            home: GlobalPosition {
                lat: -35.363_261,
                lon: 149.165_230,
                alt: 0.0,
            },
        }
    }
}

#[derive(Clone, Debug, Default)]
struct Faults {
    fail_connect: bool,
    refuse_arm: bool,
    refuse_mode: Option<FlightMode>,
    ignore_disarm: bool,
    altitude_ceiling_m: Option<f64>,
    ignore_goto: bool,
    fail_telemetry_after: Option<u64>,
}

pub struct SimulatedVehicle {
    config: SimConfig,
    faults: Faults,
    connected: bool,
    closed: bool,
    armed: bool,
    mode: FlightMode,
    altitude_m: f64,
    target_altitude_m: f64,
    position: GlobalPosition,
    pending_arm: Option<u32>,
    pending_disarm: bool,
    pending_mode: Option<(FlightMode, u32)>,
    velocity: Velocity,
    telemetry_reads: u64,
    commands: Vec<VehicleCommand>,
}

impl SimulatedVehicle {
    pub fn new(config: SimConfig) -> Self {
        let position = config.home;
        Self {
            config,
            faults: Faults::default(),
            connected: false,
            closed: false,
            armed: false,
            mode: FlightMode::Stabilize,
            altitude_m: 0.0,
            target_altitude_m: 0.0,
            position,
            pending_arm: None,
            pending_disarm: false,
            pending_mode: None,
            velocity: Velocity::ZERO,
            telemetry_reads: 0,
            commands: Vec::new(),
        }
    }

    pub fn failing_connect(mut self) -> Self {
        self.faults.fail_connect = true;
        self
    }

    /// Arm requests are accepted but never take effect.
    pub fn refusing_arm(mut self) -> Self {
        self.faults.refuse_arm = true;
        self
    }

    /// Requests for `mode` are accepted but never take effect.
    pub fn refusing_mode(mut self, mode: FlightMode) -> Self {
        self.faults.refuse_mode = Some(mode);
        self
    }

    pub fn ignoring_disarm(mut self) -> Self {
        self.faults.ignore_disarm = true;
        self
    }

    /// Climb stalls at this altitude.
    pub fn with_altitude_ceiling(mut self, ceiling_m: f64) -> Self {
        self.faults.altitude_ceiling_m = Some(ceiling_m);
        self
    }

    /// Goto requests are recorded but the vehicle holds its altitude.
    pub fn ignoring_goto(mut self) -> Self {
        self.faults.ignore_goto = true;
        self
    }

    /// Telemetry reads fail once `reads` successful reads have happened.
    pub fn failing_telemetry_after(mut self, reads: u64) -> Self {
        self.faults.fail_telemetry_after = Some(reads);
        self
    }

    pub fn commands(&self) -> &[VehicleCommand] {
        &self.commands
    }

    pub fn telemetry_reads(&self) -> u64 {
        self.telemetry_reads
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Last velocity setpoint received.
    pub fn velocity(&self) -> Velocity {
        self.velocity
    }

    /// Velocity setpoints other than the zeroing ones.
    pub fn velocity_commands(&self) -> Vec<Velocity> {
        self.commands
            .iter()
            .filter_map(|c| match c {
                VehicleCommand::SetVelocity(v) if *v != Velocity::ZERO => Some(*v),
                _ => None,
            })
            .collect()
    }

    fn ensure_connected(&self) -> Result<()> {
        if self.closed {
            bail!("vehicle link closed");
        }
        if !self.connected {
            bail!("vehicle link not connected");
        }
        Ok(())
    }

    fn tick(&mut self) {
        if let Some(remaining) = self.pending_arm {
            if remaining <= 1 {
                self.pending_arm = None;
                self.armed = true;
            } else {
                self.pending_arm = Some(remaining - 1);
            }
        }

        if let Some((mode, remaining)) = self.pending_mode {
            if remaining <= 1 {
                self.pending_mode = None;
                self.mode = mode;
            } else {
                self.pending_mode = Some((mode, remaining - 1));
            }
        }

        let target = match self.mode {
            FlightMode::Rtl | FlightMode::Land => 0.0,
            _ if self.armed => self.target_altitude_m,
            _ => self.altitude_m,
        };
        let step = self.config.climb_per_tick_m;
        let mut next = if self.altitude_m < target {
            (self.altitude_m + step).min(target)
        } else {
            (self.altitude_m - step).max(target)
        };
        if let Some(ceiling) = self.faults.altitude_ceiling_m {
            next = next.min(ceiling);
        }
        self.altitude_m = next;
        if self.mode == FlightMode::Rtl && self.altitude_m <= LANDED_ALTITUDE_M {
            self.position = self.config.home;
        }
        self.position.alt = self.altitude_m;

        if self.pending_disarm && self.altitude_m <= LANDED_ALTITUDE_M {
            self.pending_disarm = false;
            self.armed = false;
        }
    }
}

impl Default for SimulatedVehicle {
    fn default() -> Self {
        Self::new(SimConfig::default())
    }
}

impl VehicleLink for SimulatedVehicle {
    fn connect(&mut self, connection_string: &str, _timeout: Duration) -> Result<()> {
        self.commands
            .push(VehicleCommand::Connect(connection_string.to_string()));
        if self.faults.fail_connect {
            bail!("no heartbeat from {}", connection_string);
        }
        self.connected = true;
        self.closed = false;
        log::info!("SimulatedVehicle: connected to {}", connection_string);
        Ok(())
    }

    fn set_mode(&mut self, mode: FlightMode) -> Result<()> {
        self.ensure_connected()?;
        self.commands.push(VehicleCommand::SetMode(mode));
        if self.faults.refuse_mode != Some(mode) {
            self.pending_mode = Some((mode, self.config.mode_delay_ticks.max(1)));
        }
        Ok(())
    }

    fn arm(&mut self) -> Result<()> {
        self.ensure_connected()?;
        self.commands.push(VehicleCommand::Arm);
        if !self.faults.refuse_arm {
            self.pending_arm = Some(self.config.arm_delay_ticks.max(1));
        }
        Ok(())
    }

    fn disarm(&mut self) -> Result<()> {
        self.ensure_connected()?;
        self.commands.push(VehicleCommand::Disarm);
        if !self.faults.ignore_disarm {
            self.pending_disarm = true;
        }
        Ok(())
    }

    fn takeoff(&mut self, altitude_m: f64) -> Result<()> {
        self.ensure_connected()?;
        self.commands.push(VehicleCommand::Takeoff(altitude_m));
        if !self.armed {
            bail!("takeoff rejected: vehicle not armed");
        }
        self.target_altitude_m = altitude_m;
        Ok(())
    }

    fn set_velocity(&mut self, velocity: Velocity) -> Result<()> {
        self.ensure_connected()?;
        self.commands.push(VehicleCommand::SetVelocity(velocity));
        self.velocity = velocity;
        Ok(())
    }

    fn goto(&mut self, target: GlobalPosition) -> Result<()> {
        self.ensure_connected()?;
        self.commands.push(VehicleCommand::Goto(target));
        if self.faults.ignore_goto {
            return Ok(());
        }
        self.target_altitude_m = target.alt;
        self.position.lat = target.lat;
        self.position.lon = target.lon;
        Ok(())
    }

    fn read_telemetry(&mut self) -> Result<TelemetrySnapshot> {
        self.ensure_connected()?;
        if let Some(limit) = self.faults.fail_telemetry_after {
            if self.telemetry_reads >= limit {
                return Err(anyhow!("telemetry stream lost"));
            }
        }
        self.telemetry_reads += 1;
        self.tick();
        Ok(TelemetrySnapshot {
            armed: self.armed,
            mode: self.mode,
            altitude_m: self.altitude_m,
            position: self.position,
        })
    }

    fn close(&mut self) -> Result<()> {
        self.commands.push(VehicleCommand::Close);
        self.connected = false;
        self.closed = true;
        Ok(())
    }
}
