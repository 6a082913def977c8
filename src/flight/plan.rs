use std::time::Duration;

use anyhow::{anyhow, Result};
use serde::Serialize;

use super::telemetry::Velocity;

/// Body-relative displacement axis. The vehicle is assumed to face north.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum Axis {
    /// North. Negative distance moves backward.
    Forward,
    /// East. Negative distance moves left.
    Right,
    /// Up. Negative distance moves down.
    Up,
}

impl Axis {
    /// NED setpoint for a signed speed along this axis.
    pub fn velocity(self, signed_speed: f64) -> Velocity {
        match self {
            Axis::Forward => Velocity::new(signed_speed, 0.0, 0.0),
            Axis::Right => Velocity::new(0.0, signed_speed, 0.0),
            Axis::Up => Velocity::new(0.0, 0.0, -signed_speed),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub enum DescentTarget {
    /// Current altitude minus this many meters.
    Relative(f64),
    /// Absolute altitude above launch, meters.
    Absolute(f64),
}

impl DescentTarget {
    /// Target altitude from the current one, never below ground.
    pub fn resolve(self, current_altitude_m: f64) -> f64 {
        let target = match self {
            DescentTarget::Relative(step) => current_altitude_m - step,
            DescentTarget::Absolute(altitude) => altitude,
        };
        target.max(0.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub enum ManeuverKind {
    Takeoff { altitude_m: f64 },
    /// Inspection hover.
    HoldAltitude { dwell: Duration },
    /// Commanded-duration velocity step, not a closed-loop position move.
    Displace {
        axis: Axis,
        distance_m: f64,
        speed_mps: f64,
    },
    DescendTo(DescentTarget),
    ReturnToLaunch,
    Disarm,
}

impl ManeuverKind {
    pub fn is_displacement(&self) -> bool {
        matches!(self, ManeuverKind::Displace { .. })
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct ManeuverStep {
    pub kind: ManeuverKind,
    /// Budget for the telemetry wait that closes this step.
    pub timeout: Duration,
}

impl ManeuverStep {
    pub fn new(kind: ManeuverKind, timeout: Duration) -> Self {
        Self { kind, timeout }
    }
}

/// Parameters for the standard inspection pattern.
#[derive(Clone, Debug)]
pub struct PlanParams {
    pub takeoff_altitude_m: f64,
    pub horizontal_speed_mps: f64,
    pub vertical_speed_mps: f64,
    pub displacement_duration: Duration,
    pub descent_step_m: f64,
    pub hold: Duration,
    pub step_timeout: Duration,
}

impl Default for PlanParams {
    fn default() -> Self {
        Self {
            takeoff_altitude_m: 2.0,
            horizontal_speed_mps: 0.5,
            vertical_speed_mps: 0.3,
            displacement_duration: Duration::from_secs(2),
            descent_step_m: 1.0,
            hold: Duration::from_secs(2),
            step_timeout: Duration::from_secs(30),
        }
    }
}

/// Ordered, validated, immutable list of maneuver steps.
#[derive(Clone, Debug, Serialize)]
pub struct ManeuverPlan {
    steps: Vec<ManeuverStep>,
}

impl ManeuverPlan {
    pub fn new(steps: Vec<ManeuverStep>) -> Result<Self> {
        validate(&steps)?;
        Ok(Self { steps })
    }

    /// Takeoff, hover, forward/back/left/right/up nudges, short descent, RTL, disarm.
    pub fn standard(params: &PlanParams) -> Result<Self> {
        let secs = params.displacement_duration.as_secs_f64();
        let horizontal = params.horizontal_speed_mps * secs;
        let vertical = params.vertical_speed_mps * secs;
        let step = |kind| ManeuverStep::new(kind, params.step_timeout);
        let displace = |axis, distance_m, speed_mps| {
            step(ManeuverKind::Displace {
                axis,
                distance_m,
                speed_mps,
            })
        };

        Self::new(vec![
            step(ManeuverKind::Takeoff {
                altitude_m: params.takeoff_altitude_m,
            }),
            step(ManeuverKind::HoldAltitude { dwell: params.hold }),
            displace(Axis::Forward, horizontal, params.horizontal_speed_mps),
            displace(Axis::Forward, -horizontal, params.horizontal_speed_mps),
            displace(Axis::Right, -horizontal, params.horizontal_speed_mps),
            displace(Axis::Right, horizontal, params.horizontal_speed_mps),
            displace(Axis::Up, vertical, params.vertical_speed_mps),
            step(ManeuverKind::DescendTo(DescentTarget::Relative(
                params.descent_step_m,
            ))),
            step(ManeuverKind::ReturnToLaunch),
            step(ManeuverKind::Disarm),
        ])
    }

    pub fn steps(&self) -> &[ManeuverStep] {
        &self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn displacement_count(&self) -> usize {
        self.steps.iter().filter(|s| s.kind.is_displacement()).count()
    }

    /// Index of the landing sequence entered when displacements are cut short
    /// at `from`: the first descent/RTL step after the last displacement.
    pub fn landing_index_from(&self, from: usize) -> Option<usize> {
        let after_last_displacement = self
            .steps
            .iter()
            .rposition(|s| s.kind.is_displacement())
            .map_or(0, |i| i + 1);
        self.steps
            .iter()
            .enumerate()
            .skip(from.max(after_last_displacement))
            .find(|(_, s)| {
                matches!(
                    s.kind,
                    ManeuverKind::DescendTo(_) | ManeuverKind::ReturnToLaunch
                )
            })
            .map(|(i, _)| i)
    }
}

/// How long a velocity pulse must run to cover `distance_m` at `speed_mps`.
///
/// `None` when the duration is not representable (non-positive speed,
/// non-finite or overflowing ratio).
pub fn pulse_duration(distance_m: f64, speed_mps: f64) -> Option<Duration> {
    if !(speed_mps.is_finite() && speed_mps > 0.0) {
        return None;
    }
    Duration::try_from_secs_f64(distance_m.abs() / speed_mps).ok()
}

fn validate(steps: &[ManeuverStep]) -> Result<()> {
    let count = |pred: fn(&ManeuverKind) -> bool| steps.iter().filter(|s| pred(&s.kind)).count();

    match steps.first().map(|s| s.kind) {
        Some(ManeuverKind::Takeoff { altitude_m }) if altitude_m.is_finite() && altitude_m > 0.0 => {}
        Some(ManeuverKind::Takeoff { .. }) => {
            return Err(anyhow!("takeoff altitude must be greater than zero"))
        }
        _ => return Err(anyhow!("plan must start with a takeoff step")),
    }
    if !matches!(steps.last().map(|s| s.kind), Some(ManeuverKind::Disarm)) {
        return Err(anyhow!("plan must end with a disarm step"));
    }
    if count(|k| matches!(k, ManeuverKind::Takeoff { .. })) != 1 {
        return Err(anyhow!("plan must contain exactly one takeoff step"));
    }
    if count(|k| matches!(k, ManeuverKind::Disarm)) != 1 {
        return Err(anyhow!("plan must contain exactly one disarm step"));
    }
    let rtl = steps
        .iter()
        .position(|s| s.kind == ManeuverKind::ReturnToLaunch)
        .ok_or_else(|| anyhow!("plan must return to launch before disarming"))?;
    if count(|k| matches!(k, ManeuverKind::ReturnToLaunch)) != 1 {
        return Err(anyhow!("plan must contain exactly one return-to-launch step"));
    }
    if steps[rtl..].iter().any(|s| s.kind.is_displacement()) {
        return Err(anyhow!("displacements are not allowed after return-to-launch"));
    }
    if !matches!(
        steps.get(1).map(|s| s.kind),
        Some(ManeuverKind::HoldAltitude { .. })
    ) {
        return Err(anyhow!("takeoff must be followed by a hold step"));
    }
    let last_displacement = steps
        .iter()
        .rposition(|s| s.kind.is_displacement())
        .unwrap_or(0);
    if !steps[last_displacement..rtl]
        .iter()
        .any(|s| matches!(s.kind, ManeuverKind::DescendTo(_)))
    {
        return Err(anyhow!(
            "plan must descend after the last displacement and before return-to-launch"
        ));
    }

    for (i, step) in steps.iter().enumerate() {
        if step.timeout.is_zero() {
            return Err(anyhow!("step {} has a zero timeout", i));
        }
        match step.kind {
            ManeuverKind::Displace {
                distance_m,
                speed_mps,
                ..
            } => {
                if !(speed_mps.is_finite() && speed_mps > 0.0) {
                    return Err(anyhow!("step {} speed must be greater than zero", i));
                }
                if !distance_m.is_finite() || distance_m == 0.0 {
                    return Err(anyhow!("step {} distance must be finite and non-zero", i));
                }
                if pulse_duration(distance_m, speed_mps).is_none() {
                    return Err(anyhow!(
                        "step {} would run for longer than a representable duration",
                        i
                    ));
                }
            }
            ManeuverKind::DescendTo(DescentTarget::Relative(v))
            | ManeuverKind::DescendTo(DescentTarget::Absolute(v)) => {
                if !(v.is_finite() && v >= 0.0) {
                    return Err(anyhow!("step {} descent target must be non-negative", i));
                }
            }
            _ => {}
        }
    }
    Ok(())
}
