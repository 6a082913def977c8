use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::detect::TrackedClass;
use crate::flight::{ManeuverPlan, PlanParams, SequencerConfig};
use crate::ingest::CameraConfig;
use crate::pipeline::DEFAULT_FRAMES_PER_DECISION;
use crate::safety::{
    AlertPolicy, EvaluatorConfig, DEFAULT_AREA_RATIO_THRESHOLD, DEFAULT_HYSTERESIS_FRAMES,
    DEFAULT_MAX_DETECTION_DISTANCE_M, DEFAULT_MIN_DETECTION_CONFIDENCE,
};

const DEFAULT_CAMERA_URL: &str = "stub://scaffold";
const DEFAULT_CAMERA_WIDTH: u32 = 640;
const DEFAULT_CAMERA_HEIGHT: u32 = 480;
const DEFAULT_CAMERA_FPS: u32 = 30;
const DEFAULT_DEPTH_SCALE: f32 = 0.001;
const DEFAULT_MODEL_PATH: &str = "models/scaffold_1.onnx";
const DEFAULT_MODEL_CONFIDENCE: f32 = 0.5;
const DEFAULT_MODEL_IOU: f32 = 0.45;
const DEFAULT_CONNECTION_STRING: &str = "tcp:127.0.0.1:5760";
const DEFAULT_TIMEOUT_SECS: u64 = 30;
const DEFAULT_POLL_INTERVAL_MS: u64 = 1000;
const DEFAULT_TAKEOFF_ALTITUDE_M: f64 = 2.0;
const DEFAULT_HORIZONTAL_SPEED_MPS: f64 = 0.5;
const DEFAULT_VERTICAL_SPEED_MPS: f64 = 0.3;
const DEFAULT_DISPLACEMENT_SECS: f64 = 2.0;
const DEFAULT_DESCENT_STEP_M: f64 = 1.0;
const DEFAULT_ALTITUDE_TOLERANCE_M: f64 = 0.5;
const DEFAULT_HOLD_SECS: f64 = 2.0;
/// Upper bound for any single timed maneuver (pulse or hover).
const MAX_MANEUVER: Duration = Duration::from_secs(3600);

#[derive(Debug, Deserialize, Default)]
struct InspectionConfigFile {
    camera: Option<CameraConfigFile>,
    model: Option<ModelConfigFile>,
    class_names: Option<Vec<String>>,
    safety: Option<SafetyConfigFile>,
    drone: Option<DroneConfigFile>,
    flight: Option<FlightConfigFile>,
    alerts: Option<AlertConfigFile>,
    output: Option<OutputConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct CameraConfigFile {
    url: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    fps: Option<u32>,
    depth_scale: Option<f32>,
}

#[derive(Debug, Deserialize, Default)]
struct ModelConfigFile {
    model_path: Option<PathBuf>,
    confidence_threshold: Option<f32>,
    iou_threshold: Option<f32>,
}

#[derive(Debug, Deserialize, Default)]
struct SafetyConfigFile {
    area_ratio_threshold: Option<f64>,
    min_detection_confidence: Option<f32>,
    enable_depth_check: Option<bool>,
    max_detection_distance: Option<f32>,
    hysteresis_frames: Option<u32>,
    frames_per_decision: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
struct DroneConfigFile {
    connection_string: Option<String>,
    timeout_secs: Option<u64>,
    poll_interval_ms: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
struct FlightConfigFile {
    takeoff_altitude: Option<f64>,
    horizontal_speed: Option<f64>,
    vertical_speed: Option<f64>,
    displacement_duration_secs: Option<f64>,
    descent_step: Option<f64>,
    altitude_tolerance: Option<f64>,
    hold_secs: Option<f64>,
}

#[derive(Debug, Deserialize, Default)]
struct AlertConfigFile {
    alert_on_fake_guardrail: Option<bool>,
    alert_on_no_detection: Option<bool>,
}

#[derive(Debug, Deserialize, Default)]
struct OutputConfigFile {
    report_path: Option<PathBuf>,
    image_save_path: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct InspectionConfig {
    pub camera: CameraSettings,
    pub model: ModelSettings,
    pub class_names: Vec<String>,
    pub safety: SafetySettings,
    pub drone: DroneSettings,
    pub flight: FlightSettings,
    pub alerts: AlertPolicy,
    pub output: OutputSettings,
}

#[derive(Debug, Clone)]
pub struct CameraSettings {
    pub url: String,
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub depth_scale: f32,
}

#[derive(Debug, Clone)]
pub struct ModelSettings {
    pub model_path: PathBuf,
    pub confidence_threshold: f32,
    pub iou_threshold: f32,
}

#[derive(Debug, Clone)]
pub struct SafetySettings {
    pub area_ratio_threshold: f64,
    pub min_detection_confidence: f32,
    pub enable_depth_check: bool,
    pub max_detection_distance: f32,
    pub hysteresis_frames: u32,
    pub frames_per_decision: u32,
}

#[derive(Debug, Clone)]
pub struct DroneSettings {
    pub connection_string: String,
    pub timeout: Duration,
    pub poll_interval: Duration,
}

#[derive(Debug, Clone)]
pub struct FlightSettings {
    pub takeoff_altitude_m: f64,
    pub horizontal_speed_mps: f64,
    pub vertical_speed_mps: f64,
    pub displacement_duration: Duration,
    pub descent_step_m: f64,
    pub altitude_tolerance_m: f64,
    pub hold: Duration,
}

#[derive(Debug, Clone, Default)]
pub struct OutputSettings {
    pub report_path: Option<PathBuf>,
    pub image_save_path: Option<PathBuf>,
}

impl Default for InspectionConfig {
    fn default() -> Self {
        // Every field of an empty file falls back to its default.
        Self::from_file(InspectionConfigFile::default())
    }
}

impl InspectionConfig {
    /// Load from `SCAFFOLD_CONFIG` (if set), then apply env overrides.
    pub fn load() -> Result<Self> {
        Self::load_from(None)
    }

    /// Load from an explicit path, falling back to `SCAFFOLD_CONFIG`.
    pub fn load_from(path: Option<&Path>) -> Result<Self> {
        let config_path = path
            .map(Path::to_path_buf)
            .or_else(|| std::env::var("SCAFFOLD_CONFIG").ok().map(PathBuf::from));
        let file_cfg = match config_path.as_deref() {
            Some(path) => Some(read_config_file(path)?),
            None => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default());
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: InspectionConfigFile) -> Self {
        let camera = file.camera.unwrap_or_default();
        let model = file.model.unwrap_or_default();
        let safety = file.safety.unwrap_or_default();
        let drone = file.drone.unwrap_or_default();
        let flight = file.flight.unwrap_or_default();
        let alerts = file.alerts.unwrap_or_default();
        let output = file.output.unwrap_or_default();
        let default_alerts = AlertPolicy::default();

        Self {
            camera: CameraSettings {
                url: camera
                    .url
                    .unwrap_or_else(|| DEFAULT_CAMERA_URL.to_string()),
                width: camera.width.unwrap_or(DEFAULT_CAMERA_WIDTH),
                height: camera.height.unwrap_or(DEFAULT_CAMERA_HEIGHT),
                fps: camera.fps.unwrap_or(DEFAULT_CAMERA_FPS),
                depth_scale: camera.depth_scale.unwrap_or(DEFAULT_DEPTH_SCALE),
            },
            model: ModelSettings {
                model_path: model
                    .model_path
                    .unwrap_or_else(|| PathBuf::from(DEFAULT_MODEL_PATH)),
                confidence_threshold: model
                    .confidence_threshold
                    .unwrap_or(DEFAULT_MODEL_CONFIDENCE),
                iou_threshold: model.iou_threshold.unwrap_or(DEFAULT_MODEL_IOU),
            },
            class_names: file.class_names.unwrap_or_else(|| {
                vec![
                    TrackedClass::Guardrail.label().to_string(),
                    TrackedClass::SuspensionScaffold.label().to_string(),
                ]
            }),
            safety: SafetySettings {
                area_ratio_threshold: safety
                    .area_ratio_threshold
                    .unwrap_or(DEFAULT_AREA_RATIO_THRESHOLD),
                min_detection_confidence: safety
                    .min_detection_confidence
                    .unwrap_or(DEFAULT_MIN_DETECTION_CONFIDENCE),
                enable_depth_check: safety.enable_depth_check.unwrap_or(true),
                max_detection_distance: safety
                    .max_detection_distance
                    .unwrap_or(DEFAULT_MAX_DETECTION_DISTANCE_M),
                hysteresis_frames: safety
                    .hysteresis_frames
                    .unwrap_or(DEFAULT_HYSTERESIS_FRAMES),
                frames_per_decision: safety
                    .frames_per_decision
                    .unwrap_or(DEFAULT_FRAMES_PER_DECISION),
            },
            drone: DroneSettings {
                connection_string: drone
                    .connection_string
                    .unwrap_or_else(|| DEFAULT_CONNECTION_STRING.to_string()),
                timeout: Duration::from_secs(drone.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS)),
                poll_interval: Duration::from_millis(
                    drone.poll_interval_ms.unwrap_or(DEFAULT_POLL_INTERVAL_MS),
                ),
            },
            flight: FlightSettings {
                takeoff_altitude_m: flight
                    .takeoff_altitude
                    .unwrap_or(DEFAULT_TAKEOFF_ALTITUDE_M),
                horizontal_speed_mps: flight
                    .horizontal_speed
                    .unwrap_or(DEFAULT_HORIZONTAL_SPEED_MPS),
                vertical_speed_mps: flight
                    .vertical_speed
                    .unwrap_or(DEFAULT_VERTICAL_SPEED_MPS),
                displacement_duration: secs_f64(
                    flight
                        .displacement_duration_secs
                        .unwrap_or(DEFAULT_DISPLACEMENT_SECS),
                ),
                descent_step_m: flight.descent_step.unwrap_or(DEFAULT_DESCENT_STEP_M),
                altitude_tolerance_m: flight
                    .altitude_tolerance
                    .unwrap_or(DEFAULT_ALTITUDE_TOLERANCE_M),
                hold: secs_f64(flight.hold_secs.unwrap_or(DEFAULT_HOLD_SECS)),
            },
            alerts: AlertPolicy {
                alert_on_fake_guardrail: alerts
                    .alert_on_fake_guardrail
                    .unwrap_or(default_alerts.alert_on_fake_guardrail),
                alert_on_no_detection: alerts
                    .alert_on_no_detection
                    .unwrap_or(default_alerts.alert_on_no_detection),
            },
            output: OutputSettings {
                report_path: output.report_path,
                image_save_path: output.image_save_path,
            },
        }
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(conn) = std::env::var("SCAFFOLD_CONNECTION") {
            if !conn.trim().is_empty() {
                self.drone.connection_string = conn;
            }
        }
        if let Ok(url) = std::env::var("SCAFFOLD_CAMERA_URL") {
            if !url.trim().is_empty() {
                self.camera.url = url;
            }
        }
        if let Ok(value) = std::env::var("SCAFFOLD_MIN_CONFIDENCE") {
            self.safety.min_detection_confidence = value
                .trim()
                .parse()
                .map_err(|_| anyhow!("SCAFFOLD_MIN_CONFIDENCE must be a number in [0, 1]"))?;
        }
        if let Ok(value) = std::env::var("SCAFFOLD_AREA_RATIO") {
            self.safety.area_ratio_threshold = value
                .trim()
                .parse()
                .map_err(|_| anyhow!("SCAFFOLD_AREA_RATIO must be a positive number"))?;
        }
        if let Ok(value) = std::env::var("SCAFFOLD_HYSTERESIS") {
            self.safety.hysteresis_frames = value
                .trim()
                .parse()
                .map_err(|_| anyhow!("SCAFFOLD_HYSTERESIS must be an integer frame count"))?;
        }
        if let Ok(value) = std::env::var("SCAFFOLD_TIMEOUT_SECS") {
            let seconds: u64 = value.trim().parse().map_err(|_| {
                anyhow!("SCAFFOLD_TIMEOUT_SECS must be an integer number of seconds")
            })?;
            self.drone.timeout = Duration::from_secs(seconds);
        }
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        let safety = &self.safety;
        if !(safety.area_ratio_threshold.is_finite() && safety.area_ratio_threshold > 0.0) {
            return Err(anyhow!("area_ratio_threshold must be a positive number"));
        }
        if !(0.0..=1.0).contains(&safety.min_detection_confidence) {
            return Err(anyhow!("min_detection_confidence must be in [0, 1]"));
        }
        if !(0.0..=1.0).contains(&self.model.confidence_threshold)
            || !(0.0..=1.0).contains(&self.model.iou_threshold)
        {
            return Err(anyhow!("model thresholds must be in [0, 1]"));
        }
        if !(safety.max_detection_distance.is_finite() && safety.max_detection_distance > 0.0) {
            return Err(anyhow!("max_detection_distance must be greater than zero"));
        }
        if safety.hysteresis_frames == 0 {
            return Err(anyhow!("hysteresis_frames must be at least 1"));
        }
        if safety.frames_per_decision == 0 {
            return Err(anyhow!("frames_per_decision must be at least 1"));
        }

        if self.camera.width == 0 || self.camera.height == 0 || self.camera.fps == 0 {
            return Err(anyhow!("camera width, height and fps must be greater than zero"));
        }
        if !(self.camera.depth_scale.is_finite() && self.camera.depth_scale > 0.0) {
            return Err(anyhow!("camera depth_scale must be greater than zero"));
        }

        if self.class_names.len() < 2 {
            return Err(anyhow!("class_names must list at least two classes"));
        }
        for class in [TrackedClass::Guardrail, TrackedClass::SuspensionScaffold] {
            if !self.class_names.iter().any(|name| name == class.label()) {
                return Err(anyhow!("class_names must include {}", class.label()));
            }
        }

        if self.drone.connection_string.trim().is_empty() {
            return Err(anyhow!("drone connection_string must not be empty"));
        }
        if self.drone.timeout.is_zero() {
            return Err(anyhow!("drone timeout must be greater than zero"));
        }
        if self.drone.poll_interval.is_zero() {
            return Err(anyhow!("drone poll_interval_ms must be greater than zero"));
        }

        let flight = &self.flight;
        if !(flight.takeoff_altitude_m.is_finite() && flight.takeoff_altitude_m > 0.0) {
            return Err(anyhow!("takeoff_altitude must be greater than zero"));
        }
        for speed in [flight.horizontal_speed_mps, flight.vertical_speed_mps] {
            if !(speed.is_finite() && speed > 0.0) {
                return Err(anyhow!("flight speeds must be greater than zero"));
            }
        }
        if flight.displacement_duration.is_zero() {
            return Err(anyhow!("displacement_duration_secs must be greater than zero"));
        }
        if flight.displacement_duration > MAX_MANEUVER {
            return Err(anyhow!(
                "displacement_duration_secs must be at most {} seconds",
                MAX_MANEUVER.as_secs()
            ));
        }
        if flight.hold > MAX_MANEUVER {
            return Err(anyhow!(
                "hold_secs must be at most {} seconds",
                MAX_MANEUVER.as_secs()
            ));
        }
        if !(flight.descent_step_m.is_finite() && flight.descent_step_m >= 0.0) {
            return Err(anyhow!("descent_step must not be negative"));
        }
        if !(flight.altitude_tolerance_m.is_finite() && flight.altitude_tolerance_m >= 0.0) {
            return Err(anyhow!("altitude_tolerance must not be negative"));
        }
        ManeuverPlan::standard(&self.plan_params())
            .context("flight settings do not form a valid inspection plan")?;
        Ok(())
    }

    pub fn evaluator_config(&self) -> EvaluatorConfig {
        EvaluatorConfig {
            class_names: self.class_names.clone(),
            area_ratio_threshold: self.safety.area_ratio_threshold,
            min_detection_confidence: self.safety.min_detection_confidence,
            enable_depth_check: self.safety.enable_depth_check,
            max_detection_distance: self.safety.max_detection_distance,
        }
    }

    pub fn camera_config(&self) -> CameraConfig {
        CameraConfig {
            url: self.camera.url.clone(),
            width: self.camera.width,
            height: self.camera.height,
            fps: self.camera.fps,
            depth_scale: self.camera.depth_scale,
            ..CameraConfig::default()
        }
    }

    pub fn sequencer_config(&self) -> SequencerConfig {
        SequencerConfig {
            connection_string: self.drone.connection_string.clone(),
            connect_timeout: self.drone.timeout,
            arm_timeout: self.drone.timeout,
            poll_interval: self.drone.poll_interval,
            altitude_tolerance_m: self.flight.altitude_tolerance_m,
        }
    }

    pub fn plan_params(&self) -> PlanParams {
        PlanParams {
            takeoff_altitude_m: self.flight.takeoff_altitude_m,
            horizontal_speed_mps: self.flight.horizontal_speed_mps,
            vertical_speed_mps: self.flight.vertical_speed_mps,
            displacement_duration: self.flight.displacement_duration,
            descent_step_m: self.flight.descent_step_m,
            hold: self.flight.hold,
            step_timeout: self.drone.timeout,
        }
    }
}

/// Zero for negative or NaN input, `Duration::MAX` when out of range;
/// `validate` rejects both.
fn secs_f64(secs: f64) -> Duration {
    if secs.is_nan() || secs <= 0.0 {
        return Duration::ZERO;
    }
    Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX)
}

fn read_config_file(path: &Path) -> Result<InspectionConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let is_toml = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));
    let cfg = if is_toml {
        toml::from_str(&raw).map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    } else {
        serde_json::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    };
    Ok(cfg)
}
