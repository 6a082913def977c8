use std::sync::Mutex;
use std::time::Duration;

use tempfile::NamedTempFile;

use scaffold_inspect::config::InspectionConfig;

static ENV_LOCK: Mutex<()> = Mutex::new(());

fn clear_env() {
    for key in [
        "SCAFFOLD_CONFIG",
        "SCAFFOLD_CONNECTION",
        "SCAFFOLD_CAMERA_URL",
        "SCAFFOLD_MIN_CONFIDENCE",
        "SCAFFOLD_AREA_RATIO",
        "SCAFFOLD_HYSTERESIS",
        "SCAFFOLD_TIMEOUT_SECS",
    ] {
        std::env::remove_var(key);
    }
}

fn temp_config(suffix: &str, contents: &str) -> NamedTempFile {
    let mut file = tempfile::Builder::new()
        .suffix(suffix)
        .tempfile()
        .expect("temp config");
    std::io::Write::write_all(&mut file, contents.as_bytes()).expect("write config");
    file
}

#[test]
fn defaults_without_config_file() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let cfg = InspectionConfig::load().expect("load defaults");
    assert_eq!(cfg.camera.url, "stub://scaffold");
    assert_eq!(cfg.camera.width, 640);
    assert_eq!(cfg.class_names, vec!["Guardrail", "Suspension_scaffold"]);
    assert_eq!(cfg.safety.area_ratio_threshold, 1.0);
    assert_eq!(cfg.safety.min_detection_confidence, 0.6);
    assert!(cfg.safety.enable_depth_check);
    assert_eq!(cfg.safety.hysteresis_frames, 3);
    assert_eq!(cfg.drone.connection_string, "tcp:127.0.0.1:5760");
    assert_eq!(cfg.drone.timeout, Duration::from_secs(30));
    assert_eq!(cfg.flight.takeoff_altitude_m, 2.0);
    assert!(cfg.alerts.alert_on_fake_guardrail);
    assert!(!cfg.alerts.alert_on_no_detection);
    assert!(cfg.output.report_path.is_none());
}

#[test]
fn loads_json_config_with_env_overrides() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let file = temp_config(
        ".json",
        r#"{
            "camera": { "url": "stub://north_face", "width": 1280, "height": 720 },
            "safety": { "area_ratio_threshold": 1.5, "hysteresis_frames": 4 },
            "drone": { "connection_string": "udp:10.0.0.2:14550", "poll_interval_ms": 250 },
            "flight": { "takeoff_altitude": 3.0, "hold_secs": 1.5 },
            "alerts": { "alert_on_no_detection": true }
        }"#,
    );

    std::env::set_var("SCAFFOLD_CONFIG", file.path());
    std::env::set_var("SCAFFOLD_HYSTERESIS", "5");
    std::env::set_var("SCAFFOLD_CONNECTION", "tcp:192.168.1.20:5760");

    let cfg = InspectionConfig::load().expect("load config");

    assert_eq!(cfg.camera.url, "stub://north_face");
    assert_eq!(cfg.camera.width, 1280);
    assert_eq!(cfg.camera.height, 720);
    assert_eq!(cfg.camera.fps, 30);
    assert_eq!(cfg.safety.area_ratio_threshold, 1.5);
    assert_eq!(cfg.safety.hysteresis_frames, 5);
    assert_eq!(cfg.drone.connection_string, "tcp:192.168.1.20:5760");
    assert_eq!(cfg.drone.poll_interval, Duration::from_millis(250));
    assert_eq!(cfg.flight.takeoff_altitude_m, 3.0);
    assert_eq!(cfg.flight.hold, Duration::from_millis(1500));
    assert!(cfg.alerts.alert_on_no_detection);

    let plan = cfg.plan_params();
    assert_eq!(plan.takeoff_altitude_m, 3.0);
    assert_eq!(cfg.sequencer_config().poll_interval, Duration::from_millis(250));

    clear_env();
}

#[test]
fn explicit_toml_path_wins_over_env() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let env_file = temp_config(".json", r#"{ "camera": { "url": "stub://from_env" } }"#);
    let toml_file = temp_config(
        ".toml",
        r#"
class_names = ["Guardrail", "Suspension_scaffold", "Ladder"]

[camera]
url = "stub://from_flag"

[safety]
enable_depth_check = false
frames_per_decision = 8

[output]
report_path = "reports/run.json"
"#,
    );
    std::env::set_var("SCAFFOLD_CONFIG", env_file.path());

    let cfg = InspectionConfig::load_from(Some(toml_file.path())).expect("load toml");
    assert_eq!(cfg.camera.url, "stub://from_flag");
    assert_eq!(cfg.class_names.len(), 3);
    assert!(!cfg.safety.enable_depth_check);
    assert_eq!(cfg.safety.frames_per_decision, 8);
    assert_eq!(
        cfg.output.report_path.as_deref(),
        Some(std::path::Path::new("reports/run.json"))
    );

    let evaluator = cfg.evaluator_config();
    assert!(!evaluator.enable_depth_check);
    assert_eq!(evaluator.class_names.len(), 3);

    clear_env();
}

#[test]
fn rejects_invalid_values() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    std::env::set_var("SCAFFOLD_HYSTERESIS", "0");
    let err = InspectionConfig::load().unwrap_err();
    assert!(err.to_string().contains("hysteresis_frames"));

    std::env::set_var("SCAFFOLD_HYSTERESIS", "three");
    assert!(InspectionConfig::load().is_err());
    clear_env();

    std::env::set_var("SCAFFOLD_MIN_CONFIDENCE", "1.2");
    assert!(InspectionConfig::load().is_err());
    clear_env();

    let file = temp_config(".json", r#"{ "class_names": ["Guardrail"] }"#);
    assert!(InspectionConfig::load_from(Some(file.path())).is_err());

    let file = temp_config(".json", r#"{ "flight": { "horizontal_speed": 0.0 } }"#);
    assert!(InspectionConfig::load_from(Some(file.path())).is_err());

    let file = temp_config(".json", r#"{ "flight": { "hold_secs": 1e30 } }"#);
    let err = InspectionConfig::load_from(Some(file.path())).unwrap_err();
    assert!(err.to_string().contains("at most"));

    let file = temp_config(".json", "{ not json");
    let err = InspectionConfig::load_from(Some(file.path())).unwrap_err();
    assert!(err.to_string().contains("invalid config file"));

    clear_env();
}
