//! scaffold_inspect - one guarded inspection flight
//!
//! This binary:
//! 1. Loads configuration (file + env overrides)
//! 2. Opens the camera and detector
//! 3. Flies the standard inspection plan against the simulated vehicle,
//!    landing early if the guardrail check turns stably unsafe
//! 4. Prints (and optionally writes) the JSON inspection report

use anyhow::{anyhow, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use scaffold_inspect::detect::{DetectorBackend, Scenario, ScriptedBackend};
use scaffold_inspect::flight::{Clock, ManualClock, SimulatedVehicle, SystemClock};
use scaffold_inspect::ingest::{open_camera, CameraSource};
use scaffold_inspect::{InspectionConfig, InspectionReport, InspectionRun};

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Config file (.toml or .json). Falls back to SCAFFOLD_CONFIG.
    #[arg(long)]
    config: Option<PathBuf>,
    /// Scripted detection stream used when no model is given.
    #[arg(long, value_enum, default_value_t = Scenario::Safe)]
    scenario: Scenario,
    /// Detect with the ONNX model at model.model_path (requires the
    /// backend-tract feature).
    #[arg(long)]
    tract: bool,
    /// ONNX model path; implies --tract.
    #[arg(long)]
    model: Option<PathBuf>,
    /// Stop capturing after this many frames.
    #[arg(long)]
    max_frames: Option<u64>,
    /// Write the JSON report here (overrides output.report_path).
    #[arg(long)]
    report: Option<PathBuf>,
    /// Run on virtual time instead of sleeping.
    #[arg(long)]
    virtual_time: bool,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let cfg = InspectionConfig::load_from(args.config.as_deref())?;
    log::info!(
        "scaffold_inspect {} (vehicle {}, camera {})",
        env!("CARGO_PKG_VERSION"),
        cfg.drone.connection_string,
        cfg.camera.url
    );

    let stop = Arc::new(AtomicBool::new(false));
    let handler_stop = Arc::clone(&stop);
    ctrlc::set_handler(move || {
        log::warn!("operator stop requested, landing at next decision point");
        handler_stop.store(true, Ordering::SeqCst);
    })
    .expect("error setting Ctrl-C handler");

    let camera = open_camera(cfg.camera_config())?;
    let detector = open_detector(&args, &cfg)?;

    let report = if args.virtual_time {
        fly(&args, &cfg, camera, detector, ManualClock::new(), stop)?
    } else {
        fly(&args, &cfg, camera, detector, SystemClock::new(), stop)?
    };

    println!("{}", report.to_json()?);
    if let Some(path) = args.report.as_ref().or(cfg.output.report_path.as_ref()) {
        report.write_to(path)?;
    }

    match report.abort_reason {
        Some(reason) => Err(anyhow!("inspection aborted: {}", reason)),
        None => Ok(()),
    }
}

fn fly<C: Clock>(
    args: &Args,
    cfg: &InspectionConfig,
    camera: Box<dyn CameraSource>,
    detector: Box<dyn DetectorBackend>,
    clock: C,
    stop: Arc<AtomicBool>,
) -> Result<InspectionReport> {
    let link = SimulatedVehicle::default();
    let mut run = InspectionRun::from_config(cfg, camera, detector, link, clock)?
        .with_stop_signal(stop)
        .with_max_frames(args.max_frames);
    run.execute()
}

fn open_detector(args: &Args, cfg: &InspectionConfig) -> Result<Box<dyn DetectorBackend>> {
    let model = args
        .model
        .clone()
        .or_else(|| args.tract.then(|| cfg.model.model_path.clone()));
    match model {
        None => {
            log::info!("using scripted detector ({:?} scenario)", args.scenario);
            Ok(Box::new(ScriptedBackend::from_scenario(
                args.scenario,
                cfg.camera.width,
                cfg.camera.height,
            )))
        }
        Some(path) => open_model(&path, cfg),
    }
}

#[cfg(feature = "backend-tract")]
fn open_model(path: &std::path::Path, cfg: &InspectionConfig) -> Result<Box<dyn DetectorBackend>> {
    let backend =
        scaffold_inspect::detect::TractBackend::new(path, cfg.camera.width, cfg.camera.height)?
            .with_thresholds(cfg.model.confidence_threshold, cfg.model.iou_threshold);
    Ok(Box::new(backend))
}

#[cfg(not(feature = "backend-tract"))]
fn open_model(path: &std::path::Path, _cfg: &InspectionConfig) -> Result<Box<dyn DetectorBackend>> {
    Err(anyhow!(
        "model {} requires building with --features backend-tract",
        path.display()
    ))
}
