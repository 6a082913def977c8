//! Camera frame sources.
//!
//! A source produces synchronized color + depth `FramePair`s at a fixed
//! resolution. Stream configuration and alignment belong to the source; the
//! inspection core only pulls frames.
//!
//! - Synthetic source (`stub://` URLs) for tests and dry runs
//!
//! Hardware depth cameras plug in by implementing `CameraSource`.

pub mod synthetic;

use anyhow::Result;

use crate::frame::FramePair;

pub use synthetic::{CameraConfig, CameraStats, SyntheticCamera};

/// Synchronized color + depth frame producer.
pub trait CameraSource {
    /// Start streaming. Called once before the first frame.
    fn start(&mut self) -> Result<()>;

    /// Capture the next aligned frame pair.
    fn next_frame(&mut self) -> Result<FramePair>;

    /// Stop streaming and release the device. Must be safe to call twice.
    fn stop(&mut self) -> Result<()>;

    fn is_healthy(&self) -> bool {
        true
    }
}

/// Open a camera by URL. Only `stub://` URLs are built in.
pub fn open_camera(config: CameraConfig) -> Result<Box<dyn CameraSource>> {
    if config.url.starts_with("stub://") {
        Ok(Box::new(SyntheticCamera::new(config)))
    } else {
        anyhow::bail!(
            "camera url {} is not supported by this build (only stub:// sources are built in)",
            config.url
        )
    }
}

impl<S: CameraSource + ?Sized> CameraSource for Box<S> {
    fn start(&mut self) -> Result<()> {
        (**self).start()
    }

    fn next_frame(&mut self) -> Result<FramePair> {
        (**self).next_frame()
    }

    fn stop(&mut self) -> Result<()> {
        (**self).stop()
    }

    fn is_healthy(&self) -> bool {
        (**self).is_healthy()
    }
}
