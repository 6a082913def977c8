//! Synthetic color + depth source.
//!
//! Produces a flat gray color frame and a depth frame at a fixed distance with
//! a few millimeters of seeded jitter. Used with the scripted detector for dry
//! runs; frame content is not meant to be realistic.

use anyhow::{anyhow, Result};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::CameraSource;
use crate::frame::{ColorImage, DepthImage, FramePair};

/// Configuration for a camera source.
#[derive(Clone, Debug)]
pub struct CameraConfig {
    /// Source URL (e.g., "stub://scaffold").
    pub url: String,
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    /// Meters per raw depth unit.
    pub depth_scale: f32,
    /// Distance the synthetic depth frame reports, meters.
    pub synthetic_distance_m: f32,
    pub seed: u64,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            url: "stub://scaffold".to_string(),
            width: 640,
            height: 480,
            fps: 30,
            depth_scale: 0.001,
            synthetic_distance_m: 4.0,
            seed: 7,
        }
    }
}

/// Statistics for a camera source.
#[derive(Clone, Debug)]
pub struct CameraStats {
    pub frames_captured: u64,
    pub url: String,
}

pub struct SyntheticCamera {
    config: CameraConfig,
    rng: StdRng,
    streaming: bool,
    frame_count: u64,
}

impl SyntheticCamera {
    pub fn new(config: CameraConfig) -> Self {
        let rng = StdRng::seed_from_u64(config.seed);
        Self {
            config,
            rng,
            streaming: false,
            frame_count: 0,
        }
    }

    pub fn stats(&self) -> CameraStats {
        CameraStats {
            frames_captured: self.frame_count,
            url: self.config.url.clone(),
        }
    }

    fn synthetic_depth(&mut self) -> Result<DepthImage> {
        let base = (self.config.synthetic_distance_m / self.config.depth_scale).round();
        let count = self.config.width as usize * self.config.height as usize;
        let mut data = Vec::with_capacity(count);
        for _ in 0..count {
            let jitter: f32 = self.rng.gen_range(-5.0..=5.0);
            data.push((base + jitter).clamp(1.0, u16::MAX as f32) as u16);
        }
        DepthImage::new(
            self.config.width,
            self.config.height,
            data,
            self.config.depth_scale,
        )
    }
}

impl CameraSource for SyntheticCamera {
    fn start(&mut self) -> Result<()> {
        self.streaming = true;
        log::info!(
            "SyntheticCamera: streaming {} at {}x{}@{}",
            self.config.url,
            self.config.width,
            self.config.height,
            self.config.fps
        );
        Ok(())
    }

    fn next_frame(&mut self) -> Result<FramePair> {
        if !self.streaming {
            return Err(anyhow!("camera {} is not streaming", self.config.url));
        }
        self.frame_count += 1;
        let timestamp_ms = self.frame_count * 1000 / self.config.fps.max(1) as u64;
        let shade = (self.frame_count % 64) as u8 + 96;
        let color = ColorImage::filled(self.config.width, self.config.height, [shade; 3]);
        let depth = self.synthetic_depth()?;
        Ok(FramePair {
            color,
            depth: Some(depth),
            timestamp_ms,
        })
    }

    fn stop(&mut self) -> Result<()> {
        if self.streaming {
            log::info!(
                "SyntheticCamera: stopped {} after {} frames",
                self.config.url,
                self.frame_count
            );
        }
        self.streaming = false;
        Ok(())
    }

    fn is_healthy(&self) -> bool {
        self.streaming
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::BoundingBox;

    fn small_config() -> CameraConfig {
        CameraConfig {
            width: 32,
            height: 24,
            ..CameraConfig::default()
        }
    }

    #[test]
    fn frames_require_start() {
        let mut cam = SyntheticCamera::new(small_config());
        assert!(cam.next_frame().is_err());
        cam.start().unwrap();
        let frame = cam.next_frame().unwrap();
        assert_eq!(frame.color.width(), 32);
        assert_eq!(cam.stats().frames_captured, 1);
        cam.stop().unwrap();
        cam.stop().unwrap();
        assert!(!cam.is_healthy());
    }

    #[test]
    fn depth_reports_configured_distance() {
        let mut cam = SyntheticCamera::new(small_config());
        cam.start().unwrap();
        let frame = cam.next_frame().unwrap();
        let depth = frame.depth.unwrap();
        let median = depth
            .median_distance_in(&BoundingBox::new(0.0, 0.0, 32.0, 24.0))
            .unwrap();
        assert!((median - 4.0).abs() < 0.01);
    }
}
