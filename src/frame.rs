//! Camera frame types.
//!
//! - `ColorImage`: RGB8 pixels, row-major.
//! - `DepthImage`: Z16 depth aligned to the color image, with its metric scale.
//! - `FramePair`: one synchronized color + depth capture.
//!
//! Frames are produced by an ingest source, handed to the detector and the
//! safety evaluator, then dropped. Nothing here retains frames across ticks.

use anyhow::{anyhow, Result};

use crate::detect::BoundingBox;

/// RGB8 color image.
#[derive(Clone, Debug)]
pub struct ColorImage {
    width: u32,
    height: u32,
    data: Vec<u8>,
}

impl ColorImage {
    pub fn new(width: u32, height: u32, data: Vec<u8>) -> Result<Self> {
        let expected = expected_len(width, height, 3)?;
        if data.len() != expected {
            return Err(anyhow!(
                "expected {} RGB bytes for {}x{}, received {}",
                expected,
                width,
                height,
                data.len()
            ));
        }
        Ok(Self {
            width,
            height,
            data,
        })
    }

    /// Solid-color image, mostly useful for synthetic sources.
    pub fn filled(width: u32, height: u32, rgb: [u8; 3]) -> Self {
        let mut data = Vec::with_capacity(width as usize * height as usize * 3);
        for _ in 0..(width as usize * height as usize) {
            data.extend_from_slice(&rgb);
        }
        Self {
            width,
            height,
            data,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn pixels(&self) -> &[u8] {
        &self.data
    }

    pub fn into_pixels(self) -> Vec<u8> {
        self.data
    }
}

/// Z16 depth image. A raw value of zero means "no reading".
#[derive(Clone, Debug)]
pub struct DepthImage {
    width: u32,
    height: u32,
    data: Vec<u16>,
    /// Meters per raw depth unit (RealSense default is 0.001).
    depth_scale: f32,
}

impl DepthImage {
    pub fn new(width: u32, height: u32, data: Vec<u16>, depth_scale: f32) -> Result<Self> {
        let expected = expected_len(width, height, 1)?;
        if data.len() != expected {
            return Err(anyhow!(
                "expected {} depth samples for {}x{}, received {}",
                expected,
                width,
                height,
                data.len()
            ));
        }
        if !(depth_scale.is_finite() && depth_scale > 0.0) {
            return Err(anyhow!("depth scale must be a positive number"));
        }
        Ok(Self {
            width,
            height,
            data,
            depth_scale,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn depth_scale(&self) -> f32 {
        self.depth_scale
    }

    /// Distance in meters at a pixel, `None` when out of bounds or no reading.
    pub fn distance_at(&self, x: u32, y: u32) -> Option<f32> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let raw = self.data[y as usize * self.width as usize + x as usize];
        (raw != 0).then(|| raw as f32 * self.depth_scale)
    }

    /// Median distance in meters over the valid samples inside `bbox`.
    ///
    /// The box is clamped to the image. Returns `None` when no sample inside
    /// the clamped box carries a reading.
    pub fn median_distance_in(&self, bbox: &BoundingBox) -> Option<f32> {
        if !bbox.is_valid() || self.width == 0 || self.height == 0 {
            return None;
        }
        let x_start = clamp_coord(bbox.x1.floor(), self.width);
        let x_end = clamp_coord(bbox.x2.ceil(), self.width);
        let y_start = clamp_coord(bbox.y1.floor(), self.height);
        let y_end = clamp_coord(bbox.y2.ceil(), self.height);

        let mut samples: Vec<u16> = Vec::new();
        for y in y_start..y_end {
            let row = y as usize * self.width as usize;
            samples.extend(
                self.data[row + x_start as usize..row + x_end as usize]
                    .iter()
                    .copied()
                    .filter(|&raw| raw != 0),
            );
        }
        if samples.is_empty() {
            return None;
        }
        samples.sort_unstable();
        let mid = samples.len() / 2;
        let median = if samples.len() % 2 == 0 {
            (samples[mid - 1] as f32 + samples[mid] as f32) / 2.0
        } else {
            samples[mid] as f32
        };
        Some(median * self.depth_scale)
    }
}

/// Synchronized color + depth capture.
#[derive(Clone, Debug)]
pub struct FramePair {
    pub color: ColorImage,
    pub depth: Option<DepthImage>,
    /// Milliseconds since the stream started.
    pub timestamp_ms: u64,
}

fn expected_len(width: u32, height: u32, channels: usize) -> Result<usize> {
    (width as usize)
        .checked_mul(height as usize)
        .and_then(|v| v.checked_mul(channels))
        .ok_or_else(|| anyhow!("frame dimensions overflow"))
}

fn clamp_coord(value: f32, limit: u32) -> u32 {
    if value <= 0.0 {
        0
    } else if value >= limit as f32 {
        limit
    } else {
        value as u32
    }
}
