//! Annotated frame rendering.
//!
//! Pure presentation: consumes a frame, its detections and the assessment,
//! and never feeds anything back into safety or flight logic.

use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use image::{Rgb, RgbImage};

use crate::detect::{BoundingBox, DetectionFrame};
use crate::frame::ColorImage;
use crate::safety::{SafetyAssessment, SafetyVerdict};

const BOX_COLOR: Rgb<u8> = Rgb([255, 0, 255]);
const CHOSEN_COLOR: Rgb<u8> = Rgb([255, 0, 0]);
const BOX_THICKNESS: u32 = 3;
const BANNER_HEIGHT: u32 = 12;

fn banner_color(verdict: SafetyVerdict) -> Rgb<u8> {
    match verdict {
        SafetyVerdict::Safe => Rgb([0, 200, 0]),
        SafetyVerdict::GuardrailMisclassified => Rgb([220, 0, 0]),
        SafetyVerdict::Indeterminate => Rgb([128, 128, 128]),
    }
}

/// Draw every detection box, highlight the boxes the verdict used, and paint a
/// verdict-colored banner across the top.
pub fn render(
    image: &ColorImage,
    frame: &DetectionFrame,
    assessment: &SafetyAssessment,
) -> Result<RgbImage> {
    let mut canvas = RgbImage::from_raw(image.width(), image.height(), image.pixels().to_vec())
        .ok_or_else(|| anyhow!("color buffer does not match {}x{}", image.width(), image.height()))?;

    for det in &frame.detections {
        if det.bbox.is_valid() {
            draw_box(&mut canvas, &det.bbox, BOX_COLOR);
        }
    }
    for chosen in [assessment.guardrail, assessment.scaffold].into_iter().flatten() {
        draw_box(&mut canvas, &chosen.bbox, CHOSEN_COLOR);
    }

    let banner = banner_color(assessment.verdict);
    for y in 0..BANNER_HEIGHT.min(canvas.height()) {
        for x in 0..canvas.width() {
            canvas.put_pixel(x, y, banner);
        }
    }
    Ok(canvas)
}

fn draw_box(canvas: &mut RgbImage, bbox: &BoundingBox, color: Rgb<u8>) {
    let (w, h) = (canvas.width(), canvas.height());
    if w == 0 || h == 0 {
        return;
    }
    let clamp = |v: f32, max: u32| -> u32 { v.max(0.0).min((max - 1) as f32) as u32 };
    let (x1, x2) = (clamp(bbox.x1, w), clamp(bbox.x2, w));
    let (y1, y2) = (clamp(bbox.y1, h), clamp(bbox.y2, h));

    for t in 0..BOX_THICKNESS {
        for x in x1..=x2 {
            canvas.put_pixel(x, (y1 + t).min(y2), color);
            canvas.put_pixel(x, y2.saturating_sub(t).max(y1), color);
        }
        for y in y1..=y2 {
            canvas.put_pixel((x1 + t).min(x2), y, color);
            canvas.put_pixel(x2.saturating_sub(t).max(x1), y, color);
        }
    }
}

/// Writes annotated frames to a directory.
pub struct OverlayWriter {
    dir: PathBuf,
    saved: u64,
}

impl OverlayWriter {
    pub fn new<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("failed to create image directory {}", dir.display()))?;
        Ok(Self { dir, saved: 0 })
    }

    pub fn save(
        &mut self,
        image: &ColorImage,
        frame: &DetectionFrame,
        assessment: &SafetyAssessment,
    ) -> Result<PathBuf> {
        let canvas = render(image, frame, assessment)?;
        let path = self.dir.join(format!("frame_{:08}.jpg", frame.timestamp_ms));
        canvas
            .save(&path)
            .with_context(|| format!("failed to write {}", path.display()))?;
        self.saved += 1;
        Ok(path)
    }

    pub fn saved(&self) -> u64 {
        self.saved
    }
}
