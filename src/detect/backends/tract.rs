#![cfg(feature = "backend-tract")]

use std::path::Path;

use anyhow::{anyhow, Context, Result};
use tract_onnx::prelude::*;

use crate::detect::backend::DetectorBackend;
use crate::detect::result::{BoundingBox, Detection};
use crate::frame::ColorImage;

/// Tract-based backend for YOLOv8-style ONNX detectors.
///
/// Expects a `1x3xHxW` float input and a `1x(4+C)xN` output where each column
/// is `cx, cy, w, h` followed by `C` class scores. Frames must already match the
/// model input size. No letterboxing is performed.
pub struct TractBackend {
    model: SimplePlan<TypedFact, Box<dyn TypedOp>>,
    width: u32,
    height: u32,
    confidence_threshold: f32,
    iou_threshold: f32,
}

impl TractBackend {
    /// Load an ONNX model from disk and prepare it for inference.
    pub fn new<P: AsRef<Path>>(model_path: P, width: u32, height: u32) -> Result<Self> {
        let model_path = model_path.as_ref();
        let model = tract_onnx::onnx()
            .model_for_path(model_path)
            .with_context(|| format!("failed to load ONNX model from {}", model_path.display()))?
            .with_input_fact(
                0,
                InferenceFact::dt_shape(
                    f32::datum_type(),
                    tvec!(1, 3, height as usize, width as usize),
                ),
            )
            .context("failed to set input fact")?
            .into_optimized()
            .context("failed to optimize ONNX model")?
            .into_runnable()
            .context("failed to build runnable ONNX model")?;

        Ok(Self {
            model,
            width,
            height,
            confidence_threshold: 0.5,
            iou_threshold: 0.45,
        })
    }

    /// Override the model-level confidence and NMS IoU thresholds.
    pub fn with_thresholds(mut self, confidence: f32, iou: f32) -> Self {
        self.confidence_threshold = confidence;
        self.iou_threshold = iou;
        self
    }

    fn build_input(&self, image: &ColorImage) -> Result<Tensor> {
        if image.width() != self.width || image.height() != self.height {
            return Err(anyhow!(
                "frame size {}x{} does not match model input {}x{}",
                image.width(),
                image.height(),
                self.width,
                self.height
            ));
        }

        let pixels = image.pixels();
        let width = self.width as usize;
        let input = tract_ndarray::Array4::from_shape_fn(
            (1, 3, self.height as usize, width),
            |(_, channel, y, x)| {
                let idx = (y * width + x) * 3 + channel;
                pixels[idx] as f32 / 255.0
            },
        );

        Ok(input.into_tensor())
    }

    fn decode(&self, outputs: TVec<TValue>) -> Result<Vec<Detection>> {
        let output = outputs
            .first()
            .ok_or_else(|| anyhow!("model produced no outputs"))?;
        let view = output
            .to_array_view::<f32>()
            .context("model output tensor was not f32")?
            .into_dimensionality::<tract_ndarray::Ix3>()
            .context("model output was not rank 3")?;

        let rows = view.shape()[1];
        let anchors = view.shape()[2];
        if rows <= 4 {
            return Err(anyhow!("model output has no class rows"));
        }

        let mut candidates = Vec::new();
        for i in 0..anchors {
            let (class_id, score) = (4..rows)
                .map(|r| (r - 4, view[[0, r, i]]))
                .fold((0, f32::NEG_INFINITY), |best, cur| {
                    if cur.1 > best.1 {
                        cur
                    } else {
                        best
                    }
                });
            if !score.is_finite() || score < self.confidence_threshold {
                continue;
            }
            let (cx, cy, w, h) = (
                view[[0, 0, i]],
                view[[0, 1, i]],
                view[[0, 2, i]],
                view[[0, 3, i]],
            );
            candidates.push(Detection::new(
                class_id as u32,
                score.min(1.0),
                BoundingBox::new(cx - w / 2.0, cy - h / 2.0, cx + w / 2.0, cy + h / 2.0),
            ));
        }

        Ok(non_max_suppression(candidates, self.iou_threshold))
    }
}

impl DetectorBackend for TractBackend {
    fn name(&self) -> &'static str {
        "tract"
    }

    fn detect(&mut self, image: &ColorImage) -> Result<Vec<Detection>> {
        let input = self.build_input(image)?;
        let outputs = self
            .model
            .run(tvec!(input.into()))
            .context("ONNX inference failed")?;
        self.decode(outputs)
    }
}

/// Per-class greedy NMS, highest confidence first.
fn non_max_suppression(mut candidates: Vec<Detection>, iou_threshold: f32) -> Vec<Detection> {
    candidates.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    let mut kept: Vec<Detection> = Vec::new();
    for cand in candidates {
        let suppressed = kept
            .iter()
            .any(|k| k.class_id == cand.class_id && k.bbox.iou(&cand.bbox) > iou_threshold);
        if !suppressed {
            kept.push(cand);
        }
    }
    kept
}

#[cfg(test)]
mod tests {
    use super::*;

    fn det(class_id: u32, confidence: f32, x1: f32, y1: f32, x2: f32, y2: f32) -> Detection {
        Detection::new(class_id, confidence, BoundingBox::new(x1, y1, x2, y2))
    }

    #[test]
    fn overlapping_same_class_keeps_highest_confidence() {
        let kept = non_max_suppression(
            vec![
                det(0, 0.7, 1.0, 1.0, 11.0, 11.0),
                det(0, 0.9, 0.0, 0.0, 10.0, 10.0),
            ],
            0.5,
        );
        assert_eq!(kept, vec![det(0, 0.9, 0.0, 0.0, 10.0, 10.0)]);
    }

    #[test]
    fn different_classes_are_not_suppressed() {
        let kept = non_max_suppression(
            vec![
                det(1, 0.8, 0.0, 0.0, 10.0, 10.0),
                det(0, 0.9, 0.0, 0.0, 10.0, 10.0),
            ],
            0.5,
        );
        assert_eq!(kept.len(), 2);
        assert_eq!(kept[0].class_id, 0);
        assert_eq!(kept[1].class_id, 1);
    }

    #[test]
    fn overlap_at_threshold_is_kept() {
        // Intersection 50, union 100.
        let kept = non_max_suppression(
            vec![
                det(0, 0.9, 0.0, 0.0, 10.0, 10.0),
                det(0, 0.8, 0.0, 0.0, 10.0, 5.0),
            ],
            0.5,
        );
        assert_eq!(kept.len(), 2);

        // Intersection 60, union 100.
        let kept = non_max_suppression(
            vec![
                det(0, 0.9, 0.0, 0.0, 10.0, 10.0),
                det(0, 0.8, 0.0, 0.0, 10.0, 6.0),
            ],
            0.5,
        );
        assert_eq!(kept.len(), 1);
    }

    #[test]
    fn disjoint_boxes_come_back_by_confidence() {
        let kept = non_max_suppression(
            vec![
                det(0, 0.6, 0.0, 0.0, 10.0, 10.0),
                det(0, 0.95, 20.0, 20.0, 30.0, 30.0),
                det(0, 0.8, 40.0, 0.0, 50.0, 10.0),
            ],
            0.5,
        );
        let confidences: Vec<f32> = kept.iter().map(|d| d.confidence).collect();
        assert_eq!(confidences, vec![0.95, 0.8, 0.6]);
    }
}
