use anyhow::Result;

use crate::detect::backend::DetectorBackend;
use crate::detect::result::{BoundingBox, Detection};
use crate::frame::ColorImage;

/// Canned detection streams for demos and tests.
#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum Scenario {
    /// Real guardrail in front of a larger scaffold platform.
    Safe,
    /// Guardrail box larger than the scaffold box on every frame.
    Misclassified,
    /// Safe, with a single misclassified frame every fourth frame.
    Flicker,
    /// Safe for the first 20 frames, misclassified afterwards.
    Degrading,
    /// Nothing detected.
    Empty,
}

/// Stub backend replaying a fixed sequence of per-frame detections.
///
/// The sequence repeats once exhausted. Pixels are ignored.
pub struct ScriptedBackend {
    script: Vec<Vec<Detection>>,
    cursor: usize,
}

impl ScriptedBackend {
    pub fn new(script: Vec<Vec<Detection>>) -> Self {
        Self { script, cursor: 0 }
    }

    /// Build a backend from a named scenario, sized for a `width`x`height` frame.
    pub fn from_scenario(scenario: Scenario, width: u32, height: u32) -> Self {
        let safe = safe_frame(width, height);
        let misclassified = misclassified_frame(width, height);
        let script = match scenario {
            Scenario::Safe => vec![safe],
            Scenario::Misclassified => vec![misclassified],
            Scenario::Flicker => vec![safe.clone(), safe.clone(), safe, misclassified],
            Scenario::Degrading => {
                let mut script = vec![safe; 20];
                script.extend(std::iter::repeat(misclassified).take(1000));
                script
            }
            Scenario::Empty => vec![Vec::new()],
        };
        Self::new(script)
    }

    pub fn frames_served(&self) -> usize {
        self.cursor
    }
}

impl DetectorBackend for ScriptedBackend {
    fn name(&self) -> &'static str {
        "scripted"
    }

    fn detect(&mut self, _image: &ColorImage) -> Result<Vec<Detection>> {
        if self.script.is_empty() {
            return Ok(Vec::new());
        }
        let detections = self.script[self.cursor % self.script.len()].clone();
        self.cursor += 1;
        Ok(detections)
    }
}

/// Guardrail strip across the lower third of a larger scaffold platform.
fn safe_frame(width: u32, height: u32) -> Vec<Detection> {
    let (w, h) = (width as f32, height as f32);
    vec![
        Detection::new(0, 0.82, BoundingBox::new(0.2 * w, 0.6 * h, 0.8 * w, 0.75 * h)),
        Detection::new(1, 0.88, BoundingBox::new(0.1 * w, 0.2 * h, 0.9 * w, 0.9 * h)),
    ]
}

fn misclassified_frame(width: u32, height: u32) -> Vec<Detection> {
    let (w, h) = (width as f32, height as f32);
    vec![
        Detection::new(0, 0.79, BoundingBox::new(0.05 * w, 0.1 * h, 0.95 * w, 0.95 * h)),
        Detection::new(1, 0.74, BoundingBox::new(0.3 * w, 0.4 * h, 0.6 * w, 0.6 * h)),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scripted_backend_cycles_through_script() {
        let image = ColorImage::filled(4, 4, [0, 0, 0]);
        let mut backend = ScriptedBackend::from_scenario(Scenario::Flicker, 640, 480);

        let areas: Vec<bool> = (0..8)
            .map(|_| {
                let dets = backend.detect(&image).unwrap();
                dets[1].bbox.area() > dets[0].bbox.area()
            })
            .collect();
        assert_eq!(
            areas,
            vec![true, true, true, false, true, true, true, false]
        );
        assert_eq!(backend.frames_served(), 8);
    }

    #[test]
    fn empty_scenario_detects_nothing() {
        let image = ColorImage::filled(4, 4, [0, 0, 0]);
        let mut backend = ScriptedBackend::from_scenario(Scenario::Empty, 640, 480);
        assert!(backend.detect(&image).unwrap().is_empty());
    }
}
