use anyhow::Result;

use crate::detect::result::Detection;
use crate::frame::ColorImage;

/// Object detector backend.
///
/// Given a color image, returns raw detections in model order. Confidence
/// gating for the safety check happens in the evaluator, not here; backends
/// may still apply their own model-level threshold and NMS.
pub trait DetectorBackend {
    /// Backend identifier.
    fn name(&self) -> &'static str;

    /// Run detection on a frame. The image is borrowed for the call only.
    fn detect(&mut self, image: &ColorImage) -> Result<Vec<Detection>>;

    /// Optional warm-up hook.
    fn warm_up(&mut self) -> Result<()> {
        Ok(())
    }
}

impl<B: DetectorBackend + ?Sized> DetectorBackend for Box<B> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn detect(&mut self, image: &ColorImage) -> Result<Vec<Detection>> {
        (**self).detect(image)
    }

    fn warm_up(&mut self) -> Result<()> {
        (**self).warm_up()
    }
}
