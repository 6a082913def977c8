use serde::{Deserialize, Serialize};

/// Axis-aligned bounding box in pixel coordinates, `(x1, y1)` top-left.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

impl BoundingBox {
    pub fn new(x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    /// A box is usable only when all corners are finite and it has positive extent.
    pub fn is_valid(&self) -> bool {
        [self.x1, self.y1, self.x2, self.y2]
            .iter()
            .all(|v| v.is_finite())
            && self.x1 < self.x2
            && self.y1 < self.y2
    }

    pub fn width(&self) -> f64 {
        (self.x2 - self.x1) as f64
    }

    pub fn height(&self) -> f64 {
        (self.y2 - self.y1) as f64
    }

    /// Pixel area `(x2 - x1) * (y2 - y1)`.
    pub fn area(&self) -> f64 {
        self.width() * self.height()
    }

    /// Intersection-over-union with another box. Zero for disjoint or invalid boxes.
    pub fn iou(&self, other: &BoundingBox) -> f32 {
        let ix1 = self.x1.max(other.x1);
        let iy1 = self.y1.max(other.y1);
        let ix2 = self.x2.min(other.x2);
        let iy2 = self.y2.min(other.y2);
        if ix2 <= ix1 || iy2 <= iy1 {
            return 0.0;
        }
        let inter = ((ix2 - ix1) * (iy2 - iy1)) as f64;
        let union = self.area() + other.area() - inter;
        if union <= 0.0 {
            0.0
        } else {
            (inter / union) as f32
        }
    }
}

/// One raw detector output.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub class_id: u32,
    /// 0..=1
    pub confidence: f32,
    pub bbox: BoundingBox,
}

impl Detection {
    pub fn new(class_id: u32, confidence: f32, bbox: BoundingBox) -> Self {
        Self {
            class_id,
            confidence,
            bbox,
        }
    }

    /// Out-of-range confidence or a degenerate box means "not detected".
    pub fn is_well_formed(&self) -> bool {
        self.confidence.is_finite() && (0.0..=1.0).contains(&self.confidence) && self.bbox.is_valid()
    }
}

/// Detections for a single camera frame. Discarded once evaluated.
#[derive(Clone, Debug, Default)]
pub struct DetectionFrame {
    /// Capture timestamp in milliseconds since the camera stream started.
    pub timestamp_ms: u64,
    pub detections: Vec<Detection>,
}

impl DetectionFrame {
    pub fn new(timestamp_ms: u64, detections: Vec<Detection>) -> Self {
        Self {
            timestamp_ms,
            detections,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.detections.is_empty()
    }
}

/// The two classes the safety check reasons about.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TrackedClass {
    Guardrail,
    SuspensionScaffold,
}

impl TrackedClass {
    /// Class label as emitted by the scaffold model.
    pub fn label(self) -> &'static str {
        match self {
            TrackedClass::Guardrail => "Guardrail",
            TrackedClass::SuspensionScaffold => "Suspension_scaffold",
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        match label {
            "Guardrail" => Some(TrackedClass::Guardrail),
            "Suspension_scaffold" => Some(TrackedClass::SuspensionScaffold),
            _ => None,
        }
    }
}
