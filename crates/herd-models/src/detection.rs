//! Detection types produced by the detection engine.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Axis-aligned bounding box in pixel coordinates of the source frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
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

    pub fn width(&self) -> f32 {
        self.x2 - self.x1
    }

    pub fn height(&self) -> f32 {
        self.y2 - self.y1
    }

    pub fn area(&self) -> f32 {
        self.width().max(0.0) * self.height().max(0.0)
    }

    /// A box is valid when both corners are finite and strictly ordered.
    pub fn is_valid(&self) -> bool {
        [self.x1, self.y1, self.x2, self.y2]
            .iter()
            .all(|v| v.is_finite())
            && self.x1 < self.x2
            && self.y1 < self.y2
    }
}

/// A single detected object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Detection {
    /// Class label reported by the engine (e.g. "cow")
    pub class_name: String,
    /// Detection confidence [0, 1]
    pub confidence: f32,
    /// Bounding box in pixel coordinates
    pub bbox: BoundingBox,
}

impl Detection {
    /// Create a detection, clamping confidence into [0, 1].
    pub fn new(class_name: impl Into<String>, confidence: f32, bbox: BoundingBox) -> Self {
        Self {
            class_name: class_name.into(),
            confidence: if confidence.is_nan() {
                0.0
            } else {
                confidence.clamp(0.0, 1.0)
            },
            bbox,
        }
    }

    /// Case-insensitive class comparison.
    pub fn is_class(&self, class_name: &str) -> bool {
        self.class_name.eq_ignore_ascii_case(class_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bbox_geometry() {
        let bbox = BoundingBox::new(100.0, 150.0, 300.0, 400.0);
        assert!(bbox.is_valid());
        assert!((bbox.width() - 200.0).abs() < f32::EPSILON);
        assert!((bbox.height() - 250.0).abs() < f32::EPSILON);
        assert!((bbox.area() - 50_000.0).abs() < 0.5);
    }

    #[test]
    fn test_inverted_bbox_is_invalid() {
        assert!(!BoundingBox::new(10.0, 10.0, 5.0, 20.0).is_valid());
        assert!(!BoundingBox::new(0.0, 0.0, f32::NAN, 1.0).is_valid());
        assert_eq!(BoundingBox::new(10.0, 10.0, 5.0, 20.0).area(), 0.0);
    }

    #[test]
    fn test_confidence_is_clamped() {
        let bbox = BoundingBox::new(0.0, 0.0, 1.0, 1.0);
        assert_eq!(Detection::new("cow", 1.7, bbox).confidence, 1.0);
        assert_eq!(Detection::new("cow", -0.2, bbox).confidence, 0.0);
        assert_eq!(Detection::new("cow", f32::NAN, bbox).confidence, 0.0);
    }

    #[test]
    fn test_detection_wire_shape() {
        let det = Detection::new("cow", 0.95, BoundingBox::new(100.0, 150.0, 300.0, 400.0));
        let json = serde_json::to_value(&det).unwrap();
        assert_eq!(json["class_name"], "cow");
        assert_eq!(json["bbox"]["x2"], 300.0);
        assert!(det.is_class("COW"));
    }
}
