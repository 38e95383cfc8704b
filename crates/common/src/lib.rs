/// Common result types shared by the analysis modules
use serde::{Deserialize, Serialize};

/// Bounding box with normalized coordinates (0-1)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    /// X coordinate of top-left corner (normalized 0-1)
    pub x: f32,
    /// Y coordinate of top-left corner (normalized 0-1)
    pub y: f32,
    /// Width of box (normalized 0-1)
    pub width: f32,
    /// Height of box (normalized 0-1)
    pub height: f32,
}

impl BoundingBox {
    /// Create a new bounding box
    #[must_use]
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Get center coordinates
    #[must_use]
    pub fn center(&self) -> (f32, f32) {
        (self.x + self.width / 2.0, self.y + self.height / 2.0)
    }

    /// Get area of bounding box
    #[must_use]
    #[inline]
    pub fn area(&self) -> f32 {
        self.width * self.height
    }

    /// Calculate Intersection over Union (`IoU`) with another box
    #[must_use]
    #[inline]
    pub fn iou(&self, other: &BoundingBox) -> f32 {
        let x1 = self.x.max(other.x);
        let y1 = self.y.max(other.y);
        let x2 = (self.x + self.width).min(other.x + other.width);
        let y2 = (self.y + self.height).min(other.y + other.height);

        let intersection = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
        let union = self.area() + other.area() - intersection;

        if union > 0.0 {
            intersection / union
        } else {
            0.0
        }
    }
}

/// A localized prediction: one labeled region of an image
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Prediction {
    /// Human-readable class label
    pub label: String,
    /// Confidence score (0-1)
    pub confidence: f32,
    /// Bounding box with normalized coordinates
    pub bbox: BoundingBox,
}

/// A whole-input classification result (no localization)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassConfidence {
    /// Human-readable class label
    pub label: String,
    /// Confidence score (0-1)
    pub confidence: f32,
}

impl ClassConfidence {
    /// Create a new label/confidence pair
    #[must_use]
    pub fn new(label: impl Into<String>, confidence: f32) -> Self {
        Self {
            label: label.into(),
            confidence,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bbox_iou() {
        let box1 = BoundingBox::new(0.0, 0.0, 0.5, 0.5);
        let box2 = BoundingBox::new(0.25, 0.25, 0.5, 0.5);

        // Overlapping boxes should have IoU > 0
        let iou = box1.iou(&box2);
        assert!(iou > 0.0 && iou < 1.0);

        // Identical boxes should have IoU = 1.0
        let box3 = BoundingBox::new(0.0, 0.0, 0.5, 0.5);
        assert!((box1.iou(&box3) - 1.0).abs() < 0.001);

        // Non-overlapping boxes should have IoU = 0
        let box4 = BoundingBox::new(0.6, 0.6, 0.3, 0.3);
        assert_eq!(box1.iou(&box4), 0.0);
    }

    #[test]
    fn test_bbox_area_and_center() {
        let bbox = BoundingBox::new(0.1, 0.2, 0.4, 0.6);
        assert!((bbox.area() - 0.24).abs() < 1e-6);

        let (cx, cy) = bbox.center();
        assert!((cx - 0.3).abs() < 1e-6);
        assert!((cy - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_prediction_serialization() {
        let prediction = Prediction {
            label: "person".to_string(),
            confidence: 0.92,
            bbox: BoundingBox::new(0.1, 0.1, 0.2, 0.5),
        };

        let json = serde_json::to_value(&prediction).unwrap();
        assert_eq!(json["label"], "person");
        assert_eq!(json["bbox"]["width"], 0.2);

        let back: Prediction = serde_json::from_value(json).unwrap();
        assert_eq!(back.label, "person");
        assert_eq!(back.bbox, BoundingBox::new(0.1, 0.1, 0.2, 0.5));
    }
}
