use serde::{Deserialize, Serialize};

/// Axis-aligned box in source pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bbox {
    pub xmin: f32,
    pub ymin: f32,
    pub xmax: f32,
    pub ymax: f32,
}

impl Bbox {
    pub fn new(xmin: f32, ymin: f32, xmax: f32, ymax: f32) -> Self {
        Self {
            xmin,
            ymin,
            xmax,
            ymax,
        }
    }

    /// Builds a box from its center point and size, as YOLO heads emit them.
    pub fn from_cxcywh(cx: f32, cy: f32, w: f32, h: f32) -> Self {
        Self::new(cx - w / 2.0, cy - h / 2.0, cx + w / 2.0, cy + h / 2.0)
    }

    pub fn width(&self) -> f32 {
        (self.xmax - self.xmin).max(0.0)
    }

    pub fn height(&self) -> f32 {
        (self.ymax - self.ymin).max(0.0)
    }

    pub fn area(&self) -> f32 {
        self.width() * self.height()
    }

    pub fn intersection_area(&self, other: &Bbox) -> f32 {
        let l = self.xmin.max(other.xmin);
        let r = self.xmax.min(other.xmax);
        let t = self.ymin.max(other.ymin);
        let b = self.ymax.min(other.ymax);
        (r - l).max(0.0) * (b - t).max(0.0)
    }

    pub fn union_area(&self, other: &Bbox) -> f32 {
        self.area() + other.area() - self.intersection_area(other)
    }

    pub fn iou(&self, other: &Bbox) -> f32 {
        let union = self.union_area(other);
        if union <= 0.0 {
            return 0.0;
        }
        self.intersection_area(other) / union
    }
}

/// One model output for a frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub bbox: Bbox,
    /// Score in `[0, 1]`.
    pub confidence: f32,
    pub class_idx: usize,
}

impl Detection {
    pub fn new(bbox: Bbox, confidence: f32, class_idx: usize) -> Self {
        Self {
            bbox,
            confidence,
            class_idx,
        }
    }

    /// Inclusive threshold test. NaN scores never pass.
    pub fn passes(&self, threshold: f32) -> bool {
        self.confidence >= threshold
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn iou_of_identical_boxes_is_one() {
        let a = Bbox::new(0.0, 0.0, 10.0, 10.0);
        assert!((a.iou(&a) - 1.0).abs() < f32::EPSILON);
    }

    #[test]
    fn iou_of_disjoint_boxes_is_zero() {
        let a = Bbox::new(0.0, 0.0, 10.0, 10.0);
        let b = Bbox::new(20.0, 20.0, 30.0, 30.0);
        assert_eq!(a.iou(&b), 0.0);
    }

    #[test]
    fn iou_of_half_overlap() {
        let a = Bbox::new(0.0, 0.0, 10.0, 10.0);
        let b = Bbox::new(5.0, 0.0, 15.0, 10.0);
        // 50 / 150
        assert!((a.iou(&b) - 1.0 / 3.0).abs() < 1e-6);
    }

    #[test]
    fn from_cxcywh_centers_the_box() {
        let b = Bbox::from_cxcywh(50.0, 40.0, 20.0, 10.0);
        assert_eq!(b, Bbox::new(40.0, 35.0, 60.0, 45.0));
    }

    #[test]
    fn threshold_is_inclusive_and_rejects_nan() {
        let bbox = Bbox::new(0.0, 0.0, 1.0, 1.0);
        assert!(Detection::new(bbox, 0.3, 0).passes(0.3));
        assert!(!Detection::new(bbox, 0.299, 0).passes(0.3));
        assert!(!Detection::new(bbox, f32::NAN, 0).passes(0.3));
    }
}
