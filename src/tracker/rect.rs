//! Axis-aligned bounding boxes in pixel space.

use ndarray::Array2;

/// Bounding box stored as top-left corner plus size (TLWH), in pixels.
///
/// The Kalman filter works in XYAH (center x, center y, aspect ratio w/h,
/// height); detections usually arrive as TLBR corners.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Rect {
    /// Left edge
    pub x: f32,
    /// Top edge
    pub y: f32,
    /// Box width
    pub width: f32,
    /// Box height
    pub height: f32,
}

impl Rect {
    /// Build a box from its top-left corner and size (TLWH).
    #[inline]
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Build a box from its corners (x1, y1, x2, y2).
    #[inline]
    pub fn from_tlbr(x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        Self::new(x1, y1, x2 - x1, y2 - y1)
    }

    /// Box of the given size centered on `(cx, cy)`.
    #[inline]
    pub fn from_center(cx: f32, cy: f32, width: f32, height: f32) -> Self {
        Self::new(cx - width / 2.0, cy - height / 2.0, width, height)
    }

    /// Build a box from a Kalman measurement (center x, center y, w/h, height).
    #[inline]
    pub fn from_xyah(xyah: [f64; 4]) -> Self {
        let [cx, cy, aspect, height] = xyah.map(|v| v as f32);
        Self::from_center(cx, cy, aspect * height, height)
    }

    /// Corners as (x1, y1, x2, y2).
    #[inline]
    pub fn to_tlbr(&self) -> [f32; 4] {
        [self.x, self.y, self.x + self.width, self.y + self.height]
    }

    /// Kalman measurement (center x, center y, w/h, height). A zero height
    /// yields a zero aspect ratio.
    #[inline]
    pub fn to_xyah(&self) -> [f64; 4] {
        let (cx, cy) = self.center();
        let aspect = if self.height > 0.0 {
            self.width / self.height
        } else {
            0.0
        };
        [cx as f64, cy as f64, aspect as f64, self.height as f64]
    }

    /// Center point of the box.
    #[inline]
    pub fn center(&self) -> (f32, f32) {
        (self.x + self.width / 2.0, self.y + self.height / 2.0)
    }

    /// Box area; negative sizes count as zero.
    #[inline]
    pub fn area(&self) -> f32 {
        self.width.max(0.0) * self.height.max(0.0)
    }

    /// Euclidean distance between the centers of two boxes.
    pub fn center_distance(&self, other: &Rect) -> f32 {
        let (ax, ay) = self.center();
        let (bx, by) = other.center();
        ((ax - bx).powi(2) + (ay - by).powi(2)).sqrt()
    }

    /// Intersection over Union. Zero when the boxes do not overlap or both are empty.
    pub fn iou(&self, other: &Rect) -> f32 {
        let [ax1, ay1, ax2, ay2] = self.to_tlbr();
        let [bx1, by1, bx2, by2] = other.to_tlbr();

        let inter_w = (ax2.min(bx2) - ax1.max(bx1)).max(0.0);
        let inter_h = (ay2.min(by2) - ay1.max(by1)).max(0.0);
        let inter = inter_w * inter_h;
        if inter <= 0.0 {
            return 0.0;
        }

        let union = self.area() + other.area() - inter;
        if union > 0.0 { inter / union } else { 0.0 }
    }
}

/// Pairwise IoU matrix of shape `(boxes_a.len(), boxes_b.len())`.
pub fn iou_batch(boxes_a: &[Rect], boxes_b: &[Rect]) -> Array2<f32> {
    Array2::from_shape_fn((boxes_a.len(), boxes_b.len()), |(i, j)| {
        boxes_a[i].iou(&boxes_b[j])
    })
}
