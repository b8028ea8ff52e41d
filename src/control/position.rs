use serde::{Deserialize, Serialize};

use crate::tracker::Rect;

/// One observation of an object in one frame, in normalized frame coordinates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectPosition {
    /// Center x in [0, 1]
    pub cx: f64,
    /// Center y in [0, 1]
    pub cy: f64,
    /// Width as a fraction of the frame width
    pub width: f64,
    /// Height as a fraction of the frame height
    pub height: f64,
    /// Detector confidence in [0, 1]
    pub confidence: f64,
    /// Seconds on the session clock.
    pub timestamp: f64,
    /// Frame width in pixels
    pub frame_w: u32,
    /// Frame height in pixels
    pub frame_h: u32,
    /// Detector class label
    pub object_class: String,
}

impl ObjectPosition {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        cx: f64,
        cy: f64,
        width: f64,
        height: f64,
        confidence: f64,
        timestamp: f64,
        frame_w: u32,
        frame_h: u32,
        object_class: impl Into<String>,
    ) -> Self {
        Self {
            cx,
            cy,
            width,
            height,
            confidence,
            timestamp,
            frame_w,
            frame_h,
            object_class: object_class.into(),
        }
    }

    /// Box in pixel coordinates, for association.
    pub fn pixel_rect(&self) -> Rect {
        let (fw, fh) = (self.frame_w as f64, self.frame_h as f64);
        Rect::from_center(
            (self.cx * fw) as f32,
            (self.cy * fh) as f32,
            (self.width * fw) as f32,
            (self.height * fh) as f32,
        )
    }

    /// Object area as a fraction of the frame area.
    pub fn area_ratio(&self) -> f64 {
        self.width * self.height
    }

    /// Object area in square pixels.
    pub fn pixel_area(&self) -> f64 {
        self.area_ratio() * self.frame_w as f64 * self.frame_h as f64
    }

    /// Distance from the frame center in normalized units; 0 at the center,
    /// about 0.707 in a corner.
    pub fn distance_to_center(&self) -> f64 {
        (self.cx - 0.5).hypot(self.cy - 0.5)
    }

    /// Copy moved to a new center, e.g. for a prediction.
    pub fn shifted(&self, cx: f64, cy: f64, timestamp: f64) -> Self {
        Self {
            cx,
            cy,
            timestamp,
            ..self.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_center_distance_and_area() {
        let p = ObjectPosition::new(0.5, 0.5, 0.1, 0.2, 0.8, 0.0, 1920, 1080, "person");
        assert_eq!(p.distance_to_center(), 0.0);
        assert!((p.area_ratio() - 0.02).abs() < 1e-12);
        assert!((p.pixel_area() - 0.02 * 1920.0 * 1080.0).abs() < 1e-6);
    }

    #[test]
    fn test_pixel_rect() {
        let p = ObjectPosition::new(0.25, 0.5, 0.1, 0.2, 0.8, 0.0, 1000, 500, "car");
        let r = p.pixel_rect();
        assert!((r.x - 200.0).abs() < 1e-3);
        assert!((r.y - 200.0).abs() < 1e-3);
        assert!((r.width - 100.0).abs() < 1e-3);
        assert!((r.height - 100.0).abs() < 1e-3);
    }
}
