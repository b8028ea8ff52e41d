//! Builder for [`RawDetection`] records from common box formats.

use crate::integration::detection::RawDetection;

/// Builds a [`RawDetection`].
#[derive(Debug, Clone, Default)]
pub struct DetectionBuilder {
    raw: RawDetection,
}

impl DetectionBuilder {
    /// Empty detection: no box, zero confidence, class `unknown`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Pixel box in TLBR format (x1, y1, x2, y2).
    pub fn tlbr(mut self, x1: f64, y1: f64, x2: f64, y2: f64) -> Self {
        self.raw.bbox = Some([x1, y1, x2, y2]);
        self.raw.cx = None;
        self.raw.cy = None;
        self.raw.width = None;
        self.raw.height = None;
        self
    }

    /// Pixel box in TLWH format (left, top, width, height).
    pub fn tlwh(self, left: f64, top: f64, w: f64, h: f64) -> Self {
        self.tlbr(left, top, left + w, top + h)
    }

    /// Normalized center form (cx, cy, width, height), all in [0, 1].
    pub fn xywh(mut self, cx: f64, cy: f64, w: f64, h: f64) -> Self {
        self.raw.bbox = None;
        self.raw.cx = Some(cx);
        self.raw.cy = Some(cy);
        self.raw.width = Some(w);
        self.raw.height = Some(h);
        self
    }

    /// Detector confidence.
    pub fn confidence(mut self, confidence: f64) -> Self {
        self.raw.confidence = confidence;
        self
    }

    /// Object class label.
    pub fn class(mut self, class: impl Into<String>) -> Self {
        self.raw.object_class = class.into();
        self
    }

    /// Frame size in pixels, needed to normalize a pixel box.
    pub fn frame(mut self, width: u32, height: u32) -> Self {
        self.raw.frame_w = Some(width);
        self.raw.frame_h = Some(height);
        self
    }

    /// Finish the detection.
    pub fn build(self) -> RawDetection {
        self.raw
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detection_builder() {
        let det = DetectionBuilder::new()
            .tlbr(10.0, 20.0, 50.0, 80.0)
            .confidence(0.95)
            .class("boat")
            .build();

        assert_eq!(det.confidence, 0.95);
        assert_eq!(det.bbox, Some([10.0, 20.0, 50.0, 80.0]));
        assert_eq!(det.object_class, "boat");
        assert_eq!((det.frame_w, det.frame_h), (None, None));
        assert_eq!(det.frame_size(), (1920, 1080));
    }

    #[test]
    fn test_last_box_format_wins() {
        let det = DetectionBuilder::new()
            .tlwh(0.0, 0.0, 10.0, 10.0)
            .xywh(0.5, 0.5, 0.1, 0.1)
            .build();
        assert_eq!(det.bbox, None);
        assert_eq!(det.cx, Some(0.5));
    }
}
