use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::TrackingConfig;
use crate::control::ObjectPosition;
use crate::error::IngestError;

/// Frame size assumed when a detection does not carry one.
pub const DEFAULT_FRAME_SIZE: (u32, u32) = (1920, 1080);

/// One detection as delivered by the vision pipeline.
///
/// Either `bbox` (pixels, TLBR) or the normalized `cx`/`cy`/`width`/`height`
/// quadruple must be present; `bbox` takes precedence. A missing frame size
/// falls back to [`DEFAULT_FRAME_SIZE`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RawDetection {
    /// Pixel box (x1, y1, x2, y2)
    pub bbox: Option<[f64; 4]>,
    /// Normalized center x
    pub cx: Option<f64>,
    /// Normalized center y
    pub cy: Option<f64>,
    /// Normalized width
    pub width: Option<f64>,
    /// Normalized height
    pub height: Option<f64>,
    /// Detector confidence in [0, 1]
    pub confidence: f64,
    #[serde(rename = "class")]
    pub object_class: String,
    /// Frame width in pixels
    pub frame_w: Option<u32>,
    /// Frame height in pixels
    pub frame_h: Option<u32>,
}

impl Default for RawDetection {
    fn default() -> Self {
        Self {
            bbox: None,
            cx: None,
            cy: None,
            width: None,
            height: None,
            confidence: 0.0,
            object_class: "unknown".to_string(),
            frame_w: None,
            frame_h: None,
        }
    }
}

fn finite(field: &'static str, value: f64) -> Result<f64, IngestError> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(IngestError::NonFinite { field })
    }
}

impl RawDetection {
    /// Frame size, with [`DEFAULT_FRAME_SIZE`] filling in missing dimensions.
    pub fn frame_size(&self) -> (u32, u32) {
        (
            self.frame_w.unwrap_or(DEFAULT_FRAME_SIZE.0),
            self.frame_h.unwrap_or(DEFAULT_FRAME_SIZE.1),
        )
    }

    /// A pixel box whose frame size is partly or wholly assumed.
    pub fn uses_default_frame(&self) -> bool {
        self.bbox.is_some() && (self.frame_w.is_none() || self.frame_h.is_none())
    }

    /// Validate and normalize. The center is clamped into the frame.
    pub fn to_position(&self, timestamp: f64) -> Result<ObjectPosition, IngestError> {
        let (fw, fh) = self.frame_size();
        if self.uses_default_frame() {
            debug!(frame_w = fw, frame_h = fh, "pixel bbox without frame size, assuming default frame");
        }
        if fw == 0 || fh == 0 {
            return Err(IngestError::FrameSize {
                width: fw,
                height: fh,
            });
        }
        let confidence = finite("confidence", self.confidence)?;
        if !(0.0..=1.0).contains(&confidence) {
            return Err(IngestError::Confidence(confidence));
        }

        let (cx, cy, w, h) = match (self.bbox, self.cx, self.cy, self.width, self.height) {
            (Some([x1, y1, x2, y2]), ..) => {
                let x1 = finite("bbox", x1)?;
                let y1 = finite("bbox", y1)?;
                let x2 = finite("bbox", x2)?;
                let y2 = finite("bbox", y2)?;
                let (fw, fh) = (fw as f64, fh as f64);
                (
                    (x1 + x2) / 2.0 / fw,
                    (y1 + y2) / 2.0 / fh,
                    (x2 - x1) / fw,
                    (y2 - y1) / fh,
                )
            }
            (None, Some(cx), Some(cy), Some(w), Some(h)) => (
                finite("cx", cx)?,
                finite("cy", cy)?,
                finite("width", w)?,
                finite("height", h)?,
            ),
            _ => return Err(IngestError::MissingBox),
        };
        if w <= 0.0 || h <= 0.0 {
            return Err(IngestError::EmptyBox {
                width: w,
                height: h,
            });
        }

        Ok(ObjectPosition::new(
            cx.clamp(0.0, 1.0),
            cy.clamp(0.0, 1.0),
            w.min(1.0),
            h.min(1.0),
            confidence,
            timestamp,
            fw,
            fh,
            self.object_class.clone(),
        ))
    }
}

/// Outcome of filtering one inbound batch.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilteredBatch {
    /// Entries that passed every check, in input order
    pub positions: Vec<ObjectPosition>,
    /// Below `min_confidence_threshold`
    pub low_confidence: usize,
    /// Area outside `[min_object_size, max_object_size]`
    pub out_of_size: usize,
    /// Failed validation
    pub malformed: usize,
}

impl FilteredBatch {
    /// Total entries dropped from the batch.
    pub fn discarded(&self) -> usize {
        self.low_confidence + self.out_of_size + self.malformed
    }
}

/// Drop malformed entries and those below the confidence threshold or
/// outside the size bounds; the rest of the batch is kept.
pub fn filter_detections(
    raw: &[RawDetection],
    config: &TrackingConfig,
    timestamp: f64,
) -> FilteredBatch {
    let mut batch = FilteredBatch::default();
    for (idx, det) in raw.iter().enumerate() {
        let position = match det.to_position(timestamp) {
            Ok(p) => p,
            Err(e) => {
                debug!(index = idx, error = %e, "malformed detection dropped");
                batch.malformed += 1;
                continue;
            }
        };
        if position.confidence < config.min_confidence_threshold {
            batch.low_confidence += 1;
            continue;
        }
        let area = position.area_ratio();
        if area < config.min_object_size || area > config.max_object_size {
            batch.out_of_size += 1;
            continue;
        }
        batch.positions.push(position);
    }
    batch
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::integration::DetectionBuilder;

    #[test]
    fn test_bbox_normalized() {
        let det = DetectionBuilder::new()
            .tlbr(860.0, 440.0, 1060.0, 640.0)
            .confidence(0.9)
            .frame(1920, 1080)
            .build();
        let p = det.to_position(1.0).unwrap();
        assert!((p.cx - 960.0 / 1920.0).abs() < 1e-9);
        assert!((p.cy - 540.0 / 1080.0).abs() < 1e-9);
        assert!((p.width - 200.0 / 1920.0).abs() < 1e-9);
        assert_eq!(p.timestamp, 1.0);
    }

    #[test]
    fn test_malformed_rejected() {
        let missing = RawDetection {
            confidence: 0.9,
            ..RawDetection::default()
        };
        assert_eq!(missing.to_position(0.0), Err(IngestError::MissingBox));

        let nan = DetectionBuilder::new().xywh(f64::NAN, 0.5, 0.1, 0.1).confidence(0.9).build();
        assert_eq!(nan.to_position(0.0), Err(IngestError::NonFinite { field: "cx" }));

        let empty = DetectionBuilder::new().tlbr(10.0, 10.0, 10.0, 20.0).confidence(0.9).build();
        assert!(matches!(empty.to_position(0.0), Err(IngestError::EmptyBox { .. })));

        let conf = DetectionBuilder::new().xywh(0.5, 0.5, 0.1, 0.1).confidence(1.5).build();
        assert_eq!(conf.to_position(0.0), Err(IngestError::Confidence(1.5)));
    }

    #[test]
    fn test_filter_keeps_rest_of_batch() {
        let config = TrackingConfig::default();
        let raw = vec![
            DetectionBuilder::new().xywh(0.5, 0.5, 0.2, 0.2).confidence(0.9).build(),
            DetectionBuilder::new().xywh(0.5, 0.5, 0.2, 0.2).confidence(0.1).build(),
            DetectionBuilder::new().xywh(0.5, 0.5, 0.01, 0.01).confidence(0.9).build(),
            DetectionBuilder::new().xywh(0.5, 0.5, 0.95, 0.95).confidence(0.9).build(),
            RawDetection::default(),
        ];
        let batch = filter_detections(&raw, &config, 0.0);
        assert_eq!(batch.positions.len(), 1);
        assert_eq!(batch.low_confidence, 1);
        assert_eq!(batch.out_of_size, 2);
        assert_eq!(batch.malformed, 1);
        assert_eq!(batch.discarded(), 4);
    }

    #[test]
    fn test_deserialize_center_form() {
        let raw: RawDetection = serde_json::from_str(
            r#"{"cx": 0.3, "cy": 0.4, "width": 0.1, "height": 0.2, "confidence": 0.8, "class": "boat"}"#,
        )
        .unwrap();
        let p = raw.to_position(0.0).unwrap();
        assert_eq!(p.object_class, "boat");
        assert_eq!((p.frame_w, p.frame_h), (1920, 1080));
    }

    #[test]
    fn test_pixel_box_without_frame_uses_default() {
        let det = DetectionBuilder::new()
            .tlbr(0.0, 0.0, 192.0, 108.0)
            .confidence(0.9)
            .build();
        assert!(det.uses_default_frame());
        let p = det.to_position(0.0).unwrap();
        assert_eq!((p.frame_w, p.frame_h), DEFAULT_FRAME_SIZE);
        assert!((p.width - 0.1).abs() < 1e-9);

        let sized = RawDetection {
            frame_w: Some(960),
            frame_h: Some(540),
            ..det.clone()
        };
        assert!(!sized.uses_default_frame());
        assert!((sized.to_position(0.0).unwrap().width - 0.2).abs() < 1e-9);

        // Normalized boxes do not depend on the frame size.
        let normalized = DetectionBuilder::new().xywh(0.5, 0.5, 0.1, 0.1).build();
        assert!(!normalized.uses_default_frame());
    }
}
