//! Cost matrices and assignment for track/detection association.

use ndarray::Array2;

use crate::tracker::rect::{Rect, iou_batch};

/// Detection input for the association: a pixel box and its confidence.
#[derive(Debug, Clone, Copy)]
pub struct Detection {
    /// Detection box in pixels
    pub bbox: Rect,
    /// Detection confidence
    pub score: f32,
}

impl Detection {
    /// Detection from TLBR corners.
    pub fn new(x1: f32, y1: f32, x2: f32, y2: f32, score: f32) -> Self {
        Self::from_rect(Rect::from_tlbr(x1, y1, x2, y2), score)
    }

    /// Detection from an existing box.
    pub fn from_rect(bbox: Rect, score: f32) -> Self {
        Self { bbox, score }
    }
}

/// `1 - IoU` for every track/detection pair.
pub fn iou_distance(track_boxes: &[Rect], det_boxes: &[Rect]) -> Array2<f32> {
    iou_batch(track_boxes, det_boxes).mapv(|iou| 1.0 - iou)
}

/// Weight IoU similarity by detection confidence.
pub fn fuse_score(cost_matrix: &mut Array2<f32>, scores: &[f32]) {
    for ((_, j), cost) in cost_matrix.indexed_iter_mut() {
        *cost = 1.0 - (1.0 - *cost) * scores[j];
    }
}

#[derive(Debug, Clone, Default)]
pub struct AssignmentResult {
    /// Matched (track index, detection index) pairs
    pub matches: Vec<(usize, usize)>,
    /// Track indices left unmatched
    pub unmatched_tracks: Vec<usize>,
    /// Detection indices left unmatched
    pub unmatched_detections: Vec<usize>,
}

/// Minimum-cost assignment (Jonker-Volgenant); pairs costing more than
/// `thresh` are reported unmatched.
pub fn linear_assignment(cost_matrix: &Array2<f32>, thresh: f32) -> AssignmentResult {
    let (rows, cols) = cost_matrix.dim();
    if rows == 0 || cols == 0 {
        return AssignmentResult {
            matches: Vec::new(),
            unmatched_tracks: (0..rows).collect(),
            unmatched_detections: (0..cols).collect(),
        };
    }

    // lapjv wants a square matrix; pad with a prohibitive cost.
    let size = rows.max(cols);
    let padded = Array2::from_shape_fn((size, size), |(i, j)| {
        if i < rows && j < cols {
            cost_matrix[[i, j]] as f64
        } else {
            1e6
        }
    });

    let mut result = AssignmentResult::default();
    let mut detection_free = vec![true; cols];

    match lapjv::lapjv(&padded) {
        Ok((row_to_col, _)) => {
            for (row, &col) in row_to_col.iter().enumerate().take(rows) {
                if col < cols && cost_matrix[[row, col]] <= thresh {
                    result.matches.push((row, col));
                    detection_free[col] = false;
                } else {
                    result.unmatched_tracks.push(row);
                }
            }
        }
        Err(_) => result.unmatched_tracks = (0..rows).collect(),
    }

    result.unmatched_detections = detection_free
        .iter()
        .enumerate()
        .filter_map(|(j, &free)| free.then_some(j))
        .collect();
    result
}

/// Candidate with the highest strictly positive IoU against `target`.
pub fn best_iou_match<'a, I>(target: &Rect, candidates: I) -> Option<(usize, f32)>
where
    I: IntoIterator<Item = (usize, &'a Rect)>,
{
    candidates
        .into_iter()
        .map(|(idx, rect)| (idx, target.iou(rect)))
        .filter(|&(_, iou)| iou > 0.0)
        .max_by(|a, b| a.1.total_cmp(&b.1))
}
