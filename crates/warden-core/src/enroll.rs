//! Quality scoring for enrollment captures.
//!
//! A face scores higher the larger it is and the closer its centre sits to
//! the frame centre: `area / (1 + distance_to_centre)`.

use crate::types::{BoundingBox, Detection, Embedding};

/// Number of frames sampled per enrollment session.
pub const ENROLL_FRAME_CAP: usize = 30;
/// Best score a session should exceed to count as a good capture.
pub const ENROLL_QUALITY_THRESHOLD: f32 = 500.0;

/// Score a detected face against the frame it came from.
pub fn quality_score(bbox: &BoundingBox, frame_width: u32, frame_height: u32) -> f32 {
    let (cx, cy) = bbox.center();
    let fx = frame_width as f32 / 2.0;
    let fy = frame_height as f32 / 2.0;
    let distance = ((cx - fx).powi(2) + (cy - fy).powi(2)).sqrt();
    bbox.area() / (1.0 + distance)
}

/// Best face seen so far in an enrollment session.
#[derive(Debug, Clone)]
pub struct BestFace {
    pub embedding: Embedding,
    pub score: f32,
    /// Zero-based index of the frame the face came from.
    pub frame_index: usize,
}

/// Tracks the single highest-scoring face across all frames of a session.
///
/// Only a strictly greater score replaces the current best, so a zero-score
/// face is never retained and earlier frames win exact ties.
#[derive(Debug, Default)]
pub struct BestFaceTracker {
    best: Option<BestFace>,
}

impl BestFaceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Score every detection in one frame, returning the per-face scores in
    /// detection order.
    pub fn observe(
        &mut self,
        frame_index: usize,
        frame_width: u32,
        frame_height: u32,
        detections: &[Detection],
    ) -> Vec<f32> {
        let mut scores = Vec::with_capacity(detections.len());
        for det in detections {
            let score = quality_score(&det.bbox, frame_width, frame_height);
            scores.push(score);
            if score > self.best_score() {
                self.best = Some(BestFace {
                    embedding: det.embedding.clone(),
                    score,
                    frame_index,
                });
            }
        }
        scores
    }

    pub fn best_score(&self) -> f32 {
        self.best.as_ref().map_or(0.0, |b| b.score)
    }

    pub fn into_best(self) -> Option<BestFace> {
        self.best
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn det(x: f32, y: f32, w: f32, h: f32, tag: f32) -> Detection {
        Detection {
            bbox: BoundingBox { x, y, width: w, height: h },
            embedding: Embedding::new(vec![tag]),
        }
    }

    #[test]
    fn test_centered_face_scores_full_area() {
        // 100x100 box centred in a 640x480 frame: distance 0 → score = area.
        let b = BoundingBox { x: 270.0, y: 190.0, width: 100.0, height: 100.0 };
        assert!((quality_score(&b, 640, 480) - 10_000.0).abs() < 1e-3);
    }

    #[test]
    fn test_off_center_face_scores_lower() {
        let centred = BoundingBox { x: 270.0, y: 190.0, width: 100.0, height: 100.0 };
        let corner = BoundingBox { x: 0.0, y: 0.0, width: 100.0, height: 100.0 };
        assert!(quality_score(&corner, 640, 480) < quality_score(&centred, 640, 480));
    }

    #[test]
    fn test_known_distance() {
        // Centre at (50, 50); frame centre (53, 54) → distance 5.
        let b = BoundingBox { x: 40.0, y: 40.0, width: 20.0, height: 20.0 };
        assert!((quality_score(&b, 106, 108) - 400.0 / 6.0).abs() < 1e-3);
    }

    #[test]
    fn test_tracker_keeps_global_best_across_frames() {
        let mut t = BestFaceTracker::new();
        t.observe(0, 640, 480, &[det(0.0, 0.0, 50.0, 50.0, 1.0)]);
        t.observe(1, 640, 480, &[det(270.0, 190.0, 100.0, 100.0, 2.0), det(0.0, 0.0, 10.0, 10.0, 3.0)]);
        t.observe(2, 640, 480, &[det(0.0, 0.0, 60.0, 60.0, 4.0)]);

        let best = t.into_best().unwrap();
        assert_eq!(best.embedding.values, vec![2.0]);
        assert_eq!(best.frame_index, 1);
    }

    #[test]
    fn test_tracker_ties_keep_earliest() {
        let mut t = BestFaceTracker::new();
        t.observe(0, 640, 480, &[det(270.0, 190.0, 100.0, 100.0, 1.0)]);
        t.observe(1, 640, 480, &[det(270.0, 190.0, 100.0, 100.0, 2.0)]);
        assert_eq!(t.into_best().unwrap().embedding.values, vec![1.0]);
    }

    #[test]
    fn test_tracker_ignores_zero_area() {
        let mut t = BestFaceTracker::new();
        let scores = t.observe(0, 640, 480, &[det(320.0, 240.0, 0.0, 0.0, 1.0)]);
        assert_eq!(scores, vec![0.0]);
        assert!(t.into_best().is_none());
    }

    #[test]
    fn test_tracker_empty() {
        let t = BestFaceTracker::new();
        assert_eq!(t.best_score(), 0.0);
        assert!(t.into_best().is_none());
    }
}
