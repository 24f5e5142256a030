//! Stub inference engine.
//!
//! Deterministic synthetic detections for tests and demos: candidate boxes
//! and scores are derived from a hash of the frame's pixels, so identical
//! frames always produce identical results and no model file is needed.
//! Candidates below the confidence threshold are filtered out, which makes
//! the reported set shrink monotonically as the threshold rises.

use anyhow::Result;
use sha2::{Digest, Sha256};

use super::{BoundingBox, Detection, Inference, InferenceEngine};
use crate::frame::Frame;
use crate::overlay;

const CANDIDATES: usize = 5;
const CLASS_LABELS: [&str; 4] = ["person", "car", "dog", "bicycle"];

/// Model-free engine producing hash-derived detections.
pub struct StubEngine;

impl StubEngine {
    pub fn new() -> Self {
        Self
    }

    fn candidates(frame: &Frame) -> Vec<Detection> {
        let digest = Sha256::digest(frame.pixels());
        let unit = |byte: u8| byte as f32 / 255.0;

        (0..CANDIDATES)
            .map(|k| {
                // Scores span (0.15, 0.95) so thresholds at either extreme
                // still have something to include or exclude.
                let confidence = 0.15 + 0.8 * unit(digest[k]);
                let scale = 0.10 + 0.20 * unit(digest[10 + 3 * k]);
                let w = frame.width as f32 * scale;
                let h = frame.height as f32 * scale;
                let x = unit(digest[8 + 3 * k]) * (frame.width as f32 - w);
                let y = unit(digest[9 + 3 * k]) * (frame.height as f32 - h);
                let class_id = (digest[24 + k] % CLASS_LABELS.len() as u8) as u32;
                Detection {
                    class_id,
                    label: Some(CLASS_LABELS[class_id as usize].to_string()),
                    confidence,
                    bbox: BoundingBox { x, y, w, h },
                    track_id: None,
                }
            })
            .collect()
    }
}

impl Default for StubEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl InferenceEngine for StubEngine {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn detect(&mut self, frame: &Frame, confidence: f32) -> Result<Inference> {
        let detections: Vec<Detection> = Self::candidates(frame)
            .into_iter()
            .filter(|d| d.confidence >= confidence)
            .collect();

        let mut annotated = frame.clone();
        overlay::draw_detections(&mut annotated, &detections);
        Ok(Inference {
            annotated,
            detections,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::StreamId;

    fn frame(seed: u8) -> Frame {
        let data: Vec<u8> = (0..64 * 48 * 3).map(|i| (i as u8).wrapping_add(seed)).collect();
        Frame::new(data, 64, 48, StreamId::next(), 1).unwrap()
    }

    #[test]
    fn identical_frames_give_identical_detections() -> Result<()> {
        let mut engine = StubEngine::new();
        let a = engine.detect(&frame(7), 0.3)?;
        let b = engine.detect(&frame(7), 0.3)?;
        assert_eq!(a.detections.len(), b.detections.len());
        for (da, db) in a.detections.iter().zip(&b.detections) {
            assert_eq!(da.bbox, db.bbox);
            assert_eq!(da.confidence, db.confidence);
        }
        Ok(())
    }

    #[test]
    fn raising_threshold_never_adds_detections() -> Result<()> {
        let mut engine = StubEngine::new();
        let frame = frame(42);
        let mut previous = usize::MAX;
        for threshold in [0.0, 0.2, 0.4, 0.6, 0.8, 1.0] {
            let count = engine.detect(&frame, threshold)?.detections.len();
            assert!(count <= previous, "threshold {threshold} grew the set");
            previous = count;
        }
        Ok(())
    }

    #[test]
    fn detections_stay_inside_the_frame() -> Result<()> {
        let mut engine = StubEngine::new();
        let frame = frame(3);
        for d in engine.detect(&frame, 0.0)?.detections {
            assert!(d.bbox.x >= 0.0 && d.bbox.y >= 0.0);
            assert!(d.bbox.x + d.bbox.w <= frame.width as f32 + 0.5);
            assert!(d.bbox.y + d.bbox.h <= frame.height as f32 + 0.5);
        }
        Ok(())
    }

    #[test]
    fn annotated_frame_keeps_input_dimensions() -> Result<()> {
        let mut engine = StubEngine::new();
        let input = frame(9);
        let inference = engine.detect(&input, 0.0)?;
        assert_eq!(inference.annotated.width, input.width);
        assert_eq!(inference.annotated.height, input.height);
        Ok(())
    }
}
