#![cfg(feature = "backend-tract")]

//! ONNX inference engine backed by tract.
//!
//! Loads a local YOLO-style detector and decodes its output tensor
//! (shape `[1, 4 + num_classes, N]`: center-x, center-y, width, height,
//! then per-class scores) into detections above the confidence threshold,
//! with greedy non-maximum suppression. No network I/O; the model file is
//! the only disk access.

use std::path::Path;

use anyhow::{anyhow, Context, Result};
use tract_onnx::prelude::*;

use super::{BoundingBox, Detection, Inference, InferenceEngine};
use crate::frame::Frame;
use crate::overlay;

const NMS_IOU: f32 = 0.45;

pub struct TractEngine {
    model: TypedSimplePlan<TypedModel>,
    input_width: u32,
    input_height: u32,
    labels: Vec<String>,
}

impl TractEngine {
    /// Load an ONNX model from disk and prepare it for inference with a
    /// fixed input resolution.
    pub fn new<P: AsRef<Path>>(model_path: P, input_width: u32, input_height: u32) -> Result<Self> {
        let model_path = model_path.as_ref();
        let model = tract_onnx::onnx()
            .model_for_path(model_path)
            .with_context(|| format!("load ONNX model from {}", model_path.display()))?
            .with_input_fact(
                0,
                InferenceFact::dt_shape(
                    f32::datum_type(),
                    tvec!(1, 3, input_height as usize, input_width as usize),
                ),
            )
            .context("set model input fact")?
            .into_optimized()
            .context("optimize ONNX model")?
            .into_runnable()
            .context("build runnable ONNX model")?;

        Ok(Self {
            model,
            input_width,
            input_height,
            labels: Vec::new(),
        })
    }

    /// Attach class labels in model output order.
    pub fn with_labels(mut self, labels: Vec<String>) -> Self {
        self.labels = labels;
        self
    }

    fn build_input(&self, frame: &Frame) -> Result<Tensor> {
        let resized = frame.resized(self.input_width, self.input_height);
        let pixels = resized.pixels();
        let width = self.input_width as usize;
        let height = self.input_height as usize;

        let input =
            tract_ndarray::Array4::from_shape_fn((1, 3, height, width), |(_, channel, y, x)| {
                let idx = (y * width + x) * 3 + channel;
                pixels[idx] as f32 / 255.0
            });
        Ok(input.into_tensor())
    }

    /// Decode one output tensor into frame-space detections.
    fn decode(&self, outputs: TVec<TValue>, frame: &Frame, confidence: f32) -> Result<Vec<Detection>> {
        let output = outputs
            .first()
            .ok_or_else(|| anyhow!("model produced no outputs"))?;
        let view = output
            .to_array_view::<f32>()
            .context("model output tensor was not f32")?;
        let shape = view.shape();
        if shape.len() != 3 || shape[1] < 5 {
            return Err(anyhow!(
                "unexpected model output shape {:?}, want [1, 4+classes, boxes]",
                shape
            ));
        }
        let num_classes = shape[1] - 4;
        let num_boxes = shape[2];

        let scale_x = frame.width as f32 / self.input_width as f32;
        let scale_y = frame.height as f32 / self.input_height as f32;

        let mut detections = Vec::new();
        for b in 0..num_boxes {
            let mut best_class = 0usize;
            let mut best_score = 0.0f32;
            for c in 0..num_classes {
                let score = view[[0, 4 + c, b]];
                if score > best_score {
                    best_score = score;
                    best_class = c;
                }
            }
            if best_score < confidence {
                continue;
            }
            let cx = view[[0, 0, b]] * scale_x;
            let cy = view[[0, 1, b]] * scale_y;
            let w = view[[0, 2, b]] * scale_x;
            let h = view[[0, 3, b]] * scale_y;
            detections.push(Detection {
                class_id: best_class as u32,
                label: self.labels.get(best_class).cloned(),
                confidence: best_score,
                bbox: BoundingBox {
                    x: cx - w / 2.0,
                    y: cy - h / 2.0,
                    w,
                    h,
                },
                track_id: None,
            });
        }
        Ok(non_max_suppression(detections))
    }
}

/// Greedy per-class NMS, keeping the highest-scoring box in each cluster.
fn non_max_suppression(mut detections: Vec<Detection>) -> Vec<Detection> {
    detections.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
    let mut kept: Vec<Detection> = Vec::with_capacity(detections.len());
    for candidate in detections {
        let overlaps = kept.iter().any(|k| {
            k.class_id == candidate.class_id && k.bbox.iou(&candidate.bbox) > NMS_IOU
        });
        if !overlaps {
            kept.push(candidate);
        }
    }
    kept
}

impl InferenceEngine for TractEngine {
    fn name(&self) -> &'static str {
        "tract"
    }

    fn detect(&mut self, frame: &Frame, confidence: f32) -> Result<Inference> {
        let input = self.build_input(frame)?;
        let outputs = self
            .model
            .run(tvec!(input.into()))
            .context("ONNX inference failed")?;
        let detections = self.decode(outputs, frame, confidence)?;

        let mut annotated = frame.clone();
        overlay::draw_detections(&mut annotated, &detections);
        Ok(Inference {
            annotated,
            detections,
        })
    }

    fn warm_up(&mut self) -> Result<()> {
        let blank = vec![0u8; (self.input_width * self.input_height * 3) as usize];
        let input = tract_ndarray::Array4::from_shape_vec(
            (1, 3, self.input_height as usize, self.input_width as usize),
            blank.iter().map(|&p| p as f32 / 255.0).collect(),
        )
        .context("build warm-up tensor")?
        .into_tensor();
        self.model
            .run(tvec!(input.into()))
            .context("warm-up inference failed")?;
        Ok(())
    }
}
