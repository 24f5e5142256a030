//! Inference engine boundary.
//!
//! The pipeline treats the detector as opaque: it hands over a normalized
//! frame, a confidence threshold, and (when tracking) the run's
//! `TrackingState`, and receives back an annotated frame plus detection
//! records. Engines are interchangeable behind the `InferenceEngine` trait
//! and are selected by name through the registry.

pub mod registry;
pub mod stub;
#[cfg(feature = "backend-tract")]
pub mod tract;

pub use registry::EngineRegistry;
pub use stub::StubEngine;
#[cfg(feature = "backend-tract")]
pub use tract::TractEngine;

use anyhow::Result;

use crate::frame::Frame;
use crate::overlay;
use crate::track::TrackingState;

/// Axis-aligned box in pixel coordinates of the normalized frame:
/// top-left corner plus size.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub w: f32,
    pub h: f32,
}

impl BoundingBox {
    pub fn center(&self) -> (f32, f32) {
        (self.x + self.w / 2.0, self.y + self.h / 2.0)
    }

    pub fn area(&self) -> f32 {
        self.w.max(0.0) * self.h.max(0.0)
    }

    /// Intersection over union with another box.
    pub fn iou(&self, other: &BoundingBox) -> f32 {
        let ix0 = self.x.max(other.x);
        let iy0 = self.y.max(other.y);
        let ix1 = (self.x + self.w).min(other.x + other.w);
        let iy1 = (self.y + self.h).min(other.y + other.h);
        let intersection = (ix1 - ix0).max(0.0) * (iy1 - iy0).max(0.0);
        let union = self.area() + other.area() - intersection;
        if union <= 0.0 {
            0.0
        } else {
            intersection / union
        }
    }

    /// Corner coordinates, unclamped, for the overlay layer.
    pub(crate) fn to_pixel_rect(self) -> [i64; 4] {
        [
            self.x.floor() as i64,
            self.y.floor() as i64,
            (self.x + self.w).ceil() as i64,
            (self.y + self.h).ceil() as i64,
        ]
    }
}

/// One detected object.
#[derive(Clone, Debug)]
pub struct Detection {
    pub class_id: u32,
    pub label: Option<String>,
    pub confidence: f32,
    pub bbox: BoundingBox,
    /// Present only in tracking mode; stable within one run.
    pub track_id: Option<u64>,
}

/// Result of one inference call: the annotated frame to display plus the
/// structured records behind it.
#[derive(Clone, Debug)]
pub struct Inference {
    pub annotated: Frame,
    pub detections: Vec<Detection>,
}

/// Capabilities an engine may support.
#[non_exhaustive]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EngineCapability {
    Detection,
    Tracking,
}

/// Detector/tracker boundary.
///
/// `detect` is the one required method. The provided `track` runs detection,
/// feeds the results through the caller's `TrackingState`, and stamps track
/// ids onto the annotated frame. Engines with native tracking may override
/// it, but must still treat the state as owned by the caller's run.
pub trait InferenceEngine: Send {
    /// Engine identifier, used for registry lookup.
    fn name(&self) -> &'static str;

    fn supports(&self, capability: EngineCapability) -> bool {
        matches!(
            capability,
            EngineCapability::Detection | EngineCapability::Tracking
        )
    }

    /// Run detection on a normalized frame, reporting only objects at or
    /// above the confidence threshold, drawn onto the annotated frame.
    fn detect(&mut self, frame: &Frame, confidence: f32) -> Result<Inference>;

    /// Detection plus identity persistence through `state`.
    fn track(
        &mut self,
        frame: &Frame,
        confidence: f32,
        state: &mut TrackingState,
    ) -> Result<Inference> {
        let mut inference = self.detect(frame, confidence)?;
        state.update(&mut inference.detections);
        overlay::draw_track_ids(&mut inference.annotated, &inference.detections);
        Ok(inference)
    }

    /// Optional warm-up hook (model load, first-inference JIT).
    fn warm_up(&mut self) -> Result<()> {
        Ok(())
    }
}
