//! streamlens
//!
//! Real-time object detection and tracking over heterogeneous video
//! sources. One pipeline shape serves every source kind:
//!
//! 1. A source selector is parsed and opened into a `StreamHandle`
//!    (webcam index, RTSP URL, local file path, or remote video URL
//!    resolved to a playable stream first).
//! 2. Frames are pulled one at a time and normalized to a fixed
//!    16:9 inference resolution.
//! 3. An `InferenceEngine` runs detection, optionally feeding a
//!    per-run `TrackingState` so objects keep stable ids across frames.
//! 4. Annotated frames go to a `DisplaySink`; the loop never waits on
//!    presentation.
//!
//! Transport faults (open, read) abort the run; inference faults drop
//! only the offending frame. Real capture backends are feature-gated
//! (`source-rtsp-gstreamer`, `source-file-ffmpeg`, `source-webcam-v4l2`,
//! `remote-resolve-http`, `backend-tract`); without them every source
//! kind falls back to a deterministic synthetic twin driven by
//! `stub://` selectors, which is what the test suite runs against.

pub mod config;
pub mod engine;
pub mod error;
pub mod frame;
pub mod overlay;
pub mod pipeline;
pub mod sink;
pub mod source;
pub mod track;

pub use config::AppConfig;
pub use engine::{
    BoundingBox, Detection, EngineCapability, EngineRegistry, Inference, InferenceEngine,
    StubEngine,
};
#[cfg(feature = "backend-tract")]
pub use engine::TractEngine;
pub use error::StreamError;
pub use frame::{Frame, StreamId, TARGET_HEIGHT, TARGET_WIDTH};
pub use pipeline::{run, PipelineConfig, RunSummary, StopToken};
pub use sink::{DisplaySink, MemorySink, NullSink, PngDirSink};
pub use source::{
    ReadOutcome, SourceDescriptor, SourceSettings, StreamHandle,
};
pub use track::{TrackerAlgorithm, TrackingState};
