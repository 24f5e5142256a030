//! Frame pipeline.
//!
//! One synchronous loop per run: pull a frame from the stream handle,
//! normalize it to the fixed inference resolution, invoke the engine in
//! detect or track mode, emit the annotated result to the sink, repeat.
//! There is no queue and no backpressure; a live source drops frames in
//! the capture layer while the loop is busy, which is the intended policy.
//!
//! Failure severity follows the source of the fault: open and read failures
//! abort the run with the handle closed; an inference failure drops only the
//! offending frame and the loop continues, because one bad frame should not
//! kill an otherwise healthy stream.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::Serialize;

use crate::engine::InferenceEngine;
use crate::error::StreamError;
use crate::sink::DisplaySink;
use crate::source::{ReadOutcome, StreamHandle};
use crate::track::{TrackerAlgorithm, TrackingState};

/// Immutable per-run settings, validated at construction and fixed for the
/// duration of the run.
#[derive(Clone, Copy, Debug)]
pub struct PipelineConfig {
    confidence: f32,
    tracking: Option<TrackerAlgorithm>,
}

impl PipelineConfig {
    pub fn new(
        confidence: f32,
        tracking: Option<TrackerAlgorithm>,
    ) -> Result<Self, StreamError> {
        if !(0.0..=1.0).contains(&confidence) {
            return Err(StreamError::Config(format!(
                "confidence must be within [0, 1], got {confidence}"
            )));
        }
        Ok(Self {
            confidence,
            tracking,
        })
    }

    pub fn confidence(&self) -> f32 {
        self.confidence
    }

    pub fn tracking(&self) -> Option<TrackerAlgorithm> {
        self.tracking
    }
}

/// Cooperative stop signal, observed once per loop iteration. Stopping never
/// interrupts an in-flight read or inference call, so stop latency is
/// bounded by one read + inference + emit cycle.
#[derive(Clone, Default)]
pub struct StopToken(Arc<AtomicBool>);

impl StopToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request_stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_requested(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Outcome of a run that terminated without a fatal error.
#[derive(Clone, Copy, Debug, Default, Serialize)]
pub struct RunSummary {
    /// Annotated frames handed to the sink.
    pub frames_emitted: u64,
    /// Frames read but dropped because inference failed on them.
    pub frames_dropped: u64,
    /// True when the run ended on a stop request rather than exhaustion.
    pub stopped: bool,
}

/// Drive one stream through the engine into the sink until the stream is
/// exhausted, a stop is requested, or the transport fails.
///
/// The handle is exclusively owned by this run: it is closed on every exit
/// path before the function returns. When tracking is configured a fresh
/// `TrackingState` is created here, so track ids never leak across runs.
pub fn run(
    handle: &mut StreamHandle,
    config: &PipelineConfig,
    engine: &mut dyn InferenceEngine,
    sink: &mut dyn DisplaySink,
    stop: &StopToken,
) -> Result<RunSummary, StreamError> {
    let mut tracking_state = config.tracking.map(TrackingState::new);
    let mut summary = RunSummary::default();

    log::info!(
        "{}: pipeline start (confidence {:.2}, tracker {})",
        handle.id(),
        config.confidence,
        config
            .tracking
            .map(|t| t.as_str())
            .unwrap_or("off")
    );

    loop {
        // Cancellation point: once per iteration, never mid-frame.
        if stop.is_requested() {
            summary.stopped = true;
            handle.close();
            break;
        }

        let frame = match handle.read() {
            Ok(ReadOutcome::Frame(frame)) => frame,
            Ok(ReadOutcome::EndOfStream) => {
                handle.close();
                break;
            }
            Err(err) => {
                handle.close();
                return Err(err);
            }
        };

        let frame = frame.normalized();
        let result = match tracking_state.as_mut() {
            Some(state) => engine.track(&frame, config.confidence, state),
            None => engine.detect(&frame, config.confidence),
        };

        match result {
            Ok(inference) => {
                let caption = format!(
                    "detected frame {} ({} objects)",
                    frame.index,
                    inference.detections.len()
                );
                sink.show(&inference.annotated, &caption);
                summary.frames_emitted += 1;
            }
            Err(err) => {
                // Drop this frame only; the stream itself is healthy.
                summary.frames_dropped += 1;
                let diagnostic = StreamError::inference(&err);
                log::warn!("{}: dropping frame {}: {}", handle.id(), frame.index, diagnostic);
            }
        }
    }

    log::info!(
        "{}: pipeline done ({} emitted, {} dropped{})",
        handle.id(),
        summary.frames_emitted,
        summary.frames_dropped,
        if summary.stopped { ", stopped" } else { "" }
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::StubEngine;
    use crate::sink::MemorySink;
    use crate::source::{SourceDescriptor, SourceSettings, StreamHandle};

    fn open_clip(frames: u32) -> StreamHandle {
        let descriptor = SourceDescriptor::File {
            path: format!("stub://clip?frames={frames}"),
        };
        StreamHandle::open(&descriptor, &SourceSettings::default()).unwrap()
    }

    #[test]
    fn finite_clip_emits_every_frame_then_closes() {
        let mut handle = open_clip(6);
        let config = PipelineConfig::new(0.0, None).unwrap();
        let mut engine = StubEngine::new();
        let mut sink = MemorySink::new();

        let summary = run(&mut handle, &config, &mut engine, &mut sink, &StopToken::new()).unwrap();

        assert_eq!(summary.frames_emitted, 6);
        assert_eq!(summary.frames_dropped, 0);
        assert!(!summary.stopped);
        assert!(handle.is_closed());
    }

    #[test]
    fn stop_request_ends_the_run_before_the_next_read() {
        let mut handle = open_clip(100);
        let config = PipelineConfig::new(0.4, None).unwrap();
        let mut engine = StubEngine::new();
        let mut sink = MemorySink::new();
        let stop = StopToken::new();
        stop.request_stop();

        let summary = run(&mut handle, &config, &mut engine, &mut sink, &stop).unwrap();

        assert!(summary.stopped);
        assert_eq!(summary.frames_emitted, 0);
        assert!(handle.is_closed());
    }

    #[test]
    fn confidence_outside_unit_interval_is_rejected() {
        assert!(PipelineConfig::new(-0.1, None).is_err());
        assert!(PipelineConfig::new(1.5, None).is_err());
        assert!(PipelineConfig::new(0.0, None).is_ok());
        assert!(PipelineConfig::new(1.0, None).is_ok());
    }

    #[test]
    fn read_failure_aborts_and_closes_the_handle() {
        let descriptor = SourceDescriptor::File {
            path: "stub://clip?frames=10&fail_at=3".into(),
        };
        let mut handle = StreamHandle::open(&descriptor, &SourceSettings::default()).unwrap();
        let config = PipelineConfig::new(0.4, None).unwrap();
        let mut engine = StubEngine::new();
        let mut sink = MemorySink::new();

        let err = run(&mut handle, &config, &mut engine, &mut sink, &StopToken::new()).unwrap_err();

        assert!(matches!(err, StreamError::Read(_)));
        assert!(handle.is_closed());
        assert_eq!(sink.emitted(), 2);
    }
}
