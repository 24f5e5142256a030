//! End-to-end pipeline runs against the synthetic source stubs.

use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Result};

use streamlens::{
    pipeline, BoundingBox, Detection, Frame, Inference, InferenceEngine, MemorySink,
    PipelineConfig, ReadOutcome, SourceDescriptor, SourceSettings, StopToken, StreamError,
    StreamHandle, StubEngine, TrackerAlgorithm, TrackingState, TARGET_HEIGHT, TARGET_WIDTH,
};

fn open(descriptor: SourceDescriptor) -> StreamHandle {
    StreamHandle::open(&descriptor, &SourceSettings::default()).expect("open source")
}

fn file_clip(frames: u32) -> StreamHandle {
    open(SourceDescriptor::File {
        path: format!("stub://clip?frames={frames}"),
    })
}

/// Engine reporting one stationary object per frame, failing on request.
/// Records the track ids assigned to its detections, which makes identity
/// persistence observable from outside the run.
struct ScriptedEngine {
    fail_at: Option<u64>,
    seen_ids: Arc<Mutex<Vec<u64>>>,
}

impl ScriptedEngine {
    fn new(fail_at: Option<u64>) -> Self {
        Self {
            fail_at,
            seen_ids: Arc::new(Mutex::new(Vec::new())),
        }
    }

    fn ids(&self) -> Vec<u64> {
        self.seen_ids.lock().unwrap().clone()
    }
}

impl InferenceEngine for ScriptedEngine {
    fn name(&self) -> &'static str {
        "scripted"
    }

    fn detect(&mut self, frame: &Frame, _confidence: f32) -> Result<Inference> {
        if self.fail_at == Some(frame.index) {
            return Err(anyhow!("scripted fault on frame {}", frame.index));
        }
        Ok(Inference {
            annotated: frame.clone(),
            detections: vec![Detection {
                class_id: 0,
                label: Some("person".into()),
                confidence: 0.9,
                bbox: BoundingBox {
                    x: 100.0,
                    y: 80.0,
                    w: 60.0,
                    h: 120.0,
                },
                track_id: None,
            }],
        })
    }

    fn track(
        &mut self,
        frame: &Frame,
        confidence: f32,
        state: &mut TrackingState,
    ) -> Result<Inference> {
        let mut inference = self.detect(frame, confidence)?;
        state.update(&mut inference.detections);
        let mut seen = self.seen_ids.lock().unwrap();
        seen.extend(inference.detections.iter().filter_map(|d| d.track_id));
        Ok(inference)
    }
}

/// Forwards to a memory sink and requests a stop after a fixed number of
/// emissions, standing in for a user interrupt on a live stream.
struct StopAfterSink {
    inner: MemorySink,
    stop_after: usize,
    stop: StopToken,
}

impl streamlens::DisplaySink for StopAfterSink {
    fn show(&mut self, frame: &Frame, caption: &str) {
        streamlens::DisplaySink::show(&mut self.inner, frame, caption);
        if self.inner.emitted() >= self.stop_after {
            self.stop.request_stop();
        }
    }
}

#[test]
fn finite_video_emits_one_annotated_frame_per_input_frame() {
    let mut handle = file_clip(10);
    let config = PipelineConfig::new(0.4, None).unwrap();
    let mut engine = StubEngine::new();
    let mut sink = MemorySink::new();

    let summary =
        pipeline::run(&mut handle, &config, &mut engine, &mut sink, &StopToken::new()).unwrap();

    assert_eq!(summary.frames_emitted, 10);
    assert_eq!(summary.frames_dropped, 0);
    assert!(!summary.stopped);
    assert!(handle.is_closed());
    assert_eq!(sink.emitted(), 10);
    for (i, caption) in sink.captions.iter().enumerate() {
        assert!(
            caption.starts_with(&format!("detected frame {}", i + 1)),
            "caption {i}: {caption}"
        );
    }
}

#[test]
fn unreachable_rtsp_fails_before_any_emission() {
    let descriptor = SourceDescriptor::Rtsp {
        url: "stub://unreachable".into(),
    };
    let err = StreamHandle::open(&descriptor, &SourceSettings::default()).unwrap_err();
    assert!(matches!(err, StreamError::SourceUnavailable(_)));
}

#[test]
fn inference_fault_drops_one_frame_and_tracking_survives() {
    let mut handle = file_clip(10);
    let config = PipelineConfig::new(0.4, Some(TrackerAlgorithm::ByteTrack)).unwrap();
    let mut engine = ScriptedEngine::new(Some(5));
    let mut sink = MemorySink::new();

    let summary =
        pipeline::run(&mut handle, &config, &mut engine, &mut sink, &StopToken::new()).unwrap();

    assert_eq!(summary.frames_emitted, 9);
    assert_eq!(summary.frames_dropped, 1);
    assert!(handle.is_closed());
    assert!(sink.captions.iter().all(|c| !c.starts_with("detected frame 5 ")));

    // One stationary object, one identity, held across the dropped frame.
    let ids = engine.ids();
    assert_eq!(ids.len(), 9);
    assert!(ids.windows(2).all(|pair| pair[0] == pair[1]));
}

#[test]
fn every_source_kind_emits_normalized_frames() {
    let descriptors = [
        SourceDescriptor::File {
            path: "stub://clip?frames=3&width=1920&height=1080".into(),
        },
        SourceDescriptor::Remote {
            url: "stub://video?frames=3".into(),
        },
    ];
    for descriptor in descriptors {
        let mut handle = open(descriptor);
        let config = PipelineConfig::new(0.4, None).unwrap();
        let mut engine = StubEngine::new();
        let mut sink = MemorySink::new();

        pipeline::run(&mut handle, &config, &mut engine, &mut sink, &StopToken::new()).unwrap();

        assert_eq!(sink.emitted(), 3);
        for frame in &sink.frames {
            assert_eq!((frame.width, frame.height), (TARGET_WIDTH, TARGET_HEIGHT));
        }
    }
}

#[test]
fn live_stream_stops_at_the_next_frame_boundary() {
    let mut handle = open(SourceDescriptor::Rtsp {
        url: "stub://front_camera".into(),
    });
    let config = PipelineConfig::new(0.4, None).unwrap();
    let mut engine = StubEngine::new();
    let stop = StopToken::new();
    let mut sink = StopAfterSink {
        inner: MemorySink::new(),
        stop_after: 3,
        stop: stop.clone(),
    };

    let summary = pipeline::run(&mut handle, &config, &mut engine, &mut sink, &stop).unwrap();

    assert!(summary.stopped);
    assert_eq!(summary.frames_emitted, 3);
    assert!(handle.is_closed());
}

#[test]
fn sequential_runs_never_reuse_track_ids() {
    let config = PipelineConfig::new(0.4, Some(TrackerAlgorithm::ByteTrack)).unwrap();

    let mut first_engine = ScriptedEngine::new(None);
    let mut handle = file_clip(5);
    pipeline::run(
        &mut handle,
        &config,
        &mut first_engine,
        &mut MemorySink::new(),
        &StopToken::new(),
    )
    .unwrap();

    let mut second_engine = ScriptedEngine::new(None);
    let mut handle = file_clip(5);
    pipeline::run(
        &mut handle,
        &config,
        &mut second_engine,
        &mut MemorySink::new(),
        &StopToken::new(),
    )
    .unwrap();

    let first_ids = first_engine.ids();
    let second_ids = second_engine.ids();
    assert!(!first_ids.is_empty() && !second_ids.is_empty());
    assert!(first_ids.iter().all(|id| !second_ids.contains(id)));
}

#[test]
fn zero_detections_still_emit_the_frame() {
    let mut handle = file_clip(4);
    // Synthetic scores top out below 1.0, so this threshold excludes all.
    let config = PipelineConfig::new(1.0, None).unwrap();
    let mut engine = StubEngine::new();
    let mut sink = MemorySink::new();

    let summary =
        pipeline::run(&mut handle, &config, &mut engine, &mut sink, &StopToken::new()).unwrap();

    assert_eq!(summary.frames_emitted, 4);
    assert!(sink.captions.iter().all(|c| c.ends_with("(0 objects)")));
}

#[test]
fn read_fault_closes_the_stream_and_surfaces_a_read_error() {
    let mut handle = open(SourceDescriptor::File {
        path: "stub://clip?frames=8&fail_at=2".into(),
    });
    let config = PipelineConfig::new(0.4, Some(TrackerAlgorithm::BotSort)).unwrap();
    let mut engine = StubEngine::new();
    let mut sink = MemorySink::new();

    let err =
        pipeline::run(&mut handle, &config, &mut engine, &mut sink, &StopToken::new()).unwrap_err();

    assert!(matches!(err, StreamError::Read(_)));
    assert!(handle.is_closed());
    assert_eq!(sink.emitted(), 1);
}

#[test]
fn direct_reads_are_tagged_and_exhaust_cleanly() {
    let mut handle = file_clip(2);
    let ReadOutcome::Frame(first) = handle.read().unwrap() else {
        panic!("expected frame");
    };
    assert_eq!(first.index, 1);
    assert_eq!(first.stream, handle.id());
    let ReadOutcome::Frame(second) = handle.read().unwrap() else {
        panic!("expected frame");
    };
    assert_eq!(second.index, 2);
    assert!(matches!(handle.read().unwrap(), ReadOutcome::EndOfStream));
}
