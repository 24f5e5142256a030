//! Display sinks.
//!
//! A sink receives one annotated frame at a time and owns presentation from
//! there. Emission is fire-and-forget: the pipeline never waits on a sink
//! and never hears back from it, so sink-internal failures are logged and
//! swallowed rather than surfaced to the run.

use std::path::PathBuf;

use crate::frame::Frame;

/// Presentation boundary for annotated frames.
pub trait DisplaySink {
    /// Accept a frame for display. Must not block on presentation.
    fn show(&mut self, frame: &Frame, caption: &str);
}

/// Discards everything. Useful for benchmarks and soak runs.
pub struct NullSink;

impl DisplaySink for NullSink {
    fn show(&mut self, _frame: &Frame, _caption: &str) {}
}

/// Collects emitted frames in memory for assertions.
#[derive(Default)]
pub struct MemorySink {
    pub frames: Vec<Frame>,
    pub captions: Vec<String>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn emitted(&self) -> usize {
        self.frames.len()
    }
}

impl DisplaySink for MemorySink {
    fn show(&mut self, frame: &Frame, caption: &str) {
        self.frames.push(frame.clone());
        self.captions.push(caption.to_string());
    }
}

/// Writes each annotated frame as a numbered PNG into a directory.
pub struct PngDirSink {
    dir: PathBuf,
    written: u64,
}

impl PngDirSink {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir, written: 0 }
    }

    pub fn written(&self) -> u64 {
        self.written
    }
}

impl DisplaySink for PngDirSink {
    fn show(&mut self, frame: &Frame, _caption: &str) {
        self.written += 1;
        let path = self.dir.join(format!("frame_{:06}.png", self.written));
        let image = match image::RgbImage::from_raw(
            frame.width,
            frame.height,
            frame.pixels().to_vec(),
        ) {
            Some(image) => image,
            None => {
                log::warn!("PngDirSink: frame {} has a malformed buffer", frame.index);
                return;
            }
        };
        if let Err(err) = image.save(&path) {
            log::warn!("PngDirSink: failed to write {}: {}", path.display(), err);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::StreamId;

    #[test]
    fn memory_sink_records_frames_and_captions() {
        let frame = Frame::new(vec![0u8; 12], 2, 2, StreamId::next(), 1).unwrap();
        let mut sink = MemorySink::new();
        sink.show(&frame, "frame 1");
        sink.show(&frame, "frame 2");
        assert_eq!(sink.emitted(), 2);
        assert_eq!(sink.captions, vec!["frame 1", "frame 2"]);
    }

    #[test]
    fn png_sink_writes_numbered_files() {
        let dir = tempfile::tempdir().unwrap();
        let frame = Frame::new(vec![128u8; 48], 4, 4, StreamId::next(), 1).unwrap();
        let mut sink = PngDirSink::new(dir.path().to_path_buf());
        sink.show(&frame, "frame 1");
        assert_eq!(sink.written(), 1);
        assert!(dir.path().join("frame_000001.png").exists());
    }
}
