//! Decoded video frames.
//!
//! A `Frame` is an immutable RGB24 pixel buffer tagged with the stream it
//! came from and its position in that stream. Sources produce frames, the
//! pipeline normalizes them to a fixed inference resolution, and the
//! inference engine consumes each frame exactly once.

use anyhow::{anyhow, Result};
use image::{imageops, RgbImage};
use std::sync::atomic::{AtomicU64, Ordering};

/// Width every frame is normalized to before inference.
pub const TARGET_WIDTH: u32 = 720;

/// Height derived from `TARGET_WIDTH` at a 16:9 aspect ratio: round(720 * 9/16).
pub const TARGET_HEIGHT: u32 = 405;

static NEXT_STREAM_ID: AtomicU64 = AtomicU64::new(1);

/// Identifier of one open capture session. Unique for the process lifetime.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct StreamId(u64);

impl StreamId {
    pub(crate) fn next() -> Self {
        Self(NEXT_STREAM_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn value(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for StreamId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "stream-{}", self.0)
    }
}

/// One decoded RGB24 image from a capture session.
#[derive(Clone, Debug)]
pub struct Frame {
    /// Tightly packed RGB24 pixels, row-major.
    data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    /// Stream this frame was read from.
    pub stream: StreamId,
    /// 1-based position within the stream.
    pub index: u64,
}

impl Frame {
    /// Build a frame from a tightly packed RGB24 buffer.
    pub fn new(
        data: Vec<u8>,
        width: u32,
        height: u32,
        stream: StreamId,
        index: u64,
    ) -> Result<Self> {
        let expected = width
            .checked_mul(height)
            .and_then(|v| v.checked_mul(3))
            .ok_or_else(|| anyhow!("frame dimensions overflow"))? as usize;
        if data.len() != expected {
            return Err(anyhow!(
                "RGB frame length mismatch: expected {}, got {}",
                expected,
                data.len()
            ));
        }
        Ok(Self {
            data,
            width,
            height,
            stream,
            index,
        })
    }

    pub fn pixels(&self) -> &[u8] {
        &self.data
    }

    pub(crate) fn pixels_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// Resample to the fixed inference resolution.
    ///
    /// Every source kind goes through this before the inference call, so the
    /// engine always sees `TARGET_WIDTH` x `TARGET_HEIGHT` regardless of the
    /// capture resolution. Frames already at the target size pass through.
    pub fn normalized(&self) -> Frame {
        self.resized(TARGET_WIDTH, TARGET_HEIGHT)
    }

    /// Resample to an arbitrary resolution with a triangle filter.
    pub fn resized(&self, width: u32, height: u32) -> Frame {
        if self.width == width && self.height == height {
            return self.clone();
        }
        // Buffer length was validated at construction, so this cannot fail.
        let img = RgbImage::from_raw(self.width, self.height, self.data.clone())
            .unwrap_or_else(|| RgbImage::new(self.width, self.height));
        let resized = imageops::resize(&img, width, height, imageops::FilterType::Triangle);
        Frame {
            data: resized.into_raw(),
            width,
            height,
            stream: self.stream,
            index: self.index,
        }
    }
}
