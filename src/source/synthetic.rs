//! Synthetic frame generator backing every `stub://` source.
//!
//! Stub URLs keep the capture layer testable without cameras, files, or a
//! network. The query string scripts the clip:
//!
//! - `frames=N`   finite clip, end-of-stream after N frames
//! - `fail_at=K`  transport fault on read K (mid-stream failure injection)
//! - `width=W`, `height=H`  capture resolution
//!
//! `stub://unreachable` refuses to open, which is how tests exercise the
//! source-unavailable path without a dead camera on the network.

use anyhow::{anyhow, Context, Result};
use url::Url;

pub(crate) const STUB_SCHEME: &str = "stub";

/// Host name that makes `open` fail, simulating an unreachable source.
pub(crate) const UNREACHABLE_HOST: &str = "unreachable";

#[derive(Debug)]
pub(crate) struct SyntheticClip {
    label: String,
    width: u32,
    height: u32,
    /// `None` means a live, never-ending source (webcam/RTSP style).
    frames_total: Option<u64>,
    fail_at: Option<u64>,
    produced: u64,
    scene_state: u8,
}

pub(crate) fn is_stub_url(raw: &str) -> bool {
    raw.starts_with("stub://")
}

impl SyntheticClip {
    /// Parse a `stub://` URL. `default_frames` distinguishes finite clips
    /// (stored files) from live sources.
    pub(crate) fn from_stub_url(
        raw: &str,
        default_width: u32,
        default_height: u32,
        default_frames: Option<u64>,
    ) -> Result<Self> {
        let url = Url::parse(raw).with_context(|| format!("parse stub url '{raw}'"))?;
        if url.scheme() != STUB_SCHEME {
            return Err(anyhow!("expected stub:// url, got '{raw}'"));
        }
        let host = url.host_str().unwrap_or_default().to_string();
        if host == UNREACHABLE_HOST {
            return Err(anyhow!("synthetic source '{raw}' is unreachable"));
        }

        let mut clip = Self {
            label: raw.to_string(),
            width: default_width,
            height: default_height,
            frames_total: default_frames,
            fail_at: None,
            produced: 0,
            scene_state: 0,
        };
        for (key, value) in url.query_pairs() {
            match key.as_ref() {
                "frames" => clip.frames_total = Some(parse_u64(&value, "frames")?),
                "fail_at" => clip.fail_at = Some(parse_u64(&value, "fail_at")?),
                "width" => clip.width = parse_u64(&value, "width")? as u32,
                "height" => clip.height = parse_u64(&value, "height")? as u32,
                other => return Err(anyhow!("unknown stub parameter '{other}'")),
            }
        }
        if clip.width == 0 || clip.height == 0 {
            return Err(anyhow!("stub dimensions must be non-zero"));
        }
        Ok(clip)
    }

    /// Produce the next frame's pixels. `Ok(None)` is end of stream.
    pub(crate) fn next_pixels(&mut self) -> Result<Option<(Vec<u8>, u32, u32)>> {
        let next_index = self.produced + 1;
        if let Some(fail_at) = self.fail_at {
            if next_index == fail_at {
                return Err(anyhow!(
                    "synthetic transport fault on {} at frame {}",
                    self.label,
                    next_index
                ));
            }
        }
        if let Some(total) = self.frames_total {
            if self.produced >= total {
                return Ok(None);
            }
        }
        self.produced = next_index;
        Ok(Some((
            self.generate_pixels(),
            self.width,
            self.height,
        )))
    }

    pub(crate) fn produced(&self) -> u64 {
        self.produced
    }

    pub(crate) fn label(&self) -> &str {
        &self.label
    }

    /// Deterministic pattern mixing frame count, scene state, and position,
    /// with an occasional scene change to keep consecutive frames distinct.
    fn generate_pixels(&mut self) -> Vec<u8> {
        if self.produced % 50 == 0 {
            self.scene_state = self.scene_state.wrapping_add(1);
        }
        let pixel_count = (self.width * self.height * 3) as usize;
        let mut pixels = vec![0u8; pixel_count];
        for (i, pixel) in pixels.iter_mut().enumerate() {
            *pixel = ((i as u64 + self.produced + self.scene_state as u64) % 256) as u8;
        }
        pixels
    }
}

fn parse_u64(value: &str, key: &str) -> Result<u64> {
    value
        .parse::<u64>()
        .with_context(|| format!("stub parameter '{key}' must be an integer, got '{value}'"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finite_clip_ends_after_configured_frames() -> Result<()> {
        let mut clip = SyntheticClip::from_stub_url("stub://clip?frames=3", 64, 48, None)?;
        for _ in 0..3 {
            assert!(clip.next_pixels()?.is_some());
        }
        assert!(clip.next_pixels()?.is_none());
        assert_eq!(clip.produced(), 3);
        Ok(())
    }

    #[test]
    fn fail_at_injects_transport_fault() -> Result<()> {
        let mut clip = SyntheticClip::from_stub_url("stub://clip?frames=5&fail_at=2", 64, 48, None)?;
        assert!(clip.next_pixels()?.is_some());
        let err = clip.next_pixels().unwrap_err();
        assert!(err.to_string().contains("frame 2"));
        Ok(())
    }

    #[test]
    fn live_clip_without_frames_param_never_ends() -> Result<()> {
        let mut clip = SyntheticClip::from_stub_url("stub://camera", 32, 32, None)?;
        for _ in 0..120 {
            assert!(clip.next_pixels()?.is_some());
        }
        Ok(())
    }

    #[test]
    fn unreachable_host_refuses_to_open() {
        let err = SyntheticClip::from_stub_url("stub://unreachable", 64, 48, None).unwrap_err();
        assert!(err.to_string().contains("unreachable"));
    }

    #[test]
    fn dimension_overrides_apply() -> Result<()> {
        let mut clip =
            SyntheticClip::from_stub_url("stub://clip?width=1280&height=720&frames=1", 64, 48, None)?;
        let (pixels, w, h) = clip.next_pixels()?.expect("frame");
        assert_eq!((w, h), (1280, 720));
        assert_eq!(pixels.len(), (1280 * 720 * 3) as usize);
        Ok(())
    }

    #[test]
    fn unknown_parameter_is_rejected() {
        let err = SyntheticClip::from_stub_url("stub://clip?loop=1", 64, 48, None).unwrap_err();
        assert!(err.to_string().contains("loop"));
    }
}
