//! RTSP network camera source.
//!
//! `RtspSource` pulls frames from an IP camera. RTSP is a live transport:
//! the appsink keeps only the most recent buffer, so frames arriving while
//! the pipeline is busy are dropped by the capture layer rather than queued.
//!
//! `stub://` URLs select the synthetic backend. `stub://unreachable` refuses
//! to open, which is how tests reach the source-unavailable path.

use anyhow::Result;
#[cfg(feature = "source-rtsp-gstreamer")]
use anyhow::Context;
#[cfg(feature = "source-rtsp-gstreamer")]
use std::time::Duration;

use super::synthetic::{is_stub_url, SyntheticClip};

/// Configuration for an RTSP source.
#[derive(Clone, Debug)]
pub struct RtspConfig {
    /// RTSP URL (e.g. "rtsp://192.168.1.100:554/stream").
    pub url: String,
    /// Expected frame rate; used to size the read timeout.
    pub target_fps: u32,
    /// Capture width for synthetic frames.
    pub width: u32,
    /// Capture height for synthetic frames.
    pub height: u32,
}

impl Default for RtspConfig {
    fn default() -> Self {
        Self {
            url: "rtsp://localhost:554/stream".to_string(),
            target_fps: 10,
            width: 640,
            height: 480,
        }
    }
}

/// RTSP frame source.
#[derive(Debug)]
pub struct RtspSource {
    backend: RtspBackend,
}

#[derive(Debug)]
enum RtspBackend {
    Synthetic(SyntheticClip),
    #[cfg(feature = "source-rtsp-gstreamer")]
    Gstreamer(GstreamerRtspSource),
}

impl RtspSource {
    /// Connect to the stream.
    pub fn open(config: RtspConfig) -> Result<Self> {
        if is_stub_url(&config.url) {
            let clip = SyntheticClip::from_stub_url(&config.url, config.width, config.height, None)?;
            log::info!("RtspSource: connected to {} (synthetic)", clip.label());
            return Ok(Self {
                backend: RtspBackend::Synthetic(clip),
            });
        }
        #[cfg(feature = "source-rtsp-gstreamer")]
        {
            Ok(Self {
                backend: RtspBackend::Gstreamer(GstreamerRtspSource::open(config)?),
            })
        }
        #[cfg(not(feature = "source-rtsp-gstreamer"))]
        {
            anyhow::bail!("RTSP source requires the source-rtsp-gstreamer feature")
        }
    }

    /// Pull the next frame. `Ok(None)` signals end of stream.
    pub fn read(&mut self) -> Result<Option<(Vec<u8>, u32, u32)>> {
        match &mut self.backend {
            RtspBackend::Synthetic(clip) => clip.next_pixels(),
            #[cfg(feature = "source-rtsp-gstreamer")]
            RtspBackend::Gstreamer(source) => source.read(),
        }
    }

    /// Tear the transport down. Further reads report end of stream.
    pub fn close(&mut self) {
        match &mut self.backend {
            RtspBackend::Synthetic(_) => {}
            #[cfg(feature = "source-rtsp-gstreamer")]
            RtspBackend::Gstreamer(source) => source.close(),
        }
    }

    pub fn frames_read(&self) -> u64 {
        match &self.backend {
            RtspBackend::Synthetic(clip) => clip.produced(),
            #[cfg(feature = "source-rtsp-gstreamer")]
            RtspBackend::Gstreamer(source) => source.frames_read(),
        }
    }
}

// ----------------------------------------------------------------------------
// Production RTSP source using GStreamer
// ----------------------------------------------------------------------------

#[cfg(feature = "source-rtsp-gstreamer")]
struct GstreamerRtspSource {
    url: String,
    target_fps: u32,
    pipeline: Option<gstreamer::Pipeline>,
    appsink: gstreamer_app::AppSink,
    frame_count: u64,
}

#[cfg(feature = "source-rtsp-gstreamer")]
impl GstreamerRtspSource {
    /// Build and start `rtspsrc ! decodebin ! videoconvert ! appsink`.
    ///
    /// The appsink is capped at one buffer with drop enabled: a live camera
    /// is "pull latest", not "deliver every frame".
    fn open(config: RtspConfig) -> Result<Self> {
        gstreamer::init().context("initialize gstreamer")?;

        let pipeline_description = format!(
            "rtspsrc location={} latency=0 ! decodebin ! videoconvert ! video/x-raw,format=RGB ! \
             appsink name=appsink sync=false max-buffers=1 drop=true",
            config.url
        );
        let pipeline = gstreamer::parse_launch(&pipeline_description)
            .context("build RTSP pipeline")?
            .downcast::<gstreamer::Pipeline>()
            .map_err(|_| anyhow::anyhow!("RTSP pipeline is not a Pipeline"))?;

        let appsink = pipeline
            .by_name("appsink")
            .context("appsink element missing from pipeline")?
            .downcast::<gstreamer_app::AppSink>()
            .map_err(|_| anyhow::anyhow!("appsink element has unexpected type"))?;

        let caps = gstreamer::Caps::builder("video/x-raw")
            .field("format", "RGB")
            .build();
        appsink.set_caps(Some(&caps));
        appsink.set_max_buffers(1);
        appsink.set_drop(true);
        appsink.set_sync(false);

        pipeline
            .set_state(gstreamer::State::Playing)
            .with_context(|| format!("connect to {}", config.url))?;
        log::info!("RtspSource: connected to {}", config.url);

        Ok(Self {
            url: config.url,
            target_fps: config.target_fps,
            pipeline: Some(pipeline),
            appsink,
            frame_count: 0,
        })
    }

    fn read(&mut self) -> Result<Option<(Vec<u8>, u32, u32)>> {
        let Some(pipeline) = self.pipeline.as_ref() else {
            return Ok(None);
        };
        if let Some(error) = poll_bus(pipeline) {
            return Err(anyhow::anyhow!("{error}"));
        }
        if self.appsink.is_eos() {
            return Ok(None);
        }

        let sample = self
            .appsink
            .try_pull_sample(self.frame_timeout())
            .context("pull RTSP sample")?;
        let Some(sample) = sample else {
            if self.appsink.is_eos() {
                return Ok(None);
            }
            return Err(anyhow::anyhow!("RTSP stream {} stalled", self.url));
        };

        let pixels = sample_to_pixels(&sample)?;
        self.frame_count += 1;
        Ok(Some(pixels))
    }

    fn close(&mut self) {
        if let Some(pipeline) = self.pipeline.take() {
            if let Err(err) = pipeline.set_state(gstreamer::State::Null) {
                log::warn!("RtspSource: teardown of {} failed: {}", self.url, err);
            }
            log::info!(
                "RtspSource: closed {} after {} frames",
                self.url,
                self.frame_count
            );
        }
    }

    fn frames_read(&self) -> u64 {
        self.frame_count
    }

    fn frame_timeout(&self) -> Duration {
        let base_ms = if self.target_fps == 0 {
            500
        } else {
            (1000 / self.target_fps).saturating_mul(4)
        };
        Duration::from_millis(base_ms.max(500) as u64)
    }
}

#[cfg(feature = "source-rtsp-gstreamer")]
impl Drop for GstreamerRtspSource {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(feature = "source-rtsp-gstreamer")]
fn poll_bus(pipeline: &gstreamer::Pipeline) -> Option<String> {
    let bus = pipeline.bus()?;
    while let Some(message) = bus.timed_pop(Duration::from_millis(0)) {
        use gstreamer::MessageView;
        if let MessageView::Error(err) = message.view() {
            return Some(format!(
                "gstreamer error from {:?}: {}",
                err.src().map(|s| s.path_string()),
                err.error()
            ));
        }
    }
    None
}

#[cfg(feature = "source-rtsp-gstreamer")]
fn sample_to_pixels(sample: &gstreamer::Sample) -> Result<(Vec<u8>, u32, u32)> {
    let buffer = sample.buffer().context("RTSP sample missing buffer")?;
    let caps = sample.caps().context("RTSP sample missing caps")?;
    let info =
        gstreamer_video::VideoInfo::from_caps(caps).context("parse RTSP caps as video info")?;

    let width = info.width();
    let height = info.height();
    let row_bytes = (width as usize) * 3;
    let stride = info.stride()[0] as usize;

    let map = buffer.map_readable().context("map RTSP buffer")?;
    let data = map.as_slice();

    if stride == row_bytes {
        return Ok((data.to_vec(), width, height));
    }

    let mut pixels = Vec::with_capacity(row_bytes * height as usize);
    for row in 0..height as usize {
        let start = row * stride;
        let end = start + row_bytes;
        pixels.extend_from_slice(
            data.get(start..end)
                .context("RTSP buffer row is out of bounds")?,
        );
    }

    Ok((pixels, width, height))
}
