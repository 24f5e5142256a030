//! Local webcam source.
//!
//! `WebcamSource` captures from a V4L2 device node selected by index
//! (`/dev/video{N}`). Like RTSP, a webcam is a live source: the driver hands
//! out the latest frame and anything the pipeline was too slow to pull is
//! gone, not queued.
//!
//! `stub://` device strings select the synthetic backend for tests.

use anyhow::Result;
#[cfg(feature = "source-webcam-v4l2")]
use anyhow::Context;
#[cfg(feature = "source-webcam-v4l2")]
use ouroboros::self_referencing;

use super::synthetic::{is_stub_url, SyntheticClip};

/// Configuration for a webcam source.
#[derive(Clone, Debug)]
pub struct WebcamConfig {
    /// Device path (e.g. "/dev/video0"), or a `stub://` device for tests.
    pub device: String,
    /// Requested frame rate.
    pub target_fps: u32,
    /// Preferred capture width.
    pub width: u32,
    /// Preferred capture height.
    pub height: u32,
}

impl WebcamConfig {
    /// Standard configuration for a device index, per the platform
    /// convention that webcam N lives at /dev/videoN.
    pub fn for_index(index: u32) -> Self {
        Self {
            device: format!("/dev/video{index}"),
            ..Self::default()
        }
    }
}

impl Default for WebcamConfig {
    fn default() -> Self {
        Self {
            device: "/dev/video0".to_string(),
            target_fps: 10,
            width: 640,
            height: 480,
        }
    }
}

/// Webcam frame source.
#[derive(Debug)]
pub struct WebcamSource {
    backend: WebcamBackend,
}

#[derive(Debug)]
enum WebcamBackend {
    Synthetic(SyntheticClip),
    #[cfg(feature = "source-webcam-v4l2")]
    Device(DeviceWebcamSource),
}

impl WebcamSource {
    /// Open the capture device.
    pub fn open(config: WebcamConfig) -> Result<Self> {
        if is_stub_url(&config.device) {
            let clip =
                SyntheticClip::from_stub_url(&config.device, config.width, config.height, None)?;
            log::info!("WebcamSource: opened {} (synthetic)", clip.label());
            return Ok(Self {
                backend: WebcamBackend::Synthetic(clip),
            });
        }
        #[cfg(feature = "source-webcam-v4l2")]
        {
            Ok(Self {
                backend: WebcamBackend::Device(DeviceWebcamSource::open(config)?),
            })
        }
        #[cfg(not(feature = "source-webcam-v4l2"))]
        {
            anyhow::bail!("webcam source requires the source-webcam-v4l2 feature")
        }
    }

    /// Capture the next frame. Live devices never report end of stream on
    /// their own; `Ok(None)` only follows an explicit `close`.
    pub fn read(&mut self) -> Result<Option<(Vec<u8>, u32, u32)>> {
        match &mut self.backend {
            WebcamBackend::Synthetic(clip) => clip.next_pixels(),
            #[cfg(feature = "source-webcam-v4l2")]
            WebcamBackend::Device(source) => source.read(),
        }
    }

    /// Release the device node.
    pub fn close(&mut self) {
        match &mut self.backend {
            WebcamBackend::Synthetic(_) => {}
            #[cfg(feature = "source-webcam-v4l2")]
            WebcamBackend::Device(source) => source.close(),
        }
    }

    pub fn frames_read(&self) -> u64 {
        match &self.backend {
            WebcamBackend::Synthetic(clip) => clip.produced(),
            #[cfg(feature = "source-webcam-v4l2")]
            WebcamBackend::Device(source) => source.frames_read(),
        }
    }
}

// ----------------------------------------------------------------------------
// Production webcam source using V4L2
// ----------------------------------------------------------------------------

#[cfg(feature = "source-webcam-v4l2")]
struct DeviceWebcamSource {
    device_path: String,
    state: Option<DeviceState>,
    active_width: u32,
    active_height: u32,
    frame_count: u64,
}

#[cfg(feature = "source-webcam-v4l2")]
#[self_referencing]
struct DeviceState {
    device: v4l::Device,
    #[borrows(mut device)]
    #[covariant]
    stream: v4l::prelude::MmapStream<'this, v4l::Device>,
}

#[cfg(feature = "source-webcam-v4l2")]
impl DeviceWebcamSource {
    fn open(config: WebcamConfig) -> Result<Self> {
        use v4l::buffer::Type;
        use v4l::video::Capture;

        let mut device = v4l::Device::with_path(&config.device)
            .with_context(|| format!("open v4l2 device {}", config.device))?;
        let mut format = device.format().context("read v4l2 format")?;
        format.width = config.width;
        format.height = config.height;
        format.fourcc = v4l::FourCC::new(b"RGB3");

        let format = match device.set_format(&format) {
            Ok(format) => format,
            Err(err) => {
                log::warn!(
                    "WebcamSource: failed to set format on {}: {}",
                    config.device,
                    err
                );
                device
                    .format()
                    .context("read v4l2 format after set failure")?
            }
        };

        if config.target_fps > 0 {
            let params = v4l::video::capture::Parameters::with_fps(config.target_fps);
            if let Err(err) = device.set_params(&params) {
                log::warn!(
                    "WebcamSource: failed to set fps on {}: {}",
                    config.device,
                    err
                );
            }
        }

        let state = DeviceStateBuilder {
            device,
            stream_builder: |device| {
                v4l::prelude::MmapStream::with_buffers(device, Type::VideoCapture, 4)
                    .map_err(|err| anyhow::Error::new(err).context("create v4l2 buffer stream"))
            },
        }
        .try_build()?;

        log::info!(
            "WebcamSource: opened {} ({}x{})",
            config.device,
            format.width,
            format.height
        );
        Ok(Self {
            device_path: config.device,
            state: Some(state),
            active_width: format.width,
            active_height: format.height,
            frame_count: 0,
        })
    }

    fn read(&mut self) -> Result<Option<(Vec<u8>, u32, u32)>> {
        use v4l::io::traits::CaptureStream;

        let Some(state) = self.state.as_mut() else {
            return Ok(None);
        };
        let pixels = state.with_mut(|fields| {
            fields
                .stream
                .next()
                .map(|(buf, _meta)| buf.to_vec())
                .map_err(|err| anyhow::Error::new(err).context("capture v4l2 frame"))
        })?;

        self.frame_count += 1;
        Ok(Some((pixels, self.active_width, self.active_height)))
    }

    fn close(&mut self) {
        if self.state.take().is_some() {
            log::info!(
                "WebcamSource: closed {} after {} frames",
                self.device_path,
                self.frame_count
            );
        }
    }

    fn frames_read(&self) -> u64 {
        self.frame_count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn index_maps_to_device_node() {
        assert_eq!(WebcamConfig::for_index(2).device, "/dev/video2");
    }

    #[test]
    fn synthetic_webcam_produces_frames() -> Result<()> {
        let mut source = WebcamSource::open(WebcamConfig {
            device: "stub://cam".into(),
            ..WebcamConfig::default()
        })?;
        for expected in 1..=3u64 {
            assert!(source.read()?.is_some());
            assert_eq!(source.frames_read(), expected);
        }
        Ok(())
    }
}
