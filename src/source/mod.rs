//! Frame source adapters.
//!
//! Four heterogeneous source kinds (webcam device, RTSP camera, stored
//! video file, remote video URL) are normalized behind one abstraction:
//! open a `StreamHandle`, pull frames until the stream is exhausted or the
//! transport fails, close. The source kind is resolved once at open time;
//! the per-frame read path never branches on it again.
//!
//! Every backend has a `stub://` synthetic twin so the whole capture layer
//! is exercisable in tests without devices or network.

mod file;
#[cfg(feature = "source-file-ffmpeg")]
pub(crate) mod file_ffmpeg;
pub mod remote;
mod rtsp;
mod synthetic;
mod webcam;

pub use file::{FileConfig, FileSource};
pub use rtsp::{RtspConfig, RtspSource};
pub use webcam::{WebcamConfig, WebcamSource};

use crate::error::StreamError;
use crate::frame::{Frame, StreamId};

/// One of the supported input kinds, tagged at configuration time.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SourceDescriptor {
    /// Local capture device by index (`/dev/video{index}`).
    Webcam { index: u32 },
    /// RTSP network camera URL.
    Rtsp { url: String },
    /// Stored video file path.
    File { path: String },
    /// Remote video URL that must be resolved to a direct media URL first.
    Remote { url: String },
}

impl SourceDescriptor {
    /// Parse the string form used by the CLI and config file:
    /// `webcam:N` (or a bare index), `rtsp://…`, `http(s)://…` for remote
    /// videos, anything else is a file path.
    pub fn parse(raw: &str) -> Result<Self, StreamError> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(StreamError::Config("source must not be empty".into()));
        }
        if let Some(index) = raw.strip_prefix("webcam:") {
            let index = index.parse::<u32>().map_err(|_| {
                StreamError::Config(format!("webcam index must be a non-negative integer, got '{index}'"))
            })?;
            return Ok(Self::Webcam { index });
        }
        if let Ok(index) = raw.parse::<u32>() {
            return Ok(Self::Webcam { index });
        }
        if raw.starts_with("rtsp://") {
            return Ok(Self::Rtsp { url: raw.to_string() });
        }
        if raw.starts_with("http://") || raw.starts_with("https://") {
            return Ok(Self::Remote { url: raw.to_string() });
        }
        Ok(Self::File { path: raw.to_string() })
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Webcam { .. } => "webcam",
            Self::Rtsp { .. } => "rtsp",
            Self::File { .. } => "file",
            Self::Remote { .. } => "remote",
        }
    }
}

impl std::fmt::Display for SourceDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Webcam { index } => write!(f, "webcam:{index}"),
            Self::Rtsp { url } => write!(f, "{url}"),
            Self::File { path } => write!(f, "{path}"),
            Self::Remote { url } => write!(f, "{url}"),
        }
    }
}

/// Capture-layer settings shared by all source kinds, passed explicitly at
/// open time rather than read from ambient state.
#[derive(Clone, Copy, Debug)]
pub struct SourceSettings {
    pub width: u32,
    pub height: u32,
    pub target_fps: u32,
}

impl Default for SourceSettings {
    fn default() -> Self {
        Self {
            width: 640,
            height: 480,
            target_fps: 10,
        }
    }
}

/// Result of one blocking read from an open stream.
pub enum ReadOutcome {
    Frame(Frame),
    EndOfStream,
}

/// One active capture session.
///
/// Owns exactly one underlying capture resource and is exclusively owned by
/// the pipeline run driving it. `close` is idempotent and also runs on drop,
/// so the resource is released exactly once on every exit path.
pub struct StreamHandle {
    id: StreamId,
    label: String,
    backend: Option<SourceBackend>,
    frames_read: u64,
}

enum SourceBackend {
    Webcam(WebcamSource),
    Rtsp(RtspSource),
    File(FileSource),
}

impl StreamHandle {
    /// Acquire the capture resource for a descriptor.
    ///
    /// Remote descriptors resolve to a direct media URL first; resolution
    /// failure surfaces as [`StreamError::Resolution`] and no capture
    /// resource is acquired.
    pub fn open(
        descriptor: &SourceDescriptor,
        settings: &SourceSettings,
    ) -> Result<Self, StreamError> {
        let backend = match descriptor {
            SourceDescriptor::Webcam { index } => {
                let config = WebcamConfig {
                    target_fps: settings.target_fps,
                    width: settings.width,
                    height: settings.height,
                    ..WebcamConfig::for_index(*index)
                };
                SourceBackend::Webcam(
                    WebcamSource::open(config).map_err(StreamError::unavailable)?,
                )
            }
            SourceDescriptor::Rtsp { url } => SourceBackend::Rtsp(
                RtspSource::open(RtspConfig {
                    url: url.clone(),
                    target_fps: settings.target_fps,
                    width: settings.width,
                    height: settings.height,
                })
                .map_err(StreamError::unavailable)?,
            ),
            SourceDescriptor::File { path } => SourceBackend::File(
                FileSource::open(FileConfig {
                    path: path.clone(),
                    target_fps: settings.target_fps,
                })
                .map_err(StreamError::unavailable)?,
            ),
            SourceDescriptor::Remote { url } => {
                let resolved = remote::resolve(url).map_err(StreamError::resolution)?;
                Self::open_resolved(resolved, settings)?
            }
        };

        let id = StreamId::next();
        log::info!("{}: opened {} source {}", id, descriptor.kind(), descriptor);
        Ok(Self {
            id,
            label: descriptor.to_string(),
            backend: Some(backend),
            frames_read: 0,
        })
    }

    /// Open the media URL a remote descriptor resolved to.
    fn open_resolved(
        resolved: String,
        settings: &SourceSettings,
    ) -> Result<SourceBackend, StreamError> {
        if resolved.starts_with("rtsp://") {
            return Ok(SourceBackend::Rtsp(
                RtspSource::open(RtspConfig {
                    url: resolved,
                    target_fps: settings.target_fps,
                    width: settings.width,
                    height: settings.height,
                })
                .map_err(StreamError::unavailable)?,
            ));
        }
        Ok(SourceBackend::File(
            FileSource::open_resolved(resolved, settings.target_fps)
                .map_err(StreamError::unavailable)?,
        ))
    }

    /// Pull the next frame. Blocks until a frame arrives, the source is
    /// exhausted, or the transport fails. This is the run's sole suspension
    /// point on the capture side.
    pub fn read(&mut self) -> Result<ReadOutcome, StreamError> {
        let backend = self
            .backend
            .as_mut()
            .ok_or_else(|| StreamError::Read("stream handle is closed".into()))?;
        let pixels = match backend {
            SourceBackend::Webcam(source) => source.read(),
            SourceBackend::Rtsp(source) => source.read(),
            SourceBackend::File(source) => source.read(),
        };
        match pixels {
            Ok(Some((data, width, height))) => {
                self.frames_read += 1;
                let frame = Frame::new(data, width, height, self.id, self.frames_read)
                    .map_err(StreamError::read)?;
                Ok(ReadOutcome::Frame(frame))
            }
            Ok(None) => Ok(ReadOutcome::EndOfStream),
            Err(err) => Err(StreamError::read(err)),
        }
    }

    /// Release the underlying capture resource.
    ///
    /// Idempotent: returns true the one time it actually releases, false on
    /// every later call.
    pub fn close(&mut self) -> bool {
        match self.backend.take() {
            Some(mut backend) => {
                match &mut backend {
                    SourceBackend::Webcam(source) => source.close(),
                    SourceBackend::Rtsp(source) => source.close(),
                    SourceBackend::File(source) => source.close(),
                }
                log::info!("{}: closed after {} frames", self.id, self.frames_read);
                true
            }
            None => false,
        }
    }

    pub fn is_closed(&self) -> bool {
        self.backend.is_none()
    }

    pub fn id(&self) -> StreamId {
        self.id
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Frames successfully read so far.
    pub fn frames_read(&self) -> u64 {
        self.frames_read
    }
}

impl std::fmt::Debug for StreamHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamHandle")
            .field("id", &self.id)
            .field("label", &self.label)
            .field("open", &self.backend.is_some())
            .field("frames_read", &self.frames_read)
            .finish()
    }
}

impl Drop for StreamHandle {
    fn drop(&mut self) {
        self.close();
    }
}
