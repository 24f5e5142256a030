//! Stored video file source.
//!
//! `FileSource` decodes frames from a local video file. A finite file is the
//! one source kind with a natural end of stream: once the last frame is
//! decoded, reads return `None` and the pipeline terminates normally.
//!
//! `stub://` paths select the synthetic backend so tests can script finite
//! clips and mid-stream faults without fixture files on disk.

use anyhow::{anyhow, Result};

#[cfg(feature = "source-file-ffmpeg")]
use super::file_ffmpeg::FfmpegFileSource;
use super::synthetic::{is_stub_url, SyntheticClip};

/// Configuration for a stored video file source.
#[derive(Clone, Debug)]
pub struct FileConfig {
    /// Local file path, or a `stub://` clip for tests.
    pub path: String,
    /// Frames per second the caller intends to consume; informational for
    /// file sources, which are drained as fast as the pipeline pulls.
    pub target_fps: u32,
}

impl Default for FileConfig {
    fn default() -> Self {
        Self {
            path: String::new(),
            target_fps: 10,
        }
    }
}

/// Stored video file frame source.
#[derive(Debug)]
pub struct FileSource {
    backend: FileBackend,
}

#[derive(Debug)]
enum FileBackend {
    Synthetic(SyntheticClip),
    #[cfg(feature = "source-file-ffmpeg")]
    Ffmpeg(FfmpegFileSource),
}

/// Default clip length for `stub://` files that do not script `frames=N`.
const DEFAULT_STUB_FRAMES: u64 = 30;

impl FileSource {
    /// Open the file and prepare the decoder.
    pub fn open(config: FileConfig) -> Result<Self> {
        if !is_local_file_path(&config.path) {
            return Err(anyhow!(
                "file source only supports local paths, got '{}'",
                config.path
            ));
        }
        if is_stub_url(&config.path) {
            let clip =
                SyntheticClip::from_stub_url(&config.path, 640, 480, Some(DEFAULT_STUB_FRAMES))?;
            log::info!("FileSource: opened {} (synthetic)", clip.label());
            return Ok(Self {
                backend: FileBackend::Synthetic(clip),
            });
        }
        #[cfg(feature = "source-file-ffmpeg")]
        {
            Ok(Self {
                backend: FileBackend::Ffmpeg(FfmpegFileSource::open(config)?),
            })
        }
        #[cfg(not(feature = "source-file-ffmpeg"))]
        {
            Err(anyhow!(
                "file source requires the source-file-ffmpeg feature"
            ))
        }
    }

    /// Open the media URL a remote descriptor resolved to. Unlike `open`,
    /// non-local URLs are allowed here; the demuxer handles http(s).
    pub(crate) fn open_resolved(url: String, target_fps: u32) -> Result<Self> {
        if is_stub_url(&url) {
            let clip = SyntheticClip::from_stub_url(&url, 1280, 720, Some(DEFAULT_STUB_FRAMES))?;
            log::info!("FileSource: opened resolved {} (synthetic)", clip.label());
            return Ok(Self {
                backend: FileBackend::Synthetic(clip),
            });
        }
        #[cfg(feature = "source-file-ffmpeg")]
        {
            Ok(Self {
                backend: FileBackend::Ffmpeg(FfmpegFileSource::open(FileConfig {
                    path: url,
                    target_fps,
                })?),
            })
        }
        #[cfg(not(feature = "source-file-ffmpeg"))]
        {
            let _ = target_fps;
            Err(anyhow!(
                "opening resolved stream '{url}' requires the source-file-ffmpeg feature"
            ))
        }
    }

    /// Decode the next frame. `Ok(None)` signals end of stream.
    pub fn read(&mut self) -> Result<Option<(Vec<u8>, u32, u32)>> {
        match &mut self.backend {
            FileBackend::Synthetic(clip) => clip.next_pixels(),
            #[cfg(feature = "source-file-ffmpeg")]
            FileBackend::Ffmpeg(source) => source.read(),
        }
    }

    /// Release the decoder. Further reads report end of stream.
    pub fn close(&mut self) {
        match &mut self.backend {
            FileBackend::Synthetic(_) => {}
            #[cfg(feature = "source-file-ffmpeg")]
            FileBackend::Ffmpeg(source) => source.close(),
        }
    }

    pub fn frames_read(&self) -> u64 {
        match &self.backend {
            FileBackend::Synthetic(clip) => clip.produced(),
            #[cfg(feature = "source-file-ffmpeg")]
            FileBackend::Ffmpeg(source) => source.frames_read(),
        }
    }
}

fn is_local_file_path(path: &str) -> bool {
    if path.trim().is_empty() {
        return false;
    }
    if is_stub_url(path) {
        return true;
    }
    !path.contains("://")
}
