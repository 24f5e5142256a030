//! FFmpeg-backed decoder for stored video files and resolved remote URLs.
//!
//! Frames are decoded in-memory and rescaled to tightly packed RGB24. End of
//! file drains the decoder before reporting end of stream, so trailing frames
//! buffered inside the codec are not lost.

use anyhow::{anyhow, Context, Result};
use ffmpeg_next as ffmpeg;

use super::file::FileConfig;

pub(crate) struct FfmpegFileSource {
    path: String,
    state: Option<DecodeState>,
    draining: bool,
    frame_count: u64,
}

struct DecodeState {
    input: ffmpeg::format::context::Input,
    stream_index: usize,
    decoder: ffmpeg::codec::decoder::Video,
    scaler: ffmpeg::software::scaling::Context,
}

impl FfmpegFileSource {
    pub(crate) fn open(config: FileConfig) -> Result<Self> {
        ffmpeg::init().context("initialize ffmpeg")?;
        let input = ffmpeg::format::input(&config.path)
            .with_context(|| format!("open '{}' with ffmpeg", config.path))?;
        let input_stream = input
            .streams()
            .best(ffmpeg::media::Type::Video)
            .ok_or_else(|| anyhow!("'{}' has no video track", config.path))?;
        let stream_index = input_stream.index();
        let context = ffmpeg::codec::context::Context::from_parameters(input_stream.parameters())
            .context("load video decoder parameters")?;
        let decoder = context
            .decoder()
            .video()
            .context("open ffmpeg video decoder")?;

        let scaler = ffmpeg::software::scaling::context::Context::get(
            decoder.format(),
            decoder.width(),
            decoder.height(),
            ffmpeg::util::format::pixel::Pixel::RGB24,
            decoder.width(),
            decoder.height(),
            ffmpeg::software::scaling::flag::Flags::BILINEAR,
        )
        .context("create ffmpeg scaler")?;

        log::info!("FileSource: opened {} (ffmpeg)", config.path);
        Ok(Self {
            path: config.path,
            state: Some(DecodeState {
                input,
                stream_index,
                decoder,
                scaler,
            }),
            draining: false,
            frame_count: 0,
        })
    }

    pub(crate) fn read(&mut self) -> Result<Option<(Vec<u8>, u32, u32)>> {
        let mut decoded = ffmpeg::frame::Video::empty();
        loop {
            let Some(state) = self.state.as_mut() else {
                return Ok(None);
            };
            if state.decoder.receive_frame(&mut decoded).is_ok() {
                let mut rgb = ffmpeg::frame::Video::empty();
                state
                    .scaler
                    .run(&decoded, &mut rgb)
                    .context("scale frame to RGB")?;
                self.frame_count += 1;
                return frame_to_pixels(&rgb).map(Some);
            }
            if self.draining {
                self.close();
                return Ok(None);
            }

            let mut sent = false;
            for (stream, packet) in state.input.packets() {
                if stream.index() != state.stream_index {
                    continue;
                }
                state
                    .decoder
                    .send_packet(&packet)
                    .context("send packet to ffmpeg decoder")?;
                sent = true;
                break;
            }
            if !sent {
                // Demuxer exhausted. Flush the decoder for buffered frames.
                state
                    .decoder
                    .send_eof()
                    .context("flush ffmpeg decoder at end of file")?;
                self.draining = true;
            }
        }
    }

    pub(crate) fn close(&mut self) {
        if self.state.take().is_some() {
            log::info!(
                "FileSource: closed {} after {} frames",
                self.path,
                self.frame_count
            );
        }
    }

    pub(crate) fn frames_read(&self) -> u64 {
        self.frame_count
    }
}

fn frame_to_pixels(frame: &ffmpeg::frame::Video) -> Result<(Vec<u8>, u32, u32)> {
    let width = frame.width();
    let height = frame.height();
    let row_bytes = (width as usize) * 3;
    let stride = frame.stride(0);
    let data = frame.data(0);

    if stride == row_bytes {
        return Ok((data.to_vec(), width, height));
    }

    let mut pixels = Vec::with_capacity(row_bytes * height as usize);
    for row in 0..height as usize {
        let start = row * stride;
        let end = start + row_bytes;
        pixels.extend_from_slice(
            data.get(start..end)
                .context("ffmpeg frame row is out of bounds")?,
        );
    }

    Ok((pixels, width, height))
}
