use thiserror::Error;

/// Errors surfaced by the frame pipeline and its source adapters.
///
/// Open and read failures are fatal to a run. Inference failures are not:
/// the pipeline drops the offending frame, logs the cause, and continues,
/// so `Inference` only escapes through code paths that have no next frame
/// to continue with.
#[derive(Debug, Error)]
pub enum StreamError {
    /// The source could not be opened: bad device index, unreachable
    /// network stream, missing file, or a remote URL that resolved but
    /// could not be played.
    #[error("source unavailable: {0}")]
    SourceUnavailable(String),

    /// A remote video URL could not be resolved to a direct stream of the
    /// required container and resolution.
    #[error("remote stream resolution failed: {0}")]
    Resolution(String),

    /// The transport failed mid-stream. The handle is closed; there is no
    /// automatic reconnect.
    #[error("stream read failed: {0}")]
    Read(String),

    /// The inference engine failed on a single frame.
    #[error("inference failed: {0}")]
    Inference(String),

    /// Pipeline configuration rejected before the run started.
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl StreamError {
    /// Wrap a backend error, keeping the full causal chain in the message.
    pub(crate) fn unavailable(err: anyhow::Error) -> Self {
        Self::SourceUnavailable(format!("{err:#}"))
    }

    pub(crate) fn resolution(err: anyhow::Error) -> Self {
        Self::Resolution(format!("{err:#}"))
    }

    pub(crate) fn read(err: anyhow::Error) -> Self {
        Self::Read(format!("{err:#}"))
    }

    pub(crate) fn inference(err: &anyhow::Error) -> Self {
        Self::Inference(format!("{err:#}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::{anyhow, Context};

    #[test]
    fn wrapped_errors_keep_causal_chain() {
        let root: anyhow::Result<()> = Err(anyhow!("connection refused"));
        let err = root.context("open rtsp://camera-1").unwrap_err();
        let wrapped = StreamError::unavailable(err);
        let message = wrapped.to_string();
        assert!(message.contains("open rtsp://camera-1"));
        assert!(message.contains("connection refused"));
    }
}
