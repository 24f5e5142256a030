//! Application configuration.
//!
//! Settings come from three layers, later layers winning: built-in
//! defaults, a TOML file named by `STREAMLENS_CONFIG`, and `STREAMLENS_*`
//! environment variables. Validation runs once after all layers are
//! applied.

use std::path::{Path, PathBuf};

use anyhow::{anyhow, Result};
use serde::Deserialize;

use crate::pipeline::PipelineConfig;
use crate::source::{SourceDescriptor, SourceSettings};
use crate::track::TrackerAlgorithm;

const DEFAULT_SOURCE: &str = "webcam:0";
const DEFAULT_CONFIDENCE: f32 = 0.4;
const DEFAULT_CAPTURE_FPS: u32 = 10;
const DEFAULT_CAPTURE_WIDTH: u32 = 640;
const DEFAULT_CAPTURE_HEIGHT: u32 = 480;

#[derive(Debug, Deserialize, Default)]
struct AppConfigFile {
    source: Option<String>,
    confidence: Option<f32>,
    tracker: Option<String>,
    model_path: Option<PathBuf>,
    out_dir: Option<PathBuf>,
    capture: Option<CaptureConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct CaptureConfigFile {
    target_fps: Option<u32>,
    width: Option<u32>,
    height: Option<u32>,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub source: String,
    pub confidence: f32,
    pub tracker: Option<TrackerAlgorithm>,
    pub model_path: Option<PathBuf>,
    pub out_dir: Option<PathBuf>,
    pub capture: SourceSettings,
}

impl AppConfig {
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("STREAMLENS_CONFIG").ok();
        let file_cfg = match config_path.as_deref() {
            Some(path) => Some(read_config_file(Path::new(path))?),
            None => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default())?;
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: AppConfigFile) -> Result<Self> {
        let tracker = file
            .tracker
            .as_deref()
            .map(parse_tracker)
            .transpose()?
            .flatten();
        let capture = SourceSettings {
            target_fps: file
                .capture
                .as_ref()
                .and_then(|capture| capture.target_fps)
                .unwrap_or(DEFAULT_CAPTURE_FPS),
            width: file
                .capture
                .as_ref()
                .and_then(|capture| capture.width)
                .unwrap_or(DEFAULT_CAPTURE_WIDTH),
            height: file
                .capture
                .as_ref()
                .and_then(|capture| capture.height)
                .unwrap_or(DEFAULT_CAPTURE_HEIGHT),
        };
        Ok(Self {
            source: file.source.unwrap_or_else(|| DEFAULT_SOURCE.to_string()),
            confidence: file.confidence.unwrap_or(DEFAULT_CONFIDENCE),
            tracker,
            model_path: file.model_path,
            out_dir: file.out_dir,
            capture,
        })
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(source) = std::env::var("STREAMLENS_SOURCE") {
            if !source.trim().is_empty() {
                self.source = source;
            }
        }
        if let Ok(confidence) = std::env::var("STREAMLENS_CONFIDENCE") {
            self.confidence = confidence
                .parse()
                .map_err(|_| anyhow!("STREAMLENS_CONFIDENCE must be a number"))?;
        }
        if let Ok(tracker) = std::env::var("STREAMLENS_TRACKER") {
            self.tracker = parse_tracker(&tracker)?;
        }
        if let Ok(model) = std::env::var("STREAMLENS_MODEL") {
            if !model.trim().is_empty() {
                self.model_path = Some(PathBuf::from(model));
            }
        }
        if let Ok(out_dir) = std::env::var("STREAMLENS_OUT_DIR") {
            if !out_dir.trim().is_empty() {
                self.out_dir = Some(PathBuf::from(out_dir));
            }
        }
        if let Ok(fps) = std::env::var("STREAMLENS_CAPTURE_FPS") {
            self.capture.target_fps = fps
                .parse()
                .map_err(|_| anyhow!("STREAMLENS_CAPTURE_FPS must be an integer"))?;
        }
        Ok(())
    }

    fn validate(&mut self) -> Result<()> {
        SourceDescriptor::parse(&self.source)
            .map_err(|err| anyhow!("invalid source '{}': {}", self.source, err))?;
        if !(0.0..=1.0).contains(&self.confidence) {
            return Err(anyhow!(
                "confidence must be within [0, 1], got {}",
                self.confidence
            ));
        }
        if self.capture.target_fps == 0 {
            return Err(anyhow!("capture fps must be greater than zero"));
        }
        if self.capture.width == 0 || self.capture.height == 0 {
            return Err(anyhow!(
                "capture resolution must be non-zero, got {}x{}",
                self.capture.width,
                self.capture.height
            ));
        }
        Ok(())
    }

    /// Source selector parsed into its structured form.
    pub fn descriptor(&self) -> Result<SourceDescriptor> {
        SourceDescriptor::parse(&self.source).map_err(|err| anyhow!("{err}"))
    }

    /// Per-run pipeline settings derived from this configuration.
    pub fn pipeline(&self) -> Result<PipelineConfig> {
        PipelineConfig::new(self.confidence, self.tracker).map_err(|err| anyhow!("{err}"))
    }
}

fn parse_tracker(value: &str) -> Result<Option<TrackerAlgorithm>> {
    let value = value.trim();
    if value.is_empty() || value.eq_ignore_ascii_case("off") || value.eq_ignore_ascii_case("none") {
        return Ok(None);
    }
    value
        .parse()
        .map(Some)
        .map_err(|_| anyhow!("unknown tracker '{}', expected bytetrack, botsort or off", value))
}

fn read_config_file(path: &Path) -> Result<AppConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let cfg = toml::from_str(&raw)
        .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?;
    Ok(cfg)
}
