//! streamlens - detect and track objects in a video stream
//!
//! Opens one source (webcam index, RTSP URL, local file, or a remote
//! video URL resolved to a playable stream), runs detection or tracking
//! on every frame, and emits annotated frames to the selected sink.
//! Ctrl-C requests a cooperative stop; the run then ends at the next
//! frame boundary with the source released.

use std::path::PathBuf;

use anyhow::{anyhow, Result};
use clap::Parser;

use streamlens::{
    pipeline, AppConfig, DisplaySink, EngineCapability, EngineRegistry, Frame, NullSink,
    PipelineConfig, PngDirSink, SourceDescriptor, StopToken, StreamHandle, StubEngine,
    TrackerAlgorithm,
};

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Source selector: webcam index, rtsp:// URL, file path, or http(s):// URL.
    #[arg(long)]
    source: Option<String>,
    /// Minimum detection confidence, within [0, 1].
    #[arg(long)]
    confidence: Option<f32>,
    /// Tracker: bytetrack, botsort, or off.
    #[arg(long)]
    tracker: Option<String>,
    /// Inference engine to use (see --list-engines).
    #[arg(long)]
    engine: Option<String>,
    /// Path to an ONNX detector model.
    #[arg(long)]
    model: Option<PathBuf>,
    /// Directory for annotated PNG output; omit to discard frames.
    #[arg(long)]
    out_dir: Option<PathBuf>,
    /// Stop after this many emitted frames.
    #[arg(long)]
    max_frames: Option<u64>,
    /// Print the run summary as JSON on stdout.
    #[arg(long)]
    json: bool,
    /// List registered engines and exit.
    #[arg(long)]
    list_engines: bool,
}

/// Forwards to an inner sink and requests a stop once the emission
/// budget is spent.
struct BoundedSink {
    inner: Box<dyn DisplaySink>,
    remaining: u64,
    stop: StopToken,
}

impl DisplaySink for BoundedSink {
    fn show(&mut self, frame: &Frame, caption: &str) {
        if self.remaining == 0 {
            self.stop.request_stop();
            return;
        }
        self.inner.show(frame, caption);
        self.remaining -= 1;
        if self.remaining == 0 {
            self.stop.request_stop();
        }
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let mut cfg = AppConfig::load()?;
    if let Some(source) = args.source {
        cfg.source = source;
    }
    if let Some(confidence) = args.confidence {
        cfg.confidence = confidence;
    }
    if let Some(tracker) = args.tracker.as_deref() {
        cfg.tracker = match tracker {
            "off" | "none" => None,
            other => Some(
                other
                    .parse::<TrackerAlgorithm>()
                    .map_err(|_| anyhow!("unknown tracker '{}'", other))?,
            ),
        };
    }
    if let Some(model) = args.model {
        cfg.model_path = Some(model);
    }
    if let Some(out_dir) = args.out_dir {
        cfg.out_dir = Some(out_dir);
    }

    let registry = build_registry(&cfg)?;
    if args.list_engines {
        for name in registry.list() {
            println!("{name}");
        }
        return Ok(());
    }

    let descriptor: SourceDescriptor = cfg.descriptor()?;
    let pipeline_cfg: PipelineConfig = cfg.pipeline()?;

    let engine = match args.engine.as_deref() {
        Some(name) => registry
            .get(name)
            .ok_or_else(|| anyhow!("engine '{}' not registered (try --list-engines)", name))?,
        None => {
            let capability = if cfg.tracker.is_some() {
                EngineCapability::Tracking
            } else {
                EngineCapability::Detection
            };
            registry.engine_for_capability(capability)?
        }
    };

    let stop = StopToken::new();
    {
        let stop = stop.clone();
        ctrlc::set_handler(move || {
            log::info!("stop requested, finishing the current frame");
            stop.request_stop();
        })?;
    }

    let base_sink: Box<dyn DisplaySink> = match cfg.out_dir.as_ref() {
        Some(dir) => {
            std::fs::create_dir_all(dir)
                .map_err(|e| anyhow!("failed to create {}: {}", dir.display(), e))?;
            Box::new(PngDirSink::new(dir.clone()))
        }
        None => Box::new(NullSink),
    };
    let mut sink: Box<dyn DisplaySink> = match args.max_frames {
        Some(limit) => {
            // A zero budget means stop before the first read.
            if limit == 0 {
                stop.request_stop();
            }
            Box::new(BoundedSink {
                inner: base_sink,
                remaining: limit,
                stop: stop.clone(),
            })
        }
        None => base_sink,
    };

    let mut handle = StreamHandle::open(&descriptor, &cfg.capture)?;
    let mut engine = engine
        .lock()
        .map_err(|_| anyhow!("engine lock poisoned"))?;
    engine.warm_up()?;

    let summary = pipeline::run(&mut handle, &pipeline_cfg, &mut *engine, &mut *sink, &stop)?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        println!(
            "emitted {} frames, dropped {}{}",
            summary.frames_emitted,
            summary.frames_dropped,
            if summary.stopped { " (stopped)" } else { "" }
        );
    }
    Ok(())
}

fn build_registry(cfg: &AppConfig) -> Result<EngineRegistry> {
    let mut registry = EngineRegistry::new();
    registry.register(StubEngine::new());

    #[cfg(feature = "backend-tract")]
    if let Some(model_path) = cfg.model_path.as_ref() {
        let engine = streamlens::TractEngine::new(
            model_path,
            streamlens::TARGET_WIDTH,
            streamlens::TARGET_HEIGHT,
        )?;
        registry.register(engine);
        registry.set_default("tract")?;
    }
    #[cfg(not(feature = "backend-tract"))]
    if cfg.model_path.is_some() {
        log::warn!("model path configured but the backend-tract feature is disabled");
    }

    Ok(registry)
}
