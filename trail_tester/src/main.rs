//! Command-line driver for the trail engine: loads a directory of frames, runs the
//! detection and composite passes and writes the composite as a PNG.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};
use trail_vision::{
    EngineConfig, ExclusionKeyframe, FrameSequence, ImageDirectorySource, JobHandle, JobRunner,
    TrailPipeline, suggested_output_name,
};

#[derive(Parser, Debug)]
#[command(author, version, about = "Stitch fast-moving objects from a frame sequence onto one image", long_about = None)]
struct Args {
    /// Directory of frames, read in file-name order
    frames: PathBuf,

    /// Where to write the composite (defaults to `<dir>_interp.png` next to the frames)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// JSON file with engine settings; flags below override it
    #[arg(long)]
    config: Option<PathBuf>,

    /// Intensity cutoff for differencing and silhouettes
    #[arg(short, long)]
    threshold: Option<u8>,

    /// Minimum centroid travel between frames, in pixels
    #[arg(long)]
    min_speed: Option<u32>,

    /// Contours must be smaller than this area
    #[arg(long)]
    max_size: Option<u32>,

    /// Reach of each `--correct` point, in pixels
    #[arg(long)]
    correction_radius: Option<u32>,

    /// Remove detections near `x,y` before compositing (repeatable)
    #[arg(long = "correct", value_parser = parse_point)]
    corrections: Vec<(u32, u32)>,

    /// Exclusion keyframe `frame:x:y:radius` (repeatable); switches to the
    /// background-subtraction composite
    #[arg(long = "exclude", value_parser = parse_keyframe)]
    exclusions: Vec<ExclusionKeyframe>,

    /// Also save the boxed detection preview here
    #[arg(long)]
    preview: Option<PathBuf>,
}

fn parse_point(s: &str) -> Result<(u32, u32), String> {
    let (x, y) = s.split_once(',').ok_or("expected x,y")?;
    let x = x.trim().parse().map_err(|e| format!("bad x: {e}"))?;
    let y = y.trim().parse().map_err(|e| format!("bad y: {e}"))?;
    Ok((x, y))
}

fn parse_keyframe(s: &str) -> Result<ExclusionKeyframe, String> {
    let parts: Vec<&str> = s.split(':').map(str::trim).collect();
    let [frame, x, y, radius] = parts.as_slice() else {
        return Err("expected frame:x:y:radius".to_string());
    };
    Ok(ExclusionKeyframe::new(
        frame.parse().map_err(|e| format!("bad frame: {e}"))?,
        (
            x.parse().map_err(|e| format!("bad x: {e}"))?,
            y.parse().map_err(|e| format!("bad y: {e}"))?,
        ),
        radius.parse().map_err(|e| format!("bad radius: {e}"))?,
    ))
}

fn load_config(args: &Args) -> Result<EngineConfig> {
    let mut config = match &args.config {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("reading config {}", path.display()))?;
            serde_json::from_str(&text).with_context(|| format!("parsing config {}", path.display()))?
        }
        None => EngineConfig::default(),
    };
    if let Some(threshold) = args.threshold {
        config.threshold = threshold;
    }
    if let Some(min_speed) = args.min_speed {
        config.min_speed = min_speed;
    }
    if let Some(max_size) = args.max_size {
        config.max_size = max_size;
    }
    if let Some(radius) = args.correction_radius {
        config.correction_radius = radius;
    }
    Ok(config)
}

/// Prints progress until the job finishes, keeping only the last preview.
async fn drive<T>(label: &str, mut handle: JobHandle<T>) -> Result<(T, Option<image::RgbImage>)> {
    let mut progress = handle.progress();
    let mut last_preview = None;
    loop {
        tokio::select! {
            changed = progress.changed() => {
                if changed.is_err() {
                    break;
                }
                let percent = *progress.borrow_and_update();
                eprint!("\r{label}: {percent:3}%");
            }
            preview = handle.next_preview() => match preview {
                Some(image) => last_preview = Some(image),
                None => break,
            },
        }
    }
    while let Some(image) = handle.next_preview().await {
        last_preview = Some(image);
    }
    eprintln!();

    let outcome = handle.join().await?;
    if outcome.is_cancelled() {
        warn!(job = label, "Job was cancelled; output is partial");
    }
    Ok((outcome.output, last_preview))
}

fn save(image: &image::RgbImage, path: &Path) -> Result<()> {
    image
        .save(path)
        .with_context(|| format!("writing {}", path.display()))?;
    info!(path = %path.display(), "Saved image");
    Ok(())
}

/// Runs the whole job chain for `args` and returns where the composite went.
async fn run(args: &Args) -> Result<PathBuf> {
    let config = load_config(args)?;

    let mut source = ImageDirectorySource::new(&args.frames);
    let frames = FrameSequence::load(&mut source)
        .with_context(|| format!("loading frames from {}", args.frames.display()))?;
    info!(frames = frames.len(), width = frames.width(), height = frames.height(), "Loaded frames");

    let runner = JobRunner::new(TrailPipeline::new(std::sync::Arc::new(frames), config)?);
    let output = args
        .output
        .clone()
        .unwrap_or_else(|| args.frames.with_file_name(suggested_output_name(&args.frames)));

    let composite = if args.exclusions.is_empty() {
        let (mut detections, preview) = drive("detect", runner.spawn_detection()?).await?;
        info!(boxes = detections.total_boxes(), "Detection finished");

        let mut latest_preview = preview;
        for &(x, y) in &args.corrections {
            let mut sink = |image: &image::RgbImage| latest_preview = Some(image.clone());
            let removed = runner.correct(&mut detections, x, y, &mut sink)?;
            info!(x, y, removed, "Applied correction");
        }
        if let (Some(path), Some(image)) = (&args.preview, &latest_preview) {
            save(image, path)?;
        }

        drive("composite", runner.spawn_composite(detections)?).await?.0
    } else {
        drive("composite", runner.spawn_exclusion_composite(args.exclusions.clone())?)
            .await?
            .0
    };

    save(&composite, &output)?;
    Ok(output)
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    let output = run(&args).await?;
    println!("Composite saved to {}", output.display());
    Ok(())
}
