use anyhow::{Context, bail};
use clap::Parser;
use image::{Rgba, RgbaImage};
use imageproc::drawing::draw_hollow_rect_mut;
use imageproc::rect::Rect;
use log::{info, warn};
use shape_tracker::{Frame, FrameReport, Millis, ParallelPipeline, PipelineConfig, ShapeOverlay, ShapePipeline};
use std::fs;
use std::path::{Path, PathBuf};

const DEFAULT_OVERLAY_COLOR: Rgba<u8> = Rgba([255, 255, 255, 255]);

#[derive(Parser)]
#[command(name = "overlay_tester")]
#[command(about = "Run a directory of still frames through the shape tracker")]
struct Cli {
    /// Directory of frames, processed in file-name order
    #[arg(value_name = "FRAMES_DIR")]
    frames_dir: PathBuf,

    /// Pipeline configuration (TOML)
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Write annotated copies of the frames here
    #[arg(long, value_name = "DIR")]
    output: Option<PathBuf>,

    /// Frame rate used to timestamp the frames
    #[arg(long, default_value_t = 30.0)]
    fps: f64,

    /// Fan detection work out over the blocking thread pool
    #[arg(long)]
    parallel: bool,
}

enum Engine {
    Sequential(ShapePipeline),
    Parallel(ParallelPipeline),
}

impl Engine {
    async fn process(&mut self, frame: Frame) -> FrameReport {
        match self {
            Engine::Sequential(pipeline) => pipeline.process_frame(&frame),
            Engine::Parallel(pipeline) => pipeline.process_frame(frame).await,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Cli::parse();
    if args.fps.is_nan() || args.fps <= 0.0 {
        bail!("--fps must be positive, got {}", args.fps);
    }

    // --- 1. Configuration ---
    let config = match &args.config {
        Some(path) => PipelineConfig::load(path).with_context(|| format!("loading {}", path.display()))?,
        None => PipelineConfig::default(),
    };
    let mut engine = if args.parallel {
        Engine::Parallel(ParallelPipeline::new(config).context("building parallel pipeline")?)
    } else {
        Engine::Sequential(ShapePipeline::new(config).context("building pipeline")?)
    };

    if let Some(dir) = &args.output {
        fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
    }

    // --- 2. Frame Loop ---
    let paths = frame_paths(&args.frames_dir)?;
    info!("processing {} frames from {}", paths.len(), args.frames_dir.display());

    for (index, path) in paths.iter().enumerate() {
        let image = match image::open(path) {
            Ok(image) => image.to_rgba8(),
            Err(err) => {
                warn!("skipping {}: {}", path.display(), err);
                continue;
            }
        };

        let timestamp = (index as f64 * 1000.0 / args.fps).round() as Millis;
        let report = engine.process(Frame::from_rgba_image(&image, timestamp)).await;
        println!("{}", serde_json::to_string(&report)?);

        // --- 3. Visualization ---
        if let Some(dir) = &args.output {
            let annotated = annotate(image, &report.overlays);
            let target = dir.join(path.file_name().unwrap_or_default()).with_extension("png");
            annotated
                .save(&target)
                .with_context(|| format!("writing {}", target.display()))?;
        }
    }

    Ok(())
}

fn frame_paths(dir: &Path) -> anyhow::Result<Vec<PathBuf>> {
    let mut paths = Vec::new();
    for entry in fs::read_dir(dir).with_context(|| format!("reading {}", dir.display()))? {
        let path = entry?.path();
        if path.is_file() {
            paths.push(path);
        }
    }
    paths.sort();
    Ok(paths)
}

/// Draws each overlay's box at its predicted position, in its pattern colour.
fn annotate(mut image: RgbaImage, overlays: &[ShapeOverlay]) -> RgbaImage {
    for overlay in overlays {
        let color = overlay
            .display
            .as_ref()
            .and_then(|display| parse_hex_color(&display.color))
            .unwrap_or(DEFAULT_OVERLAY_COLOR);
        let (x, y) = overlay.predicted_position;
        let width = overlay.bounding_box.width.round().max(1.0) as u32;
        let height = overlay.bounding_box.height.round().max(1.0) as u32;
        let rect = Rect::at(x.round() as i32, y.round() as i32).of_size(width, height);
        draw_hollow_rect_mut(&mut image, rect, color);
    }
    image
}

/// `#rrggbb` to an opaque pixel.
fn parse_hex_color(hex: &str) -> Option<Rgba<u8>> {
    let digits = hex.strip_prefix('#')?;
    if digits.len() != 6 || !digits.is_ascii() {
        return None;
    }
    let channel = |range: std::ops::Range<usize>| u8::from_str_radix(&digits[range], 16).ok();
    Some(Rgba([channel(0..2)?, channel(2..4)?, channel(4..6)?, 255]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use shape_tracker::core_modules::contour::BoundingBox;

    #[test]
    fn parses_pattern_colours() {
        assert_eq!(parse_hex_color("#2ecc71"), Some(Rgba([0x2e, 0xcc, 0x71, 255])));
        assert_eq!(parse_hex_color("2ecc71"), None);
        assert_eq!(parse_hex_color("#2ecc7"), None);
        assert_eq!(parse_hex_color("#zzzzzz"), None);
    }

    #[test]
    fn overlays_are_drawn_at_the_predicted_position() {
        let overlay = ShapeOverlay {
            id: 0,
            pattern_id: "forma_cruz".to_string(),
            bounding_box: BoundingBox::new(8.0, 8.0, 10.0, 10.0),
            predicted_position: (10.0, 12.0),
            confidence: 0.9,
            display: None,
        };
        let image = annotate(RgbaImage::new(40, 40), &[overlay]);
        assert_eq!(*image.get_pixel(10, 12), DEFAULT_OVERLAY_COLOR);
        assert_eq!(*image.get_pixel(19, 21), DEFAULT_OVERLAY_COLOR);
        assert_eq!(*image.get_pixel(8, 8), Rgba([0, 0, 0, 0]));
    }
}
