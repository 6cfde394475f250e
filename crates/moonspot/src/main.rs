//! moonspot: find the moon in a photograph from the command line.
//!
//! ```text
//! moonspot detect night.jpg -o marked.png
//! moonspot detect night.jpg -o moon.png --mode crop --json
//! moonspot locate marked.png
//! ```
//!
//! Logging goes to stderr; set `RUST_LOG=debug` for per-stage detail.

#![allow(clippy::print_stdout, clippy::print_stderr)]

use std::error::Error;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand, ValueEnum};
use flexi_logger::Logger;
use image::DynamicImage;
use moonspot_pipeline::{
    ColorBand, DetectConfig, DetectorKind, Dimensions, OutputMode, Outcome, locate_overlay,
};

/// Locate the moon in still photographs and mark it.
#[derive(Parser)]
#[command(name = "moonspot", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Detect the moon and write the annotated (or cropped) image.
    Detect(DetectArgs),
    /// Find the overlay circle in an already annotated image.
    Locate(LocateArgs),
}

#[derive(clap::Args)]
struct DetectArgs {
    /// Input image (PNG, JPEG, BMP, WebP).
    input: PathBuf,

    /// Output image path; the format follows the extension.
    #[arg(short, long)]
    output: PathBuf,

    /// Disk locator.
    #[arg(long, value_enum, default_value_t = Detector::Threshold)]
    detector: Detector,

    /// What to write when a disk is found.
    #[arg(long, value_enum, default_value_t = Mode::Overlay)]
    mode: Mode,

    /// Full detection config as a JSON string.
    ///
    /// When provided, `--detector` and `--mode` are ignored. Missing
    /// fields take their defaults.
    #[arg(long)]
    config_json: Option<String>,

    /// Print diagnostics as JSON instead of the human-readable report.
    #[arg(long)]
    json: bool,
}

#[derive(clap::Args)]
struct LocateArgs {
    /// Annotated image produced by `moonspot detect`.
    image: PathBuf,

    /// Per-channel tolerance around the default overlay colour.
    #[arg(long, default_value_t = ColorBand::DEFAULT_TOLERANCE)]
    tolerance: u8,

    /// Print the result as JSON.
    #[arg(long)]
    json: bool,
}

#[derive(Clone, Copy, ValueEnum)]
enum Detector {
    /// Otsu threshold, contour ranking, minimal enclosing circle.
    Threshold,
    /// Gradient Hough transform over Canny edges.
    Hough,
}

#[derive(Clone, Copy, ValueEnum)]
enum Mode {
    /// Draw the circle on a full-size copy.
    Overlay,
    /// Cut the circle's bounding box plus a margin.
    Crop,
}

fn config_from_args(args: &DetectArgs) -> Result<DetectConfig, String> {
    if let Some(ref json) = args.config_json {
        return serde_json::from_str(json).map_err(|e| format!("Error parsing --config-json: {e}"));
    }

    Ok(DetectConfig {
        detector: match args.detector {
            Detector::Threshold => DetectorKind::Threshold,
            Detector::Hough => DetectorKind::HoughGradient,
        },
        output_mode: match args.mode {
            Mode::Overlay => OutputMode::Overlay,
            Mode::Crop => OutputMode::Crop,
        },
        ..DetectConfig::default()
    })
}

fn read_image(path: &Path) -> Result<DynamicImage, Box<dyn Error>> {
    let bytes =
        std::fs::read(path).map_err(|e| format!("Error reading {}: {e}", path.display()))?;
    log::info!("read {} ({} bytes)", path.display(), bytes.len());
    Ok(moonspot_pipeline::ingest::decode(&bytes)?)
}

fn detect(args: &DetectArgs) -> Result<(), Box<dyn Error>> {
    let config = config_from_args(args)?;
    let image = read_image(&args.input)?;

    let (detection, diagnostics) = moonspot_pipeline::detect_with_diagnostics(&image, &config)?;

    match &detection.outcome {
        Outcome::Found(fit) => log::info!(
            "moon at ({:.1}, {:.1}) r={:.1}px via {}",
            fit.circle.center.x,
            fit.circle.center.y,
            fit.circle.radius,
            fit.detector
        ),
        Outcome::Missed(miss) => log::warn!("no moon found ({miss}); writing input unchanged"),
    }

    detection
        .image
        .save(&args.output)
        .map_err(|e| format!("Error writing {}: {e}", args.output.display()))?;
    log::info!("wrote {}", args.output.display());

    if args.json {
        println!("{}", serde_json::to_string_pretty(&diagnostics)?);
    } else {
        println!("{}", diagnostics.report());
    }
    Ok(())
}

fn locate(args: &LocateArgs) -> Result<(), Box<dyn Error>> {
    let image = read_image(&args.image)?;
    let dimensions = Dimensions::new(image.width(), image.height());
    let band = ColorBand::for_stroke(&DetectConfig::default(), args.tolerance);

    let Some(rect) = locate_overlay(&image, band) else {
        return Err(format!("no overlay pixels in {}", args.image.display()).into());
    };
    let focus = rect.focus_point(dimensions);

    if args.json {
        let value = serde_json::json!({ "rect": rect, "focus_point": focus });
        println!("{}", serde_json::to_string_pretty(&value)?);
    } else {
        println!(
            "Overlay: {}x{} at ({}, {})",
            rect.width, rect.height, rect.x, rect.y
        );
        println!("Focus point: ({:.4}, {:.4})", focus.x, focus.y);
    }
    Ok(())
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    // Keep the handle alive for the whole run.
    let _logger = match Logger::try_with_env_or_str("info").and_then(Logger::start) {
        Ok(handle) => handle,
        Err(e) => {
            eprintln!("Logger initialization failed: {e}");
            return ExitCode::FAILURE;
        }
    };

    let result = match &cli.command {
        Command::Detect(args) => detect(args),
        Command::Locate(args) => locate(args),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{e}");
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(args).unwrap()
    }

    fn detect_args(cli: Cli) -> Option<DetectArgs> {
        match cli.command {
            Command::Detect(args) => Some(args),
            Command::Locate(_) => None,
        }
    }

    #[test]
    fn flags_map_onto_config() {
        let cli = parse(&[
            "moonspot", "detect", "in.jpg", "-o", "out.png", "--detector", "hough", "--mode",
            "crop",
        ]);
        let config = config_from_args(&detect_args(cli).unwrap()).unwrap();
        assert_eq!(config.detector, DetectorKind::HoughGradient);
        assert_eq!(config.output_mode, OutputMode::Crop);
        assert_eq!(config.crop_margin, DetectConfig::DEFAULT_CROP_MARGIN);
    }

    #[test]
    fn config_json_overrides_flags() {
        let cli = parse(&[
            "moonspot",
            "detect",
            "in.jpg",
            "-o",
            "out.png",
            "--detector",
            "hough",
            "--config-json",
            r#"{"crop_margin": 4}"#,
        ]);
        let config = config_from_args(&detect_args(cli).unwrap()).unwrap();
        assert_eq!(config.detector, DetectorKind::Threshold);
        assert_eq!(config.crop_margin, 4);
    }

    #[test]
    fn bad_config_json_is_reported() {
        let cli = parse(&[
            "moonspot",
            "detect",
            "in.jpg",
            "-o",
            "out.png",
            "--config-json",
            "{not json",
        ]);
        let err = config_from_args(&detect_args(cli).unwrap()).unwrap_err();
        assert!(err.starts_with("Error parsing --config-json"));
    }

    #[test]
    fn detect_requires_output() {
        assert!(Cli::try_parse_from(["moonspot", "detect", "in.jpg"]).is_err());
    }

    #[test]
    fn locate_defaults_tolerance() {
        let cli = parse(&["moonspot", "locate", "marked.png"]);
        match cli.command {
            Command::Locate(args) => assert_eq!(args.tolerance, ColorBand::DEFAULT_TOLERANCE),
            Command::Detect(_) => unreachable!("parsed as detect"),
        }
    }

    #[test]
    fn cli_definition_is_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
