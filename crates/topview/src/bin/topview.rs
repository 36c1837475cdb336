use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use topview::extrinsics::{load_static_transforms, transform_buffer};
use topview::{run_static, CalibrationConfig, CalibrationResult, CameraInfo, TopviewError};

#[derive(Parser, Debug)]
#[command(name = "topview", version, about = "One-shot bird's-eye calibration")]
struct Cli {
    /// Log level: off, error, warn, info, debug, trace.
    #[arg(long, default_value = "info", global = true)]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Compute the forward/inverse warp matrices.
    Calibrate(CalibrateArgs),
}

#[derive(Args, Debug)]
struct CalibrateArgs {
    /// Calibration configuration (JSON).
    #[arg(long)]
    config: PathBuf,
    /// Camera info message (JSON).
    #[arg(long)]
    camera_info: PathBuf,
    /// Static transforms (JSON list of {parent, child, translation, rotation_rpy}).
    #[arg(long)]
    extrinsics: PathBuf,
    /// Write the matrices here instead of stdout.
    #[arg(long)]
    output: Option<PathBuf>,
    /// Give up after this many milliseconds.
    #[arg(long, default_value_t = 5000)]
    max_wait_ms: u64,
    /// Camera frame to render into the top view.
    #[cfg(feature = "image")]
    #[arg(long, requires = "top_view")]
    image: Option<PathBuf>,
    /// Where to save the rendered top view.
    #[cfg(feature = "image")]
    #[arg(long, requires = "image")]
    top_view: Option<PathBuf>,
}

fn main() {
    let cli = Cli::parse();
    if let Err(err) = run(cli) {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    init_logging(&cli.log_level)?;
    match cli.command {
        Command::Calibrate(args) => calibrate(&args)?,
    }
    Ok(())
}

fn init_logging(level: &str) -> Result<(), Box<dyn std::error::Error>> {
    let level = topview::core::parse_level(level)
        .ok_or_else(|| format!("unknown log level '{level}'"))?;
    #[cfg(feature = "tracing")]
    topview::core::init_tracing(level, false);
    #[cfg(not(feature = "tracing"))]
    topview::core::init_with_level(level)?;
    Ok(())
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, TopviewError> {
    let raw = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&raw)?)
}

fn calibrate(args: &CalibrateArgs) -> Result<(), TopviewError> {
    let config = CalibrationConfig::from_path(&args.config)?;
    let camera_info: CameraInfo = read_json(&args.camera_info)?;
    let transforms = load_static_transforms(&args.extrinsics)?;
    let frames = Arc::new(transform_buffer(&transforms));
    log::info!(
        "loaded {} static transform(s); publishing to {}",
        transforms.len(),
        config.matrix_topic
    );

    let (result, matrices) = run_static(
        config,
        frames,
        camera_info,
        Duration::from_millis(args.max_wait_ms),
    )?;

    let json = serde_json::to_string_pretty(&matrices)?;
    match &args.output {
        Some(path) => {
            fs::write(path, json)?;
            log::info!("wrote matrices to {}", path.display());
        }
        None => println!("{json}"),
    }

    render(args, &result)
}

#[cfg(feature = "image")]
fn render(args: &CalibrateArgs, result: &CalibrationResult) -> Result<(), TopviewError> {
    if let (Some(input), Some(output)) = (&args.image, &args.top_view) {
        let img = ::image::ImageReader::open(input)?.decode()?.to_luma8();
        topview::render::render_top_view(&img, result).save(output)?;
        log::info!("wrote top view to {}", output.display());
    }
    Ok(())
}

#[cfg(not(feature = "image"))]
fn render(_args: &CalibrateArgs, _result: &CalibrationResult) -> Result<(), TopviewError> {
    Ok(())
}
