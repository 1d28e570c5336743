use anyhow::Result;
use clap::Parser;
use std::sync::Arc;
use timelapse::{CaptureMode, CaptureOutcome, RunController, TestPatternDriver, TimelapseConfig};
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(name = "timelapse")]
#[command(about = "Capture timelapse stills from a camera and stitch them into a video")]
#[command(version)]
#[command(long_about = "Samples a camera at a fixed interval, stores each sample as a \
timestamped PNG still and optionally assembles the stills into a video. Runs for a fixed \
period or until interrupted with 'q' or Ctrl+C.")]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "timelapse.toml", help = "Path to TOML configuration file")]
    config: String,

    /// Camera device index
    #[arg(long, value_name = "INDEX", help = "Camera index to use (0 for /dev/video0); probes when omitted")]
    id: Option<u32>,

    /// Seconds between stored frames
    #[arg(short, long, value_name = "SECONDS", help = "Seconds between taking each photo")]
    interval: Option<u64>,

    /// Length of the timelapse
    #[arg(short, long, value_name = "SECONDS", help = "Length of the timelapse in seconds")]
    period: Option<u64>,

    /// Capture until interrupted instead of for a fixed period
    #[arg(long, help = "Capture until interrupted instead of for a fixed period")]
    continuous: bool,

    /// Disable the live view
    #[arg(long, help = "Do not display a live view while capturing")]
    headless: bool,

    /// Stitch captures into a video once capturing ends
    #[arg(short, long, help = "Stitch all captures into a video when capturing ends")]
    stitch: bool,

    /// Only stitch existing captures
    #[arg(long, help = "Stitch existing captures into a video without capturing", conflicts_with_all = ["clear", "preview"])]
    stitch_only: bool,

    /// Empty the capture directory first
    #[arg(long, help = "Delete stored captures before capturing")]
    clear: bool,

    /// Show a preview before starting
    #[arg(long, help = "Display a camera preview to set up the shot before starting")]
    preview: bool,

    /// Enable debug logging (most verbose)
    #[arg(short, long, help = "Enable debug level logging")]
    debug: bool,

    /// Enable verbose logging (info level)
    #[arg(short, long, help = "Enable verbose info level logging")]
    verbose: bool,

    /// Enable quiet mode (errors only)
    #[arg(short, long, help = "Enable quiet mode - only log errors")]
    quiet: bool,

    /// Validate configuration and exit
    #[arg(long, help = "Validate configuration file and exit without capturing")]
    validate_config: bool,

    /// Print default configuration and exit
    #[arg(long, help = "Print default configuration in TOML format and exit")]
    print_config: bool,

    /// Override log format (json, pretty, compact)
    #[arg(long, value_name = "FORMAT", help = "Log output format: json, pretty, or compact")]
    log_format: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    if args.print_config {
        print_default_config()?;
        return Ok(());
    }

    init_logging(&args)?;

    info!("Starting timelapse v{}", env!("CARGO_PKG_VERSION"));
    info!("Configuration file: {}", args.config);

    let mut config = match TimelapseConfig::load_from_file(&args.config) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            eprintln!("✗ Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };
    apply_overrides(&mut config, &args);

    if args.validate_config {
        match config.validate() {
            Ok(()) => {
                info!("Configuration validation successful");
                println!("✓ Configuration is valid");
                return Ok(());
            }
            Err(e) => {
                error!("Configuration validation failed: {}", e);
                eprintln!("✗ Configuration validation failed: {}", e);
                std::process::exit(1);
            }
        }
    }

    let mut builder = RunController::builder(config).listen_for_interrupts(true);
    if args.stitch_only {
        // No device is opened when only stitching
        builder = builder.driver(Arc::new(TestPatternDriver::default()));
    }

    let controller = match builder.build() {
        Ok(controller) => controller,
        Err(e) => {
            error!("Failed to set up timelapse: {}", e);
            eprintln!("✗ {}", e);
            std::process::exit(1);
        }
    };

    let exit_code = if args.stitch_only {
        stitch_only(&controller).await
    } else {
        capture(&controller, args.clear).await
    };

    info!("Timelapse exited with code: {}", exit_code);
    std::process::exit(exit_code);
}

async fn stitch_only(controller: &RunController) -> i32 {
    match controller.stitch().await {
        Ok(Some(report)) => {
            println!(
                "✓ Wrote {} frame(s) to {}",
                report.frames_written,
                report.output_path.display()
            );
            0
        }
        Ok(None) => {
            println!(
                "No captures in {}, nothing to stitch",
                controller.config().capture_dir().display()
            );
            0
        }
        Err(e) => {
            error!("Stitching failed: {}", e);
            eprintln!("✗ Stitching failed: {}", e);
            1
        }
    }
}

async fn capture(controller: &RunController, clear: bool) -> i32 {
    if clear {
        match controller.clear_captures() {
            Ok(removed) => info!("Removed {} stored capture(s)", removed),
            Err(e) => warn!("Failed to clear captures: {}", e),
        }
    }

    match controller.run().await {
        Ok(report) => {
            let verb = match report.outcome {
                CaptureOutcome::Stopped => "finished",
                CaptureOutcome::Interrupted => "interrupted",
            };
            println!(
                "Timelapse {}: {} frame(s) captured, {} read failure(s)",
                verb, report.stats.frames_persisted, report.stats.read_failures
            );
            if let Some(assembly) = report.assembly {
                println!(
                    "✓ Wrote {} frame(s) to {}",
                    assembly.frames_written,
                    assembly.output_path.display()
                );
            }
            0
        }
        Err(e) => {
            error!("Timelapse failed: {}", e);
            eprintln!("✗ Timelapse failed: {}", e);
            1
        }
    }
}

fn apply_overrides(config: &mut TimelapseConfig, args: &Args) {
    if let Some(id) = args.id {
        config.camera.index = Some(id);
    }
    if let Some(interval) = args.interval {
        config.capture.interval_seconds = interval;
    }
    if let Some(period) = args.period {
        config.capture.period_seconds = period;
    }
    if args.continuous {
        config.capture.mode = CaptureMode::Continuous;
    }
    if args.headless {
        config.capture.headless = true;
    }
    if args.stitch {
        config.capture.generate_video = true;
    }
    if args.preview {
        config.preview.before_start = true;
    }
}

fn init_logging(args: &Args) -> Result<()> {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

    let log_level = if args.debug {
        "debug"
    } else if args.verbose {
        "info"
    } else if args.quiet {
        "error"
    } else {
        "warn"
    };

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("timelapse={}", log_level)));

    let fmt_layer = match args.log_format.as_deref() {
        Some("json") => fmt::layer()
            .json()
            .with_target(true)
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true)
            .boxed(),
        Some("compact") => fmt::layer()
            .compact()
            .with_target(false)
            .with_thread_ids(false)
            .with_file(false)
            .with_line_number(false)
            .boxed(),
        Some("pretty") | None => fmt::layer()
            .pretty()
            .with_target(true)
            .with_thread_ids(args.debug)
            .with_file(args.debug)
            .with_line_number(args.debug)
            .boxed(),
        Some(format) => {
            eprintln!("Warning: Unknown log format '{}', using default", format);
            fmt::layer()
                .with_target(true)
                .with_thread_ids(args.debug)
                .with_file(args.debug)
                .with_line_number(args.debug)
                .boxed()
        }
    };

    tracing_subscriber::registry()
        .with(fmt_layer)
        .with(env_filter)
        .init();

    Ok(())
}

/// Print default configuration in TOML format
fn print_default_config() -> Result<()> {
    println!("# Timelapse Configuration File");
    println!("# Unset camera.index to probe for cameras; unset resolutions to follow the camera");
    println!();
    println!("{}", TimelapseConfig::default().to_toml()?);
    Ok(())
}
