use anyhow::Result;
use clap::Parser;
use scancam::controller::{PreviewController, ResultSink};
use scancam::decode::DecodeSuccess;
use scancam::geometry::{DisplayRotation, Size};
use scancam::hardware::mock::MockBackend;
use scancam::session::CameraDeviceSession;
use scancam::ScancamConfig;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "scancam")]
#[command(about = "Camera preview and barcode decode pipeline")]
#[command(version)]
#[command(long_about = "Drives the scancam capture pipeline against the built-in mock camera \
backend: opens a session, negotiates preview geometry, runs the decode loop for a bounded \
duration and reports what was decoded. Useful for exercising the pipeline end to end without \
camera hardware.")]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "scancam.toml", help = "Path to TOML configuration file")]
    config: String,

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
    #[arg(long, help = "Validate configuration file and exit without running")]
    validate_config: bool,

    /// Print default configuration and exit
    #[arg(long, help = "Print default configuration in TOML format and exit")]
    print_config: bool,

    /// How long to run the scan loop, in milliseconds
    #[arg(long, default_value_t = 2000, value_name = "MS", help = "Scan loop duration in milliseconds")]
    duration_ms: u64,

    /// Screen resolution the viewfinder pretends to have
    #[arg(long, default_value = "1080x1920", value_name = "WxH", help = "Simulated screen resolution")]
    screen: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    if args.print_config {
        print_default_config()?;
        return Ok(());
    }

    init_logging(&args);

    info!("Starting scancam v{}", env!("CARGO_PKG_VERSION"));
    info!("Configuration file: {}", args.config);

    let config = match ScancamConfig::load_from_file(&args.config) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            return Err(e.into());
        }
    };

    if args.validate_config {
        println!("✓ Configuration is valid");
        return Ok(());
    }

    let screen = parse_screen(&args.screen)?;

    // The demo runs against the deterministic mock backend; real hardware
    // plugs in through the same CameraBackend trait.
    let backend = MockBackend::single_back_camera();

    let mut session = CameraDeviceSession::open(&backend, &config).map_err(|e| {
        error!("Failed to open camera: {}", e);
        anyhow::anyhow!(e)
    })?;
    session
        .configure(screen, DisplayRotation::Deg0)
        .map_err(|e| {
            error!("Failed to configure camera: {}", e);
            anyhow::anyhow!(e)
        })?;

    info!(
        "session configured: framing rect {:?}, preview rect {:?}",
        session.framing_rect(),
        session.framing_rect_in_preview()
    );

    let sink = Arc::new(PrintingSink::default());
    let sink_dyn: Arc<dyn ResultSink> = sink.clone();
    let controller =
        PreviewController::start(session, make_decoder(), sink_dyn, &config)
            .await
            .map_err(|e| {
                error!("Failed to start capture flow: {}", e);
                anyhow::anyhow!(e)
            })?;

    info!("scan loop running for {} ms", args.duration_ms);
    tokio::time::sleep(Duration::from_millis(args.duration_ms)).await;

    controller.quit().await;

    let decoded = sink.successes.load(Ordering::SeqCst);
    let requested = backend
        .device(0)
        .map(|spec| spec.log.frame_requests.load(Ordering::SeqCst))
        .unwrap_or(0);
    println!("frames requested: {requested}, symbols decoded: {decoded}");

    Ok(())
}

/// Prints every decoded symbol; the stand-in for result display/routing.
#[derive(Default)]
struct PrintingSink {
    successes: AtomicU32,
}

impl ResultSink for PrintingSink {
    fn decode_succeeded(&self, success: DecodeSuccess) {
        self.successes.fetch_add(1, Ordering::SeqCst);
        println!(
            "decoded {} symbol in {} ms: {}",
            success.symbol.format.name(),
            success.elapsed.as_millis(),
            success.symbol.text
        );
    }
}

#[cfg(feature = "qr")]
fn make_decoder() -> Box<dyn scancam::decode::Decoder + Send> {
    Box::new(scancam::qr::RqrrDecoder::new())
}

/// Without the QR feature there is no stock decoder; scan attempts simply
/// keep failing, which still exercises the full pipeline.
#[cfg(not(feature = "qr"))]
fn make_decoder() -> Box<dyn scancam::decode::Decoder + Send> {
    struct NeverDecoder;
    impl scancam::decode::Decoder for NeverDecoder {
        fn decode(
            &mut self,
            _source: &scancam::frame::LuminanceSource,
        ) -> Option<scancam::decode::DecodedSymbol> {
            None
        }
        fn reset(&mut self) {}
    }
    Box::new(NeverDecoder)
}

fn parse_screen(raw: &str) -> Result<Size> {
    let (w, h) = raw
        .split_once('x')
        .ok_or_else(|| anyhow::anyhow!("screen must look like 1080x1920"))?;
    Ok(Size::new(w.parse()?, h.parse()?))
}

fn init_logging(args: &Args) {
    use tracing_subscriber::EnvFilter;

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
        .unwrap_or_else(|_| EnvFilter::new(format!("scancam={}", log_level)));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(args.debug)
        .init();
}

/// Print default configuration in TOML format.
fn print_default_config() -> Result<()> {
    println!("# Scancam Configuration File");
    println!("# Defaults for all available options");
    println!();
    let rendered = toml::to_string_pretty(&ScancamConfig::default())?;
    println!("{rendered}");
    Ok(())
}
