//! Camera Session CLI
//!
//! Runs the fixed record sequence (start the camera, record between two
//! delays, report the saved clip) or takes a single still.

use camera_session::{
    capture::{FileConfig, LensFacing},
    dispatch::MainLoop,
    host::{Notifier, SessionHost},
    lifecycle::Lifecycle,
    platform::{CameraPlatform, MockPlatform, NullPreview},
    session::CameraSession,
};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// How long to wait for finalization after the scheduled stop.
const FINALIZE_GRACE: Duration = Duration::from_secs(5);

#[derive(Parser)]
#[command(name = "camera-session", version, about = "Record a clip or take a still")]
struct Cli {
    /// TOML configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Directory for stills and clips
    #[arg(long)]
    output_dir: Option<PathBuf>,

    /// Start with the front camera
    #[arg(long)]
    front: bool,

    /// Use the hardware camera instead of the in-process one
    #[cfg(feature = "camera")]
    #[arg(long)]
    native: bool,

    /// Serve Prometheus metrics on this port
    #[cfg(feature = "metrics")]
    #[arg(long)]
    metrics_port: Option<u16>,

    #[command(subcommand)]
    command: Option<Mode>,
}

#[derive(Subcommand)]
enum Mode {
    /// Record one clip between two delays (default)
    Record {
        #[arg(long)]
        start_delay_ms: Option<u64>,
        #[arg(long)]
        stop_delay_ms: Option<u64>,
    },
    /// Save one still
    Snapshot,
}

/// Prints notifications to stdout.
struct CliNotifier;

impl Notifier for CliNotifier {
    fn notify(&self, message: &str) {
        println!("{message}");
    }
}

/// Drives the in-process camera at the configured frame rate.
struct PreviewTicker {
    stop: Option<tokio::sync::oneshot::Sender<()>>,
    thread: Option<std::thread::JoinHandle<()>>,
}

impl PreviewTicker {
    fn spawn(platform: &MockPlatform, fps: u32) -> std::io::Result<Self> {
        let provider = platform.provider();
        let period = Duration::from_secs(1) / fps.max(1);
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()?;
        let (stop, mut stopped) = tokio::sync::oneshot::channel::<()>();

        let thread = std::thread::Builder::new()
            .name("preview-ticker".into())
            .spawn(move || {
                runtime.block_on(async move {
                    let mut interval = tokio::time::interval(period);
                    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
                    loop {
                        tokio::select! {
                            _ = &mut stopped => break,
                            _ = interval.tick() => {
                                provider.emit_preview_frame();
                            }
                        }
                    }
                });
            })?;

        Ok(Self {
            stop: Some(stop),
            thread: Some(thread),
        })
    }
}

impl Drop for PreviewTicker {
    fn drop(&mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

fn load_config(cli: &Cli) -> Result<FileConfig, String> {
    let mut config = match cli.config.as_ref() {
        Some(path) => FileConfig::from_file(path).map_err(|e| e.to_string())?,
        None => FileConfig::default(),
    };

    if let Some(dir) = cli.output_dir.as_ref() {
        config.host.output_dir = dir.clone();
    }
    if cli.front {
        config.session.lens = LensFacing::Front;
    }
    if let Some(Mode::Record {
        start_delay_ms,
        stop_delay_ms,
    }) = cli.command.as_ref()
    {
        if let Some(ms) = start_delay_ms {
            config.host.start_delay_ms = *ms;
        }
        if let Some(ms) = stop_delay_ms {
            config.host.stop_delay_ms = *ms;
        }
    }

    config.preview.validate().map_err(|e| e.to_string())?;
    config.host.validate().map_err(|e| e.to_string())?;
    Ok(config)
}

/// Picks the camera backend; the in-process one also gets a frame ticker.
#[cfg(feature = "camera")]
fn select_platform(
    cli: &Cli,
    config: &FileConfig,
) -> (Arc<dyn CameraPlatform>, Option<PreviewTicker>) {
    if cli.native {
        info!("Using hardware camera");
        let platform = camera_session::platform::NativePlatform::new(config.preview.clone());
        return (Arc::new(platform), None);
    }
    mock_platform(config)
}

#[cfg(not(feature = "camera"))]
fn select_platform(
    _cli: &Cli,
    config: &FileConfig,
) -> (Arc<dyn CameraPlatform>, Option<PreviewTicker>) {
    mock_platform(config)
}

fn mock_platform(config: &FileConfig) -> (Arc<dyn CameraPlatform>, Option<PreviewTicker>) {
    info!("Using in-process camera");
    let platform = Arc::new(MockPlatform::new(config.preview.clone()));
    let ticker = match PreviewTicker::spawn(&platform, config.preview.fps) {
        Ok(ticker) => Some(ticker),
        Err(e) => {
            warn!("Preview ticker failed to start: {}", e);
            None
        }
    };
    (platform, ticker)
}

#[cfg(feature = "metrics")]
fn metrics_port(cli: &Cli) -> Option<u16> {
    cli.metrics_port
}

#[cfg(not(feature = "metrics"))]
fn metrics_port(_cli: &Cli) -> Option<u16> {
    None
}

#[cfg(feature = "metrics")]
fn serve_metrics(port: u16, session: &CameraSession) {
    use camera_session::metrics::{MetricsRegistry, MetricsServer, MetricsServerConfig};

    let registry = match MetricsRegistry::new() {
        Ok(registry) => registry,
        Err(e) => {
            warn!("Metrics disabled: {}", e);
            return;
        }
    };
    let server = MetricsServer::new(MetricsServerConfig::with_port(port), registry);
    server.state().blocking_write().attach(session.clone());

    std::thread::spawn(move || {
        let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
            Ok(runtime) => runtime,
            Err(e) => {
                warn!("Metrics runtime failed to start: {}", e);
                return;
            }
        };
        if let Err(e) = runtime.block_on(server.run()) {
            warn!("Metrics server stopped: {}", e);
        }
    });
}

#[cfg(not(feature = "metrics"))]
fn serve_metrics(port: u16, _session: &CameraSession) {
    warn!(port, "Built without the metrics feature; not serving metrics");
}

fn run_record(
    metrics_port: Option<u16>,
    config: FileConfig,
    platform: Arc<dyn CameraPlatform>,
    main: &mut MainLoop,
) -> Result<(), String> {
    let deadline = config.host.stop_delay() + FINALIZE_GRACE;
    let quit = main.handle();
    let mut host = SessionHost::new(platform, main.handle(), config.session, config.host)
        .with_notifier(Arc::new(CliNotifier))
        .on_recording_saved(move |_| quit.quit());

    host.on_create().map_err(|e| e.to_string())?;
    info!(
        "Recording to {} in {} ms, stopping at {} ms",
        host.config().output_dir.display(),
        host.config().start_delay_ms,
        host.config().stop_delay_ms
    );

    if let (Some(port), Some(session)) = (metrics_port, host.session()) {
        serve_metrics(port, session);
    }

    main.run_for(deadline);
    if !main.is_quit() {
        warn!("No recording was saved before the deadline");
    }

    host.on_destroy();
    Ok(())
}

fn run_snapshot(
    config: FileConfig,
    platform: Arc<dyn CameraPlatform>,
    main: &mut MainLoop,
) -> Result<(), String> {
    let session = CameraSession::new(
        platform,
        main.handle(),
        config.session,
        Arc::new(NullPreview),
    )
    .map_err(|e| e.to_string())?;

    let quit = main.handle();
    session.on_capture_success(move |path| {
        println!("Photo saved: {}", path.display());
        quit.quit();
    });
    let quit = main.handle();
    session.on_error(move |e| {
        eprintln!("Camera error: {}", e);
        quit.quit();
    });

    let lifecycle = Lifecycle::new();
    lifecycle.start();
    session.start(lifecycle.clone());

    let bound = {
        let session = session.clone();
        main.run_until(FINALIZE_GRACE, move || session.is_bound())
    };
    if !bound {
        session.release();
        return Err("camera did not become ready".to_string());
    }

    std::fs::create_dir_all(&config.host.output_dir).map_err(|e| e.to_string())?;
    session.take_picture(&config.host.output_dir);
    main.run_for(FINALIZE_GRACE);

    lifecycle.destroy();
    session.release();
    Ok(())
}

fn main() {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let cli = Cli::parse();
    info!("Camera Session v{}", camera_session::VERSION);

    let config = match load_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Invalid configuration: {}", e);
            std::process::exit(1);
        }
    };

    let mut main = match MainLoop::new() {
        Ok(main) => main,
        Err(e) => {
            eprintln!("Failed to start main loop: {}", e);
            std::process::exit(1);
        }
    };
    let interrupt = main.handle();
    if let Err(e) = ctrlc::set_handler(move || interrupt.quit()) {
        warn!("Failed to install Ctrl-C handler: {}", e);
    }

    let (platform, ticker) = select_platform(&cli, &config);

    let result = match cli.command {
        Some(Mode::Snapshot) => run_snapshot(config, platform, &mut main),
        _ => run_record(metrics_port(&cli), config, platform, &mut main),
    };
    drop(ticker);

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
    info!("Done.");
}
