//! Mirror Cam CLI
//!
//! Runs the capture pipeline against a mock or native camera with a
//! simulated render loop and prints a summary.

use chrono::{Local, Utc};
use clap::{Parser, ValueEnum};
use mirror_cam::{
    capture::{
        CameraPosition, CaptureSource, CaptureState, DeviceProvider, FileConfig, MockProvider,
        StaticPermissions,
    },
    metrics::MetricsSnapshot,
    presenter::{DeviceOrientation, FrameSlot, Presenter},
};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Backend {
    /// Synthetic frames
    Mock,
    /// Platform camera (requires the `camera` feature)
    Native,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Position {
    Front,
    Back,
}

#[derive(Debug, Parser)]
#[command(name = "mirror-cam", version, about = "Camera preview pipeline demo")]
struct Args {
    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Camera backend
    #[arg(long, value_enum, default_value_t = Backend::Mock)]
    backend: Backend,

    /// Camera to use, overriding the config file
    #[arg(long, value_enum)]
    position: Option<Position>,

    /// Number of render ticks before exiting
    #[arg(long)]
    frames: Option<u32>,

    /// Run until interrupted
    #[arg(long)]
    continuous: bool,

    /// Manual exposure ISO applied after start
    #[arg(long)]
    iso: Option<f32>,

    /// Corrupt every Nth mock buffer to exercise frame dropping
    #[arg(long, default_value_t = 0)]
    corrupt_every: u64,

    /// Cycle the device orientation once per second
    #[arg(long)]
    rotate: bool,

    /// Serve Prometheus metrics on this port (requires the `metrics` feature)
    #[arg(long)]
    metrics_port: Option<u16>,
}

const ROTATION_CYCLE: [DeviceOrientation; 4] = [
    DeviceOrientation::Portrait,
    DeviceOrientation::LandscapeRight,
    DeviceOrientation::PortraitUpsideDown,
    DeviceOrientation::LandscapeLeft,
];

fn main() {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let args = Args::parse();
    info!("Mirror Cam v{}", mirror_cam::VERSION);

    let mut config = match &args.config {
        Some(path) => match FileConfig::from_file(path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("Failed to load config {}: {}", path.display(), e);
                std::process::exit(2);
            }
        },
        None => FileConfig::default(),
    };
    if let Some(position) = args.position {
        config.capture.position = match position {
            Position::Front => CameraPosition::Front,
            Position::Back => CameraPosition::Back,
        };
    }
    if let Some(frames) = args.frames {
        config.output.frame_count = frames;
    }
    config.output.continuous |= args.continuous;
    if let Some(port) = args.metrics_port {
        config.output.metrics_port = port;
    }

    let provider = match build_provider(&args) {
        Some(provider) => provider,
        None => {
            eprintln!("Native backend requested but built without the `camera` feature");
            std::process::exit(2);
        }
    };

    let slot = FrameSlot::new();
    let source = CaptureSource::new(provider, Arc::new(StaticPermissions::granted()), slot.clone());

    if let Err(e) = source.start(config.capture.clone()) {
        eprintln!("Failed to start capture: {}", e);
        std::process::exit(1);
    }

    if let Some(iso) = args.iso {
        match source.exposure_range() {
            Some(range) => info!(min = range.min, max = range.max, "Manual exposure range"),
            None => warn!("Device reports no manual exposure range"),
        }
        if let Err(e) = source.set_exposure_iso(iso) {
            warn!("Manual exposure not applied: {}", e);
        }
    }

    let running = Arc::new(AtomicBool::new(true));
    {
        let running = Arc::clone(&running);
        if let Err(e) = ctrlc::set_handler(move || running.store(false, Ordering::SeqCst)) {
            warn!("Failed to install Ctrl-C handler: {}", e);
        }
    }

    let publish_metrics = start_metrics(config.output.metrics_port);

    let mut presenter = Presenter::new(&slot, &config.presenter);
    let viewport = config.presenter.viewport();
    let refresh_hz = config.presenter.refresh_hz.max(1);
    let tick = Duration::from_secs(1) / refresh_hz;

    let started_at = Local::now();
    let started = Instant::now();
    let mut ticks: u64 = 0;
    let mut rendered: u64 = 0;

    info!(
        refresh_hz,
        continuous = config.output.continuous,
        "Rendering preview..."
    );

    while running.load(Ordering::SeqCst) {
        if !config.output.continuous && ticks >= u64::from(config.output.frame_count) {
            break;
        }
        if source.state() == CaptureState::Stopped {
            warn!("Capture stopped unexpectedly");
            break;
        }

        if args.rotate && ticks % u64::from(refresh_hz) == 0 {
            let step = (ticks / u64::from(refresh_hz)) as usize;
            presenter.on_orientation_changed(ROTATION_CYCLE[step % ROTATION_CYCLE.len()]);
        }

        if let Some(plan) = presenter.render_plan(viewport) {
            rendered += 1;
            tracing::trace!(
                sequence = plan.frame.sequence(),
                orientation = ?plan.orientation,
                scale = plan.scale,
                "Render"
            );
        }

        if let Some(publish) = &publish_metrics {
            publish(&MetricsSnapshot::from_components(
                source.state(),
                &source.stats(),
                &presenter,
            ));
        }

        ticks += 1;
        std::thread::sleep(tick);
    }

    let stats = source.stats();
    source.stop();

    let elapsed = started.elapsed().as_secs_f64();
    info!(
        "Processed {} buffers: {} published, {} dropped, {} presented",
        stats.frames_captured,
        stats.frames_published,
        stats.frames_dropped,
        presenter.frames_presented()
    );

    println!("Started:        {}", started_at.to_rfc3339());
    println!("Duration:       {:.2}s", elapsed);
    println!("Render ticks:   {} ({} with a frame)", ticks, rendered);
    println!(
        "Capture rate:   {:.1} fps",
        stats.frames_published as f64 / elapsed.max(f64::EPSILON)
    );
    if let Some(frame) = presenter.current_frame() {
        let age = Utc::now().signed_duration_since(frame.captured_at());
        println!(
            "Last frame:     #{} {}x{} ({} ms old)",
            frame.sequence(),
            frame.width(),
            frame.height(),
            age.num_milliseconds()
        );
    }
    println!("Orientation:    {:?}", presenter.orientation());
}

fn build_provider(args: &Args) -> Option<Arc<dyn DeviceProvider>> {
    match args.backend {
        Backend::Mock => {
            let provider = MockProvider::new();
            if args.corrupt_every > 0 {
                for id in ["mock-front", "mock-back"] {
                    if let Some(device) = provider.device(id) {
                        device.corrupt_every(args.corrupt_every);
                    }
                }
            }
            Some(Arc::new(provider))
        }
        #[cfg(feature = "camera")]
        Backend::Native => Some(Arc::new(mirror_cam::capture::NativeProvider::new())),
        #[cfg(not(feature = "camera"))]
        Backend::Native => None,
    }
}

type MetricsPublisher = Box<dyn Fn(&MetricsSnapshot)>;

#[cfg(feature = "metrics")]
fn start_metrics(port: u16) -> Option<MetricsPublisher> {
    use mirror_cam::metrics::{MetricsRegistry, MetricsServer, MetricsServerConfig};

    if port == 0 {
        return None;
    }

    let registry = match MetricsRegistry::new() {
        Ok(registry) => registry,
        Err(e) => {
            warn!("Metrics disabled: {}", e);
            return None;
        }
    };
    let server = MetricsServer::new(MetricsServerConfig::with_port(port), registry);
    let state = server.state();

    let spawned = std::thread::Builder::new()
        .name("metrics".to_string())
        .spawn(move || {
            let runtime = match tokio::runtime::Builder::new_multi_thread()
                .worker_threads(1)
                .enable_all()
                .build()
            {
                Ok(runtime) => runtime,
                Err(e) => {
                    warn!("Failed to start metrics runtime: {}", e);
                    return;
                }
            };
            if let Err(e) = runtime.block_on(server.run()) {
                warn!("Metrics server stopped: {}", e);
            }
        });
    if let Err(e) = spawned {
        warn!("Failed to spawn metrics thread: {}", e);
        return None;
    }

    Some(Box::new(move |snapshot| state.blocking_write().update(snapshot)))
}

#[cfg(not(feature = "metrics"))]
fn start_metrics(port: u16) -> Option<MetricsPublisher> {
    if port != 0 {
        warn!("Built without the `metrics` feature; metrics port {} ignored", port);
    }
    None
}
