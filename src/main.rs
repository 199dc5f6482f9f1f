//! corebridge - host integration for handheld emulation cores
//!
//! Main entry point. Runs the desktop frontend, or a headless session with
//! null audio and video sinks.

use anyhow::{bail, Context};
use cb_audio::{AudioOutput, NullAudioBackend};
use cb_core::pattern::PatternCoreFactory;
use cb_core::{logging, Config, CoreFactory};
use cb_integration::CoreBridge;
use cb_video::{NullPresenter, VideoSurface};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Debug, Parser)]
#[command(name = "corebridge", version, about)]
struct Cli {
    /// ROM image to start
    rom: Option<PathBuf>,

    /// Configuration file to use instead of the default
    #[arg(long)]
    config: Option<PathBuf>,

    /// Run without a window, discarding audio and video
    #[arg(long)]
    headless: bool,

    /// Stop a headless session after this many seconds
    #[arg(long, value_name = "SECS")]
    run_for: Option<f64>,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let (config, config_error) = match &cli.config {
        Some(path) => (
            Config::load_from(path)
                .with_context(|| format!("loading config {}", path.display()))?,
            None,
        ),
        None => match Config::load() {
            Ok(config) => (config, None),
            Err(e) => (Config::default(), Some(e)),
        },
    };

    logging::init(&config.logging).context("initialising logging")?;
    if let Some(e) = config_error {
        tracing::warn!("Using default configuration: {}", e);
    }

    tracing::info!("Starting corebridge");

    let factory: Arc<dyn CoreFactory> = Arc::new(PatternCoreFactory::new());
    if cli.headless {
        let Some(rom) = cli.rom else {
            bail!("--headless needs a ROM");
        };
        run_headless(config, factory, rom, cli.run_for)
    } else {
        cb_ui::app::run(config, factory, cli.rom)
            .map_err(|e| anyhow::anyhow!("frontend failed: {}", e))
    }
}

fn run_headless(
    config: Config,
    factory: Arc<dyn CoreFactory>,
    rom: PathBuf,
    run_for: Option<f64>,
) -> anyhow::Result<()> {
    let display_hz = config.video.display_link_hz;
    let bridge = CoreBridge::new(factory, config);

    let (presenter, _) = NullPresenter::new(240, 160);
    let surface = VideoSurface::new(Box::new(presenter));
    surface.attach_bridge(&bridge);

    bridge
        .start(&rom)
        .with_context(|| format!("starting {}", rom.display()))?;
    surface
        .start_display_link(display_hz)
        .context("starting display")?;

    let handle = bridge
        .handle()
        .context("session ended during startup")?;
    let mut audio = AudioOutput::with_backend(handle, Box::new(NullAudioBackend::new()));
    audio.start().context("starting audio")?;

    let deadline = run_for.map(|secs| Instant::now() + Duration::from_secs_f64(secs.max(0.0)));
    let mut last_report = Instant::now();
    while bridge.is_running() && deadline.map_or(true, |d| Instant::now() < d) {
        std::thread::sleep(Duration::from_millis(50));
        if last_report.elapsed() >= Duration::from_secs(1) {
            last_report = Instant::now();
            let stats = audio.stats();
            tracing::info!(
                "frame {} | audio buffers {} underruns {} | video dropped {}",
                bridge.frame_count(),
                stats.buffers,
                stats.underruns,
                surface.stats().dropped
            );
        }
    }

    audio.stop();
    surface.stop_display();
    surface.detach_bridge(&bridge);
    bridge.stop();
    tracing::info!("Headless session finished");
    Ok(())
}
