//! Conepilot: camera frames in, steering and light codes out over serial

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use color_eyre::Result;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use conepilot::capture::{BufferPool, CaptureSource, SyntheticSource, V4l2Capture};
use conepilot::pipeline::{FramePump, PipelineStatus, PumpSummary, StatusBoard};
use conepilot::serial::SerialExchange;
use conepilot::{utils, Config, SourceKind};

/// Exit status when the loop never got to capture.
const SETUP_FAILURE: u8 = 128;
const CONFIG_ENV: &str = "CONEPILOT_CONFIG";
const DEFAULT_CONFIG_FILE: &str = "conepilot.toml";

struct Setup {
    pump: FramePump,
    source: Box<dyn CaptureSource>,
    board: Arc<StatusBoard>,
    stop: Arc<AtomicBool>,
    timeout: Option<Duration>,
}

#[tokio::main]
async fn main() -> ExitCode {
    // Initialize error handling and logging
    if let Err(e) = color_eyre::install() {
        eprintln!("failed to install error reporter: {e}");
    }
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("conepilot=debug")),
        )
        .with_timer(tracing_subscriber::fmt::time::uptime())
        .init();

    info!("Conepilot Launching...");

    let setup = match setup() {
        Ok(setup) => setup,
        Err(report) => {
            error!("Setup failed: {:?}", report);
            return ExitCode::from(SETUP_FAILURE);
        }
    };
    let board = setup.board.clone();

    match run(setup).await {
        Ok(summary) => {
            report(&summary, &board.load());
            info!("Conepilot shutting down");
            ExitCode::SUCCESS
        }
        Err(report) => {
            error!("Capture failed to start: {:?}", report);
            ExitCode::from(SETUP_FAILURE)
        }
    }
}

fn setup() -> Result<Setup> {
    let path = std::env::var_os(CONFIG_ENV)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));
    let mut config = Config::load(Some(&path))?;

    // Any argument switches to the fixed thresholds
    if std::env::args().nth(1).is_some() {
        info!(
            u = config.calibration.default_u,
            v = config.calibration.default_v,
            "fixed color calibration"
        );
        config.calibration.enabled = false;
    }

    let mut source: Box<dyn CaptureSource> = match config.capture.source {
        SourceKind::V4l2 => {
            if config.capture.device.path.is_empty() {
                config.capture.device = utils::auto_detect_device()?;
            }
            info!("Using capture device: {:?}", config.capture.device);
            Box::new(V4l2Capture::new(config.capture.clone())?)
        }
        SourceKind::Synthetic => {
            info!("Using synthetic capture source");
            Box::new(
                SyntheticSource::new(config.capture.width, config.capture.height)
                    .with_fps(config.capture.fps),
            )
        }
    };

    let serial = if config.serial.port.is_empty() {
        warn!("No serial port configured, running open loop");
        None
    } else {
        Some(SerialExchange::open(&config.serial)?)
    };

    // The source owns the storage: mapped driver buffers or heap frames
    let buffers = source.allocate(config.capture.buffer_count as usize)?;
    let pool = Arc::new(BufferPool::from_buffers(buffers)?);
    let board = Arc::new(StatusBoard::new());
    let stop = Arc::new(AtomicBool::new(false));
    let pump = FramePump::new(&config, pool, serial, board.clone(), stop.clone())?;

    let timeout = (config.pipeline.timeout_ms > 0)
        .then(|| Duration::from_millis(config.pipeline.timeout_ms));

    Ok(Setup {
        pump,
        source,
        board,
        stop,
        timeout,
    })
}

async fn run(setup: Setup) -> Result<PumpSummary> {
    let Setup {
        pump,
        source,
        stop,
        timeout,
        ..
    } = setup;

    let mut handle = tokio::task::spawn_blocking(move || pump.run(source));

    let reason = tokio::select! {
        finished = &mut handle => return Ok(finished??),
        _ = tokio::signal::ctrl_c() => "interrupt",
        _ = expire(timeout) => "timeout",
    };

    info!("{} received, draining", reason);
    stop.store(true, Ordering::Release);
    Ok(handle.await??)
}

async fn expire(timeout: Option<Duration>) {
    match timeout {
        Some(timeout) => tokio::time::sleep(timeout).await,
        None => std::future::pending().await,
    }
}

fn report(summary: &PumpSummary, status: &PipelineStatus) {
    info!(
        "{:.0} seconds for {} frames : FPS = {:.2}",
        summary.elapsed.as_secs_f64(),
        status.frames_processed,
        summary.average_fps
    );
    info!(
        dropped = status.frames_dropped,
        starved = status.pool_starved,
        serial_errors = status.serial_errors,
        leaked = summary.leaked_buffers,
        mode = %status.mode,
        state = %status.state,
        "final status"
    );
    if let Some(last) = status.last_frame {
        info!(
            sequence = last.sequence,
            "Last result: Offset: {:3.2}  Angle: {:3.2}  Light: {:?}",
            last.steer.offset,
            last.steer.angle,
            last.light
        );
    }
}
