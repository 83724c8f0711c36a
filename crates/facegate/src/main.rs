use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyModifiers};
use facegate_core::{
    AccessController, ActuatorCommand, ActuatorLink, FrameOutcome, OnnxLbphVision,
    ProfileStore, SqliteProfileStore, Verdict,
};
use facegate_hw::camera::CaptureSession;
use facegate_hw::{Camera, SerialLink};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

mod config;

use config::Config;

#[derive(Parser)]
#[command(name = "facegate", about = "Face-gated door access terminal")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the access terminal (camera loop + operator keys)
    Run {
        /// Do not open the serial port; log actuator commands instead
        #[arg(long)]
        simulate_link: bool,
    },
    /// Show the persisted enrollment state without opening the camera
    Status,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let config = Config::from_env();

    match cli.command {
        Commands::Run { simulate_link } => run(&config, simulate_link),
        Commands::Status => status(&config),
    }
}

fn status(config: &Config) -> Result<()> {
    let store = SqliteProfileStore::open(&config.db_path)
        .with_context(|| format!("opening profile store at {}", config.db_path.display()))?;

    let summary = match store.load() {
        Ok(Some(profile)) => serde_json::json!({
            "trained": true,
            "name": profile.name,
            "enrolled_at": profile.enrolled_at,
        }),
        Ok(None) => serde_json::json!({ "trained": false }),
        Err(e) => serde_json::json!({ "trained": false, "error": e.to_string() }),
    };

    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

fn run(config: &Config, simulate_link: bool) -> Result<()> {
    let vision = OnnxLbphVision::load(&config.detector_model_path())
        .with_context(|| format!("loading detection model from {}", config.model_dir.display()))?;

    let store = SqliteProfileStore::open(&config.db_path)
        .with_context(|| format!("opening profile store at {}", config.db_path.display()))?;

    let mut link = if simulate_link {
        SerialLink::simulated()
    } else {
        SerialLink::open_or_simulated(&config.serial_port, config.baud)
    };
    link.send(ActuatorCommand::SystemReady);

    let mut controller = AccessController::new(vision, store, link);
    controller.load_profile();

    let camera = Camera::open(&config.camera_device)
        .with_context(|| format!("opening camera {}", config.camera_device))?;
    let mut session = camera.stream().context("starting capture stream")?;
    session.warmup(config.warmup_frames);

    tracing::info!("access terminal ready");
    tracing::info!("keys: [e]nroll  [r]ecognize  [s]tatus  [c]lear  [q]uit");

    let _guard = RawModeGuard::enable()?;
    frame_loop(&mut controller, &mut session)
}

/// The single-threaded, frame-synchronous loop: one frame is fully processed
/// (detect, decide, signal) before the next is accepted.
fn frame_loop(
    controller: &mut AccessController<OnnxLbphVision, SqliteProfileStore, SerialLink>,
    session: &mut CaptureSession<'_>,
) -> Result<()> {
    let mut last_outcome: Option<FrameOutcome> = None;

    loop {
        if !handle_keys(controller)? {
            break;
        }

        let frame = match session.next_frame() {
            Ok(frame) => frame,
            Err(e) => {
                tracing::warn!(error = %e, "frame capture failed, retrying");
                continue;
            }
        };

        if CaptureSession::is_dark(&frame) {
            tracing::debug!(seq = frame.sequence, "skipping dark frame");
            continue;
        }

        match controller.process_frame(&frame.data, frame.width, frame.height) {
            Ok(report) => {
                if last_outcome != Some(report.outcome) {
                    log_outcome(&report.outcome, report.faces, report.verdict);
                    last_outcome = Some(report.outcome);
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "frame skipped");
            }
        }
    }

    tracing::info!("access terminal shutting down");
    Ok(())
}

/// Drain pending key events. Returns false when the operator quits.
fn handle_keys(
    controller: &mut AccessController<OnnxLbphVision, SqliteProfileStore, SerialLink>,
) -> Result<bool> {
    while event::poll(Duration::ZERO)? {
        let Event::Key(KeyEvent {
            code, modifiers, ..
        }) = event::read()?
        else {
            continue;
        };

        if code == KeyCode::Char('c') && modifiers.contains(KeyModifiers::CONTROL) {
            return Ok(false);
        }

        match code {
            KeyCode::Char('q') | KeyCode::Esc => return Ok(false),
            KeyCode::Char('e') => controller.request_enroll(),
            KeyCode::Char('r') => {
                if let Err(e) = controller.request_recognize() {
                    tracing::warn!(error = %e, "recognition not started");
                }
            }
            KeyCode::Char('s') => {
                let json = serde_json::to_string_pretty(&controller.status())?;
                // Raw mode: carriage returns are not implied by newlines.
                print!("{}\r\n", json.replace('\n', "\r\n"));
            }
            KeyCode::Char('c') => {
                if let Err(e) = controller.clear_profile() {
                    tracing::warn!(error = %e, "failed to clear profile");
                }
            }
            _ => {}
        }
    }
    Ok(true)
}

fn log_outcome(outcome: &FrameOutcome, faces: usize, verdict: Option<Verdict>) {
    match outcome {
        FrameOutcome::AccessGranted => {
            if let Some(Verdict::Authorized(confidence)) = verdict {
                tracing::info!(faces, confidence, "ACCESS GRANTED");
            } else {
                tracing::info!(faces, "ACCESS GRANTED");
            }
        }
        FrameOutcome::AccessDenied => match verdict {
            Some(Verdict::Unknown(confidence)) => {
                tracing::info!(faces, confidence, "ACCESS DENIED: unknown face");
            }
            Some(Verdict::Error) => {
                tracing::info!(faces, "ACCESS DENIED: match error");
            }
            _ => tracing::info!(faces, "ACCESS DENIED"),
        },
        FrameOutcome::EnrollComplete => tracing::info!("face enrolled"),
        FrameOutcome::Ready => tracing::info!(faces, "ready, press R to start recognition"),
        FrameOutcome::Waiting => tracing::info!("waiting for a face"),
    }
}

/// Restores the terminal on every exit path.
struct RawModeGuard;

impl RawModeGuard {
    fn enable() -> Result<Self> {
        crossterm::terminal::enable_raw_mode()?;
        Ok(Self)
    }
}

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        let _ = crossterm::terminal::disable_raw_mode();
    }
}
