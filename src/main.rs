//! dictation-core — microphone capture and transcription pipeline.
//!
//! The host UI drives this process over JSON-line IPC: commands arrive on
//! stdin (start/stop recording, device listing), events go out on stdout
//! (recording state, transcriptions, errors). What the host does with the
//! text (word-processor embedding, printing, saving) is its own business.

mod audio;
mod config;
mod ipc;
mod stt;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use audio::{list_input_devices, wav_dump, CaptureSession};
use config::Settings;
use ipc::bridge::{emit_error, emit_event, spawn_stdin_reader};
use ipc::{HostCommand, HostEvent};
use stt::whisper::WhisperStt;
use stt::TranscriptionAdapter;

#[tokio::main]
async fn main() {
    let data_dir = config::paths::data_dir();
    let _log_guard = init_tracing(&data_dir);

    // Emit starting event immediately so the host knows we're alive.
    emit_event(&HostEvent::Starting {});

    if let Err(e) = run(data_dir).await {
        error!("Fatal: {e:#}");
        emit_error(&format!("{e:#}"));
        std::process::exit(1);
    }
}

/// Logging to stderr plus a daily rolling file; stdout stays protocol-clean.
/// Respects RUST_LOG, defaults to info.
fn init_tracing(data_dir: &Path) -> tracing_appender::non_blocking::WorkerGuard {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let log_dir = data_dir.join("logs");
    let _ = std::fs::create_dir_all(&log_dir);
    let (file_writer, guard) = tracing_appender::non_blocking(tracing_appender::rolling::daily(
        log_dir,
        "dictation-core.log",
    ));

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(fmt::layer().with_ansi(false).with_writer(file_writer))
        .init();

    guard
}

async fn run(data_dir: PathBuf) -> anyhow::Result<()> {
    let settings = config::read_settings();
    info!(?settings, "Settings loaded");

    emit_event(&HostEvent::Loading {
        step: "Preparing whisper model...".to_string(),
    });
    let model_path = stt::whisper::ensure_model(&data_dir, &settings.model_size)
        .await
        .context("whisper model provisioning failed")?;

    emit_event(&HostEvent::Loading {
        step: "Loading whisper model...".to_string(),
    });
    let engine =
        WhisperStt::new(&model_path, &settings.language).context("whisper model load failed")?;
    let adapter = Arc::new(TranscriptionAdapter::new(engine));

    let mut cmd_rx = spawn_stdin_reader();
    // Mid-recording stream failures (device disconnect) from the cpal error
    // callback, and finished transcriptions from worker tasks.
    let (failure_tx, mut failure_rx) = mpsc::unbounded_channel();
    let (result_tx, mut result_rx) = mpsc::unbounded_channel();

    let mut core = Core {
        settings,
        data_dir,
        session: CaptureSession::new(failure_tx),
        adapter,
        result_tx,
    };

    emit_event(&HostEvent::Ready {});
    info!("Dictation core ready");

    loop {
        tokio::select! {
            cmd = cmd_rx.recv() => {
                match cmd {
                    Some(command) => {
                        if !core.handle_command(command) {
                            break; // Stop command received
                        }
                    }
                    None => {
                        // stdin closed — host process gone
                        info!("stdin closed, shutting down");
                        break;
                    }
                }
            }
            Some(text) = result_rx.recv() => {
                emit_event(&HostEvent::Transcription { text });
            }
            Some(err) = failure_rx.recv() => {
                warn!("Capture session failed: {err}");
                // A failure arriving after stop already drained the session
                // is stale; only an active session needs tearing down.
                if core.session.is_recording() {
                    core.session.abort();
                    emit_error(&err.to_string());
                }
            }
        }
    }

    info!("Dictation core shutting down");
    Ok(())
}

/// Control-loop state: the capture session and the shared transcription
/// adapter.
struct Core {
    settings: Settings,
    data_dir: PathBuf,
    session: CaptureSession,
    adapter: Arc<TranscriptionAdapter<WhisperStt>>,
    result_tx: mpsc::UnboundedSender<String>,
}

impl Core {
    /// Handle a single command from the host.
    /// Returns `false` if the control loop should exit.
    fn handle_command(&mut self, cmd: HostCommand) -> bool {
        match cmd {
            HostCommand::Ping {} => {
                emit_event(&HostEvent::Pong {});
            }

            HostCommand::Stop {} => {
                emit_event(&HostEvent::Stopping {});
                return false;
            }

            HostCommand::ListAudioDevices {} => match list_input_devices() {
                Ok(input) => emit_event(&HostEvent::AudioDevices { input }),
                Err(e) => {
                    warn!("Device enumeration failed: {e}");
                    emit_error(&e.to_string());
                }
            },

            HostCommand::StartRecording { device } => {
                let chosen = device.or_else(|| self.settings.input_device.clone());
                match self.session.start(chosen.as_deref()) {
                    Ok(()) => emit_event(&HostEvent::RecordingStart {}),
                    Err(e) => {
                        warn!("Failed to start recording: {e}");
                        emit_error(&e.to_string());
                    }
                }
            }

            HostCommand::StopRecording {} => {
                let buffer = self.session.stop();
                emit_event(&HostEvent::RecordingStop {});

                if self.settings.keep_last_recording {
                    if let Some(samples) = &buffer {
                        match wav_dump::write_recording(&self.data_dir, samples) {
                            Ok(path) => info!(path = %path.display(), "Recording dumped"),
                            Err(e) => warn!("Failed to dump recording: {e:#}"),
                        }
                    }
                }

                // The host always gets a transcription event per stop; an
                // empty or silent capture yields "" without engine work.
                let adapter = Arc::clone(&self.adapter);
                let result_tx = self.result_tx.clone();
                tokio::spawn(async move {
                    let text = adapter.transcribe(buffer).await;
                    let _ = result_tx.send(text);
                });
            }
        }

        true
    }
}
