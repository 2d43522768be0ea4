//! Voice session entry point.
//!
//! Wires the complete flow: capture → transcription connection →
//! dispatcher → handoff queue → single-flight orchestrator → stdout.

use crate::audio::capture::{CpalCaptureSource, suppress_audio_warnings};
use crate::audio::source::{CaptureSource, pcm_bytes};
use crate::config::{Config, Credentials};
use crate::defaults;
use crate::error::{Result, VoxloopError};
use crate::llm::client::CompletionClient;
use crate::session::dispatcher::Dispatcher;
use crate::session::gate::ReadyGate;
use crate::session::orchestrator::Orchestrator;
use crate::session::queue::handoff_queue;
use crate::session::sink::{StdoutSink, TokenSink};
use crate::stt::connection::{self, AudioSender, ListenConfig};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Run the voice session until interrupted.
///
/// Blocks on Ctrl+C, then performs the shutdown sequence: cancel the
/// orchestrator loop (tearing down any active generation), then release
/// the capture device.
pub async fn run(
    config: Config,
    credentials: Credentials,
    instructions: String,
    quiet: bool,
    verbosity: u8,
) -> Result<()> {
    // Suppress noisy JACK/ALSA warnings before audio init
    suppress_audio_warnings();

    if !quiet {
        eprintln!("voxloop {}", crate::version_string());
    }

    // Open the microphone first so a missing device fails before any
    // network work.
    let mut source: Box<dyn CaptureSource> = Box::new(CpalCaptureSource::with_sample_rate(
        config.audio.device.as_deref(),
        config.audio.sample_rate,
    )?);
    source.start()?;

    let listen = ListenConfig {
        model: config.transcription.model.clone(),
        encoding: config.transcription.encoding.clone(),
        sample_rate: config.audio.sample_rate,
        eot_threshold: config.transcription.eot_threshold,
        eot_timeout_ms: config.transcription.eot_timeout_ms,
    };
    let conn = connection::connect(
        &config.transcription.url,
        &credentials.transcription_key,
        &listen,
    )
    .await?;
    let audio = conn.audio_sender();

    let (utterance_tx, utterance_rx) = handoff_queue();
    let gate = Arc::new(ReadyGate::new());

    let service = Arc::new(CompletionClient::new(
        config.generation.base_url.clone(),
        credentials.generation_key.clone(),
    ));
    let orchestrator = Orchestrator::new(
        service,
        config.generation.model.clone(),
        Arc::from(instructions),
        Box::new(|| Box::new(StdoutSink::new()) as Box<dyn TokenSink>),
    );
    let shutdown = CancellationToken::new();
    let orchestrator_task = tokio::spawn(orchestrator.run(utterance_rx, shutdown.clone()));

    // Capture loop on its own thread; it parks on the gate until the
    // connection reports open.
    let running = Arc::new(AtomicBool::new(true));
    let capture_thread = {
        let gate = gate.clone();
        let running = running.clone();
        let frame_samples = config.audio.frame_samples;
        thread::spawn(move || capture_loop(source, audio, gate, running, frame_samples))
    };

    // Listener thread drives dispatcher callbacks. It ends with the
    // connection; the session itself only ends on Ctrl+C.
    let mut dispatcher = Dispatcher::new(
        utterance_tx,
        gate.clone(),
        Duration::from_millis(config.session.debounce_ms),
        verbosity,
    );
    thread::spawn(move || conn.start_listening(&mut dispatcher));

    tokio::signal::ctrl_c()
        .await
        .map_err(|e| VoxloopError::Other(format!("Failed to wait for Ctrl+C: {}", e)))?;

    if !quiet {
        eprintln!("\nShutting down...");
    }

    // Shutdown order: generation loop first, then the capture device.
    shutdown.cancel();
    let _ = orchestrator_task.await;

    running.store(false, Ordering::SeqCst);
    gate.signal(); // release a capture thread still parked on the gate
    if capture_thread.join().is_err() {
        eprintln!("voxloop: capture thread panicked");
    }

    Ok(())
}

/// Capture loop: wait for connection readiness, then forward fixed-size
/// PCM frames to the connection unconditionally until shutdown.
fn capture_loop(
    mut source: Box<dyn CaptureSource>,
    audio: AudioSender,
    gate: Arc<ReadyGate>,
    running: Arc<AtomicBool>,
    frame_samples: usize,
) {
    gate.wait();

    let poll_interval = Duration::from_millis(defaults::CAPTURE_POLL_MS);
    let mut consecutive_errors: u32 = 0;

    while running.load(Ordering::SeqCst) {
        match source.read_frame(frame_samples) {
            Ok(samples) if samples.is_empty() => {
                // Device warming up or between frames
                thread::sleep(poll_interval);
            }
            Ok(samples) => {
                consecutive_errors = 0;
                audio.send(pcm_bytes(&samples));
            }
            Err(e) => {
                consecutive_errors += 1;
                if consecutive_errors >= defaults::MAX_CONSECUTIVE_READ_ERRORS {
                    eprintln!(
                        "voxloop: audio capture failed {consecutive_errors} times in a row: {e}"
                    );
                    eprintln!("voxloop: check your microphone connection and try again");
                    break;
                }
                thread::sleep(poll_interval);
            }
        }
    }

    // Stop and close the device stream, tolerating a mid-read shutdown.
    if let Err(e) = source.stop() {
        eprintln!("voxloop: failed to stop audio capture: {e}");
    }
}
