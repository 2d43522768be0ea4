//! voxloop - Realtime voice assistant for the terminal
//!
//! Streams microphone audio to a transcription service and answers each
//! finalized utterance with a streaming language model, one generation at
//! a time.

#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]
#![warn(clippy::let_underscore_must_use)]

pub mod app;
pub mod audio;
pub mod cli;
pub mod config;
pub mod defaults;
pub mod error;
pub mod llm;
pub mod session;
pub mod stt;

// Core traits (source → session → sink)
pub use audio::source::CaptureSource;
pub use llm::client::CompletionService;
pub use session::sink::{CollectorSink, StdoutSink, TokenSink};
pub use stt::connection::ConnectionHandler;

// Orchestration core
pub use session::gate::ReadyGate;
pub use session::orchestrator::{GenerationHandle, Orchestrator};
pub use session::queue::{Utterance, handoff_queue};
pub use session::worker::WorkerOutcome;

// Error handling
pub use error::{Result, VoxloopError};

// Config
pub use config::{Config, Credentials};

/// Build version string with optional git commit hash.
///
/// Returns `"0.1.2+abc1234"` when git hash is available, `"0.1.2"` otherwise.
pub fn version_string() -> String {
    let version = env!("CARGO_PKG_VERSION");
    match option_env!("GIT_HASH") {
        Some(hash) if !hash.is_empty() => format!("{}+{}", version, hash),
        _ => version.to_string(),
    }
}
