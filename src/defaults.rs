//! Default configuration constants for voxloop.
//!
//! This module provides shared constants used across different configuration types
//! to ensure consistency and eliminate duplication.

/// Default audio sample rate in Hz.
///
/// 16kHz is the standard for speech recognition and provides a good balance
/// between quality and computational efficiency for voice applications.
pub const SAMPLE_RATE: u32 = 16000;

/// Audio frame size in samples (i16 mono).
///
/// 2560 samples at 16kHz is 160ms of audio per frame, small enough for the
/// transcription service to keep partial transcripts responsive.
pub const FRAME_SAMPLES: usize = 2560;

/// Default debounce window in milliseconds between two transcript emissions.
pub const DEBOUNCE_MS: u64 = 400;

/// Default streaming transcription endpoint.
pub const TRANSCRIPTION_URL: &str = "wss://api.deepgram.com/v2/listen";

/// Default transcription model.
///
/// Flux models detect end-of-turn server-side, which is what drives the
/// utterance handoff.
pub const TRANSCRIPTION_MODEL: &str = "flux-general-en";

/// Wire encoding for outbound audio frames.
pub const AUDIO_ENCODING: &str = "linear16";

/// End-of-turn confidence threshold (0.0 to 1.0).
pub const EOT_THRESHOLD: f32 = 0.7;

/// End-of-turn timeout in milliseconds.
///
/// The service finalizes a turn after this much trailing silence even when
/// the confidence threshold was never reached.
pub const EOT_TIMEOUT_MS: u32 = 5000;

/// Default streaming completion endpoint (OpenAI-compatible).
pub const GENERATION_URL: &str = "https://api.groq.com/openai/v1";

/// Default generation model.
pub const GENERATION_MODEL: &str = "llama-3.3-70b-versatile";

/// Default instruction file read once at startup.
pub const INSTRUCTIONS_FILE: &str = "script.txt";

/// Consecutive capture read failures tolerated before the capture loop bails out.
pub const MAX_CONSECUTIVE_READ_ERRORS: u32 = 10;

/// Capture loop polling interval when the device has no samples ready.
pub const CAPTURE_POLL_MS: u64 = 16;
