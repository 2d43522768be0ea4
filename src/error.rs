//! Error types for voxloop.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum VoxloopError {
    // Startup errors
    #[error("Missing credential: set the {name} environment variable")]
    MissingCredential { name: String },

    #[error("Instruction file not found at {path}")]
    InstructionsNotFound { path: String },

    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    // Audio capture errors
    #[error("Audio device not found: {device}")]
    AudioDeviceNotFound { device: String },

    #[error("Audio capture failed: {message}")]
    AudioCapture { message: String },

    // Transcription connection errors
    #[error("Transcription connection failed: {message}")]
    TranscriptionConnect { message: String },

    // Generation errors
    #[error("Generation request failed: {message}")]
    GenerationRequest { message: String },

    #[error("Generation stream failed: {message}")]
    GenerationStream { message: String },

    // General I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // Generic error for cases not covered above
    #[error("{0}")]
    Other(String),
}

// Type alias for convenience
pub type Result<T> = std::result::Result<T, VoxloopError>;
