use crate::defaults;
use crate::error::{Result, VoxloopError};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Root configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    pub audio: AudioConfig,
    pub transcription: TranscriptionConfig,
    pub generation: GenerationConfig,
    pub session: SessionConfig,
}

/// Audio capture configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AudioConfig {
    pub device: Option<String>,
    pub sample_rate: u32,
    pub frame_samples: usize,
}

/// Streaming transcription configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TranscriptionConfig {
    pub url: String,
    pub model: String,
    pub encoding: String,
    pub eot_threshold: f32,
    pub eot_timeout_ms: u32,
}

/// Streaming completion configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GenerationConfig {
    pub base_url: String,
    pub model: String,
}

/// Session behavior configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SessionConfig {
    pub debounce_ms: u64,
    pub instructions: PathBuf,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            device: None,
            sample_rate: defaults::SAMPLE_RATE,
            frame_samples: defaults::FRAME_SAMPLES,
        }
    }
}

impl Default for TranscriptionConfig {
    fn default() -> Self {
        Self {
            url: defaults::TRANSCRIPTION_URL.to_string(),
            model: defaults::TRANSCRIPTION_MODEL.to_string(),
            encoding: defaults::AUDIO_ENCODING.to_string(),
            eot_threshold: defaults::EOT_THRESHOLD,
            eot_timeout_ms: defaults::EOT_TIMEOUT_MS,
        }
    }
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            base_url: defaults::GENERATION_URL.to_string(),
            model: defaults::GENERATION_MODEL.to_string(),
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            debounce_ms: defaults::DEBOUNCE_MS,
            instructions: PathBuf::from(defaults::INSTRUCTIONS_FILE),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// Returns an error if the file contains invalid TOML.
    /// Missing fields will use default values.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Load configuration from a file or return defaults if file doesn't exist
    ///
    /// Only returns defaults if the file is missing.
    /// Returns errors for invalid TOML.
    pub fn load_or_default(path: &Path) -> Self {
        match Self::load(path) {
            Ok(config) => config,
            Err(e) => {
                if e.downcast_ref::<std::io::Error>()
                    .map(|io_err| io_err.kind() == std::io::ErrorKind::NotFound)
                    .unwrap_or(false)
                {
                    Self::default()
                } else {
                    // Re-panic on invalid TOML or other errors
                    panic!("Failed to load config from {}: {}", path.display(), e);
                }
            }
        }
    }

    /// Apply environment variable overrides
    ///
    /// Supported environment variables:
    /// - VOXLOOP_DEVICE → audio.device
    /// - VOXLOOP_TRANSCRIPTION_MODEL → transcription.model
    /// - VOXLOOP_GENERATION_MODEL → generation.model
    /// - VOXLOOP_INSTRUCTIONS → session.instructions
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(device) = std::env::var("VOXLOOP_DEVICE")
            && !device.is_empty()
        {
            self.audio.device = Some(device);
        }

        if let Ok(model) = std::env::var("VOXLOOP_TRANSCRIPTION_MODEL")
            && !model.is_empty()
        {
            self.transcription.model = model;
        }

        if let Ok(model) = std::env::var("VOXLOOP_GENERATION_MODEL")
            && !model.is_empty()
        {
            self.generation.model = model;
        }

        if let Ok(path) = std::env::var("VOXLOOP_INSTRUCTIONS")
            && !path.is_empty()
        {
            self.session.instructions = PathBuf::from(path);
        }

        self
    }

    /// Get the default configuration file path
    ///
    /// Returns ~/.config/voxloop/config.toml on Linux
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .expect("Could not determine config directory")
            .join("voxloop")
            .join("config.toml")
    }
}

/// API credentials for the two external services.
///
/// Both keys are required; the pipeline cannot start without them.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub transcription_key: String,
    pub generation_key: String,
}

impl Credentials {
    /// Read credentials from the environment.
    ///
    /// Returns `MissingCredential` naming the first absent variable.
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            transcription_key: require_env("DEEPGRAM_API_KEY")?,
            generation_key: require_env("GROQ_API_KEY")?,
        })
    }
}

fn require_env(name: &str) -> Result<String> {
    match std::env::var(name) {
        Ok(value) if !value.is_empty() => Ok(value),
        _ => Err(VoxloopError::MissingCredential {
            name: name.to_string(),
        }),
    }
}

/// Load the static instruction text consumed by every generation.
///
/// Read once at startup; a missing or unreadable file is a fatal error.
pub fn load_instructions(path: &Path) -> Result<String> {
    fs::read_to_string(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            VoxloopError::InstructionsNotFound {
                path: path.display().to_string(),
            }
        } else {
            VoxloopError::Io(e)
        }
    })
}
