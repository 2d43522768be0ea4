use crate::error::{Result, VoxloopError};

/// Trait for audio capture devices.
///
/// This trait allows swapping implementations (real audio device vs mock).
pub trait CaptureSource: Send {
    /// Start capturing audio from the device.
    fn start(&mut self) -> Result<()>;

    /// Stop capturing and release the device stream.
    fn stop(&mut self) -> Result<()>;

    /// Read up to `frame_samples` 16-bit PCM samples.
    ///
    /// Returns an empty vector when a full frame is not yet available;
    /// the caller polls.
    fn read_frame(&mut self, frame_samples: usize) -> Result<Vec<i16>>;
}

/// Serialize PCM samples as little-endian bytes for the wire.
pub fn pcm_bytes(samples: &[i16]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(samples.len() * 2);
    for sample in samples {
        bytes.extend_from_slice(&sample.to_le_bytes());
    }
    bytes
}

/// Mock capture source for testing
#[derive(Debug, Clone)]
pub struct MockCaptureSource {
    is_started: bool,
    samples: Vec<i16>,
    should_fail_start: bool,
    should_fail_stop: bool,
    should_fail_read: bool,
    error_message: String,
}

impl MockCaptureSource {
    /// Create a new mock capture source with default settings
    pub fn new() -> Self {
        Self {
            is_started: false,
            samples: vec![0i16; 160],
            should_fail_start: false,
            should_fail_stop: false,
            should_fail_read: false,
            error_message: "mock audio error".to_string(),
        }
    }

    /// Configure the mock to return specific samples
    pub fn with_samples(mut self, samples: Vec<i16>) -> Self {
        self.samples = samples;
        self
    }

    /// Configure the mock to fail on start
    pub fn with_start_failure(mut self) -> Self {
        self.should_fail_start = true;
        self
    }

    /// Configure the mock to fail on stop
    pub fn with_stop_failure(mut self) -> Self {
        self.should_fail_stop = true;
        self
    }

    /// Configure the mock to fail on read
    pub fn with_read_failure(mut self) -> Self {
        self.should_fail_read = true;
        self
    }

    /// Configure the error message for failures
    pub fn with_error_message(mut self, message: &str) -> Self {
        self.error_message = message.to_string();
        self
    }

    /// Check if the capture source is started
    pub fn is_started(&self) -> bool {
        self.is_started
    }
}

impl Default for MockCaptureSource {
    fn default() -> Self {
        Self::new()
    }
}

impl CaptureSource for MockCaptureSource {
    fn start(&mut self) -> Result<()> {
        if self.should_fail_start {
            Err(VoxloopError::AudioCapture {
                message: self.error_message.clone(),
            })
        } else {
            self.is_started = true;
            Ok(())
        }
    }

    fn stop(&mut self) -> Result<()> {
        if self.should_fail_stop {
            Err(VoxloopError::AudioCapture {
                message: self.error_message.clone(),
            })
        } else {
            self.is_started = false;
            Ok(())
        }
    }

    fn read_frame(&mut self, frame_samples: usize) -> Result<Vec<i16>> {
        if self.should_fail_read {
            Err(VoxloopError::AudioCapture {
                message: self.error_message.clone(),
            })
        } else {
            Ok(self
                .samples
                .iter()
                .copied()
                .take(frame_samples)
                .collect())
        }
    }
}
