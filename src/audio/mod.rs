//! Audio capture: device trait, cpal implementation, PCM helpers.

pub mod capture;
pub mod source;
