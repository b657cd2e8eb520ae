//! Audio capture seam.
//! The capture subsystem pushes timestamped frames into a single tap; the
//! session forwards them unmodified to the active recognition stream.
//! Format fields are opaque to the core apart from the non-zero check.

#[cfg(feature = "cpal-capture")]
pub mod cpal_capture;

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;

use crate::error::ListenerError;

/// Input format reported by the capture device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AudioFormat {
    pub sample_rate: u32,
    pub channels: u16,
}

impl AudioFormat {
    pub fn new(sample_rate: u32, channels: u16) -> Self {
        Self {
            sample_rate,
            channels,
        }
    }

    /// Hard precondition for starting a recognition stream.
    pub fn validate(self) -> Result<Self, ListenerError> {
        if self.channels == 0 || self.sample_rate == 0 {
            return Err(ListenerError::AudioFormatInvalid {
                channels: self.channels,
                sample_rate: self.sample_rate,
            });
        }
        Ok(self)
    }
}

/// One buffer of interleaved PCM samples.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioFrame {
    pub samples: Vec<f32>,
    pub format: AudioFormat,
    /// Offset from the start of capture.
    pub timestamp: Duration,
}

/// Frame callback installed on the capture subsystem. Called on the capture thread.
pub type FrameTap = Arc<dyn Fn(AudioFrame) + Send + Sync>;

/// Platform audio capture adapter.
///
/// `start` and `stop` are called inline from the session task and may block
/// briefly while the device engine spins up or winds down. Implementations
/// must not wait on anything that needs the session to make progress.
pub trait AudioCapture: Send + Sync {
    /// Whether a real input device exists at all.
    fn is_available(&self) -> bool;

    fn input_format(&self) -> AudioFormat;

    /// Install `tap` and start capturing. Replaces any previous tap.
    fn start(&self, tap: FrameTap) -> Result<(), ListenerError>;

    /// Detach the tap and stop the engine. Must be safe to call when stopped.
    fn stop(&self);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_format_passes() {
        assert!(AudioFormat::new(16000, 1).validate().is_ok());
        assert!(AudioFormat::new(48000, 2).validate().is_ok());
    }

    #[test]
    fn test_zero_fields_are_rejected() {
        let err = AudioFormat::new(0, 1).validate().unwrap_err();
        assert_eq!(
            err,
            ListenerError::AudioFormatInvalid {
                channels: 1,
                sample_rate: 0
            }
        );
        assert!(AudioFormat::new(16000, 0).validate().is_err());
    }
}
