//! Error taxonomy for the listening session.
//! Everything here ends up as status text; only stream errors are retried.

use std::fmt;

use serde::Serialize;

/// Which permission was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Permission {
    Microphone,
    Speech,
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Permission::Microphone => write!(f, "microphone"),
            Permission::Speech => write!(f, "speech recognition"),
        }
    }
}

/// Errors that can occur while starting or running a listening session
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ListenerError {
    /// User or OS refused a permission; no automatic retry
    #[error("{0} permission denied")]
    PermissionDenied(Permission),
    /// No usable microphone in this environment
    #[error("no audio input available")]
    UnsupportedEnvironment,
    /// Input format reports zero channels or zero sample rate
    #[error("invalid audio format: {channels} channel(s) at {sample_rate} Hz")]
    AudioFormatInvalid { channels: u16, sample_rate: u32 },
    #[error("speech recognizer unavailable: {0}")]
    RecognitionEngineUnavailable(String),
    #[error("audio session configuration failed: {0}")]
    AudioSessionFailed(String),
    #[error("audio capture failed: {0}")]
    CaptureFailed(String),
    /// Current recognition stream failed; recoverable by restarting
    #[error("recognition stream error: {0}")]
    RecognitionStreamError(String),
    /// The session task is gone
    #[error("listening session closed")]
    SessionClosed,
}

impl ListenerError {
    /// Only a failed stream is retried automatically.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, ListenerError::RecognitionStreamError(_))
    }

    /// Human-readable status line for the UI.
    pub fn status_text(&self) -> String {
        match self {
            ListenerError::PermissionDenied(Permission::Microphone) => "Mic denied".to_string(),
            ListenerError::PermissionDenied(Permission::Speech) => "Speech denied".to_string(),
            ListenerError::UnsupportedEnvironment => "No microphone available".to_string(),
            ListenerError::AudioFormatInvalid { .. } => "Invalid audio format".to_string(),
            ListenerError::RecognitionEngineUnavailable(msg) => {
                format!("Speech recognizer unavailable: {msg}")
            }
            ListenerError::AudioSessionFailed(msg) => format!("Audio session error: {msg}"),
            ListenerError::CaptureFailed(msg) => format!("Audio capture error: {msg}"),
            ListenerError::RecognitionStreamError(msg) => format!("Recognizer error: {msg}"),
            ListenerError::SessionClosed => "Off".to_string(),
        }
    }
}
