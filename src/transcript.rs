//! Transcript data delivered by the speech engine.
//! The engine re-emits the whole hypothesis on every update, so a
//! `TranscriptUpdate` replaces the previous one instead of extending it.

use std::time::Duration;

use serde::Serialize;

use crate::error::ListenerError;

/// One recognized word with its timing inside the current utterance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WordSegment {
    pub text: String,
    pub start: Duration,
    pub end: Duration,
}

impl WordSegment {
    pub fn new(text: impl Into<String>, start: Duration, end: Duration) -> Self {
        Self {
            text: text.into(),
            start,
            end,
        }
    }

    /// Convenience constructor with offsets in milliseconds.
    pub fn from_millis(text: impl Into<String>, start_ms: u64, end_ms: u64) -> Self {
        Self::new(
            text,
            Duration::from_millis(start_ms),
            Duration::from_millis(end_ms),
        )
    }
}

/// Current best-guess text for the in-progress utterance.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TranscriptUpdate {
    pub text: String,
    pub segments: Vec<WordSegment>,
    /// The engine will not revise this hypothesis any further.
    pub is_final: bool,
}

impl TranscriptUpdate {
    pub fn partial(text: impl Into<String>, segments: Vec<WordSegment>) -> Self {
        Self {
            text: text.into(),
            segments,
            is_final: false,
        }
    }

    pub fn final_result(text: impl Into<String>, segments: Vec<WordSegment>) -> Self {
        Self {
            text: text.into(),
            segments,
            is_final: true,
        }
    }
}

/// Event emitted by a recognition stream for the current utterance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecognitionEvent {
    Update(TranscriptUpdate),
    /// Terminal failure of the current stream. Recoverable errors restart the
    /// stream after backoff; anything else disables the session.
    Error(ListenerError),
}
