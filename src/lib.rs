//! wakecmd: always-on wake phrase listener.
//! Feeds a live speech-to-text stream through a streaming command extractor
//! and keeps one logical listening session alive across single-utterance
//! recognition runs, errors and external demands for the microphone.

pub mod audio;
pub mod cancellation;
pub mod collab;
pub mod config;
pub mod controller;
pub mod error;
pub mod extract;
pub mod metrics;
pub mod state_machine;
pub mod transcript;
pub mod triggers;

pub use audio::{AudioCapture, AudioFormat, AudioFrame, FrameTap};
pub use collab::{
    command_handler, AudioSessionConfigurator, CommandHandler, PermissionProvider,
    RecognitionSink, RecognitionStream, SpeechRecognizer,
};
pub use config::{ConfigError, ListenerConfig};
pub use controller::{Collaborators, ListeningController};
pub use error::{ListenerError, Permission};
pub use extract::{
    extract, extract_command, sanitize_triggers, MatchResult, TriggerPhrase,
    DEFAULT_MIN_POST_TRIGGER_GAP,
};
pub use state_machine::{SessionSnapshot, SessionState};
pub use transcript::{RecognitionEvent, TranscriptUpdate, WordSegment};
pub use triggers::TriggerWordStore;

/// Install the fmt tracing subscriber (`RUST_LOG` overrides the default
/// `wakecmd=debug`). Does nothing if a global subscriber is already set.
pub fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("wakecmd=debug"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .try_init();
}

/// Same as [`init_tracing`] but emits JSON lines, for log shipping.
pub fn init_tracing_json() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("wakecmd=debug"));
    let _ = tracing_subscriber::fmt()
        .json()
        .with_env_filter(filter)
        .with_thread_ids(true)
        .try_init();
}
