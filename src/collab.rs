//! Collaborator seams consumed by the listening session.
//! Platform code (permissions, audio session, speech engine, command
//! execution) implements these; the session only sees the traits.

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::audio::{AudioFormat, AudioFrame};
use crate::controller::SessionMsg;
use crate::error::ListenerError;
use crate::transcript::{RecognitionEvent, TranscriptUpdate};

/// OS permission prompts. Each check may fail independently.
#[async_trait]
pub trait PermissionProvider: Send + Sync {
    async fn request_microphone(&self) -> bool;
    async fn request_speech(&self) -> bool;
}

/// Audio session / category configuration.
pub trait AudioSessionConfigurator: Send + Sync {
    fn configure(&self) -> Result<(), String>;

    /// Give the audio session back to the system. Must tolerate repeated calls.
    fn release(&self);
}

/// Speech-to-text engine. Each stream handles a single utterance.
pub trait SpeechRecognizer: Send + Sync {
    fn is_available(&self) -> bool;

    /// Begin recognizing audio in `format`; results go to `sink`.
    fn start_stream(
        &self,
        format: AudioFormat,
        sink: RecognitionSink,
    ) -> Result<Arc<dyn RecognitionStream>, ListenerError>;
}

/// One in-flight recognition run.
pub trait RecognitionStream: Send + Sync {
    /// Feed captured audio. Called on the capture thread.
    fn append(&self, frame: AudioFrame);

    /// No more audio will follow.
    fn end_audio(&self);

    /// Abort recognition; no further events are expected.
    fn cancel(&self);
}

/// Receives extracted commands. Invoked at most once per non-duplicate command.
#[async_trait]
pub trait CommandHandler: Send + Sync {
    async fn handle(&self, command: String);
}

/// Adapter so a plain async closure can serve as a [`CommandHandler`].
pub struct FnCommandHandler<F> {
    f: F,
}

#[async_trait]
impl<F, Fut> CommandHandler for FnCommandHandler<F>
where
    F: Fn(String) -> Fut + Send + Sync,
    Fut: Future<Output = ()> + Send + 'static,
{
    async fn handle(&self, command: String) {
        (self.f)(command).await;
    }
}

/// Wrap an async closure as a shared command handler.
pub fn command_handler<F, Fut>(f: F) -> Arc<dyn CommandHandler>
where
    F: Fn(String) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    Arc::new(FnCommandHandler { f })
}

/// Handle the engine uses to report results from any thread.
/// Events are queued for the session task and tagged with the stream's
/// generation, so results from a stream that was already torn down are ignored.
/// The sink does not keep the session alive.
#[derive(Clone)]
pub struct RecognitionSink {
    tx: mpsc::WeakUnboundedSender<SessionMsg>,
    generation: u64,
}

impl RecognitionSink {
    pub(crate) fn new(tx: mpsc::WeakUnboundedSender<SessionMsg>, generation: u64) -> Self {
        Self { tx, generation }
    }

    /// Report a (partial or final) transcript. Returns false once the session is gone.
    pub fn update(&self, update: TranscriptUpdate) -> bool {
        self.send(RecognitionEvent::Update(update))
    }

    /// Report a recoverable stream failure; the session restarts after backoff.
    pub fn error(&self, message: impl Into<String>) -> bool {
        self.send(RecognitionEvent::Error(ListenerError::RecognitionStreamError(
            message.into(),
        )))
    }

    /// Returns false once the session is gone.
    pub fn send(&self, event: RecognitionEvent) -> bool {
        let Some(tx) = self.tx.upgrade() else {
            return false;
        };
        tx.send(SessionMsg::Recognition {
            generation: self.generation,
            event,
        })
        .is_ok()
    }
}
