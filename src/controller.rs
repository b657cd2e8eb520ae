//! Listening session controller.
//! One session task owns all state: enable/disable requests, suspension,
//! trigger-list refreshes, recognition events, handler completions and
//! backoff timers all arrive as messages on a single channel and are handled
//! one at a time. Collaborator threads never touch session state directly.
//!
//! Each underlying recognition stream covers one utterance, so the session
//! keeps starting fresh streams: after a dispatched command's handler
//! finishes, after a final result without a command, and (after a fixed
//! backoff) after a stream error.

use std::sync::Arc;
use std::time::Instant;

use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::audio::{AudioCapture, FrameTap};
use crate::cancellation::{GenerationGuard, TaskGeneration};
use crate::collab::{
    AudioSessionConfigurator, CommandHandler, PermissionProvider, RecognitionSink,
    RecognitionStream, SpeechRecognizer,
};
use crate::config::ListenerConfig;
use crate::error::{ListenerError, Permission};
use crate::extract::{extract, sanitize_triggers, TriggerPhrase};
use crate::metrics::{metric_names, MetricsRegistry};
use crate::state_machine::{SessionSnapshot, SessionState, StateMachine};
use crate::transcript::{RecognitionEvent, TranscriptUpdate};

/// External systems the session drives.
#[derive(Clone)]
pub struct Collaborators {
    pub permissions: Arc<dyn PermissionProvider>,
    pub audio_session: Arc<dyn AudioSessionConfigurator>,
    pub capture: Arc<dyn AudioCapture>,
    pub recognizer: Arc<dyn SpeechRecognizer>,
    pub handler: Arc<dyn CommandHandler>,
}

/// Messages processed by the session task.
pub(crate) enum SessionMsg {
    SetEnabled {
        enabled: bool,
        done: oneshot::Sender<()>,
    },
    Suspend {
        reply: oneshot::Sender<bool>,
    },
    Resume {
        was_suspended: bool,
        done: oneshot::Sender<()>,
    },
    TriggersChanged(Vec<String>),
    Recognition {
        generation: u64,
        event: RecognitionEvent,
    },
    HandlerFinished {
        generation: u64,
    },
    RestartDue {
        generation: u64,
    },
    Flush {
        done: oneshot::Sender<()>,
    },
    Shutdown {
        done: oneshot::Sender<()>,
    },
}

/// Cloneable handle to a running listening session.
#[derive(Clone)]
pub struct ListeningController {
    tx: mpsc::UnboundedSender<SessionMsg>,
    state: Arc<StateMachine>,
    metrics: Arc<MetricsRegistry>,
}

impl ListeningController {
    /// Spawn the session task on the current Tokio runtime. The session
    /// starts `Disabled`; `triggers` is the externally owned raw trigger list.
    pub fn spawn(
        config: ListenerConfig,
        collaborators: Collaborators,
        triggers: watch::Receiver<Vec<String>>,
    ) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let state = Arc::new(StateMachine::new());
        let metrics = Arc::new(MetricsRegistry::new());

        let initial = sanitize_triggers(triggers.borrow().as_slice());
        info!(trigger_count = initial.len(), "listening session created");

        let session = Session {
            config,
            deps: collaborators,
            state: Arc::clone(&state),
            metrics: Arc::clone(&metrics),
            tx: tx.downgrade(),
            streams: TaskGeneration::new(),
            triggers: initial,
            active: None,
            last_dispatched: None,
            pending_handlers: 0,
            restart_when_idle: false,
            backoff_started: None,
        };
        tokio::spawn(session.run(rx));
        tokio::spawn(forward_trigger_changes(triggers, tx.downgrade()));

        Self { tx, state, metrics }
    }

    /// Switch the session on or off. Resolves once the request has been
    /// handled (for `true`, after the start sequence succeeded or failed).
    pub async fn set_enabled(&self, enabled: bool) -> Result<(), ListenerError> {
        let (done, rx) = oneshot::channel();
        self.send(SessionMsg::SetEnabled { enabled, done })?;
        rx.await.map_err(|_| ListenerError::SessionClosed)
    }

    /// Release the microphone for another subsystem. Returns whether a
    /// listening stream was actually suspended.
    pub async fn suspend_for_external_audio_capture(&self) -> bool {
        let (reply, rx) = oneshot::channel();
        if self.send(SessionMsg::Suspend { reply }).is_err() {
            return false;
        }
        rx.await.unwrap_or(false)
    }

    /// Undo a suspension reported by [`Self::suspend_for_external_audio_capture`].
    pub async fn resume_after_external_audio_capture(&self, was_suspended: bool) {
        let (done, rx) = oneshot::channel();
        if self.send(SessionMsg::Resume { was_suspended, done }).is_ok() {
            let _ = rx.await;
        }
    }

    /// Wait until every message queued before this call has been handled.
    pub async fn flush(&self) {
        let (done, rx) = oneshot::channel();
        if self.send(SessionMsg::Flush { done }).is_ok() {
            let _ = rx.await;
        }
    }

    /// Disable and stop the session task.
    pub async fn shutdown(&self) {
        let (done, rx) = oneshot::channel();
        if self.send(SessionMsg::Shutdown { done }).is_ok() {
            let _ = rx.await;
        }
    }

    pub fn state(&self) -> SessionState {
        self.state.current()
    }

    pub fn status(&self) -> String {
        self.state.status()
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.state.subscribe()
    }

    pub fn metrics(&self) -> &Arc<MetricsRegistry> {
        &self.metrics
    }

    fn send(&self, msg: SessionMsg) -> Result<(), ListenerError> {
        self.tx.send(msg).map_err(|_| ListenerError::SessionClosed)
    }
}

async fn forward_trigger_changes(
    mut triggers: watch::Receiver<Vec<String>>,
    tx: mpsc::WeakUnboundedSender<SessionMsg>,
) {
    while triggers.changed().await.is_ok() {
        let raw = triggers.borrow_and_update().clone();
        let Some(tx) = tx.upgrade() else { break };
        if tx.send(SessionMsg::TriggersChanged(raw)).is_err() {
            break;
        }
    }
}

struct ActiveStream {
    stream: Arc<dyn RecognitionStream>,
    guard: GenerationGuard,
    id: Uuid,
}

/// State owned by the session task.
struct Session {
    config: ListenerConfig,
    deps: Collaborators,
    state: Arc<StateMachine>,
    metrics: Arc<MetricsRegistry>,
    /// Weak (as are the copies held by sinks, timers and handler tasks) so the
    /// task ends once every controller handle is dropped.
    tx: mpsc::WeakUnboundedSender<SessionMsg>,
    streams: TaskGeneration,
    triggers: Vec<TriggerPhrase>,
    active: Option<ActiveStream>,
    /// Cleared whenever a fresh stream starts.
    last_dispatched: Option<String>,
    pending_handlers: usize,
    /// Start a fresh stream as soon as no handler is pending.
    restart_when_idle: bool,
    backoff_started: Option<Instant>,
}

impl Session {
    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<SessionMsg>) {
        info!("session task started");
        while let Some(msg) = rx.recv().await {
            match msg {
                SessionMsg::SetEnabled { enabled, done } => {
                    if enabled {
                        self.enable().await;
                    } else {
                        self.disable();
                    }
                    let _ = done.send(());
                }
                SessionMsg::Suspend { reply } => {
                    let _ = reply.send(self.suspend());
                }
                SessionMsg::Resume {
                    was_suspended,
                    done,
                } => {
                    self.resume(was_suspended).await;
                    let _ = done.send(());
                }
                SessionMsg::TriggersChanged(raw) => {
                    self.triggers = sanitize_triggers(raw.as_slice());
                    info!(trigger_count = self.triggers.len(), "trigger list refreshed");
                }
                SessionMsg::Recognition { generation, event } => {
                    self.on_recognition(generation, event);
                }
                SessionMsg::HandlerFinished { generation } => {
                    self.on_handler_finished(generation);
                }
                SessionMsg::RestartDue { generation } => {
                    self.on_restart_due(generation);
                }
                SessionMsg::Flush { done } => {
                    let _ = done.send(());
                }
                SessionMsg::Shutdown { done } => {
                    self.disable();
                    let _ = done.send(());
                    break;
                }
            }
        }
        self.disable();
        info!("session task exiting");
    }

    async fn enable(&mut self) {
        match self.state.current() {
            SessionState::Disabled | SessionState::Paused => self.begin().await,
            other => debug!(state = %other, "enable ignored, already enabled"),
        }
    }

    /// Starting → Listening, or Disabled with the failure as status. Stays in
    /// Starting while a dispatched command's handler is still running.
    async fn begin(&mut self) {
        if self.state.transition(SessionState::Starting).is_err() {
            return;
        }
        let started = Instant::now();
        if let Err(e) = self.prepare().await {
            self.fail(e);
            return;
        }
        if self.pending_handlers > 0 {
            debug!(
                pending = self.pending_handlers,
                "stream start deferred until handlers finish"
            );
            self.restart_when_idle = true;
            return;
        }
        match self.start_stream() {
            Ok(()) => self.metrics.record_since(metric_names::SESSION_START, started),
            Err(e) => self.fail(e),
        }
    }

    /// Environment, permission and audio-session checks gating `Starting`.
    async fn prepare(&self) -> Result<(), ListenerError> {
        if !self.deps.capture.is_available() {
            return Err(ListenerError::UnsupportedEnvironment);
        }
        if !self.deps.recognizer.is_available() {
            return Err(ListenerError::RecognitionEngineUnavailable(
                "recognizer not available".to_string(),
            ));
        }
        if !self.deps.permissions.request_microphone().await {
            return Err(ListenerError::PermissionDenied(Permission::Microphone));
        }
        if !self.deps.permissions.request_speech().await {
            return Err(ListenerError::PermissionDenied(Permission::Speech));
        }
        self.deps
            .audio_session
            .configure()
            .map_err(ListenerError::AudioSessionFailed)
    }

    /// Tear down whatever runs and start one fresh recognition stream → Listening.
    fn start_stream(&mut self) -> Result<(), ListenerError> {
        let guard = self.teardown_stream();
        self.last_dispatched = None;
        self.restart_when_idle = false;

        let format = self.deps.capture.input_format().validate()?;
        let sink = RecognitionSink::new(self.tx.clone(), guard.my_generation());
        let stream = self.deps.recognizer.start_stream(format, sink)?;

        let tap_stream = Arc::clone(&stream);
        let tap: FrameTap = Arc::new(move |frame| tap_stream.append(frame));
        if let Err(e) = self.deps.capture.start(tap) {
            stream.cancel();
            return Err(e);
        }

        let id = Uuid::new_v4();
        info!(
            stream_id = %id,
            generation = guard.my_generation(),
            sample_rate = format.sample_rate,
            channels = format.channels,
            "recognition stream started"
        );
        self.active = Some(ActiveStream { stream, guard, id });
        self.metrics.incr(metric_names::STREAM_STARTED);
        self.state
            .transition(SessionState::Listening)
            .map_err(ListenerError::RecognitionStreamError)?;
        Ok(())
    }

    /// Cancel recognition, end input, detach the tap, stop capture. Safe to
    /// repeat. Returns the guard of the generation that follows.
    fn teardown_stream(&mut self) -> GenerationGuard {
        if let Some(active) = self.active.take() {
            active.stream.cancel();
            active.stream.end_audio();
            debug!(stream_id = %active.id, generation = active.guard.my_generation(), "recognition stream torn down");
        }
        self.deps.capture.stop();
        self.streams.cancel_and_advance()
    }

    /// Non-retryable failure: release everything and report.
    fn fail(&mut self, error: ListenerError) {
        warn!(error = %error, "listening session failed");
        self.teardown_stream();
        self.deps.audio_session.release();
        self.restart_when_idle = false;
        self.backoff_started = None;
        self.state.force_disabled(error.status_text());
    }

    fn disable(&mut self) {
        let was = self.state.current();
        self.teardown_stream();
        self.restart_when_idle = false;
        self.backoff_started = None;
        self.last_dispatched = None;
        if was != SessionState::Disabled {
            self.deps.audio_session.release();
            self.state.force_disabled(SessionState::Disabled.default_status());
        }
    }

    fn suspend(&mut self) -> bool {
        if self.state.current() != SessionState::Listening {
            debug!(state = %self.state.current(), "suspend ignored, not listening");
            return false;
        }
        self.teardown_stream();
        self.deps.audio_session.release();
        self.restart_when_idle = false;
        self.state.transition(SessionState::Paused).is_ok()
    }

    async fn resume(&mut self, was_suspended: bool) {
        if !was_suspended {
            return;
        }
        if self.state.current() == SessionState::Paused {
            self.begin().await;
        } else {
            debug!(state = %self.state.current(), "resume ignored, session not paused");
        }
    }

    fn on_recognition(&mut self, generation: u64, event: RecognitionEvent) {
        let live = self.active.is_some()
            && self.streams.is_current(generation)
            && self.state.current() == SessionState::Listening;
        if !live {
            self.metrics.incr(metric_names::STALE_EVENT_DROPPED);
            debug!(generation, "dropping event from inactive stream");
            return;
        }
        match event {
            RecognitionEvent::Update(update) => self.on_transcript(generation, update),
            RecognitionEvent::Error(error) if error.is_recoverable() => self.on_stream_error(error),
            RecognitionEvent::Error(error) => self.fail(error),
        }
    }

    fn on_transcript(&mut self, generation: u64, update: TranscriptUpdate) {
        let started = Instant::now();
        let found = extract(
            &update.text,
            &update.segments,
            &self.triggers,
            self.config.min_post_trigger_gap(),
        );
        self.metrics.record_since(metric_names::EXTRACT, started);

        match found {
            Some(m) if self.last_dispatched.as_deref() != Some(m.command.as_str()) => {
                self.dispatch(generation, m.command, &m.trigger);
            }
            Some(m) => {
                self.metrics.incr(metric_names::DUPLICATE_SUPPRESSED);
                debug!(command = %m.command, "duplicate command suppressed");
            }
            None if update.is_final && !self.restart_when_idle => {
                debug!("utterance ended without a command");
                self.restart_when_idle = true;
                self.restart_if_idle();
            }
            None => {}
        }
    }

    fn dispatch(&mut self, generation: u64, command: String, trigger: &TriggerPhrase) {
        if !self.state.current().is_enabled() {
            return;
        }
        info!(command = %command, trigger = %trigger, generation, "dispatching command");
        self.last_dispatched = Some(command.clone());
        self.pending_handlers += 1;
        self.restart_when_idle = true;
        self.metrics.incr(metric_names::COMMAND_DISPATCHED);

        let handler = Arc::clone(&self.deps.handler);
        let metrics = Arc::clone(&self.metrics);
        let tx = self.tx.clone();
        tokio::spawn(async move {
            let started = Instant::now();
            handler.handle(command).await;
            metrics.record_since(metric_names::COMMAND_HANDLER, started);
            if let Some(tx) = tx.upgrade() {
                let _ = tx.send(SessionMsg::HandlerFinished { generation });
            }
        });
    }

    fn on_handler_finished(&mut self, generation: u64) {
        self.pending_handlers = self.pending_handlers.saturating_sub(1);
        debug!(generation, pending = self.pending_handlers, "command handler finished");
        self.restart_if_idle();
    }

    /// Start the deferred fresh stream once no handler is pending.
    fn restart_if_idle(&mut self) {
        if !self.restart_when_idle || self.pending_handlers > 0 {
            return;
        }
        match self.state.current() {
            SessionState::Starting | SessionState::Listening | SessionState::Restarting => {
                if let Some(started) = self.backoff_started.take() {
                    self.metrics.record_since(metric_names::RESTART_BACKOFF, started);
                }
                if let Err(e) = self.start_stream() {
                    self.fail(e);
                }
            }
            _ => self.restart_when_idle = false,
        }
    }

    fn on_stream_error(&mut self, error: ListenerError) {
        warn!(error = %error, "recognition stream failed, restarting after backoff");
        let guard = self.teardown_stream();
        self.restart_when_idle = false;
        if self
            .state
            .transition_with_status(SessionState::Restarting, error.status_text())
            .is_err()
        {
            return;
        }
        self.backoff_started = Some(Instant::now());

        let tx = self.tx.clone();
        let backoff = self.config.restart_backoff();
        tokio::spawn(async move {
            tokio::select! {
                _ = guard.token().cancelled() => {}
                _ = tokio::time::sleep(backoff) => {
                    if !guard.should_continue() {
                        return;
                    }
                    if let Some(tx) = tx.upgrade() {
                        let _ = tx.send(SessionMsg::RestartDue { generation: guard.my_generation() });
                    }
                }
            }
        });
    }

    fn on_restart_due(&mut self, generation: u64) {
        if self.state.current() != SessionState::Restarting || !self.streams.is_current(generation)
        {
            debug!(generation, "stale restart timer ignored");
            return;
        }
        self.restart_when_idle = true;
        self.restart_if_idle();
    }
}
