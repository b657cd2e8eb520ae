//! Session lifecycle: Disabled → Starting → Listening ⇄ Restarting / Paused → Disabled.
//! The status string shown to the user is updated together with the state,
//! so observers never see one without the other.

use parking_lot::RwLock;
use serde::Serialize;
use tokio::sync::watch;
use tracing::{info, warn};

/// All states of one logical listening session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum SessionState {
    Disabled,
    Starting,
    Listening,
    Paused,
    Restarting,
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionState::Disabled => write!(f, "Disabled"),
            SessionState::Starting => write!(f, "Starting"),
            SessionState::Listening => write!(f, "Listening"),
            SessionState::Paused => write!(f, "Paused"),
            SessionState::Restarting => write!(f, "Restarting"),
        }
    }
}

impl SessionState {
    /// Returns whether transitioning from `self` to `next` is valid.
    pub fn can_transition_to(self, next: SessionState) -> bool {
        matches!(
            (self, next),
            (SessionState::Disabled, SessionState::Starting)
                | (SessionState::Paused, SessionState::Starting) // resume after external capture
                | (SessionState::Starting, SessionState::Listening)
                | (SessionState::Listening, SessionState::Listening) // fresh stream after dispatch
                | (SessionState::Listening, SessionState::Restarting)
                | (SessionState::Listening, SessionState::Paused)
                | (SessionState::Restarting, SessionState::Listening)
                // Explicit stop or failed start from anywhere
                | (_, SessionState::Disabled)
        )
    }

    /// Default status text for a state entered without an error.
    pub fn default_status(self) -> &'static str {
        match self {
            SessionState::Disabled => "Off",
            SessionState::Starting => "Starting…",
            SessionState::Listening => "Listening",
            SessionState::Paused => "Paused",
            SessionState::Restarting => "Restarting…",
        }
    }

    /// Whether the session counts as switched on by the user.
    pub fn is_enabled(self) -> bool {
        self != SessionState::Disabled
    }
}

/// Observable state + status pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionSnapshot {
    pub state: SessionState,
    pub status: String,
}

impl SessionSnapshot {
    fn initial() -> Self {
        Self {
            state: SessionState::Disabled,
            status: SessionState::Disabled.default_status().to_string(),
        }
    }
}

/// Thread-safe state holder with a watch channel for reactive subscribers.
/// Mutated only by the session task; read from anywhere.
pub struct StateMachine {
    snapshot: RwLock<SessionSnapshot>,
    state_tx: watch::Sender<SessionSnapshot>,
    state_rx: watch::Receiver<SessionSnapshot>,
}

impl StateMachine {
    pub fn new() -> Self {
        let (state_tx, state_rx) = watch::channel(SessionSnapshot::initial());
        Self {
            snapshot: RwLock::new(SessionSnapshot::initial()),
            state_tx,
            state_rx,
        }
    }

    /// Current state (non-blocking read).
    pub fn current(&self) -> SessionState {
        self.snapshot.read().state
    }

    /// Current status text.
    pub fn status(&self) -> String {
        self.snapshot.read().status.clone()
    }

    /// Transition with the state's default status text.
    pub fn transition(&self, next: SessionState) -> Result<SessionState, String> {
        self.transition_with_status(next, next.default_status())
    }

    /// Attempt a state transition, replacing the status text.
    pub fn transition_with_status(
        &self,
        next: SessionState,
        status: impl Into<String>,
    ) -> Result<SessionState, String> {
        let mut snapshot = self.snapshot.write();
        let current = snapshot.state;
        if !current.can_transition_to(next) {
            let msg = format!("invalid transition: {} -> {}", current, next);
            warn!("{}", msg);
            return Err(msg);
        }
        snapshot.state = next;
        snapshot.status = status.into();
        let _ = self.state_tx.send(snapshot.clone());
        info!(from = %current, to = %next, status = %snapshot.status, "state_transition");
        Ok(next)
    }

    /// Force Disabled from any state with the given status (stop, failed start).
    pub fn force_disabled(&self, status: impl Into<String>) {
        let mut snapshot = self.snapshot.write();
        let prev = snapshot.state;
        snapshot.state = SessionState::Disabled;
        snapshot.status = status.into();
        let _ = self.state_tx.send(snapshot.clone());
        info!(from = %prev, status = %snapshot.status, "force_disabled");
    }

    /// Subscribe to state changes.
    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.state_rx.clone()
    }
}

impl Default for StateMachine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_state_machine_is_disabled_and_off() {
        let sm = StateMachine::new();
        assert_eq!(sm.current(), SessionState::Disabled);
        assert_eq!(sm.status(), "Off");
    }

    #[test]
    fn test_normal_lifecycle_transitions() {
        let sm = StateMachine::new();
        sm.transition(SessionState::Starting).unwrap();
        sm.transition(SessionState::Listening).unwrap();
        sm.transition_with_status(SessionState::Restarting, "Recognizer error: no speech")
            .unwrap();
        assert_eq!(sm.status(), "Recognizer error: no speech");
        sm.transition(SessionState::Listening).unwrap();
        sm.transition(SessionState::Paused).unwrap();
        sm.transition(SessionState::Starting).unwrap();
        sm.transition(SessionState::Listening).unwrap();
        sm.transition(SessionState::Disabled).unwrap();
        assert_eq!(sm.status(), "Off");
    }

    #[test]
    fn test_invalid_transitions_leave_state_untouched() {
        let sm = StateMachine::new();
        assert!(sm.transition(SessionState::Listening).is_err());
        assert!(sm.transition(SessionState::Paused).is_err());
        assert!(sm.transition(SessionState::Restarting).is_err());
        assert_eq!(sm.current(), SessionState::Disabled);

        sm.transition(SessionState::Starting).unwrap();
        assert!(sm.transition(SessionState::Paused).is_err());
        assert_eq!(sm.current(), SessionState::Starting);
    }

    #[test]
    fn test_force_disabled_from_any_state() {
        let sm = StateMachine::new();
        sm.transition(SessionState::Starting).unwrap();
        sm.force_disabled("Mic denied");
        assert_eq!(sm.current(), SessionState::Disabled);
        assert_eq!(sm.status(), "Mic denied");
    }

    #[test]
    fn test_subscribers_see_state_and_status_together() {
        let sm = StateMachine::new();
        let rx = sm.subscribe();
        sm.transition(SessionState::Starting).unwrap();
        let seen = rx.borrow().clone();
        assert_eq!(
            seen,
            SessionSnapshot {
                state: SessionState::Starting,
                status: "Starting…".to_string(),
            }
        );
    }
}
