//! Core listening state machine
//!
//! Handles transitions between Idle, Listening, Processing and Error
//! based on explicit control calls and session adapter events.

use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::adapter::SessionEvent;

/// The listening state of the engine
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "state", content = "message", rename_all = "snake_case")]
pub enum ListeningState {
    /// No session, ready to start
    #[default]
    Idle,
    /// Session is live and capturing speech
    Listening,
    /// Speech ended, waiting for the final transcription
    Processing,
    /// Terminal failure; requires a manual start
    Error(String),
}

impl ListeningState {
    /// Whether a session is in progress (Listening or Processing)
    pub fn is_active(&self) -> bool {
        matches!(self, ListeningState::Listening | ListeningState::Processing)
    }
}

impl std::fmt::Display for ListeningState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ListeningState::Idle => write!(f, "Idle"),
            ListeningState::Listening => write!(f, "Listening"),
            ListeningState::Processing => write!(f, "Processing"),
            ListeningState::Error(message) => write!(f, "Error({})", message),
        }
    }
}

/// A state change that was applied
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub from: ListeningState,
    pub to: ListeningState,
    /// Time spent in `from`, zero for Idle and Error
    pub duration_ms: u64,
}

/// Compute the next state for an adapter event.
///
/// Returns `None` when the event does not change the state. Events that
/// arrive while no session is active never move the machine.
pub fn next_state(state: &ListeningState, event: &SessionEvent) -> Option<ListeningState> {
    match (state, event) {
        (ListeningState::Listening, SessionEvent::EndOfSpeech) => Some(ListeningState::Processing),
        (ListeningState::Listening | ListeningState::Processing, SessionEvent::FinalText(_)) => {
            Some(ListeningState::Idle)
        }
        (ListeningState::Listening | ListeningState::Processing, SessionEvent::Error(_)) => {
            Some(ListeningState::Idle)
        }
        // ready, begin-of-speech and partial text are re-entrant
        (ListeningState::Listening | ListeningState::Processing, _) => None,
        (ListeningState::Idle | ListeningState::Error(_), _) => None,
    }
}

/// The state machine that owns the current listening state
#[derive(Debug, Default)]
pub struct ListeningStateMachine {
    state: ListeningState,
    /// Time when the current active state was entered
    state_entered_at: Option<Instant>,
}

impl ListeningStateMachine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> &ListeningState {
        &self.state
    }

    pub fn is_active(&self) -> bool {
        self.state.is_active()
    }

    /// Enter Listening from Idle or Error.
    ///
    /// Returns `None` while a session is already active; a duplicate start
    /// must not open a second session.
    pub fn start(&mut self) -> Option<Transition> {
        if self.state.is_active() {
            debug!(state = %self.state, "start ignored, session already active");
            return None;
        }
        Some(self.transition_to(ListeningState::Listening))
    }

    /// Cancel an active session
    pub fn stop(&mut self) -> Option<Transition> {
        if !self.state.is_active() {
            return None;
        }
        Some(self.transition_to(ListeningState::Idle))
    }

    /// Return to Idle from any state
    pub fn reset(&mut self) -> Option<Transition> {
        if self.state == ListeningState::Idle {
            return None;
        }
        Some(self.transition_to(ListeningState::Idle))
    }

    /// Surface a terminal failure
    pub fn fail(&mut self, message: impl Into<String>) -> Option<Transition> {
        let target = ListeningState::Error(message.into());
        if self.state == target {
            return None;
        }
        Some(self.transition_to(target))
    }

    /// Apply an adapter event
    pub fn on_event(&mut self, event: &SessionEvent) -> Option<Transition> {
        let target = next_state(&self.state, event)?;
        Some(self.transition_to(target))
    }

    fn transition_to(&mut self, new_state: ListeningState) -> Transition {
        let duration_ms = self
            .state_entered_at
            .map(|t| t.elapsed().as_millis() as u64)
            .unwrap_or(0);

        info!(
            from = %self.state,
            to = %new_state,
            duration_ms = duration_ms,
            "listening state transition"
        );

        self.state_entered_at = if new_state.is_active() {
            Some(Instant::now())
        } else {
            None
        };
        let from = std::mem::replace(&mut self.state, new_state);

        Transition {
            from,
            to: self.state.clone(),
            duration_ms,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retry::SessionErrorCode;

    fn listening() -> ListeningStateMachine {
        let mut sm = ListeningStateMachine::new();
        sm.start();
        sm
    }

    #[test]
    fn test_initial_state() {
        let sm = ListeningStateMachine::new();
        assert_eq!(sm.state(), &ListeningState::Idle);
        assert!(!sm.is_active());
    }

    #[test]
    fn test_idle_to_listening() {
        let mut sm = ListeningStateMachine::new();
        let t = sm.start().unwrap();
        assert_eq!(t.from, ListeningState::Idle);
        assert_eq!(t.to, ListeningState::Listening);
        assert_eq!(sm.state(), &ListeningState::Listening);
    }

    #[test]
    fn test_duplicate_start_is_ignored() {
        let mut sm = listening();
        assert!(sm.start().is_none());
        assert_eq!(sm.state(), &ListeningState::Listening);

        sm.on_event(&SessionEvent::EndOfSpeech);
        assert!(sm.start().is_none());
        assert_eq!(sm.state(), &ListeningState::Processing);
    }

    #[test]
    fn test_ready_is_reentrant() {
        let mut sm = listening();
        assert!(sm.on_event(&SessionEvent::Ready).is_none());
        assert!(sm.on_event(&SessionEvent::BeginSpeech).is_none());
        assert!(sm
            .on_event(&SessionEvent::PartialText("open".into()))
            .is_none());
        assert_eq!(sm.state(), &ListeningState::Listening);
    }

    #[test]
    fn test_full_session_path() {
        let mut sm = listening();
        sm.on_event(&SessionEvent::EndOfSpeech);
        assert_eq!(sm.state(), &ListeningState::Processing);

        sm.on_event(&SessionEvent::FinalText("go home".into()));
        assert_eq!(sm.state(), &ListeningState::Idle);
    }

    #[test]
    fn test_final_text_while_listening_concludes() {
        let mut sm = listening();
        let t = sm.on_event(&SessionEvent::FinalText("sos".into())).unwrap();
        assert_eq!(t.from, ListeningState::Listening);
        assert_eq!(t.to, ListeningState::Idle);
    }

    #[test]
    fn test_error_returns_to_idle() {
        let mut sm = listening();
        sm.on_event(&SessionEvent::EndOfSpeech);
        sm.on_event(&SessionEvent::Error(SessionErrorCode::Network));
        assert_eq!(sm.state(), &ListeningState::Idle);
    }

    #[test]
    fn test_no_idle_to_processing() {
        let mut sm = ListeningStateMachine::new();
        assert!(sm.on_event(&SessionEvent::EndOfSpeech).is_none());
        assert!(sm
            .on_event(&SessionEvent::FinalText("sos".into()))
            .is_none());
        assert_eq!(sm.state(), &ListeningState::Idle);
    }

    #[test]
    fn test_stop_only_cancels_active_session() {
        let mut sm = ListeningStateMachine::new();
        assert!(sm.stop().is_none());

        let mut sm = listening();
        assert!(sm.stop().is_some());
        assert_eq!(sm.state(), &ListeningState::Idle);
    }

    #[test]
    fn test_fail_then_manual_start() {
        let mut sm = ListeningStateMachine::new();
        sm.fail("Tap microphone to try again");
        assert_eq!(
            sm.state(),
            &ListeningState::Error("Tap microphone to try again".into())
        );
        assert!(sm.start().is_some());
        assert_eq!(sm.state(), &ListeningState::Listening);
    }

    #[test]
    fn test_reset_from_error() {
        let mut sm = ListeningStateMachine::new();
        sm.fail("boom");
        assert!(sm.reset().is_some());
        assert_eq!(sm.state(), &ListeningState::Idle);
        assert!(sm.reset().is_none());
    }

    #[test]
    fn test_state_serialization() {
        let json = serde_json::to_string(&ListeningState::Error("x".into())).unwrap();
        assert_eq!(json, r#"{"state":"error","message":"x"}"#);
        let json = serde_json::to_string(&ListeningState::Idle).unwrap();
        assert_eq!(json, r#"{"state":"idle"}"#);
    }
}
