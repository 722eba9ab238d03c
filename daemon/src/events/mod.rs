//! Events module for engine observers
//!
//! Every observable change of the engine is broadcast as an
//! [`EngineEvent`]: state transitions, recognized text, feedback
//! utterances, command outcomes and retry decisions.

use serde::{Deserialize, Serialize};

use crate::command::{CommandResult, VoiceAction};
use crate::retry::{ErrorClass, SessionErrorCode};
use crate::state::ListeningState;

/// Events emitted by the voice command engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EngineEvent {
    /// Listening state changed
    StateChanged {
        from: ListeningState,
        to: ListeningState,
    },

    /// Partial or final transcription received
    TextRecognized { text: String, is_final: bool },

    /// Utterance handed to the feedback channel
    Feedback { utterance: String },

    /// A finalized utterance was classified
    CommandRecognized { result: CommandResult },

    /// An action was handed to its handler slot
    ActionDispatched { action: VoiceAction, handled: bool },

    /// The session ended with an adapter error
    SessionError {
        code: SessionErrorCode,
        class: ErrorClass,
    },

    /// Auto-restart scheduled after a recoverable error
    RestartScheduled { attempt: u32, delay_ms: u64 },

    /// Retry budget spent; waiting for a manual start
    RetriesExhausted { attempts: u32 },
}

impl std::fmt::Display for EngineEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineEvent::StateChanged { from, to } => write!(f, "STATE_CHANGED ({} -> {})", from, to),
            EngineEvent::TextRecognized { is_final, .. } => {
                write!(f, "TEXT_RECOGNIZED (final={})", is_final)
            }
            EngineEvent::Feedback { .. } => write!(f, "FEEDBACK"),
            EngineEvent::CommandRecognized { result } => match result {
                CommandResult::Success { command, .. } => {
                    write!(f, "COMMAND_RECOGNIZED ({})", command)
                }
                CommandResult::Error { message } => write!(f, "COMMAND_ERROR ({})", message),
                CommandResult::NoMatch => write!(f, "COMMAND_NO_MATCH"),
            },
            EngineEvent::ActionDispatched { action, .. } => {
                write!(f, "ACTION_DISPATCHED ({})", action.kind())
            }
            EngineEvent::SessionError { code, .. } => write!(f, "SESSION_ERROR ({})", code),
            EngineEvent::RestartScheduled { attempt, delay_ms } => {
                write!(f, "RESTART_SCHEDULED (attempt {} in {}ms)", attempt, delay_ms)
            }
            EngineEvent::RetriesExhausted { attempts } => {
                write!(f, "RETRIES_EXHAUSTED ({})", attempts)
            }
        }
    }
}
