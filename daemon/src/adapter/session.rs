//! Speech session adapter contract
//!
//! The adapter wraps a native recognizer. The engine drives it with
//! start/stop/destroy; the recognizer reports back with generation-tagged
//! lifecycle events so callbacks from a cancelled session can be told apart.

use serde::{Deserialize, Serialize};

use crate::error::EngineError;
use crate::retry::SessionErrorCode;

/// Recognizer tuning passed with every session start
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionOptions {
    /// Deliver partial transcriptions while the user speaks
    pub partial_results: bool,
    /// Minimum utterance length before end-of-speech is accepted
    pub min_utterance_ms: u64,
    /// Silence after which the utterance is considered complete
    pub complete_silence_ms: u64,
    /// Silence after which the utterance is possibly complete
    pub possibly_complete_silence_ms: u64,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            partial_results: true,
            min_utterance_ms: 1000,
            complete_silence_ms: 1500,
            possibly_complete_silence_ms: 1000,
        }
    }
}

/// Lifecycle events emitted by the recognizer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum SessionEvent {
    Ready,
    BeginSpeech,
    PartialText(String),
    FinalText(String),
    EndOfSpeech,
    Error(SessionErrorCode),
}

impl std::fmt::Display for SessionEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionEvent::Ready => write!(f, "READY"),
            SessionEvent::BeginSpeech => write!(f, "BEGIN_SPEECH"),
            SessionEvent::PartialText(_) => write!(f, "PARTIAL_TEXT"),
            SessionEvent::FinalText(_) => write!(f, "FINAL_TEXT"),
            SessionEvent::EndOfSpeech => write!(f, "END_OF_SPEECH"),
            SessionEvent::Error(code) => write!(f, "ERROR({})", code),
        }
    }
}

/// An event attributed to the session that produced it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdapterEvent {
    pub generation: u64,
    pub event: SessionEvent,
}

impl AdapterEvent {
    pub fn new(generation: u64, event: SessionEvent) -> Self {
        Self { generation, event }
    }
}

/// Native recognizer wrapper, owned exclusively by the engine
pub trait SessionAdapter: Send + Sync {
    /// Open a recognition session; events must carry `generation`
    fn start_session(
        &self,
        generation: u64,
        language_tag: &str,
        options: &SessionOptions,
    ) -> Result<(), EngineError>;

    /// Cancel the running session, if any
    fn stop_session(&self);

    /// Release the recognizer for good
    fn destroy(&self);
}
