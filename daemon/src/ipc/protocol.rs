//! IPC message protocol definitions
//!
//! All messages are JSON-encoded, prefixed with a 4-byte little-endian length.

use serde::{Deserialize, Serialize};

use crate::adapter::{AdapterEvent, SessionOptions};
use crate::command::CommandResult;
use crate::engine::EngineSnapshot;
use crate::events::EngineEvent;
use crate::retry::RetryState;
use crate::state::ListeningState;

/// Largest accepted frame body
pub const MAX_FRAME_LEN: usize = 1024 * 1024;

/// Requests from clients to daemon
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Request {
    /// Ping to check connectivity
    Ping,

    /// Request current daemon status
    GetStatus,

    /// Manually start a listening session
    Start,

    /// Cancel the current session and any pending restart
    Stop,

    /// Reset the engine to Idle and clear its counters
    Reset,

    /// Toggle automatic restart after recoverable errors
    SetAutoRestart { enabled: bool },

    /// Recognizer lifecycle event from the speech host
    AdapterEvent(AdapterEvent),

    /// Classify text without dispatching
    Recognize { text: String },

    /// Subscribe to engine events and session commands
    Subscribe,
}

/// Responses from daemon to clients
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Response {
    /// Pong response to ping
    Pong,

    /// Current daemon status
    Status(DaemonStatus),

    /// Request accepted
    Ok,

    /// Result of a dry-run classification
    Recognized { result: CommandResult },

    /// Subscription confirmed
    Subscribed,

    /// Error response
    Error { code: String, message: String },
}

impl Response {
    pub fn error(code: &str, message: impl Into<String>) -> Self {
        Response::Error {
            code: code.to_string(),
            message: message.into(),
        }
    }
}

/// Instruction for the speech host that owns the native recognizer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum SessionCommand {
    StartSession {
        generation: u64,
        language_tag: String,
        options: SessionOptions,
    },
    StopSession,
    Destroy,
}

/// Push notification from daemon to subscribed clients
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum Notification {
    /// Engine event occurred
    EngineEvent(EngineEvent),
    /// The speech host should act on the recognizer
    SessionCommand(SessionCommand),
}

/// Full daemon status snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DaemonStatus {
    /// Daemon version
    pub version: String,

    pub state: ListeningState,

    pub retry: RetryState,

    pub recognized_text: String,

    pub last_result: Option<CommandResult>,

    pub last_error: Option<String>,

    /// Uptime in seconds
    pub uptime_secs: u64,
}

impl DaemonStatus {
    pub fn from_snapshot(snapshot: EngineSnapshot, uptime_secs: u64) -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
            state: snapshot.state,
            retry: snapshot.retry,
            recognized_text: snapshot.recognized_text,
            last_result: snapshot.last_result,
            last_error: snapshot.last_error,
            uptime_secs,
        }
    }
}
