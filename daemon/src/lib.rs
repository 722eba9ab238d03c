//! voicecmd: hands-free voice command engine
//!
//! Drives a speech recognizer session through Idle, Listening,
//! Processing and Error, classifies the final transcription against a
//! fixed phrase table and dispatches the resulting action. Recoverable
//! recognizer errors restart the session after a delay, a bounded
//! number of times.
//!
//! The recognizer itself is external and reached through
//! [`adapter::SessionAdapter`]; the daemon binary implements it over IPC.

pub mod adapter;
pub mod command;
pub mod config;
pub mod dispatch;
pub mod engine;
pub mod error;
pub mod events;
pub mod ipc;
pub mod lifecycle;
pub mod retry;
pub mod state;
pub mod telemetry;

pub use command::{ActionKind, CommandResult, VoiceAction};
pub use engine::{EngineBuilder, EngineConfig, EngineSnapshot, VoiceCommandEngine};
pub use error::{ConfigError, EngineError};
pub use state::ListeningState;
