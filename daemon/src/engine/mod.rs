//! Engine module: the voice command recognition engine
//!
//! Combines the listening state machine, command matcher, retry controller
//! and dispatcher around one exclusively owned session adapter.

mod builder;
mod voice;

pub use self::builder::{EngineBuilder, EngineConfig};
pub use self::voice::{EngineSnapshot, VoiceCommandEngine, ADAPTER_UNAVAILABLE_MESSAGE};
