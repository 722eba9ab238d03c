//! State machine module for the listening session
//!
//! Provides an explicit state machine with four states:
//! - Idle: Default state, no session
//! - Listening: Session live, capturing speech
//! - Processing: Speech ended, awaiting the final transcription
//! - Error: Terminal failure, waits for a manual start

mod machine;

pub use machine::{next_state, ListeningState, ListeningStateMachine, Transition};
