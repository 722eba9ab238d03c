//! Retry module for session error recovery
//!
//! Classifies adapter error codes and decides between a delayed
//! auto-restart and surfacing the failure.

mod codes;
mod controller;

pub use codes::{ErrorClass, SessionErrorCode};
pub use controller::{RetryController, RetryDecision, RetryState, RETRIES_EXHAUSTED_MESSAGE};
