//! Bounded auto-restart policy for recoverable session errors.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::codes::{ErrorClass, SessionErrorCode};

/// Terminal message surfaced once the retry budget is spent
pub const RETRIES_EXHAUSTED_MESSAGE: &str = "Tap microphone to try again";

/// Snapshot of the retry counters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryState {
    pub count: u32,
    pub max_retries: u32,
    pub auto_restart_enabled: bool,
}

/// What the engine should do after a session error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Restart after `delay`; `attempt` is the new retry count
    Restart { attempt: u32, delay: Duration },
    /// Budget spent; surface the terminal error and wait for a manual start
    Exhausted { attempts: u32 },
    /// No restart; surface the error's feedback only
    Surface { class: ErrorClass },
}

/// Tracks consecutive recoverable failures
#[derive(Debug, Clone)]
pub struct RetryController {
    state: RetryState,
    delay: Duration,
}

impl RetryController {
    pub fn new(max_retries: u32, delay: Duration, auto_restart_enabled: bool) -> Self {
        Self {
            state: RetryState {
                count: 0,
                max_retries,
                auto_restart_enabled,
            },
            delay,
        }
    }

    pub fn state(&self) -> RetryState {
        self.state
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    pub fn is_exhausted(&self) -> bool {
        self.state.count >= self.state.max_retries
    }

    /// Classify an error and update the counter.
    ///
    /// The count moves only for recoverable errors while auto-restart is on,
    /// and never past `max_retries`.
    pub fn on_error(&mut self, code: SessionErrorCode) -> RetryDecision {
        let class = code.class();
        if class == ErrorClass::Terminal {
            debug!(%code, "terminal session error, no retry");
            return RetryDecision::Surface { class };
        }
        if !self.state.auto_restart_enabled {
            debug!(%code, "auto-restart disabled, no retry");
            return RetryDecision::Surface { class };
        }
        if self.is_exhausted() {
            warn!(count = self.state.count, "retry budget already spent");
            return RetryDecision::Exhausted {
                attempts: self.state.count,
            };
        }

        self.state.count += 1;
        if self.is_exhausted() {
            warn!(
                attempts = self.state.count,
                max_retries = self.state.max_retries,
                "retries exhausted"
            );
            RetryDecision::Exhausted {
                attempts: self.state.count,
            }
        } else {
            info!(
                attempt = self.state.count,
                max_retries = self.state.max_retries,
                delay_ms = self.delay.as_millis() as u64,
                "scheduling auto-restart"
            );
            RetryDecision::Restart {
                attempt: self.state.count,
                delay: self.delay,
            }
        }
    }

    /// A final recognition succeeded
    pub fn on_success(&mut self) {
        self.state.count = 0;
    }

    /// Manual reset
    pub fn reset(&mut self) {
        self.state.count = 0;
    }

    /// Re-arm the budget on a manual start after exhaustion
    pub fn rearm(&mut self) {
        if self.is_exhausted() {
            debug!("re-arming retry budget after manual start");
            self.state.count = 0;
        }
    }

    pub fn set_auto_restart(&mut self, enabled: bool) {
        self.state.auto_restart_enabled = enabled;
    }
}
