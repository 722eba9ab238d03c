//! Engine construction.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::sync::broadcast;

use super::voice::{Inner, Shared, VoiceCommandEngine};
use crate::adapter::{SessionAdapter, SessionOptions};
use crate::command::{CommandMatcher, CommandPatternTable};
use crate::dispatch::{
    ActionHandlers, Dispatcher, FeedbackEmitter, ObservedFeedback, TracingFeedback,
};
use crate::retry::RetryController;
use crate::state::ListeningStateMachine;

/// Engine tuning
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    pub language_tag: String,
    pub options: SessionOptions,
    pub max_retries: u32,
    pub restart_delay: Duration,
    pub auto_restart: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            language_tag: "en-US".to_string(),
            options: SessionOptions::default(),
            max_retries: 3,
            restart_delay: Duration::from_millis(1500),
            auto_restart: true,
        }
    }
}

/// Collects the engine's collaborators.
///
/// Handlers are handed over once here; the engine has no setter for them
/// afterwards.
pub struct EngineBuilder {
    adapter: Box<dyn SessionAdapter>,
    feedback: Box<dyn FeedbackEmitter>,
    handlers: ActionHandlers,
    patterns: CommandPatternTable,
    config: EngineConfig,
    event_capacity: usize,
    runtime: Option<Handle>,
}

impl EngineBuilder {
    pub(super) fn new(adapter: Box<dyn SessionAdapter>) -> Self {
        Self {
            adapter,
            feedback: Box::new(TracingFeedback),
            handlers: ActionHandlers::new(),
            patterns: CommandPatternTable::standard(),
            config: EngineConfig::default(),
            event_capacity: 64,
            runtime: None,
        }
    }

    pub fn feedback(mut self, feedback: impl FeedbackEmitter + 'static) -> Self {
        self.feedback = Box::new(feedback);
        self
    }

    pub fn handlers(mut self, handlers: ActionHandlers) -> Self {
        self.handlers = handlers;
        self
    }

    pub fn patterns(mut self, patterns: CommandPatternTable) -> Self {
        self.patterns = patterns;
        self
    }

    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Capacity of the engine event broadcast channel
    pub fn event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity.max(1);
        self
    }

    /// Runtime for restart timers.
    ///
    /// Defaults to the runtime `build` is called on.
    pub fn runtime(mut self, handle: Handle) -> Self {
        self.runtime = Some(handle);
        self
    }

    pub fn build(self) -> VoiceCommandEngine {
        let (event_tx, _) = broadcast::channel(self.event_capacity);
        let feedback = Arc::new(ObservedFeedback::new(self.feedback, event_tx.clone()));

        let inner = Inner {
            machine: ListeningStateMachine::new(),
            retry: RetryController::new(
                self.config.max_retries,
                self.config.restart_delay,
                self.config.auto_restart,
            ),
            recognized_text: String::new(),
            last_result: None,
            last_error: None,
            generation: 0,
            active_generation: None,
            pending_restart: None,
            restart_seq: 0,
            shut_down: false,
        };

        VoiceCommandEngine::from_shared(Shared {
            inner: Mutex::new(inner),
            adapter: self.adapter,
            adapter_order: Mutex::new(()),
            runtime: self.runtime.or_else(|| Handle::try_current().ok()),
            dispatcher: Dispatcher::new(feedback, self.handlers),
            matcher: CommandMatcher::new(self.patterns),
            config: self.config,
            event_tx,
        })
    }
}
