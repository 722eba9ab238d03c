//! Announce-then-invoke dispatch of recognized actions.

use std::sync::Arc;

use tracing::{debug, info};

use super::feedback::FeedbackEmitter;
use super::handlers::ActionHandlers;
use crate::command::VoiceAction;

pub struct Dispatcher {
    feedback: Arc<dyn FeedbackEmitter>,
    handlers: ActionHandlers,
}

impl Dispatcher {
    pub fn new(feedback: Arc<dyn FeedbackEmitter>, handlers: ActionHandlers) -> Self {
        Self { feedback, handlers }
    }

    pub fn feedback(&self) -> &dyn FeedbackEmitter {
        self.feedback.as_ref()
    }

    /// Narrate the action, then run its handler once if one is registered.
    ///
    /// Returns whether a handler ran.
    pub fn dispatch(&self, action: &VoiceAction) -> bool {
        self.feedback.speak(&action.announcement());

        let handled = self.handlers.invoke(action);
        if handled {
            info!(kind = %action.kind(), "action dispatched");
        } else {
            debug!(kind = %action.kind(), "no handler registered");
        }
        handled
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("handlers", &self.handlers)
            .finish()
    }
}
