//! Accessibility feedback channel.

use tokio::sync::broadcast;
use tracing::info;

use crate::events::EngineEvent;

/// Narrated once a session is live
pub const READY_PROMPT: &str = "Listening. Say a command.";

/// Narrated when an incident command carries no description
pub const MISSING_DESCRIPTION_PROMPT: &str =
    "Please describe the incident. Say report incident followed by what happened.";

/// Fire-and-forget text-to-speech sink
pub trait FeedbackEmitter: Send + Sync {
    fn speak(&self, utterance: &str);
}

/// Writes feedback to the log; used when no speech output is attached
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingFeedback;

impl FeedbackEmitter for TracingFeedback {
    fn speak(&self, utterance: &str) {
        info!(utterance, "feedback");
    }
}

/// Mirrors every utterance onto the engine event stream before
/// passing it to the wrapped emitter
pub(crate) struct ObservedFeedback {
    inner: Box<dyn FeedbackEmitter>,
    event_tx: broadcast::Sender<EngineEvent>,
}

impl ObservedFeedback {
    pub(crate) fn new(
        inner: Box<dyn FeedbackEmitter>,
        event_tx: broadcast::Sender<EngineEvent>,
    ) -> Self {
        Self { inner, event_tx }
    }
}

impl FeedbackEmitter for ObservedFeedback {
    fn speak(&self, utterance: &str) {
        let _ = self.event_tx.send(EngineEvent::Feedback {
            utterance: utterance.to_string(),
        });
        self.inner.speak(utterance);
    }
}
