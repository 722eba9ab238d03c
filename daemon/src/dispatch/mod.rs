//! Dispatch module: action handlers and spoken feedback

mod dispatcher;
mod feedback;
mod handlers;

pub use dispatcher::Dispatcher;
pub(crate) use feedback::ObservedFeedback;
pub use feedback::{FeedbackEmitter, TracingFeedback, MISSING_DESCRIPTION_PROMPT, READY_PROMPT};
pub use handlers::ActionHandlers;
