//! Per-action handler registry.
//!
//! One optional callback per [`ActionKind`]. Registering a kind twice
//! replaces the earlier callback. The incident handler receives the
//! extracted description; every other handler takes no payload.

use std::collections::HashMap;

use crate::command::{ActionKind, VoiceAction};

type PlainCallback = Box<dyn Fn() + Send + Sync>;
type IncidentCallback = Box<dyn Fn(&str) + Send + Sync>;

enum Handler {
    Plain(PlainCallback),
    Incident(IncidentCallback),
}

/// Registered action callbacks, fixed once the engine is built
#[derive(Default)]
pub struct ActionHandlers {
    handlers: HashMap<ActionKind, Handler>,
}

impl std::fmt::Debug for ActionHandlers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut kinds: Vec<String> = self.handlers.keys().map(|k| k.to_string()).collect();
        kinds.sort();
        f.debug_struct("ActionHandlers")
            .field("registered", &kinds)
            .finish()
    }
}

impl ActionHandlers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a payload-free callback for `kind`.
    ///
    /// For [`ActionKind::ReportIncident`] the description is dropped; use
    /// [`ActionHandlers::on_report_incident`] to receive it.
    pub fn on<F>(&mut self, kind: ActionKind, callback: F) -> &mut Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.handlers.insert(kind, Handler::Plain(Box::new(callback)));
        self
    }

    /// Register the incident callback
    pub fn on_report_incident<F>(&mut self, callback: F) -> &mut Self
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.handlers
            .insert(ActionKind::ReportIncident, Handler::Incident(Box::new(callback)));
        self
    }

    pub fn is_registered(&self, kind: ActionKind) -> bool {
        self.handlers.contains_key(&kind)
    }

    /// Invoke the handler for `action` once.
    ///
    /// Returns `false` when no handler is registered for its kind.
    pub fn invoke(&self, action: &VoiceAction) -> bool {
        let Some(handler) = self.handlers.get(&action.kind()) else {
            return false;
        };
        match (handler, action) {
            (Handler::Incident(callback), VoiceAction::ReportIncident { description }) => {
                callback(description)
            }
            (Handler::Incident(callback), _) => callback(""),
            (Handler::Plain(callback), _) => callback(),
        }
        true
    }
}
