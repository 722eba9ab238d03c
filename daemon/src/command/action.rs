//! Typed actions and recognition results.

use serde::{Deserialize, Serialize};

/// An action the application performs in response to a voice command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum VoiceAction {
    NavigateToScan,
    #[serde(rename = "trigger_sos")]
    TriggerSOS,
    ShowAlerts,
    NavigateToHome,
    ReportIncident { description: String },
    Unknown { text: String },
}

impl VoiceAction {
    pub fn kind(&self) -> ActionKind {
        match self {
            VoiceAction::NavigateToScan => ActionKind::NavigateToScan,
            VoiceAction::TriggerSOS => ActionKind::TriggerSos,
            VoiceAction::ShowAlerts => ActionKind::ShowAlerts,
            VoiceAction::NavigateToHome => ActionKind::NavigateToHome,
            VoiceAction::ReportIncident { .. } => ActionKind::ReportIncident,
            VoiceAction::Unknown { .. } => ActionKind::Unknown,
        }
    }

    /// Feedback narrated right before the action's handler runs
    pub fn announcement(&self) -> String {
        match self {
            VoiceAction::NavigateToScan => "Opening scan.".to_string(),
            VoiceAction::TriggerSOS => "Sending SOS emergency alert.".to_string(),
            VoiceAction::ShowAlerts => "Showing alerts.".to_string(),
            VoiceAction::NavigateToHome => "Going back home.".to_string(),
            VoiceAction::ReportIncident { description } => {
                format!("Reporting incident: {}", description)
            }
            VoiceAction::Unknown { .. } => "Command not recognized. Please try again.".to_string(),
        }
    }
}

/// Payload-free discriminant of [`VoiceAction`], used to key handlers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    NavigateToScan,
    TriggerSos,
    ShowAlerts,
    NavigateToHome,
    ReportIncident,
    Unknown,
}

impl std::fmt::Display for ActionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ActionKind::NavigateToScan => "navigate_to_scan",
            ActionKind::TriggerSos => "trigger_sos",
            ActionKind::ShowAlerts => "show_alerts",
            ActionKind::NavigateToHome => "navigate_to_home",
            ActionKind::ReportIncident => "report_incident",
            ActionKind::Unknown => "unknown",
        };
        write!(f, "{}", name)
    }
}

/// Why an utterance did not produce a dispatchable command
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CommandError {
    #[error("no command matched")]
    NoMatch,
    #[error("Missing incident description")]
    MissingDescription,
}

/// Outcome of one finalized utterance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum CommandResult {
    Success { command: String, action: VoiceAction },
    Error { message: String },
    NoMatch,
}

impl CommandResult {
    pub fn is_success(&self) -> bool {
        matches!(self, CommandResult::Success { .. })
    }
}

impl From<CommandError> for CommandResult {
    fn from(err: CommandError) -> Self {
        match err {
            CommandError::NoMatch => CommandResult::NoMatch,
            CommandError::MissingDescription => CommandResult::Error {
                message: err.to_string(),
            },
        }
    }
}
