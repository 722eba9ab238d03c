//! Canonical command table.
//!
//! Each canonical command owns an ordered list of lowercase trigger
//! phrases. Table order is the tie-break between commands whose phrases
//! overlap: the first command with any contained phrase wins. The
//! incident command is the one exception, it is always checked first.

use std::collections::HashSet;

use super::action::ActionKind;
use crate::error::EngineError;

pub const OPEN_SCAN: &str = "open scan";
pub const SEND_SOS: &str = "send sos";
pub const SHOW_ALERTS: &str = "show alerts";
pub const BACK_HOME: &str = "back home";
pub const SEND_INCIDENT: &str = "send incident";

/// A canonical command and its trigger phrases
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandPattern {
    pub name: String,
    pub phrases: Vec<String>,
    pub kind: ActionKind,
}

impl CommandPattern {
    pub fn new(name: &str, phrases: &[&str], kind: ActionKind) -> Self {
        Self {
            name: name.to_string(),
            phrases: phrases.iter().map(|p| p.to_string()).collect(),
            kind,
        }
    }

    /// First phrase, in declaration order, contained in `normalized`
    pub fn find_phrase(&self, normalized: &str) -> Option<&str> {
        self.phrases
            .iter()
            .map(String::as_str)
            .find(|phrase| normalized.contains(phrase))
    }
}

/// Ordered, immutable command table
#[derive(Debug, Clone)]
pub struct CommandPatternTable {
    patterns: Vec<CommandPattern>,
}

impl Default for CommandPatternTable {
    fn default() -> Self {
        Self::standard()
    }
}

impl CommandPatternTable {
    /// The command set shipped with the application
    pub fn standard() -> Self {
        Self {
            patterns: vec![
                CommandPattern::new(
                    OPEN_SCAN,
                    &[
                        "open scan",
                        "start scan",
                        "begin scan",
                        "scan area",
                        "scan surroundings",
                        "look around",
                        "check area",
                    ],
                    ActionKind::NavigateToScan,
                ),
                CommandPattern::new(
                    SEND_SOS,
                    &[
                        "send sos",
                        "sos",
                        "emergency",
                        "help me",
                        "i need help",
                        "call emergency",
                        "send emergency",
                        "trigger sos",
                    ],
                    ActionKind::TriggerSos,
                ),
                CommandPattern::new(
                    SHOW_ALERTS,
                    &[
                        "show alerts",
                        "open alerts",
                        "view alerts",
                        "alerts",
                        "check alerts",
                        "see alerts",
                    ],
                    ActionKind::ShowAlerts,
                ),
                CommandPattern::new(
                    BACK_HOME,
                    &[
                        "back home",
                        "go home",
                        "return home",
                        "home",
                        "main screen",
                        "main menu",
                    ],
                    ActionKind::NavigateToHome,
                ),
                CommandPattern::new(
                    SEND_INCIDENT,
                    &[
                        "send incident",
                        "report incident",
                        "report emergency",
                        "file incident",
                        "create incident",
                        "log incident",
                    ],
                    ActionKind::ReportIncident,
                ),
            ],
        }
    }

    /// Build a custom table.
    ///
    /// Phrases must be non-empty, lowercase and free of surrounding
    /// whitespace, since matching runs against normalized text.
    pub fn from_patterns(patterns: Vec<CommandPattern>) -> Result<Self, EngineError> {
        let mut names = HashSet::new();
        for pattern in &patterns {
            if !names.insert(pattern.name.as_str()) {
                return Err(EngineError::InvalidPatterns(format!(
                    "duplicate command {:?}",
                    pattern.name
                )));
            }
            if pattern.kind == ActionKind::Unknown {
                return Err(EngineError::InvalidPatterns(format!(
                    "command {:?} cannot map to the unknown action",
                    pattern.name
                )));
            }
            if pattern.phrases.is_empty() {
                return Err(EngineError::InvalidPatterns(format!(
                    "command {:?} has no trigger phrases",
                    pattern.name
                )));
            }
            for phrase in &pattern.phrases {
                if phrase.is_empty()
                    || phrase.trim() != phrase
                    || phrase.to_lowercase() != *phrase
                {
                    return Err(EngineError::InvalidPatterns(format!(
                        "phrase {:?} of {:?} must be lowercase and trimmed",
                        phrase, pattern.name
                    )));
                }
            }
        }
        Ok(Self { patterns })
    }

    pub fn iter(&self) -> impl Iterator<Item = &CommandPattern> {
        self.patterns.iter()
    }

    pub fn get(&self, name: &str) -> Option<&CommandPattern> {
        self.patterns.iter().find(|p| p.name == name)
    }

    /// The incident-reporting command, if the table has one
    pub fn incident(&self) -> Option<&CommandPattern> {
        self.patterns
            .iter()
            .find(|p| p.kind == ActionKind::ReportIncident)
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }
}
