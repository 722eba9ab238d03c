//! Phrase matching and incident description extraction.
//!
//! Precedence, highest first:
//! 1. any trigger phrase of the incident command
//! 2. the remaining commands in table order, first contained phrase wins
//! 3. the bare word "incident" anywhere in the text
//! 4. no match

use std::sync::Arc;

use tracing::debug;

use super::action::{ActionKind, CommandError, CommandResult, VoiceAction};
use super::patterns::{CommandPattern, CommandPatternTable};

/// Words dropped from an incident description.
///
/// Removal is plain substring replacement, not word-aware, so "without"
/// loses its "with" as well.
pub const FILLER_WORDS: [&str; 3] = ["about", "with", "saying"];

const INCIDENT_KEYWORD: &str = "incident";

/// Matcher output for one utterance
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Recognition {
    pub result: CommandResult,
    /// Action to dispatch; `None` when extraction failed
    pub action: Option<VoiceAction>,
}

/// Lowercase and trim surrounding whitespace
pub fn normalize(text: &str) -> String {
    text.trim().to_lowercase()
}

/// Description following `phrase` in `normalized`, fillers removed.
///
/// Falls back to the text after the bare word "incident" when `phrase`
/// is absent. Returns `None` when nothing usable remains.
pub fn extract_incident_description(normalized: &str, phrase: &str) -> Option<String> {
    let rest = match normalized.find(phrase) {
        Some(idx) => &normalized[idx + phrase.len()..],
        None => {
            let idx = normalized.find(INCIDENT_KEYWORD)?;
            &normalized[idx + INCIDENT_KEYWORD.len()..]
        }
    };

    let mut description = rest.to_string();
    for filler in FILLER_WORDS {
        description = description.replace(filler, "");
    }
    let description = description.trim();

    if description.is_empty() {
        None
    } else {
        Some(description.to_string())
    }
}

/// Maps recognized text to a typed action.
///
/// The pattern table is shared read-only, so clones are cheap and can be
/// used from any thread.
#[derive(Debug, Clone, Default)]
pub struct CommandMatcher {
    table: Arc<CommandPatternTable>,
}

impl CommandMatcher {
    pub fn new(table: CommandPatternTable) -> Self {
        Self {
            table: Arc::new(table),
        }
    }

    pub fn table(&self) -> &CommandPatternTable {
        &self.table
    }

    pub fn recognize(&self, text: &str) -> Recognition {
        match self.match_command(text) {
            Ok((command, action)) => Recognition {
                result: CommandResult::Success {
                    command,
                    action: action.clone(),
                },
                action: Some(action),
            },
            Err(CommandError::NoMatch) => Recognition {
                result: CommandResult::NoMatch,
                action: Some(VoiceAction::Unknown {
                    text: text.to_string(),
                }),
            },
            Err(err @ CommandError::MissingDescription) => Recognition {
                result: err.into(),
                action: None,
            },
        }
    }

    /// Resolve `text` to `(canonical command, action)`
    pub fn match_command(&self, text: &str) -> Result<(String, VoiceAction), CommandError> {
        let normalized = normalize(text);

        // incident phrases can embed other commands' phrases
        // ("report emergency"), so they are checked first
        if let Some(incident) = self.table.incident() {
            if let Some(phrase) = incident.find_phrase(&normalized) {
                debug!(command = %incident.name, phrase, "incident phrase matched");
                return Self::incident_action(incident, &normalized, phrase);
            }
        }

        for pattern in self
            .table
            .iter()
            .filter(|p| p.kind != ActionKind::ReportIncident)
        {
            if let Some(phrase) = pattern.find_phrase(&normalized) {
                debug!(command = %pattern.name, phrase, "command phrase matched");
                return Ok((pattern.name.clone(), plain_action(pattern.kind)));
            }
        }

        if let Some(incident) = self.table.incident() {
            if normalized.contains(INCIDENT_KEYWORD) {
                debug!("bare incident keyword matched");
                return Self::incident_action(incident, &normalized, INCIDENT_KEYWORD);
            }
        }

        debug!(text = %normalized, "no command matched");
        Err(CommandError::NoMatch)
    }

    fn incident_action(
        incident: &CommandPattern,
        normalized: &str,
        phrase: &str,
    ) -> Result<(String, VoiceAction), CommandError> {
        let description = extract_incident_description(normalized, phrase)
            .ok_or(CommandError::MissingDescription)?;
        Ok((
            incident.name.clone(),
            VoiceAction::ReportIncident { description },
        ))
    }
}

fn plain_action(kind: ActionKind) -> VoiceAction {
    match kind {
        ActionKind::NavigateToScan => VoiceAction::NavigateToScan,
        ActionKind::TriggerSos => VoiceAction::TriggerSOS,
        ActionKind::ShowAlerts => VoiceAction::ShowAlerts,
        ActionKind::NavigateToHome => VoiceAction::NavigateToHome,
        // payload-carrying kinds never reach here; tables reject Unknown and
        // incidents are resolved before the ordered scan
        ActionKind::ReportIncident => VoiceAction::ReportIncident {
            description: String::new(),
        },
        ActionKind::Unknown => VoiceAction::Unknown {
            text: String::new(),
        },
    }
}
