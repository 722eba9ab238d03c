//! Command module: turns recognized text into a typed action
//!
//! Matching is substring based against a fixed, ordered phrase table.
//! See [`matcher`] for the precedence rules.

mod action;
pub mod matcher;
mod patterns;

pub use action::{ActionKind, CommandError, CommandResult, VoiceAction};
pub use matcher::{extract_incident_description, normalize, CommandMatcher, Recognition};
pub use patterns::{
    CommandPattern, CommandPatternTable, BACK_HOME, OPEN_SCAN, SEND_INCIDENT, SEND_SOS,
    SHOW_ALERTS,
};
