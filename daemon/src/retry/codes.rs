//! Session error codes reported by the speech adapter

use serde::{Deserialize, Serialize};

/// Error codes a recognition session can end with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionErrorCode {
    Network,
    NetworkTimeout,
    NoMatch,
    SpeechTimeout,
    RecognizerBusy,
    InsufficientPermissions,
    Other,
}

/// Whether an error is eligible for auto-restart
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorClass {
    Recoverable,
    Terminal,
}

impl SessionErrorCode {
    pub fn class(self) -> ErrorClass {
        match self {
            SessionErrorCode::SpeechTimeout | SessionErrorCode::NoMatch => ErrorClass::Recoverable,
            SessionErrorCode::Network
            | SessionErrorCode::NetworkTimeout
            | SessionErrorCode::RecognizerBusy
            | SessionErrorCode::InsufficientPermissions
            | SessionErrorCode::Other => ErrorClass::Terminal,
        }
    }

    pub fn is_recoverable(self) -> bool {
        self.class() == ErrorClass::Recoverable
    }

    /// Feedback narrated to the user for this error
    pub fn feedback_message(self) -> &'static str {
        match self {
            SessionErrorCode::Network => "Network error. Please check your connection.",
            SessionErrorCode::NetworkTimeout => "Network timeout. Please try again.",
            SessionErrorCode::NoMatch => "I didn't catch that. Please try again.",
            SessionErrorCode::SpeechTimeout => "No speech detected. Please try again.",
            SessionErrorCode::RecognizerBusy => "Speech recognizer is busy. Please wait.",
            SessionErrorCode::InsufficientPermissions => {
                "Microphone permission is required for voice commands."
            }
            SessionErrorCode::Other => "Speech recognition error. Please try again.",
        }
    }
}

impl std::fmt::Display for SessionErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionErrorCode::Network => write!(f, "NETWORK"),
            SessionErrorCode::NetworkTimeout => write!(f, "NETWORK_TIMEOUT"),
            SessionErrorCode::NoMatch => write!(f, "NO_MATCH"),
            SessionErrorCode::SpeechTimeout => write!(f, "SPEECH_TIMEOUT"),
            SessionErrorCode::RecognizerBusy => write!(f, "RECOGNIZER_BUSY"),
            SessionErrorCode::InsufficientPermissions => write!(f, "INSUFFICIENT_PERMISSIONS"),
            SessionErrorCode::Other => write!(f, "OTHER"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recoverable_codes() {
        assert!(SessionErrorCode::SpeechTimeout.is_recoverable());
        assert!(SessionErrorCode::NoMatch.is_recoverable());
    }

    #[test]
    fn test_terminal_codes() {
        for code in [
            SessionErrorCode::Network,
            SessionErrorCode::NetworkTimeout,
            SessionErrorCode::RecognizerBusy,
            SessionErrorCode::InsufficientPermissions,
            SessionErrorCode::Other,
        ] {
            assert_eq!(code.class(), ErrorClass::Terminal, "{}", code);
        }
    }

    #[test]
    fn test_wire_names_match_display() {
        let json = serde_json::to_string(&SessionErrorCode::InsufficientPermissions).unwrap();
        assert_eq!(json, r#""INSUFFICIENT_PERMISSIONS""#);

        let code: SessionErrorCode = serde_json::from_str(r#""SPEECH_TIMEOUT""#).unwrap();
        assert_eq!(code, SessionErrorCode::SpeechTimeout);
        assert_eq!(code.to_string(), "SPEECH_TIMEOUT");
    }
}
