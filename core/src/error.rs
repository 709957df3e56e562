//! Error types for Chatlink Core

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Media capability denied: {0}")]
    CapabilityDenied(String),

    #[error("Signaling error: {0}")]
    Signaling(String),

    #[error("Signaling channel not connected")]
    NotConnected,

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Media error: {0}")]
    Media(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Config error: {0}")]
    Config(String),

    #[error("A call is already in progress")]
    CallBusy,

    #[error("No active call")]
    NoActiveCall,

    #[error("Cannot {action} while call is {from}")]
    InvalidTransition { from: &'static str, action: &'static str },

    #[error("No conversation is open")]
    NoConversation,
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// True for failures the user should see rather than only find in logs.
    pub fn is_user_visible(&self) -> bool {
        !matches!(self, Error::Persistence(_) | Error::Http(_))
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Error::Http(e.to_string())
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for Error {
    fn from(e: tokio_tungstenite::tungstenite::Error) -> Self {
        Error::Signaling(e.to_string())
    }
}

impl From<webrtc::Error> for Error {
    fn from(e: webrtc::Error) -> Self {
        Error::Media(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_failures_stay_in_logs() {
        assert!(!Error::Http("502 Bad Gateway".into()).is_user_visible());
        assert!(!Error::Persistence("timeout".into()).is_user_visible());
        assert!(Error::CapabilityDenied("camera".into()).is_user_visible());
        assert!(Error::NotConnected.is_user_visible());
        assert_eq!(
            Error::InvalidTransition {
                from: "outgoing",
                action: "accept"
            }
            .to_string(),
            "Cannot accept while call is outgoing"
        );
    }
}
