//! Error taxonomy for remote calls and client-side checks.
//!
//! Three failure families reach callers:
//!
//! | Variant | Origin |
//! |---------|--------|
//! | [`CrmError::Transport`] | the server answered with a non-2xx status |
//! | [`CrmError::Network`] | no response was received (connect/timeout/IO) |
//! | [`CrmError::Validation`] | a client-side check failed before any request |
//!
//! `Decode` and `NotFound` cover malformed bodies and lookups that
//! resolve to nothing. The type is `Clone` so one de-duplicated failure
//! can be handed to every waiter of a shared request.

use thiserror::Error;

/// Result alias used across the library.
pub type CrmResult<T> = Result<T, CrmError>;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CrmError {
    /// Non-2xx response. `message` is the response body when present.
    #[error("API Error: {status} - {message}")]
    Transport { status: u16, message: String },

    /// The request never produced a response.
    #[error("Network error: {0}")]
    Network(String),

    /// Client-side field check; never sent to the server.
    #[error("Invalid {field}: {message}")]
    Validation { field: String, message: String },

    /// The response body could not be decoded into the expected shape.
    #[error("Malformed response: {0}")]
    Decode(String),

    #[error("Not found: {0}")]
    NotFound(String),
}

impl CrmError {
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// The single string surfaced to the user.
    ///
    /// Transport and network failures are rendered the same way: one line,
    /// no distinction the UI has to branch on.
    pub fn user_message(&self) -> String {
        self.to_string()
    }

    /// True for failures that came from the remote side (transport or network).
    pub fn is_remote(&self) -> bool {
        matches!(self, Self::Transport { .. } | Self::Network(_))
    }
}

impl From<reqwest::Error> for CrmError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            return Self::Decode(e.to_string());
        }
        match e.status() {
            Some(status) => Self::Transport {
                status: status.as_u16(),
                message: status
                    .canonical_reason()
                    .unwrap_or("request failed")
                    .to_string(),
            },
            None => Self::Network(e.to_string()),
        }
    }
}

impl From<serde_json::Error> for CrmError {
    fn from(e: serde_json::Error) -> Self {
        Self::Decode(e.to_string())
    }
}
