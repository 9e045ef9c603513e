//! Error types for the Gmail reader

use thiserror::Error;

/// Result type for Gmail reader operations
pub type GmailResult<T> = Result<T, GmailError>;

/// Errors that can occur while talking to the mailbox
#[derive(Debug, Error)]
pub enum GmailError {
    /// Credential descriptor or configuration is missing or malformed
    #[error("Configuration error: {0}")]
    Config(String),

    /// Refresh token exchange was rejected
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// A remote call failed
    #[error("Transport error: {0}")]
    Transport(String),

    /// Outer base64url layer of a raw message could not be decoded
    #[error("Unable to decode raw message: {0}")]
    Decode(#[from] base64::DecodeError),

    /// Raw message or one of its headers has an unexpected structure
    #[error("Malformed message: {0}")]
    Format(String),
}

impl GmailError {
    pub fn is_auth(&self) -> bool {
        matches!(self, GmailError::Auth(_))
    }

    pub fn is_config(&self) -> bool {
        matches!(self, GmailError::Config(_))
    }
}

impl From<hyper::Error> for GmailError {
    fn from(e: hyper::Error) -> Self {
        GmailError::Transport(e.to_string())
    }
}
