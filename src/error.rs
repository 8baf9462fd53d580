//! Error taxonomy shared by the CLI and the TUI
//!
//! Every failure is caught where the triggering action was started and shown
//! as a notification; nothing here is fatal to the interactive client.

use thiserror::Error;

/// Classified client-side failure.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Backend or socket unreachable, or the backend answered with a 5xx.
    #[error("network error: {0}")]
    Network(String),

    /// Bad credentials, or a missing/expired session token.
    #[error("authentication failed: {0}")]
    Auth(String),

    /// Missing or malformed user input.
    #[error("invalid input: {0}")]
    Validation(String),

    /// Unknown peer, mentor or user id.
    #[error("not found: {0}")]
    NotFound(String),

    /// Identity provider or conferencing SDK failure.
    #[error("{service} error: {message}")]
    ThirdParty {
        service: &'static str,
        message: String,
    },
}

impl ClientError {
    /// Short label used as the notification prefix.
    pub fn label(&self) -> &'static str {
        match self {
            ClientError::Network(_) => "Connection problem",
            ClientError::Auth(_) => "Sign-in required",
            ClientError::Validation(_) => "Check your input",
            ClientError::NotFound(_) => "Not found",
            ClientError::ThirdParty { .. } => "Service error",
        }
    }

    pub fn network(err: impl std::fmt::Display) -> Self {
        ClientError::Network(err.to_string())
    }

    pub fn third_party(service: &'static str, err: impl std::fmt::Display) -> Self {
        ClientError::ThirdParty {
            service,
            message: err.to_string(),
        }
    }
}

/// Find the classified error anywhere in an anyhow chain.
pub fn classify(err: &anyhow::Error) -> Option<&ClientError> {
    err.chain().find_map(|e| e.downcast_ref::<ClientError>())
}

/// One-line, user-facing notification text for an error.
pub fn notice(err: &anyhow::Error) -> String {
    match classify(err) {
        Some(client_err) => format!("{}: {:#}", client_err.label(), err),
        None => format!("Something went wrong: {:#}", err),
    }
}
