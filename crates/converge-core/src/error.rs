//! Error types for the reconciliation engine

use thiserror::Error;

/// Result type alias using the converge Error
pub type Result<T> = std::result::Result<T, Error>;

/// Failures a reconciliation step can run into
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    /// No candidate endpoint could be reached within the retry budget
    #[error("Connection error: {0}")]
    Connection(String),

    /// Network or timeout failure while a command was in flight
    #[error("Transport error: {0}")]
    Transport(String),

    /// The server answered with `ok: 0`
    #[error("Server error{}: {message}", code.map(|c| format!(" ({c})")).unwrap_or_default())]
    Server {
        /// Server error code, when the reply carried one
        code: Option<i32>,
        /// The reply's `errmsg`
        message: String,
    },

    /// After a reconfigure whose connection dropped, the live config differs
    /// from the one that was submitted
    #[error("Replica set config mismatch: current {current}, target {target}")]
    ConfigMismatch {
        /// Live members as re-read from the cluster
        current: String,
        /// Members that were submitted
        target: String,
    },

    /// The server reported success but the confirmation field was missing
    #[error("Ambiguous result: {0}")]
    Ambiguous(String),

    /// Desired-state input that cannot be turned into commands
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// A reply or live config document did not have the expected shape
    #[error("Malformed reply: {0}")]
    MalformedReply(String),
}

impl Error {
    /// Create a connection error
    pub fn connection(msg: impl Into<String>) -> Self {
        Self::Connection(msg.into())
    }

    /// Create a transport error
    pub fn transport(msg: impl Into<String>) -> Self {
        Self::Transport(msg.into())
    }

    /// Create a server error
    pub fn server(code: Option<i32>, msg: impl Into<String>) -> Self {
        Self::Server {
            code,
            message: msg.into(),
        }
    }

    /// Create an invalid-input error
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// Create a malformed-reply error
    pub fn malformed(msg: impl Into<String>) -> Self {
        Self::MalformedReply(msg.into())
    }

    /// Whether this is a connection-level failure
    pub fn is_connection(&self) -> bool {
        matches!(self, Self::Connection(_))
    }
}

impl From<mongodb::bson::document::ValueAccessError> for Error {
    fn from(err: mongodb::bson::document::ValueAccessError) -> Self {
        Self::MalformedReply(err.to_string())
    }
}
