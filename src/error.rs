//! Error types for serverquery-client.

use std::time::Duration;

use thiserror::Error;

/// Main error type for all ServerQuery operations.
#[derive(Debug, Error)]
pub enum QueryError {
    /// Invalid or incomplete connection configuration.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Opening the connection (or the TLS handshake) failed.
    #[error("Failed to connect to {endpoint}: {source}")]
    Connection {
        /// Endpoint string the transport tried to reach.
        endpoint: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// A read or write failed after the connection was established.
    #[error("Connection lost: {0}")]
    ConnectionLost(String),

    /// The transport has no live stream.
    #[error("Not connected")]
    NotConnected,

    /// The server answered a command with a non-zero status code.
    #[error("Command failed with error {code}: {message}")]
    Command {
        /// Status code from the `error id=` field.
        code: u32,
        /// Unescaped status message.
        message: String,
    },

    /// A handler does not accept the arguments of the signal it was bound to.
    #[error("Handler for signal '{signal}' accepts {found} arguments, expected {expected}")]
    InvalidHandler {
        /// Lowercased signal name.
        signal: String,
        /// Argument kind the signal carries.
        expected: &'static str,
        /// Argument kind the handler accepts.
        found: &'static str,
    },

    /// The readiness wait exceeded its configured limit.
    #[error("Timed out waiting for data after {elapsed:?}")]
    WaitTimeout {
        /// Time spent waiting.
        elapsed: Duration,
    },

    /// The operation is not available on this kind of transport.
    #[error("Unsupported operation: {0}")]
    Unsupported(&'static str),

    /// The server sent something the protocol grammar does not allow.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// A signal handler reported a failure.
    #[error("Signal handler failed: {0}")]
    Handler(String),
}

impl QueryError {
    /// Status code of a failed command, if this is a command error.
    pub fn command_code(&self) -> Option<u32> {
        match self {
            QueryError::Command { code, .. } => Some(*code),
            _ => None,
        }
    }

    /// Whether the error means the connection is gone and a reconnect is needed.
    pub fn is_connection_lost(&self) -> bool {
        matches!(
            self,
            QueryError::ConnectionLost(_) | QueryError::NotConnected
        )
    }
}

/// Result type alias using QueryError.
pub type Result<T> = std::result::Result<T, QueryError>;
