//! Server error types.

use crate::config::ConfigError;
use flare_protocol::{ErrorClass, ProtocolError};
use thiserror::Error;

/// Server errors.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("no task registered for opcode {opcode:#x}")]
    UnsupportedMessage { opcode: u8 },

    #[error("{0} timed out")]
    Timeout(&'static str),

    #[error("server shutting down")]
    ShuttingDown,
}

impl ServerError {
    /// Returns the error class.
    pub fn class(&self) -> ErrorClass {
        match self {
            ServerError::Io(_) | ServerError::Timeout(_) | ServerError::ShuttingDown => {
                ErrorClass::IoFailure
            }
            ServerError::Protocol(e) => e.class(),
            ServerError::Config(_) => ErrorClass::ConfigurationError,
            ServerError::UnsupportedMessage { .. } => ErrorClass::DispatchMiss,
        }
    }

    /// Returns whether the connection must be torn down.
    pub fn is_fatal(&self) -> bool {
        match self {
            ServerError::Protocol(e) => e.is_fatal(),
            ServerError::UnsupportedMessage { .. } => false,
            _ => true,
        }
    }
}
