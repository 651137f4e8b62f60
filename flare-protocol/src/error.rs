//! Protocol error types and error classes.

use std::fmt;
use thiserror::Error;

/// Protocol-level errors that can occur during the handshake, framing or
/// Flare message handling.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("unsupported frame opcode: {opcode:#x}")]
    UnsupportedFrame { opcode: u8 },

    #[error("unsupported application message opcode: {opcode:#x}")]
    UnsupportedMessage { opcode: u8 },

    #[error("frame too large: {size} bytes (max {max})")]
    FrameTooLarge { size: u64, max: u32 },

    #[error("handshake request exceeds {max} bytes")]
    HandshakeTooLarge { max: usize },

    #[error("handshake request has no Sec-WebSocket-Key header")]
    MissingKey,

    #[error("length mismatch: header declares {declared} bytes, got {actual}")]
    LengthMismatch { declared: u32, actual: usize },

    #[error("truncated message: need {needed} more bytes")]
    Truncated { needed: usize },

    #[error("invalid field {field}: {reason}")]
    InvalidField {
        field: &'static str,
        reason: String,
    },

    #[error("opcode {opcode:#x} registered twice")]
    DuplicateOpcode { opcode: u8 },

    #[error("invalid UTF-8 in text payload")]
    InvalidUtf8,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// How an error is treated by a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorClass {
    /// Malformed input. The offending frame or message is rejected.
    ProtocolViolation,
    /// Read or write failure. Always fatal to the connection.
    IoFailure,
    /// Missing or unusable peer-supplied setup data, degraded to a default.
    ConfigurationError,
    /// No handler registered for an opcode.
    DispatchMiss,
}

impl ErrorClass {
    /// Returns whether errors of this class always end the connection.
    pub fn is_fatal(&self) -> bool {
        matches!(self, ErrorClass::IoFailure)
    }
}

impl fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorClass::ProtocolViolation => write!(f, "PROTOCOL_VIOLATION"),
            ErrorClass::IoFailure => write!(f, "IO_FAILURE"),
            ErrorClass::ConfigurationError => write!(f, "CONFIGURATION_ERROR"),
            ErrorClass::DispatchMiss => write!(f, "DISPATCH_MISS"),
        }
    }
}

impl ProtocolError {
    /// Classifies the error.
    pub fn class(&self) -> ErrorClass {
        match self {
            ProtocolError::UnsupportedFrame { .. } | ProtocolError::UnsupportedMessage { .. } => {
                ErrorClass::DispatchMiss
            }
            ProtocolError::MissingKey => ErrorClass::ConfigurationError,
            ProtocolError::Io(_) => ErrorClass::IoFailure,
            _ => ErrorClass::ProtocolViolation,
        }
    }

    /// Returns whether the input stream can no longer be trusted to be
    /// positioned on a frame boundary after this error.
    pub fn desynchronizes(&self) -> bool {
        matches!(
            self,
            ProtocolError::FrameTooLarge { .. }
                | ProtocolError::HandshakeTooLarge { .. }
                | ProtocolError::Io(_)
        )
    }

    /// Returns whether the connection must be torn down.
    pub fn is_fatal(&self) -> bool {
        self.class().is_fatal() || self.desynchronizes()
    }
}
