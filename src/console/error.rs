//! Console error types

use crate::session::SessionError;

/// Console error with code and message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsoleError {
    /// E01: Unknown command
    UnknownCommand,
    /// E02: Invalid value format
    InvalidValue,
    /// E03: Missing required argument
    MissingArg,
    /// E04: Value out of allowed range
    OutOfRange,
    /// E05: Session already ended
    NotConnected,
    /// E06: Keyer write failed
    LinkFailed,
}

impl ConsoleError {
    /// Get error code string
    pub fn code(&self) -> &'static str {
        match self {
            Self::UnknownCommand => "E01",
            Self::InvalidValue => "E02",
            Self::MissingArg => "E03",
            Self::OutOfRange => "E04",
            Self::NotConnected => "E05",
            Self::LinkFailed => "E06",
        }
    }

    /// Get error message
    pub fn message(&self) -> &'static str {
        match self {
            Self::UnknownCommand => "unknown command",
            Self::InvalidValue => "invalid value",
            Self::MissingArg => "missing argument",
            Self::OutOfRange => "out of range",
            Self::NotConnected => "not connected",
            Self::LinkFailed => "keyer write failed",
        }
    }
}

impl From<SessionError> for ConsoleError {
    fn from(err: SessionError) -> Self {
        match err {
            SessionError::InvalidSpeed(_) => Self::OutOfRange,
            SessionError::Ended | SessionError::Link(crate::link::LinkError::Closed) => Self::NotConnected,
            SessionError::Link(_) | SessionError::Spawn(_) => Self::LinkFailed,
        }
    }
}

impl core::fmt::Display for ConsoleError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}: {}", self.code(), self.message())
    }
}

impl std::error::Error for ConsoleError {}
