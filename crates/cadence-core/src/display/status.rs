//! Reply type for routed commands.

use std::fmt;

use crate::error::{EngineError, ErrorKind};

/// Outcome of one command, with a markdown message for the channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandResult {
    pub success: bool,
    pub message: String,
}

impl CommandResult {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
        }
    }

    /// Translates an engine error into a user-facing failure.
    pub fn from_error(error: &EngineError) -> Self {
        let message = match error.kind() {
            ErrorKind::NotFound
            | ErrorKind::InvalidArgument
            | ErrorKind::InvalidState
            | ErrorKind::LimitExceeded
            | ErrorKind::Conflict => error.to_string(),
            ErrorKind::Internal => format!("Internal error: {error}"),
        };
        Self::failure(message)
    }
}

impl From<EngineError> for CommandResult {
    fn from(error: EngineError) -> Self {
        Self::from_error(&error)
    }
}

impl fmt::Display for CommandResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.message)
    }
}
