//! Error types for the engine library.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// The kinds of entity the engine hands out ids for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    Goal,
    Task,
    Plan,
    Step,
    Schedule,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EntityKind::Goal => "Goal",
            EntityKind::Task => "Task",
            EntityKind::Plan => "Plan",
            EntityKind::Step => "Step",
            EntityKind::Schedule => "Schedule",
        };
        f.write_str(name)
    }
}

/// Comprehensive error type for all engine operations.
#[derive(Error, Debug)]
pub enum EngineError {
    /// Database connection or query errors
    #[error("Database error: {message}")]
    Database {
        message: String,
        #[source]
        source: rusqlite::Error,
    },
    /// Unknown id, or an id owned by another scope
    #[error("{entity} with ID {id} not found")]
    NotFound { entity: EntityKind, id: u64 },
    /// Malformed input such as a bad cron expression or session key
    #[error("Invalid argument '{field}': {reason}")]
    InvalidArgument { field: String, reason: String },
    /// The requested transition is not allowed from the current status
    #[error("{message}")]
    InvalidState { message: String },
    /// A configured cap was reached
    #[error("Limit exceeded: at most {limit} {what}")]
    LimitExceeded { what: String, limit: u32 },
    /// Another live entity already occupies the slot
    #[error("Conflict: {message}")]
    Conflict { message: String },
    /// File system operation errors
    #[error("File system error at path '{path}': {source}")]
    FileSystem {
        path: PathBuf,
        source: std::io::Error,
    },
    /// XDG directory specification errors
    #[error("XDG directory error: {0}")]
    XdgDirectory(String),
    /// Serialization/deserialization errors
    #[error("Serialization error: {source}")]
    Serialization {
        #[from]
        source: serde_json::Error,
    },
    /// Configuration errors
    #[error("Configuration error: {message}")]
    Configuration { message: String },
}

/// Coarse classification used by the command layer to phrase replies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    InvalidArgument,
    InvalidState,
    LimitExceeded,
    Conflict,
    Internal,
}

/// Builder for creating database errors with optional context.
pub struct DatabaseErrorBuilder {
    message: String,
}

impl DatabaseErrorBuilder {
    /// Create a new database error builder with a message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// Build the error with the given source.
    pub fn with_source(self, source: rusqlite::Error) -> EngineError {
        EngineError::Database {
            message: self.message,
            source,
        }
    }
}

/// Builder for creating argument validation errors.
pub struct InvalidArgumentBuilder {
    field: String,
}

impl InvalidArgumentBuilder {
    /// Create a new invalid argument error builder for a field.
    pub fn new(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
        }
    }

    /// Build the error with the given reason.
    pub fn with_reason(self, reason: impl Into<String>) -> EngineError {
        EngineError::InvalidArgument {
            field: self.field,
            reason: reason.into(),
        }
    }
}

impl EngineError {
    /// Creates a builder for database errors.
    pub fn database(message: impl Into<String>) -> DatabaseErrorBuilder {
        DatabaseErrorBuilder::new(message)
    }

    /// Creates a builder for argument validation errors.
    pub fn invalid_argument(field: impl Into<String>) -> InvalidArgumentBuilder {
        InvalidArgumentBuilder::new(field)
    }

    pub fn not_found(entity: EntityKind, id: u64) -> Self {
        Self::NotFound { entity, id }
    }

    pub fn invalid_state(message: impl Into<String>) -> Self {
        Self::InvalidState {
            message: message.into(),
        }
    }

    pub fn limit_exceeded(what: impl Into<String>, limit: u32) -> Self {
        Self::LimitExceeded {
            what: what.into(),
            limit,
        }
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict {
            message: message.into(),
        }
    }

    /// Wraps a failed `spawn_blocking` join.
    pub fn join(error: tokio::task::JoinError) -> Self {
        Self::Configuration {
            message: format!("Task join error: {error}"),
        }
    }

    /// Classifies the error for user-facing translation.
    pub fn kind(&self) -> ErrorKind {
        match self {
            EngineError::NotFound { .. } => ErrorKind::NotFound,
            EngineError::InvalidArgument { .. } => ErrorKind::InvalidArgument,
            EngineError::InvalidState { .. } => ErrorKind::InvalidState,
            EngineError::LimitExceeded { .. } => ErrorKind::LimitExceeded,
            EngineError::Conflict { .. } => ErrorKind::Conflict,
            EngineError::Database { .. }
            | EngineError::FileSystem { .. }
            | EngineError::XdgDirectory(_)
            | EngineError::Serialization { .. }
            | EngineError::Configuration { .. } => ErrorKind::Internal,
        }
    }
}

/// Specialized extension trait for database-related Results.
pub trait DatabaseResultExt<T> {
    /// Map database errors with a message.
    fn db_context(self, message: &str) -> Result<T>;
}

/// Specialized extension trait for configuration-related Results.
pub trait ConfigResultExt<T> {
    /// Map any displayable error into a configuration error with a message.
    fn config_context(self, message: &str) -> Result<T>;
}

impl<T> DatabaseResultExt<T> for std::result::Result<T, rusqlite::Error> {
    fn db_context(self, message: &str) -> Result<T> {
        self.map_err(|e| EngineError::database(message).with_source(e))
    }
}

impl<T, E> ConfigResultExt<T> for std::result::Result<T, E>
where
    E: fmt::Display,
{
    fn config_context(self, message: &str) -> Result<T> {
        self.map_err(|e| EngineError::Configuration {
            message: format!("{message}: {e}"),
        })
    }
}

/// Result type alias for engine operations
pub type Result<T> = std::result::Result<T, EngineError>;
