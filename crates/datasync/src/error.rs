//! Error types for table sync operations.

use thiserror::Error;

/// Process exit code for configuration errors.
pub const EXIT_CONFIG_ERROR: u8 = 1;
/// Process exit code for connection and pool errors.
pub const EXIT_CONNECTION_ERROR: u8 = 2;
/// Process exit code for SQL statement errors.
pub const EXIT_STATEMENT_ERROR: u8 = 3;
/// Process exit code for a cancelled sync.
pub const EXIT_CANCELLED: u8 = 4;
/// Process exit code for I/O errors.
pub const EXIT_IO_ERROR: u8 = 7;

/// Main error type for sync operations.
#[derive(Error, Debug)]
pub enum SyncError {
    /// Configuration error (missing data source, invalid request, bad YAML values)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Pool creation or connection acquisition failed
    #[error("Connection error: {message}\n  Context: {context}")]
    Connection { message: String, context: String },

    /// The data source was destroyed and can no longer hand out connections
    #[error("Data source '{0}' has been closed")]
    PoolClosed(String),

    /// SQL execution or row decoding failed
    #[error("Statement failed on {table}: {message}")]
    Statement { table: String, message: String },

    /// Sync was cancelled (SIGINT, etc.)
    #[error("Sync cancelled")]
    Cancelled,

    /// IO error (file operations)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML serialization/deserialization error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Coarse error taxonomy used by callers to decide how to react.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Configuration,
    Connection,
    Statement,
    Cancelled,
    Io,
}

impl SyncError {
    /// Create a Connection error with context about where it occurred
    pub fn connection(message: impl ToString, context: impl Into<String>) -> Self {
        SyncError::Connection {
            message: message.to_string(),
            context: context.into(),
        }
    }

    /// Create a Statement error for the given table
    pub fn statement(table: impl Into<String>, message: impl ToString) -> Self {
        SyncError::Statement {
            table: table.into(),
            message: message.to_string(),
        }
    }

    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            SyncError::Config(_) | SyncError::Yaml(_) | SyncError::Json(_) => {
                ErrorKind::Configuration
            }
            SyncError::Connection { .. } | SyncError::PoolClosed(_) => ErrorKind::Connection,
            SyncError::Statement { .. } => ErrorKind::Statement,
            SyncError::Cancelled => ErrorKind::Cancelled,
            SyncError::Io(_) => ErrorKind::Io,
        }
    }

    /// Exit code the CLI reports for this error.
    pub fn exit_code(&self) -> u8 {
        match self.kind() {
            ErrorKind::Configuration => EXIT_CONFIG_ERROR,
            ErrorKind::Connection => EXIT_CONNECTION_ERROR,
            ErrorKind::Statement => EXIT_STATEMENT_ERROR,
            ErrorKind::Cancelled => EXIT_CANCELLED,
            ErrorKind::Io => EXIT_IO_ERROR,
        }
    }

    /// Format error with full details including error chain
    pub fn format_detailed(&self) -> String {
        let mut output = format!("Error: {}\n", self);

        let mut source = std::error::Error::source(self);
        let mut depth = 1;
        while let Some(err) = source {
            output.push_str(&format!("\nCaused by:\n  {}: {}", depth, err));
            source = err.source();
            depth += 1;
        }

        output
    }
}

/// Result type alias for sync operations.
pub type Result<T> = std::result::Result<T, SyncError>;
