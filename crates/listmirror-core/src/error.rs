//! Error types for the listmirror sync engine.
//!
//! Error definitions with transient/permanent classification for retry logic.

use thiserror::Error;

/// Result type alias using [`SyncError`].
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur during a synchronization run.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Configuration validation error.
    #[error("invalid configuration: {message}")]
    Config { message: String },

    /// Token exchange exhausted retries or credentials were rejected.
    #[error("authentication failed: {message}")]
    Authentication { message: String },

    /// Paginated read failed after retries, or the response was malformed.
    #[error("fetch failed: {message}")]
    Fetch { message: String },

    /// Destination table introspection or creation failed.
    #[error("schema error: {message}")]
    Schema { message: String },

    /// Batch insert failed.
    #[error("write failed: {message}")]
    Write { message: String },

    /// Cooperative cancellation was honored.
    #[error("sync cancelled")]
    Cancelled,

    // Transport-level errors, produced beneath the retry layer and mapped
    // into one of the component errors above once retries are exhausted.
    /// Network-level failure reaching the remote endpoint.
    #[error("transport error: {message}")]
    Transport {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Non-success HTTP response.
    #[error("HTTP {status}: {body}")]
    HttpStatus { status: u16, body: String },

    /// Remote response did not have the expected shape.
    #[error("malformed response: {message}")]
    MalformedResponse { message: String },

    /// Database driver error.
    #[error("database error: {message}")]
    Database {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Internal error.
    #[error("internal error: {message}")]
    Internal { message: String },
}

impl SyncError {
    /// Check if this error is transient and the operation should be retried.
    ///
    /// Transient errors are those caused by temporary conditions that may
    /// resolve themselves: network failures, rate limiting, server-side
    /// unavailability.
    pub fn is_transient(&self) -> bool {
        match self {
            SyncError::Transport { .. } => true,
            SyncError::HttpStatus { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }

    /// Check if this error is permanent and retry won't help.
    pub fn is_permanent(&self) -> bool {
        !self.is_transient()
    }

    /// Get an error code for classification in logs and events.
    pub fn error_code(&self) -> &'static str {
        match self {
            SyncError::Config { .. } => "INVALID_CONFIG",
            SyncError::Authentication { .. } => "AUTH_FAILED",
            SyncError::Fetch { .. } => "FETCH_FAILED",
            SyncError::Schema { .. } => "SCHEMA_ERROR",
            SyncError::Write { .. } => "WRITE_FAILED",
            SyncError::Cancelled => "CANCELLED",
            SyncError::Transport { .. } => "TRANSPORT_ERROR",
            SyncError::HttpStatus { .. } => "HTTP_STATUS",
            SyncError::MalformedResponse { .. } => "MALFORMED_RESPONSE",
            SyncError::Database { .. } => "DATABASE_ERROR",
            SyncError::Internal { .. } => "INTERNAL_ERROR",
        }
    }

    // Convenience constructors

    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        SyncError::Config {
            message: message.into(),
        }
    }

    /// Create an authentication error.
    pub fn authentication(message: impl Into<String>) -> Self {
        SyncError::Authentication {
            message: message.into(),
        }
    }

    /// Create a fetch error.
    pub fn fetch(message: impl Into<String>) -> Self {
        SyncError::Fetch {
            message: message.into(),
        }
    }

    /// Create a schema error.
    pub fn schema(message: impl Into<String>) -> Self {
        SyncError::Schema {
            message: message.into(),
        }
    }

    /// Create a write error.
    pub fn write(message: impl Into<String>) -> Self {
        SyncError::Write {
            message: message.into(),
        }
    }

    /// Create a transport error without an underlying source.
    pub fn transport(message: impl Into<String>) -> Self {
        SyncError::Transport {
            message: message.into(),
            source: None,
        }
    }

    /// Create a transport error with source.
    pub fn transport_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        SyncError::Transport {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a malformed-response error.
    pub fn malformed(message: impl Into<String>) -> Self {
        SyncError::MalformedResponse {
            message: message.into(),
        }
    }

    /// Create a database error without an underlying source.
    pub fn database(message: impl Into<String>) -> Self {
        SyncError::Database {
            message: message.into(),
            source: None,
        }
    }

    /// Create a database error with source.
    pub fn database_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        SyncError::Database {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        SyncError::Internal {
            message: message.into(),
        }
    }
}
