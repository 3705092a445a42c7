//! Error types for the pool manager.
//!
//! This module defines all error types using `thiserror` for ergonomic error handling.
//! Each variant is a failure the data-access layer can branch on: capacity
//! (`PoolExhausted`), lifecycle (`PoolClosed`), misconfiguration (`NotConfigured`,
//! `UnknownPool`) or an unavailable database (`Adapter`).

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DbError {
    /// The engine refused or failed to open or use a connection.
    #[error("Connection failed: {message}")]
    Adapter { message: String, suggestion: String },

    #[error("Database error: {message}")]
    Database {
        message: String,
        /// e.g., "42P01" for undefined table
        sql_state: Option<String>,
        suggestion: String,
    },

    #[error("Pool '{pool}' exhausted: all {max_connections} connections are busy")]
    PoolExhausted { pool: String, max_connections: u32 },

    #[error("Pool '{pool}' is closed")]
    PoolClosed { pool: String },

    #[error("Unknown pool: {pool}")]
    UnknownPool { pool: String },

    #[error("No connection configured with name '{name}'")]
    NotConfigured { name: String },

    #[error("Invalid input: {message}")]
    InvalidInput { message: String },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl DbError {
    /// Create an adapter error with a helpful suggestion.
    pub fn adapter(message: impl Into<String>, suggestion: impl Into<String>) -> Self {
        Self::Adapter {
            message: message.into(),
            suggestion: suggestion.into(),
        }
    }

    /// Create a database error with optional SQL state.
    pub fn database(
        message: impl Into<String>,
        sql_state: Option<String>,
        suggestion: impl Into<String>,
    ) -> Self {
        Self::Database {
            message: message.into(),
            sql_state,
            suggestion: suggestion.into(),
        }
    }

    pub fn pool_exhausted(pool: impl Into<String>, max_connections: u32) -> Self {
        Self::PoolExhausted {
            pool: pool.into(),
            max_connections,
        }
    }

    pub fn pool_closed(pool: impl Into<String>) -> Self {
        Self::PoolClosed { pool: pool.into() }
    }

    pub fn unknown_pool(pool: impl Into<String>) -> Self {
        Self::UnknownPool { pool: pool.into() }
    }

    pub fn not_configured(name: impl Into<String>) -> Self {
        Self::NotConfigured { name: name.into() }
    }

    /// Create an invalid input error.
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Get the suggestion for this error, if available.
    pub fn suggestion(&self) -> Option<&str> {
        match self {
            Self::Adapter { suggestion, .. } => Some(suggestion),
            Self::Database { suggestion, .. } => Some(suggestion),
            Self::PoolExhausted { .. } => {
                Some("Release idle leases or retry after a short backoff")
            }
            Self::NotConfigured { .. } => {
                Some("Add the connection with --database <name>=<url>")
            }
            _ => None,
        }
    }

    /// Check if this error is retryable.
    ///
    /// Nothing is retried inside the pool; this only tells the caller whether
    /// a later attempt against the same pool can succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Adapter { .. } | Self::PoolExhausted { .. })
    }
}

/// Convert sqlx errors to DbError.
impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Configuration(msg) => DbError::adapter(
                msg.to_string(),
                "Check the connection string format and credentials",
            ),
            sqlx::Error::Database(db_err) => {
                let code = db_err.code().map(|c| c.to_string());
                DbError::database(
                    db_err.message(),
                    code,
                    "Check the SQL syntax and referenced objects",
                )
            }
            sqlx::Error::Io(io_err) => DbError::adapter(
                format!("I/O error: {}", io_err),
                "Check network connectivity and database server status",
            ),
            sqlx::Error::Tls(tls_err) => DbError::adapter(
                format!("TLS error: {}", tls_err),
                "Verify TLS configuration and certificates",
            ),
            sqlx::Error::Protocol(msg) => DbError::adapter(
                format!("Protocol error: {}", msg),
                "Check database server compatibility",
            ),
            sqlx::Error::WorkerCrashed => DbError::adapter(
                "Database worker crashed",
                "The connection is unusable; acquire a new one",
            ),
            _ => DbError::internal(format!("Unknown database error: {}", err)),
        }
    }
}

/// Result type alias for database operations.
pub type DbResult<T> = Result<T, DbError>;
