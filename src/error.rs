//! Error types for the datasource registry.
//!
//! Every fallible operation returns [`DbResult`]. Nothing in this crate aborts
//! the process: callers can retry an init with a different id or selection key.
//! Non-fatal pragma problems are modelled separately as [`PragmaWarning`],
//! which is logged and collected but never returned as an error.

use crate::models::DatasourceId;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DbError {
    /// Unknown backend kind, missing selection key, malformed host file.
    #[error("Configuration error: {message}")]
    Configuration { message: String, suggestion: String },

    /// Open/dial failure, including exhausting all embedded file candidates.
    #[error("Connection failed: {message}")]
    Connection { message: String, suggestion: String },

    /// The connection opened but the post-open ping failed.
    #[error("Liveness check failed for '{key}': {message}")]
    Liveness { key: String, message: String },

    #[error("Datasource {id} is not initialized")]
    NotInitialized { id: DatasourceId },

    #[error("Timeout: {operation} exceeded {elapsed_secs}s")]
    Timeout {
        operation: String,
        elapsed_secs: u64,
    },

    #[error("Database error: {message}")]
    Database {
        message: String,
        /// e.g., "42P01" for undefined table
        sql_state: Option<String>,
        suggestion: String,
    },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl DbError {
    /// Create a configuration error with a helpful suggestion.
    pub fn configuration(message: impl Into<String>, suggestion: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
            suggestion: suggestion.into(),
        }
    }

    /// Create a connection error with a helpful suggestion.
    pub fn connection(message: impl Into<String>, suggestion: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
            suggestion: suggestion.into(),
        }
    }

    pub fn liveness(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Liveness {
            key: key.into(),
            message: message.into(),
        }
    }

    pub fn not_initialized(id: DatasourceId) -> Self {
        Self::NotInitialized { id }
    }

    /// Create a timeout error.
    pub fn timeout(operation: impl Into<String>, elapsed_secs: u64) -> Self {
        Self::Timeout {
            operation: operation.into(),
            elapsed_secs,
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

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Get the suggestion for this error, if available.
    pub fn suggestion(&self) -> Option<&str> {
        match self {
            Self::Configuration { suggestion, .. } => Some(suggestion),
            Self::Connection { suggestion, .. } => Some(suggestion),
            Self::Database { suggestion, .. } => Some(suggestion),
            Self::NotInitialized { .. } => Some("Call init() for this datasource id first"),
            _ => None,
        }
    }

    /// Check if this error is retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Connection { .. } | Self::Liveness { .. } | Self::Timeout { .. }
        )
    }
}

/// Convert sqlx errors to DbError.
impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Configuration(msg) => DbError::configuration(
                msg.to_string(),
                "Check the host descriptor and connection parameters",
            ),
            sqlx::Error::Database(db_err) => {
                let code = db_err.code().map(|c| c.to_string());
                DbError::database(
                    db_err.message(),
                    code,
                    "Check the SQL syntax and referenced objects",
                )
            }
            sqlx::Error::RowNotFound => DbError::database(
                "No rows returned",
                None,
                "Verify the query conditions match existing data",
            ),
            sqlx::Error::PoolTimedOut => DbError::connection(
                "Timed out acquiring a connection from the pool",
                "Raise acquire_timeout or max_connections in connection_params",
            ),
            sqlx::Error::PoolClosed => DbError::connection(
                "Connection pool is closed",
                "The datasource was closed or re-initialized; fetch a fresh mapper",
            ),
            sqlx::Error::Io(io_err) => DbError::connection(
                format!("I/O error: {}", io_err),
                "Check network connectivity and database server status",
            ),
            sqlx::Error::Tls(tls_err) => DbError::connection(
                format!("TLS error: {}", tls_err),
                "Verify TLS configuration and certificates",
            ),
            sqlx::Error::Protocol(msg) => DbError::connection(
                format!("Protocol error: {}", msg),
                "Check database server compatibility",
            ),
            sqlx::Error::ColumnDecode { index, source } => {
                DbError::internal(format!("Failed to decode column {}: {}", index, source))
            }
            sqlx::Error::Decode(source) => DbError::internal(format!("Decode error: {}", source)),
            sqlx::Error::WorkerCrashed => DbError::internal("Database worker crashed"),
            _ => DbError::internal(format!("Unknown database error: {}", err)),
        }
    }
}

impl From<serde_json::Error> for DbError {
    fn from(err: serde_json::Error) -> Self {
        DbError::configuration(
            format!("Invalid host descriptor file: {}", err),
            "Check the JSON syntax and the fields of each host descriptor",
        )
    }
}

/// Result type alias for registry operations.
pub type DbResult<T> = Result<T, DbError>;

/// A non-fatal problem with an engine pragma.
///
/// Raised when a tuning or enforcement pragma is rejected by the engine or
/// reads back a value other than the one requested.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PragmaWarning {
    pub pragma: String,
    pub expected: String,
    /// Value read back, if the read succeeded.
    pub actual: Option<String>,
    /// Engine error text, if the pragma was rejected.
    pub error: Option<String>,
}

impl PragmaWarning {
    pub fn rejected(pragma: impl Into<String>, expected: impl Into<String>, error: impl ToString) -> Self {
        Self {
            pragma: pragma.into(),
            expected: expected.into(),
            actual: None,
            error: Some(error.to_string()),
        }
    }

    pub fn mismatch(
        pragma: impl Into<String>,
        expected: impl Into<String>,
        actual: Option<String>,
    ) -> Self {
        Self {
            pragma: pragma.into(),
            expected: expected.into(),
            actual,
            error: None,
        }
    }
}

impl std::fmt::Display for PragmaWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match (&self.error, &self.actual) {
            (Some(error), _) => write!(f, "PRAGMA {} rejected: {}", self.pragma, error),
            (None, Some(actual)) => write!(
                f,
                "PRAGMA {} is {} (expected {})",
                self.pragma, actual, self.expected
            ),
            (None, None) => write!(
                f,
                "PRAGMA {} returned no value (expected {})",
                self.pragma, self.expected
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = DbError::connection("Failed to connect", "Check credentials");
        assert!(err.to_string().contains("Connection failed"));
    }

    #[test]
    fn test_not_initialized_display() {
        let err = DbError::not_initialized(DatasourceId::SECONDARY);
        assert_eq!(err.to_string(), "Datasource 1 is not initialized");
        assert!(err.suggestion().is_some());
    }

    #[test]
    fn test_error_suggestion() {
        let err = DbError::database(
            "Syntax error",
            Some("42601".to_string()),
            "Check SQL syntax",
        );
        assert_eq!(err.suggestion(), Some("Check SQL syntax"));
        assert_eq!(DbError::internal("boom").suggestion(), None);
    }

    #[test]
    fn test_error_retryable() {
        assert!(DbError::timeout("connect", 10).is_retryable());
        assert!(DbError::connection("err", "sugg").is_retryable());
        assert!(DbError::liveness("dsn1", "ping failed").is_retryable());
        assert!(!DbError::configuration("unknown key", "fix it").is_retryable());
        assert!(!DbError::not_initialized(DatasourceId::PRIMARY).is_retryable());
    }

    #[test]
    fn test_pool_timed_out_does_not_claim_a_duration() {
        let err: DbError = sqlx::Error::PoolTimedOut.into();
        assert!(matches!(err, DbError::Connection { .. }));
        assert!(err.is_retryable());
        assert!(!err.to_string().chars().any(|c| c.is_ascii_digit()));
        assert!(err.suggestion().unwrap().contains("acquire_timeout"));
    }

    #[test]
    fn test_pool_closed_maps_to_connection() {
        let err: DbError = sqlx::Error::PoolClosed.into();
        assert!(matches!(err, DbError::Connection { .. }));
    }

    #[test]
    fn test_pragma_warning_display() {
        let w = PragmaWarning::mismatch("foreign_keys", "1", Some("0".to_string()));
        assert_eq!(w.to_string(), "PRAGMA foreign_keys is 0 (expected 1)");

        let w = PragmaWarning::rejected("journal_mode", "OFF", "not allowed");
        assert!(w.to_string().contains("rejected"));
        assert!(w.to_string().contains("not allowed"));
    }
}
