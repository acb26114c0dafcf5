//! Error types for plinth.

use thiserror::Error;

/// Result type alias using plinth's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// PostgreSQL SQLSTATE for unique constraint violations.
const UNIQUE_VIOLATION: &str = "23505";

/// PostgreSQL SQLSTATE for foreign key violations.
const FOREIGN_KEY_VIOLATION: &str = "23503";

/// PostgreSQL SQLSTATE for CHECK constraint violations.
const CHECK_VIOLATION: &str = "23514";

/// Core error type for plinth operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Database operation failed (wraps sqlx::Error)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Write conflicts with existing state (duplicate slug, non-empty parent)
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Authentication failed
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Forbidden (authenticated but not authorized)
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Search engine operation failed
    #[error("Search error: {0}")]
    Search(String),

    /// Job queue error
    #[error("Job error: {0}")]
    Job(String),

    /// Object storage error
    #[error("Storage error: {0}")]
    Storage(String),

    /// Outbound email failed
    #[error("Email error: {0}")]
    Email(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// HTTP/network request failed
    #[error("Request error: {0}")]
    Request(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),

    /// File I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// True when the error is a PostgreSQL unique constraint violation.
    pub fn is_unique_violation(&self) -> bool {
        self.has_sqlstate(UNIQUE_VIOLATION)
    }

    /// True when the error is a PostgreSQL foreign key violation.
    pub fn is_foreign_key_violation(&self) -> bool {
        self.has_sqlstate(FOREIGN_KEY_VIOLATION)
    }

    /// True when the error is a PostgreSQL CHECK constraint violation.
    pub fn is_check_violation(&self) -> bool {
        self.has_sqlstate(CHECK_VIOLATION)
    }

    fn has_sqlstate(&self, code: &str) -> bool {
        match self {
            Error::Database(sqlx::Error::Database(db)) => db.code().as_deref() == Some(code),
            _ => false,
        }
    }

    /// Convert a unique violation into a `Conflict` with the given message,
    /// passing every other error through untouched.
    pub fn on_unique_violation(self, message: impl Into<String>) -> Self {
        if self.is_unique_violation() {
            Error::Conflict(message.into())
        } else {
            self
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Error::Request(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_not_found() {
        let err = Error::NotFound("Organization abc".to_string());
        assert_eq!(err.to_string(), "Not found: Organization abc");
    }

    #[test]
    fn test_error_display_invalid_input() {
        let err = Error::InvalidInput("slug is empty".to_string());
        assert_eq!(err.to_string(), "Invalid input: slug is empty");
    }

    #[test]
    fn test_error_display_conflict() {
        let err = Error::Conflict("slug already in use".to_string());
        assert_eq!(err.to_string(), "Conflict: slug already in use");
    }

    #[test]
    fn test_error_display_search() {
        let err = Error::Search("index unavailable".to_string());
        assert_eq!(err.to_string(), "Search error: index unavailable");
    }

    #[test]
    fn test_error_display_storage() {
        let err = Error::Storage("disk full".to_string());
        assert_eq!(err.to_string(), "Storage error: disk full");
    }

    #[test]
    fn test_error_display_email() {
        let err = Error::Email("relay returned 502".to_string());
        assert_eq!(err.to_string(), "Email error: relay returned 502");
    }

    #[test]
    fn test_error_display_unauthorized() {
        let err = Error::Unauthorized("invalid credentials".to_string());
        assert_eq!(err.to_string(), "Unauthorized: invalid credentials");
    }

    #[test]
    fn test_error_from_serde_json() {
        let json_err = serde_json::from_str::<serde_json::Value>("{not json").unwrap_err();
        let err: Error = json_err.into();
        assert!(matches!(err, Error::Serialization(_)));
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "missing blob");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
        assert!(err.to_string().contains("missing blob"));
    }

    #[test]
    fn test_non_database_error_is_not_unique_violation() {
        let err = Error::InvalidInput("x".to_string());
        assert!(!err.is_unique_violation());
        assert!(!err.is_foreign_key_violation());
    }

    #[test]
    fn test_on_unique_violation_passes_other_errors_through() {
        let err = Error::NotFound("x".to_string()).on_unique_violation("dup");
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[test]
    fn test_row_not_found_is_not_unique_violation() {
        let err = Error::Database(sqlx::Error::RowNotFound);
        assert!(!err.is_unique_violation());
    }
}
