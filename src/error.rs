use thiserror::Error;

/// Main error type for Lexigraph
#[derive(Error, Debug)]
pub enum LexigraphError {
    /// Database-related errors
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// File system I/O errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Embedding service errors
    #[error("Embedding API error: {0}")]
    Embedding(String),

    /// Classification oracle errors
    #[error("Oracle API error: {0}")]
    Oracle(String),

    /// Sense not found
    #[error("Sense not found: {0}")]
    SenseNotFound(String),

    /// Parse errors (stored timestamps, embedding blobs, enum names)
    #[error("Parse error: {0}")]
    Parse(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// A blocking database task panicked or was cancelled
    #[error("Task error: {0}")]
    Task(String),
}

impl LexigraphError {
    /// A write referenced a sense that no longer exists.
    pub fn is_foreign_key_violation(&self) -> bool {
        matches!(
            self,
            LexigraphError::Database(rusqlite::Error::SqliteFailure(e, _))
                if e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_FOREIGNKEY
        )
    }
}

/// Convenient Result type using LexigraphError
pub type Result<T> = std::result::Result<T, LexigraphError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = LexigraphError::Config("Test error".to_string());
        assert!(err.to_string().contains("Configuration error"));
        assert!(err.to_string().contains("Test error"));
    }

    #[test]
    fn test_error_from_rusqlite() {
        let rusqlite_err = rusqlite::Error::InvalidQuery;
        let err: LexigraphError = rusqlite_err.into();
        assert!(matches!(err, LexigraphError::Database(_)));
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: LexigraphError = io_err.into();
        assert!(matches!(err, LexigraphError::Io(_)));
    }

    #[test]
    fn test_foreign_key_violation() {
        let conn = rusqlite::Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "PRAGMA foreign_keys = ON;
             CREATE TABLE parent (id INTEGER PRIMARY KEY);
             CREATE TABLE child (parent_id INTEGER REFERENCES parent(id));",
        )
        .unwrap();
        let err: LexigraphError = conn.execute("INSERT INTO child VALUES (1)", []).unwrap_err().into();
        assert!(err.is_foreign_key_violation());

        let other: LexigraphError = rusqlite::Error::InvalidQuery.into();
        assert!(!other.is_foreign_key_violation());
    }

    #[test]
    fn test_oracle_error_display() {
        let err = LexigraphError::Oracle("timed out".to_string());
        assert_eq!(err.to_string(), "Oracle API error: timed out");
    }
}
