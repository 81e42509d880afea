use thiserror::Error;

/// Main error type for relsubs
#[derive(Error, Debug)]
pub enum RelsubsError {
    /// Corpus store errors
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// File system I/O errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization errors for the cache blob and graph documents
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Graphviz rendering errors
    #[error("Render error: {0}")]
    Render(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Worker task or lock failures in the HTTP layer
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Convenient Result type using RelsubsError
pub type Result<T> = std::result::Result<T, RelsubsError>;
