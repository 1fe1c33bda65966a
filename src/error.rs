#[derive(Debug, thiserror::Error)]
pub enum MemoryError {
    #[error("content must not be empty")]
    EmptyContent,

    #[error("content exceeds maximum length of {0} characters")]
    ContentTooLong(usize),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("memory not found: {0}")]
    NotFound(String),

    #[error("database unavailable: {0}")]
    Unavailable(String),

    #[error("migration v{version} failed: {message}")]
    Migration { version: i64, message: String },

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

impl MemoryError {
    /// True for errors the caller can fix by changing the request.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::EmptyContent | Self::ContentTooLong(_) | Self::Validation(_)
        )
    }
}
