//! Database errors

use thiserror::Error;

/// Database errors
#[derive(Error, Debug)]
pub enum DbError {
    /// SQLx error
    #[error("database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    /// Record not found
    #[error("record not found")]
    NotFound,

    /// A stored value could not be mapped onto a domain type
    #[error("invalid stored data: {0}")]
    InvalidData(String),

    /// The store could not be reached
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

impl From<taskflow_types::TypeError> for DbError {
    fn from(err: taskflow_types::TypeError) -> Self {
        Self::InvalidData(err.to_string())
    }
}

/// Result alias for repository calls
pub type DbResult<T> = Result<T, DbError>;
