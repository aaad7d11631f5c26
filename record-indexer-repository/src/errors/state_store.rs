use thiserror::Error;

/// Represents errors that can occur within the watermark state store.
#[derive(Debug, Error)]
pub enum StateStoreError {
    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),
}
