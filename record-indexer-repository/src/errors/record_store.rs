use thiserror::Error;

/// Represents errors that can occur within the record store.
///
/// Consolidates database failures with the validation errors raised before
/// a query is issued (such as a malformed auxiliary table name).
#[derive(Debug, Error)]
pub enum RecordStoreError {
    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),

    /// An auxiliary dedup-group table name outside the `mr_record_*`
    /// namespace was passed to a table operation.
    #[error("Invalid auxiliary table name: {0}")]
    InvalidAuxTableName(String),
}
