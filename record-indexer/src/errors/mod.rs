//! Error types for the indexing pipeline.

use thiserror::Error;

use record_indexer_repository::{RecordStoreError, StateStoreError};
use record_indexer_shared::{MappingError, ParserError};
use record_indexer_solr::TransportError;

/// Errors that can occur in the indexing pipeline.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Configuration error (missing required data-source field, missing
    /// mapping file, unknown transformation).
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Record store error.
    #[error("Record store error: {0}")]
    StoreError(#[from] RecordStoreError),

    /// Watermark state store error.
    #[error("State store error: {0}")]
    StateError(#[from] StateStoreError),

    /// Search backend transport error.
    #[error("Transport error: {0}")]
    TransportError(#[from] TransportError),

    /// Metadata parser or transformation error.
    #[error("Parser error: {0}")]
    ParserError(#[from] ParserError),

    /// Mapping table error.
    #[error("Mapping error: {0}")]
    MappingError(#[from] MappingError),

    /// Failed to serialize a document for the backend.
    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl PipelineError {
    /// Create a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }
}
