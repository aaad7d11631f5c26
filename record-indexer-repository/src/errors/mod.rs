//! Error types for the record store repositories.

pub mod record_store;
pub mod state_store;

pub use record_store::RecordStoreError;
pub use state_store::StateStoreError;
