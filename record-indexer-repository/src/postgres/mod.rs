//! PostgreSQL implementations of the repository traits.

pub mod record_store;
pub mod schema;
pub mod state_store;

pub use record_store::PostgresRecordStore;
pub use schema::ensure_schema;
pub use state_store::PostgresStateStore;
