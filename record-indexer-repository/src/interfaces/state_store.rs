use chrono::{DateTime, Utc};

use crate::errors::StateStoreError;

/// Trait for interacting with the watermark state store.
///
/// Watermarks record the last successful indexing instant per key
/// (`"Last Index Update"` for the merged pass, `"Last Index Update
/// <source>"` per source for the individual pass). The driver writes a
/// watermark only after the full pass, including the final commit, has
/// succeeded.
#[async_trait::async_trait]
pub trait StateStore: Send + Sync {
    /// Retrieves the persisted instant for a watermark key.
    ///
    /// # Returns
    ///
    /// A `Result` containing the instant if one has been persisted, or
    /// `None` if the key has never been written.
    async fn last_index_update(
        &self,
        key: &str,
    ) -> Result<Option<DateTime<Utc>>, StateStoreError>;

    /// Persists the instant for a watermark key, replacing any prior
    /// value.
    async fn save_last_index_update(
        &self,
        key: &str,
        instant: DateTime<Utc>,
    ) -> Result<(), StateStoreError>;
}
