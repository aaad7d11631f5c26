use chrono::{DateTime, Utc};
use record_indexer_shared::{Record, RecordFilter};

use crate::errors::RecordStoreError;
use crate::types::GeoLocation;

/// Trait for interacting with the record store.
///
/// This trait provides a clean abstraction over the underlying data store
/// for the indexing pipeline. Enumeration uses keyset pagination (records
/// ordered by id, resuming after the last seen id) so that multi-hour
/// passes never depend on a long-lived server-side cursor.
#[async_trait::async_trait]
pub trait RecordStore: Send + Sync {
    /// Fetches the next batch of records matching a filter, ordered by id,
    /// starting after `after_id` when given.
    async fn fetch_records(
        &self,
        filter: &RecordFilter,
        after_id: Option<&str>,
        limit: u32,
    ) -> Result<Vec<Record>, RecordStoreError>;

    /// Counts the records matching a filter (used for progress reporting).
    async fn count_records(&self, filter: &RecordFilter) -> Result<u64, RecordStoreError>;

    /// Fetches a single record by id.
    async fn find_record(&self, id: &str) -> Result<Option<Record>, RecordStoreError>;

    /// Fetches every record sharing a dedup key, deleted members included.
    async fn records_in_group(&self, dedup_key: &str)
        -> Result<Vec<Record>, RecordStoreError>;

    /// Fetches the live component parts of a host record: records of the
    /// same source whose `host_record_id` equals the host's `linking_id`.
    async fn component_parts(
        &self,
        source_id: &str,
        linking_id: &str,
    ) -> Result<Vec<Record>, RecordStoreError>;

    /// Resolves the host record of a component part: the record of the
    /// same source whose `linking_id` equals the part's `host_record_id`.
    async fn find_host(
        &self,
        source_id: &str,
        host_record_id: &str,
    ) -> Result<Option<Record>, RecordStoreError>;

    /// Whether any live record other than `exclude_id` carries `dedup_key`
    /// as its dedup key.
    async fn has_live_group_member(
        &self,
        dedup_key: &str,
        exclude_id: &str,
    ) -> Result<bool, RecordStoreError>;

    /// The `updated` instant of the newest record in the store, used as
    /// the cache-busting suffix of auxiliary table names.
    async fn newest_record_updated(&self)
        -> Result<Option<DateTime<Utc>>, RecordStoreError>;

    /// Whether the named auxiliary dedup-group table already exists.
    async fn dedup_group_table_exists(&self, table: &str) -> Result<bool, RecordStoreError>;

    /// Builds the named auxiliary table of `(dedup_key, member count)`
    /// rows for the records matching the filter, replacing any prior
    /// content.
    async fn build_dedup_group_table(
        &self,
        table: &str,
        filter: &RecordFilter,
    ) -> Result<(), RecordStoreError>;

    /// Fetches the next batch of dedup keys from an auxiliary table,
    /// ordered, starting after `after` when given.
    async fn fetch_dedup_keys(
        &self,
        table: &str,
        after: Option<&str>,
        limit: u32,
    ) -> Result<Vec<String>, RecordStoreError>;

    /// Lists every auxiliary dedup-group table currently present.
    async fn list_dedup_group_tables(&self) -> Result<Vec<String>, RecordStoreError>;

    /// Drops an auxiliary dedup-group table.
    async fn drop_dedup_group_table(&self, table: &str) -> Result<(), RecordStoreError>;

    /// Looks up geocoding entries for an uppercased place key, ordered by
    /// importance ascending.
    async fn lookup_locations(&self, place: &str)
        -> Result<Vec<GeoLocation>, RecordStoreError>;
}
