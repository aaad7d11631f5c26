//! PostgreSQL implementation of the record store.
//!
//! Records live in a `record` table with the raw metadata payload in a
//! JSONB column. The dedup-group aggregation materializes `mr_record_*`
//! tables server-side with `CREATE TABLE … AS SELECT`, the relational
//! counterpart of the original map/reduce collections.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, QueryBuilder};
use tracing::debug;

use record_indexer_shared::{DedupConstraint, Record, RecordFilter};

use crate::errors::RecordStoreError;
use crate::interfaces::RecordStore;
use crate::types::GeoLocation;

const RECORD_COLUMNS: &str = "id, source_id, format, oai_id, linking_id, host_record_id, \
     dedup_key, \"key\", created, updated, \"date\", deleted, update_needed, metadata";

#[derive(sqlx::FromRow)]
struct RecordRow {
    id: String,
    source_id: String,
    format: String,
    oai_id: Option<String>,
    linking_id: Option<String>,
    host_record_id: Option<String>,
    dedup_key: Option<String>,
    key: Option<String>,
    created: DateTime<Utc>,
    updated: DateTime<Utc>,
    date: DateTime<Utc>,
    deleted: bool,
    update_needed: bool,
    metadata: serde_json::Value,
}

impl From<RecordRow> for Record {
    fn from(row: RecordRow) -> Self {
        Record {
            id: row.id,
            source_id: row.source_id,
            format: row.format,
            oai_id: row.oai_id,
            linking_id: row.linking_id,
            host_record_id: row.host_record_id,
            dedup_key: row.dedup_key,
            key: row.key,
            created: row.created,
            updated: row.updated,
            date: row.date,
            deleted: row.deleted,
            update_needed: row.update_needed,
            metadata: row.metadata,
        }
    }
}

/// PostgreSQL-backed record store.
pub struct PostgresRecordStore {
    pool: PgPool,
}

impl PostgresRecordStore {
    /// Creates a new record store over a configured connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Appends the WHERE clause for a record filter.
    ///
    /// A `single_id` target replaces the source, window and update-pending
    /// constraints; the dedup constraint always applies.
    fn push_filter(builder: &mut QueryBuilder<'_, Postgres>, filter: &RecordFilter) {
        builder.push(" WHERE TRUE");
        if let Some(single_id) = &filter.single_id {
            builder.push(" AND id = ").push_bind(single_id.clone());
        } else {
            if let Some(source_id) = &filter.source_id {
                builder.push(" AND source_id = ").push_bind(source_id.clone());
            }
            if let Some(updated_since) = filter.updated_since {
                builder.push(" AND updated >= ").push_bind(updated_since);
            }
            if filter.exclude_update_pending {
                builder.push(" AND update_needed = FALSE");
            }
        }
        match filter.dedup {
            DedupConstraint::Any => {}
            DedupConstraint::Present => {
                builder.push(" AND dedup_key IS NOT NULL");
            }
            DedupConstraint::Absent => {
                builder.push(" AND dedup_key IS NULL");
            }
        }
    }
}

/// Auxiliary table names are generated by the driver; anything outside the
/// `mr_record_*` identifier namespace is rejected before touching SQL.
fn validate_aux_table(table: &str) -> Result<(), RecordStoreError> {
    let valid = table.starts_with("mr_record_")
        && table.len() <= 63
        && table
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_');
    if valid {
        Ok(())
    } else {
        Err(RecordStoreError::InvalidAuxTableName(table.to_string()))
    }
}

#[async_trait]
impl RecordStore for PostgresRecordStore {
    async fn fetch_records(
        &self,
        filter: &RecordFilter,
        after_id: Option<&str>,
        limit: u32,
    ) -> Result<Vec<Record>, RecordStoreError> {
        let mut builder = QueryBuilder::new(format!("SELECT {RECORD_COLUMNS} FROM record"));
        Self::push_filter(&mut builder, filter);
        if let Some(after_id) = after_id {
            builder.push(" AND id > ").push_bind(after_id.to_string());
        }
        builder.push(" ORDER BY id LIMIT ").push_bind(i64::from(limit));

        let rows: Vec<RecordRow> = builder.build_query_as().fetch_all(&self.pool).await?;
        Ok(rows.into_iter().map(Record::from).collect())
    }

    async fn count_records(&self, filter: &RecordFilter) -> Result<u64, RecordStoreError> {
        let mut builder = QueryBuilder::new("SELECT COUNT(*) FROM record");
        Self::push_filter(&mut builder, filter);
        let count: i64 = builder.build_query_scalar().fetch_one(&self.pool).await?;
        Ok(count as u64)
    }

    async fn find_record(&self, id: &str) -> Result<Option<Record>, RecordStoreError> {
        let row: Option<RecordRow> = sqlx::query_as(&format!(
            "SELECT {RECORD_COLUMNS} FROM record WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Record::from))
    }

    async fn records_in_group(
        &self,
        dedup_key: &str,
    ) -> Result<Vec<Record>, RecordStoreError> {
        let rows: Vec<RecordRow> = sqlx::query_as(&format!(
            "SELECT {RECORD_COLUMNS} FROM record WHERE dedup_key = $1 ORDER BY id"
        ))
        .bind(dedup_key)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Record::from).collect())
    }

    async fn component_parts(
        &self,
        source_id: &str,
        linking_id: &str,
    ) -> Result<Vec<Record>, RecordStoreError> {
        let rows: Vec<RecordRow> = sqlx::query_as(&format!(
            "SELECT {RECORD_COLUMNS} FROM record \
             WHERE source_id = $1 AND host_record_id = $2 AND deleted = FALSE \
             ORDER BY id"
        ))
        .bind(source_id)
        .bind(linking_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Record::from).collect())
    }

    async fn find_host(
        &self,
        source_id: &str,
        host_record_id: &str,
    ) -> Result<Option<Record>, RecordStoreError> {
        let row: Option<RecordRow> = sqlx::query_as(&format!(
            "SELECT {RECORD_COLUMNS} FROM record \
             WHERE source_id = $1 AND linking_id = $2 AND deleted = FALSE \
             ORDER BY id LIMIT 1"
        ))
        .bind(source_id)
        .bind(host_record_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Record::from))
    }

    async fn has_live_group_member(
        &self,
        dedup_key: &str,
        exclude_id: &str,
    ) -> Result<bool, RecordStoreError> {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM record \
             WHERE dedup_key = $1 AND deleted = FALSE AND id <> $2)",
        )
        .bind(dedup_key)
        .bind(exclude_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(exists)
    }

    async fn newest_record_updated(
        &self,
    ) -> Result<Option<DateTime<Utc>>, RecordStoreError> {
        let newest: Option<DateTime<Utc>> =
            sqlx::query_scalar("SELECT MAX(updated) FROM record")
                .fetch_one(&self.pool)
                .await?;
        Ok(newest)
    }

    async fn dedup_group_table_exists(&self, table: &str) -> Result<bool, RecordStoreError> {
        validate_aux_table(table)?;
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM information_schema.tables \
             WHERE table_schema = current_schema() AND table_name = $1)",
        )
        .bind(table)
        .fetch_one(&self.pool)
        .await?;
        Ok(exists)
    }

    async fn build_dedup_group_table(
        &self,
        table: &str,
        filter: &RecordFilter,
    ) -> Result<(), RecordStoreError> {
        validate_aux_table(table)?;

        sqlx::query(&format!("DROP TABLE IF EXISTS \"{table}\""))
            .execute(&self.pool)
            .await?;

        let mut builder = QueryBuilder::new(format!(
            "CREATE TABLE \"{table}\" AS SELECT dedup_key AS id, COUNT(*) AS value FROM record"
        ));
        Self::push_filter(&mut builder, filter);
        builder.push(" GROUP BY dedup_key");
        builder.build().execute(&self.pool).await?;

        debug!(table = %table, "Built dedup group table");
        Ok(())
    }

    async fn fetch_dedup_keys(
        &self,
        table: &str,
        after: Option<&str>,
        limit: u32,
    ) -> Result<Vec<String>, RecordStoreError> {
        validate_aux_table(table)?;
        let mut builder = QueryBuilder::new(format!("SELECT id FROM \"{table}\" WHERE TRUE"));
        if let Some(after) = after {
            builder.push(" AND id > ").push_bind(after.to_string());
        }
        builder.push(" ORDER BY id LIMIT ").push_bind(i64::from(limit));

        let keys: Vec<String> = builder.build_query_scalar().fetch_all(&self.pool).await?;
        Ok(keys)
    }

    async fn list_dedup_group_tables(&self) -> Result<Vec<String>, RecordStoreError> {
        let tables: Vec<String> = sqlx::query_scalar(
            "SELECT table_name FROM information_schema.tables \
             WHERE table_schema = current_schema() AND table_name LIKE 'mr\\_record\\_%' \
             ORDER BY table_name",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(tables)
    }

    async fn drop_dedup_group_table(&self, table: &str) -> Result<(), RecordStoreError> {
        validate_aux_table(table)?;
        sqlx::query(&format!("DROP TABLE IF EXISTS \"{table}\""))
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn lookup_locations(
        &self,
        place: &str,
    ) -> Result<Vec<GeoLocation>, RecordStoreError> {
        let locations: Vec<GeoLocation> = sqlx::query_as(
            "SELECT place, lon, lat, importance FROM location \
             WHERE place = $1 ORDER BY importance ASC",
        )
        .bind(place)
        .fetch_all(&self.pool)
        .await?;
        Ok(locations)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_aux_table_accepts_generated_names() {
        assert!(validate_aux_table("mr_record_0123abcd_1700000000").is_ok());
    }

    #[test]
    fn test_validate_aux_table_rejects_foreign_names() {
        assert!(validate_aux_table("record").is_err());
        assert!(validate_aux_table("mr_record_x; DROP TABLE record").is_err());
        assert!(validate_aux_table("mr_record_UPPER").is_err());
    }
}
