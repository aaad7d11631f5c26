//! Schema bootstrap for the PostgreSQL record store.

use sqlx::PgPool;

use crate::errors::RecordStoreError;

const DDL: &[&str] = &[
    r#"CREATE TABLE IF NOT EXISTS record (
        id TEXT PRIMARY KEY,
        source_id TEXT NOT NULL,
        format TEXT NOT NULL,
        oai_id TEXT,
        linking_id TEXT,
        host_record_id TEXT,
        dedup_key TEXT,
        "key" TEXT,
        created TIMESTAMPTZ NOT NULL,
        updated TIMESTAMPTZ NOT NULL,
        "date" TIMESTAMPTZ NOT NULL,
        deleted BOOLEAN NOT NULL DEFAULT FALSE,
        update_needed BOOLEAN NOT NULL DEFAULT FALSE,
        metadata JSONB NOT NULL DEFAULT '{}'::jsonb
    )"#,
    "CREATE INDEX IF NOT EXISTS record_source_updated_idx ON record (source_id, updated)",
    "CREATE INDEX IF NOT EXISTS record_dedup_key_idx ON record (dedup_key)",
    "CREATE INDEX IF NOT EXISTS record_host_idx ON record (source_id, host_record_id)",
    "CREATE INDEX IF NOT EXISTS record_linking_idx ON record (source_id, linking_id)",
    r#"CREATE TABLE IF NOT EXISTS state (
        id TEXT PRIMARY KEY,
        value TIMESTAMPTZ NOT NULL
    )"#,
    r#"CREATE TABLE IF NOT EXISTS location (
        place TEXT NOT NULL,
        lon DOUBLE PRECISION NOT NULL,
        lat DOUBLE PRECISION NOT NULL,
        importance INTEGER NOT NULL DEFAULT 999
    )"#,
    "CREATE INDEX IF NOT EXISTS location_place_idx ON location (place, importance)",
];

/// Idempotently creates the `record`, `state` and `location` tables with
/// their indexes.
pub async fn ensure_schema(pool: &PgPool) -> Result<(), RecordStoreError> {
    for statement in DDL {
        sqlx::query(statement).execute(pool).await?;
    }
    Ok(())
}
