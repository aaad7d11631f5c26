//! Integration tests for the PostgreSQL repository implementations.
//!
//! These tests require a real PostgreSQL database and use SQLx test macros
//! to ensure proper test isolation and cleanup.
//!
//! Run with: `cargo test --test postgres_store`

use chrono::{TimeZone, Utc};
use serde_json::json;

use record_indexer_repository::postgres::ensure_schema;
use record_indexer_repository::{
    PostgresRecordStore, PostgresStateStore, RecordStore, StateStore,
};
use record_indexer_shared::{DedupConstraint, Record, RecordFilter};

fn make_record(id: &str, source_id: &str) -> Record {
    Record {
        id: id.to_string(),
        source_id: source_id.to_string(),
        format: "Book".to_string(),
        oai_id: None,
        linking_id: None,
        host_record_id: None,
        dedup_key: None,
        key: None,
        created: Utc.with_ymd_and_hms(2023, 1, 1, 0, 0, 0).unwrap(),
        updated: Utc.with_ymd_and_hms(2023, 1, 2, 0, 0, 0).unwrap(),
        date: Utc.with_ymd_and_hms(2023, 1, 2, 0, 0, 0).unwrap(),
        deleted: false,
        update_needed: false,
        metadata: json!({"title": "T"}),
    }
}

async fn insert_record(pool: &sqlx::PgPool, record: &Record) {
    sqlx::query(
        "INSERT INTO record (id, source_id, format, oai_id, linking_id, host_record_id, \
         dedup_key, \"key\", created, updated, \"date\", deleted, update_needed, metadata) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)",
    )
    .bind(&record.id)
    .bind(&record.source_id)
    .bind(&record.format)
    .bind(&record.oai_id)
    .bind(&record.linking_id)
    .bind(&record.host_record_id)
    .bind(&record.dedup_key)
    .bind(&record.key)
    .bind(record.created)
    .bind(record.updated)
    .bind(record.date)
    .bind(record.deleted)
    .bind(record.update_needed)
    .bind(&record.metadata)
    .execute(pool)
    .await
    .unwrap();
}

#[sqlx::test]
async fn test_fetch_records_with_keyset_pagination(pool: sqlx::PgPool) {
    ensure_schema(&pool).await.unwrap();
    for i in 1..=5 {
        insert_record(&pool, &make_record(&format!("s1.{i}"), "s1")).await;
    }
    let store = PostgresRecordStore::new(pool);
    let filter = RecordFilter::all().with_source("s1");

    let first = store.fetch_records(&filter, None, 2).await.unwrap();
    assert_eq!(first.len(), 2);
    assert_eq!(first[0].id, "s1.1");

    let second = store
        .fetch_records(&filter, Some(&first[1].id), 10)
        .await
        .unwrap();
    assert_eq!(second.len(), 3);
    assert_eq!(second[0].id, "s1.3");
}

#[sqlx::test]
async fn test_filter_excludes_update_pending(pool: sqlx::PgPool) {
    ensure_schema(&pool).await.unwrap();
    let mut pending = make_record("s1.1", "s1");
    pending.update_needed = true;
    insert_record(&pool, &pending).await;
    insert_record(&pool, &make_record("s1.2", "s1")).await;

    let store = PostgresRecordStore::new(pool);
    let records = store
        .fetch_records(&RecordFilter::all(), None, 10)
        .await
        .unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].id, "s1.2");

    // A single-id target ignores the update-pending exclusion.
    let filter = RecordFilter::all().with_single_id("s1.1");
    let targeted = store.fetch_records(&filter, None, 10).await.unwrap();
    assert_eq!(targeted.len(), 1);

    let found = store.find_record("s1.1").await.unwrap();
    assert!(found.is_some_and(|r| r.update_needed));
    assert!(store.find_record("missing").await.unwrap().is_none());
}

#[sqlx::test]
async fn test_dedup_group_table_lifecycle(pool: sqlx::PgPool) {
    ensure_schema(&pool).await.unwrap();
    for (id, dedup) in [("s1.1", Some("D1")), ("s1.2", Some("D1")), ("s1.3", Some("D2"))] {
        let mut record = make_record(id, "s1");
        record.dedup_key = dedup.map(str::to_string);
        insert_record(&pool, &record).await;
    }
    insert_record(&pool, &make_record("s1.4", "s1")).await;

    let store = PostgresRecordStore::new(pool);
    let table = "mr_record_cafe01_1700000000";
    let filter = RecordFilter::all().with_dedup(DedupConstraint::Present);

    assert!(!store.dedup_group_table_exists(table).await.unwrap());
    store.build_dedup_group_table(table, &filter).await.unwrap();
    assert!(store.dedup_group_table_exists(table).await.unwrap());

    let keys = store.fetch_dedup_keys(table, None, 10).await.unwrap();
    assert_eq!(keys, vec!["D1".to_string(), "D2".to_string()]);

    let tables = store.list_dedup_group_tables().await.unwrap();
    assert_eq!(tables, vec![table.to_string()]);

    store.drop_dedup_group_table(table).await.unwrap();
    assert!(!store.dedup_group_table_exists(table).await.unwrap());
}

#[sqlx::test]
async fn test_host_and_component_lookup(pool: sqlx::PgPool) {
    ensure_schema(&pool).await.unwrap();
    let mut host = make_record("s1.host", "s1");
    host.linking_id = Some("L1".to_string());
    insert_record(&pool, &host).await;

    let mut part = make_record("s1.part", "s1");
    part.host_record_id = Some("L1".to_string());
    insert_record(&pool, &part).await;

    let mut deleted_part = make_record("s1.gone", "s1");
    deleted_part.host_record_id = Some("L1".to_string());
    deleted_part.deleted = true;
    insert_record(&pool, &deleted_part).await;

    let store = PostgresRecordStore::new(pool);

    let parts = store.component_parts("s1", "L1").await.unwrap();
    assert_eq!(parts.len(), 1);
    assert_eq!(parts[0].id, "s1.part");

    let found = store.find_host("s1", "L1").await.unwrap();
    assert_eq!(found.map(|h| h.id), Some("s1.host".to_string()));
}

#[sqlx::test]
async fn test_has_live_group_member(pool: sqlx::PgPool) {
    ensure_schema(&pool).await.unwrap();
    let mut a = make_record("s1.1", "s1");
    a.dedup_key = Some("D".to_string());
    insert_record(&pool, &a).await;

    let mut b = make_record("s1.2", "s1");
    b.dedup_key = Some("D".to_string());
    b.deleted = true;
    insert_record(&pool, &b).await;

    let store = PostgresRecordStore::new(pool);
    assert!(store.has_live_group_member("D", "s1.2").await.unwrap());
    assert!(!store.has_live_group_member("D", "s1.1").await.unwrap());
}

#[sqlx::test]
async fn test_location_lookup_ordered_by_importance(pool: sqlx::PgPool) {
    ensure_schema(&pool).await.unwrap();
    for (place, lon, lat, importance) in [
        ("HELSINKI", 24.93, 60.16, 5),
        ("HELSINKI", 24.94, 60.17, 0),
    ] {
        sqlx::query("INSERT INTO location (place, lon, lat, importance) VALUES ($1, $2, $3, $4)")
            .bind(place)
            .bind(lon)
            .bind(lat)
            .bind(importance)
            .execute(&pool)
            .await
            .unwrap();
    }

    let store = PostgresRecordStore::new(pool);
    let locations = store.lookup_locations("HELSINKI").await.unwrap();
    assert_eq!(locations.len(), 2);
    assert_eq!(locations[0].importance, 0);
    assert!(locations[0].is_definite());
}

#[sqlx::test]
async fn test_watermark_upsert(pool: sqlx::PgPool) {
    ensure_schema(&pool).await.unwrap();
    let store = PostgresStateStore::new(pool);

    assert!(store
        .last_index_update("Last Index Update")
        .await
        .unwrap()
        .is_none());

    let first = Utc.with_ymd_and_hms(2023, 6, 1, 0, 0, 0).unwrap();
    store
        .save_last_index_update("Last Index Update", first)
        .await
        .unwrap();
    assert_eq!(
        store.last_index_update("Last Index Update").await.unwrap(),
        Some(first)
    );

    let second = Utc.with_ymd_and_hms(2023, 6, 2, 0, 0, 0).unwrap();
    store
        .save_last_index_update("Last Index Update", second)
        .await
        .unwrap();
    assert_eq!(
        store.last_index_update("Last Index Update").await.unwrap(),
        Some(second)
    );
}
