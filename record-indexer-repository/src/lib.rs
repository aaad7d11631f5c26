//! # Record Indexer Repository
//!
//! This crate provides traits and implementations for interacting with the
//! record store: record enumeration, dedup-group auxiliary tables, host and
//! component lookups, geographic location lookup, and watermark
//! persistence. It includes definitions for errors, interfaces, and
//! concrete PostgreSQL implementations.

pub mod errors;
pub mod interfaces;
pub mod postgres;
pub mod types;

pub use errors::{RecordStoreError, StateStoreError};
pub use interfaces::{RecordStore, StateStore};
pub use postgres::{PostgresRecordStore, PostgresStateStore};
pub use types::GeoLocation;
