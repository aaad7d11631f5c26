//! # Record Indexer Solr
//!
//! This crate provides the transport to the search backend: the
//! `UpdateTransport` trait, the JSON wire payload builders, and a concrete
//! HTTP client with an optional background worker that decouples request
//! submission from batch preparation.

pub mod errors;
pub mod interfaces;
pub mod payloads;
pub mod solr;

pub use errors::TransportError;
pub use interfaces::UpdateTransport;
pub use solr::{SolrClient, SolrClientConfig};
