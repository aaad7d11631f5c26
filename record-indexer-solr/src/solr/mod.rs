//! Solr HTTP client implementation.

pub mod client;

pub use client::{SolrClient, SolrClientConfig};
