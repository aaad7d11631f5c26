//! Dependency initialization and wiring for the indexing pipeline.

use std::collections::HashMap;
use std::env;
use std::path::Path;
use std::sync::Arc;

use sqlx::postgres::PgPoolOptions;
use tracing::info;

use record_indexer_repository::postgres::ensure_schema;
use record_indexer_repository::{PostgresRecordStore, PostgresStateStore, RecordStoreError};
use record_indexer_shared::{JsonParserFactory, RecordTransformer};
use record_indexer_solr::{SolrClient, SolrClientConfig};

use crate::config::IndexerConfig;
use crate::errors::PipelineError;
use crate::pipeline::Pipeline;

/// Maximum connections of the record store pool.
const MAX_POOL_CONNECTIONS: u32 = 10;

/// Container for all initialized dependencies.
pub struct Dependencies {
    /// The configured pipeline ready to run.
    pub pipeline: Pipeline,
}

impl Dependencies {
    /// Initialize all dependencies from the configuration file.
    ///
    /// # Environment Variables
    ///
    /// - `DATABASE_URL`: overrides the configured record store URL
    /// - `SOLR_UPDATE_URL`: overrides the configured backend update URL
    pub async fn new(config_path: &Path) -> Result<Self, PipelineError> {
        Self::with_transformers(config_path, &HashMap::new()).await
    }

    /// Initialize with externally registered post-projection
    /// transformations, resolvable by name from data-source settings.
    pub async fn with_transformers(
        config_path: &Path,
        transformers: &HashMap<String, Arc<dyn RecordTransformer>>,
    ) -> Result<Self, PipelineError> {
        let mut config = IndexerConfig::load(config_path, transformers)?;
        if let Ok(url) = env::var("DATABASE_URL") {
            config.store.database_url = url;
        }
        if let Ok(url) = env::var("SOLR_UPDATE_URL") {
            config.solr.update_url = url;
        }

        info!(
            update_url = %config.solr.update_url,
            background_update = config.solr.background_update,
            data_sources = config.data_sources().count(),
            "Initializing dependencies"
        );

        let pool = PgPoolOptions::new()
            .max_connections(MAX_POOL_CONNECTIONS)
            .connect(&config.store.database_url)
            .await
            .map_err(RecordStoreError::from)?;
        ensure_schema(&pool).await?;

        let store = Arc::new(PostgresRecordStore::new(pool.clone()));
        let state = Arc::new(PostgresStateStore::new(pool));

        let mut solr_config = SolrClientConfig::new(config.solr.update_url.clone());
        solr_config.username = config.solr.username.clone();
        solr_config.password = config.solr.password.clone();
        solr_config.background_update = config.solr.background_update;
        solr_config.accept_invalid_certs = config.solr.accept_invalid_certs;
        let transport = Arc::new(SolrClient::new(solr_config)?);

        info!("Record store connection established");

        let pipeline = Pipeline::new(
            Arc::new(config),
            store,
            state,
            transport,
            Arc::new(JsonParserFactory),
        );

        Ok(Self { pipeline })
    }
}
