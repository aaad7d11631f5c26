//! Configuration for the indexing pipeline.
//!
//! The pipeline reads one immutable `IndexerConfig` threaded through
//! constructors; there is no process-wide config table. The configuration
//! file is TOML with `[solr]`, `[store]` and `[[data_source]]` tables;
//! infrastructure endpoints can be overridden from the environment at
//! wiring time.

pub mod dependencies;

pub use dependencies::Dependencies;

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;

use serde::Deserialize;

use record_indexer_shared::{
    ComponentPartsPolicy, DataSourceSettings, FieldMapping, FormatClasses, InstitutionInBuilding,
    MappingTable, RecordTransformer,
};

use crate::errors::PipelineError;
use crate::merger::DEFAULT_MERGED_FIELDS;

/// Search backend settings.
#[derive(Debug, Clone)]
pub struct SolrSettings {
    /// Backend POST target for updates.
    pub update_url: String,
    pub username: Option<String>,
    pub password: Option<String>,
    /// Run HTTP requests in a background worker.
    pub background_update: bool,
    /// Accept invalid TLS certificates (explicit opt-in for legacy
    /// deployments).
    pub accept_invalid_certs: bool,
    /// Records between intermediate commits.
    pub max_commit_interval: u64,
    /// Documents per HTTP add batch.
    pub max_update_records: usize,
    /// Add batch byte ceiling in KiB.
    pub max_update_size: usize,
}

/// Record store settings.
#[derive(Debug, Clone)]
pub struct StoreSettings {
    pub database_url: String,
    /// Count cursor results for progress reporting.
    pub counts: bool,
}

/// Immutable pipeline configuration.
#[derive(Debug)]
pub struct IndexerConfig {
    pub solr: SolrSettings,
    pub store: StoreSettings,
    pub formats: FormatClasses,
    /// Multiplicity field list for the merge engine.
    pub merged_fields: Vec<String>,
    hierarchical_facets: HashSet<String>,
    geocoding: Option<String>,
    data_sources: BTreeMap<String, DataSourceSettings>,
}

impl IndexerConfig {
    /// Minimal configuration for the given endpoints, without data
    /// sources.
    pub fn new(update_url: impl Into<String>, database_url: impl Into<String>) -> Self {
        Self {
            solr: SolrSettings {
                update_url: update_url.into(),
                username: None,
                password: None,
                background_update: false,
                accept_invalid_certs: false,
                max_commit_interval: 50000,
                max_update_records: 5000,
                max_update_size: 1024,
            },
            store: StoreSettings {
                database_url: database_url.into(),
                counts: false,
            },
            formats: FormatClasses::default(),
            merged_fields: DEFAULT_MERGED_FIELDS.iter().map(|f| f.to_string()).collect(),
            hierarchical_facets: HashSet::new(),
            geocoding: None,
            data_sources: BTreeMap::new(),
        }
    }

    /// Register a data source.
    pub fn add_data_source(&mut self, settings: DataSourceSettings) {
        self.data_sources.insert(settings.id.clone(), settings);
    }

    /// Declare a hierarchical facet.
    pub fn add_hierarchical_facet(&mut self, name: impl Into<String>) {
        self.hierarchical_facets.insert(name.into());
    }

    /// Set the geocoding target field.
    pub fn set_geocoding(&mut self, field: impl Into<String>) {
        self.geocoding = Some(field.into());
    }

    pub fn data_source(&self, id: &str) -> Option<&DataSourceSettings> {
        self.data_sources.get(id)
    }

    /// Configured data sources in id order.
    pub fn data_sources(&self) -> impl Iterator<Item = &DataSourceSettings> {
        self.data_sources.values()
    }

    pub fn is_hierarchical_facet(&self, name: &str) -> bool {
        self.hierarchical_facets.contains(name)
    }

    pub fn hierarchical_facets(&self) -> impl Iterator<Item = &String> {
        self.hierarchical_facets.iter()
    }

    pub fn geocoding(&self) -> Option<&str> {
        self.geocoding.as_deref()
    }

    /// Load the configuration from a TOML file.
    ///
    /// Mapping files are resolved relative to the configuration file;
    /// transformation names are resolved against `transformers`.
    pub fn load(
        path: &Path,
        transformers: &HashMap<String, Arc<dyn RecordTransformer>>,
    ) -> Result<Self, PipelineError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            PipelineError::config(format!("Failed to read {}: {e}", path.display()))
        })?;
        let base_dir = path.parent().unwrap_or_else(|| Path::new("."));
        Self::from_toml_str(&content, base_dir, transformers)
    }

    /// Parse the configuration from TOML content.
    pub fn from_toml_str(
        content: &str,
        base_dir: &Path,
        transformers: &HashMap<String, Arc<dyn RecordTransformer>>,
    ) -> Result<Self, PipelineError> {
        let file: ConfigFile = toml::from_str(content)
            .map_err(|e| PipelineError::config(format!("Invalid configuration: {e}")))?;

        let mut formats = FormatClasses::default();
        if let Some(journal) = file.solr.journal_formats {
            formats.journal_formats = journal.into_iter().collect();
        }
        if let Some(ejournal) = file.solr.ejournal_formats {
            formats.ejournal_formats = ejournal.into_iter().collect();
        }
        if let Some(article) = file.solr.article_formats {
            formats.article_formats = article.into_iter().collect();
        }
        if let Some(earticle) = file.solr.earticle_formats {
            formats.earticle_formats = earticle.into_iter().collect();
        }

        let merged_fields = file
            .solr
            .merged_fields
            .unwrap_or_else(|| DEFAULT_MERGED_FIELDS.iter().map(|f| f.to_string()).collect());

        let mut config = Self {
            solr: SolrSettings {
                update_url: file.solr.update_url,
                username: file.solr.username,
                password: file.solr.password,
                background_update: file.solr.background_update,
                accept_invalid_certs: file.solr.accept_invalid_certs,
                max_commit_interval: file.solr.max_commit_interval,
                max_update_records: file.solr.max_update_records,
                max_update_size: file.solr.max_update_size,
            },
            store: StoreSettings {
                database_url: file.store.database_url,
                counts: file.store.counts,
            },
            formats,
            merged_fields,
            hierarchical_facets: file.solr.hierarchical_facets.into_iter().collect(),
            geocoding: file.solr.geocoding,
            data_sources: BTreeMap::new(),
        };

        for section in file.data_sources {
            let mut settings =
                DataSourceSettings::new(section.id.clone(), section.institution, section.format);
            if let Some(id_prefix) = section.id_prefix {
                settings.id_prefix = id_prefix;
            }
            settings.component_parts = section.component_parts;
            settings.index_merged_parts = section.index_merged_parts;
            settings.institution_in_building = section.institution_in_building;

            for (field, file_name) in section.mappings {
                let table = MappingTable::from_file(base_dir.join(&file_name))?;
                settings.mappings.push(FieldMapping { field, table });
            }

            if let Some(name) = section.transformation {
                let transformer = transformers.get(&name).ok_or_else(|| {
                    PipelineError::config(format!(
                        "Unknown transformation {name} for data source {}",
                        section.id
                    ))
                })?;
                settings.transformation = Some(Arc::clone(transformer));
            }

            if config.data_sources.contains_key(&section.id) {
                return Err(PipelineError::config(format!(
                    "Duplicate data source {}",
                    section.id
                )));
            }
            config.add_data_source(settings);
        }

        Ok(config)
    }
}

#[derive(Debug, Deserialize)]
struct ConfigFile {
    solr: SolrSection,
    store: StoreSection,
    #[serde(default, rename = "data_source")]
    data_sources: Vec<DataSourceSection>,
}

#[derive(Debug, Deserialize)]
struct SolrSection {
    update_url: String,
    username: Option<String>,
    password: Option<String>,
    #[serde(default)]
    background_update: bool,
    #[serde(default)]
    accept_invalid_certs: bool,
    #[serde(default = "default_commit_interval")]
    max_commit_interval: u64,
    #[serde(default = "default_update_records")]
    max_update_records: usize,
    #[serde(default = "default_update_size")]
    max_update_size: usize,
    journal_formats: Option<Vec<String>>,
    ejournal_formats: Option<Vec<String>>,
    article_formats: Option<Vec<String>>,
    earticle_formats: Option<Vec<String>>,
    merged_fields: Option<Vec<String>>,
    #[serde(default)]
    hierarchical_facets: Vec<String>,
    geocoding: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StoreSection {
    database_url: String,
    #[serde(default)]
    counts: bool,
}

#[derive(Debug, Deserialize)]
struct DataSourceSection {
    id: String,
    institution: String,
    format: String,
    id_prefix: Option<String>,
    #[serde(default)]
    component_parts: ComponentPartsPolicy,
    #[serde(default = "default_true")]
    index_merged_parts: bool,
    transformation: Option<String>,
    #[serde(default)]
    institution_in_building: InstitutionInBuilding,
    #[serde(default)]
    mappings: HashMap<String, String>,
}

fn default_commit_interval() -> u64 {
    50000
}

fn default_update_records() -> usize {
    5000
}

fn default_update_size() -> usize {
    1024
}

fn default_true() -> bool {
    true
}
