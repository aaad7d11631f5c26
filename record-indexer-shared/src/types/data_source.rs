//! Per-data-source settings and format classification.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use serde::Deserialize;

use crate::mapping::MappingTable;
use crate::parser::RecordTransformer;

/// How component parts of a host record are treated when indexing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComponentPartsPolicy {
    /// Index every component part as its own document.
    #[default]
    AsIs,
    /// Merge all component parts into the host document.
    MergeAll,
    /// Merge component parts unless their format is an article format.
    MergeNonArticles,
    /// Merge component parts unless their format is an e-article format.
    MergeNonEarticles,
}

/// Which institution code prefixes hierarchical `building` values.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstitutionInBuilding {
    /// The settings institution (default).
    #[default]
    Institution,
    /// The `institution` field of the projected document.
    Driver,
    /// No institution prefix.
    None,
    /// The data source id.
    Source,
}

/// A mapping table applied to one document field.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldMapping {
    pub field: String,
    pub table: MappingTable,
}

/// Format classification sets gating merge and hide decisions.
#[derive(Clone, PartialEq, Eq)]
pub struct FormatClasses {
    pub journal_formats: HashSet<String>,
    pub ejournal_formats: HashSet<String>,
    pub article_formats: HashSet<String>,
    pub earticle_formats: HashSet<String>,
}

impl Default for FormatClasses {
    fn default() -> Self {
        Self {
            journal_formats: ["journal".to_string()].into(),
            ejournal_formats: ["eJournal".to_string()].into(),
            article_formats: ["article".to_string()].into(),
            earticle_formats: ["eArticle".to_string()].into(),
        }
    }
}

impl FormatClasses {
    pub fn is_journal(&self, format: &str) -> bool {
        self.journal_formats.contains(format)
    }

    /// Whether the format is in the union of journal and e-journal formats.
    pub fn is_any_journal(&self, format: &str) -> bool {
        self.journal_formats.contains(format) || self.ejournal_formats.contains(format)
    }

    pub fn is_article(&self, format: &str) -> bool {
        self.article_formats.contains(format)
    }

    pub fn is_earticle(&self, format: &str) -> bool {
        self.earticle_formats.contains(format)
    }

    /// Whether the format is in the union of article and e-article formats.
    pub fn is_any_article(&self, format: &str) -> bool {
        self.article_formats.contains(format) || self.earticle_formats.contains(format)
    }
}

impl fmt::Debug for FormatClasses {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FormatClasses")
            .field("journal_formats", &self.journal_formats)
            .field("ejournal_formats", &self.ejournal_formats)
            .field("article_formats", &self.article_formats)
            .field("earticle_formats", &self.earticle_formats)
            .finish()
    }
}

/// Resolved settings of one data source.
///
/// Built by the configuration layer from the data-source table of the
/// config file, with mapping tables loaded and the optional transformation
/// resolved to a handle.
#[derive(Clone)]
pub struct DataSourceSettings {
    pub id: String,
    /// Owning institution; required.
    pub institution: String,
    /// Default metadata format; required.
    pub format: String,
    /// Prefix for identifiers minted from this source; defaults to the
    /// source id.
    pub id_prefix: String,
    pub component_parts: ComponentPartsPolicy,
    /// Whether hidden (merged) component parts are still indexed.
    pub index_merged_parts: bool,
    pub institution_in_building: InstitutionInBuilding,
    /// `<field>_mapping` tables applied after projection.
    pub mappings: Vec<FieldMapping>,
    /// Optional post-projection transformation of the parser's XML output.
    pub transformation: Option<Arc<dyn RecordTransformer>>,
}

impl DataSourceSettings {
    /// Settings with defaults for everything beyond the required fields.
    pub fn new(
        id: impl Into<String>,
        institution: impl Into<String>,
        format: impl Into<String>,
    ) -> Self {
        let id = id.into();
        Self {
            id_prefix: id.clone(),
            id,
            institution: institution.into(),
            format: format.into(),
            component_parts: ComponentPartsPolicy::default(),
            index_merged_parts: true,
            institution_in_building: InstitutionInBuilding::default(),
            mappings: Vec::new(),
            transformation: None,
        }
    }
}

impl fmt::Debug for DataSourceSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DataSourceSettings")
            .field("id", &self.id)
            .field("institution", &self.institution)
            .field("format", &self.format)
            .field("id_prefix", &self.id_prefix)
            .field("component_parts", &self.component_parts)
            .field("index_merged_parts", &self.index_merged_parts)
            .field("institution_in_building", &self.institution_in_building)
            .field("mappings", &self.mappings)
            .field(
                "transformation",
                &self.transformation.as_ref().map(|_| "<transformer>"),
            )
            .finish()
    }
}
