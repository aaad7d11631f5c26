//! Record-to-document projection.
//!
//! For one stored record, produces the single index document: invokes the
//! format parser, applies the optional post-projection transformation,
//! attaches host/component linkage, applies mapping tables, expands
//! hierarchical facets, backfills `allfields`, stamps timestamps and
//! strips empty fields.

use std::sync::Arc;

use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{json, Value};
use tracing::warn;

use record_indexer_repository::RecordStore;
use record_indexer_shared::types::document::value_to_string;
use record_indexer_shared::{
    ComponentPartsPolicy, DataSourceSettings, FieldMapping, IndexDocument, InstitutionInBuilding,
    ParserFactory, Record, TransformContext,
};

use crate::config::IndexerConfig;
use crate::errors::PipelineError;

/// Fields that never contribute to the `allfields` backfill.
const ALLFIELDS_EXCLUDED: &[&str] = &["fullrecord", "thumbnail", "id", "recordtype", "ctrlnum"];

/// Hierarchy linking fields that get the source prefix on a non-component
/// record.
const HIERARCHY_ID_FIELDS: &[&str] = &["hierarchy_top_id", "hierarchy_parent_id", "is_hierarchy_id"];

/// Result of projecting one record.
pub enum Projection {
    /// The record's index document.
    Document(ProjectedRecord),
    /// Hidden component part of a source that does not index merged parts.
    Skipped,
}

/// A projected document together with the number of component parts merged
/// into it.
pub struct ProjectedRecord {
    pub document: IndexDocument,
    pub merged_components: u64,
}

/// Projects stored records into index documents.
pub struct RecordProjector {
    config: Arc<IndexerConfig>,
    store: Arc<dyn RecordStore>,
    parsers: Arc<dyn ParserFactory>,
}

impl RecordProjector {
    pub fn new(
        config: Arc<IndexerConfig>,
        store: Arc<dyn RecordStore>,
        parsers: Arc<dyn ParserFactory>,
    ) -> Self {
        Self {
            config,
            store,
            parsers,
        }
    }

    /// Project one record into its index document.
    pub async fn project(&self, record: &Record) -> Result<Projection, PipelineError> {
        let settings = self.config.data_source(&record.source_id).ok_or_else(|| {
            PipelineError::config(format!(
                "Data source {} is not configured",
                record.source_id
            ))
        })?;
        let mut parser = self.parsers.create(record)?;

        let is_component = record.is_component_part();
        let hidden = is_component && self.is_hidden_component(settings, &record.format);
        if hidden && !settings.index_merged_parts {
            return Ok(Projection::Skipped);
        }

        // Host-side component gathering.
        let mut merged_components = 0u64;
        let mut has_components = false;
        if !is_component {
            if let Some(linking_id) = &record.linking_id {
                let components = self
                    .store
                    .component_parts(&record.source_id, linking_id)
                    .await?;
                has_components = !components.is_empty();
                if has_components && self.merges_components(settings, &record.format) {
                    merged_components = parser.merge_component_parts(&components) as u64;
                }
            } else if settings.component_parts != ComponentPartsPolicy::AsIs {
                warn!(
                    record_id = %record.id,
                    "Record has no linking id; component parts were not gathered"
                );
            }
        }

        // Base projection.
        let context = TransformContext {
            source_id: &record.source_id,
            institution: &settings.institution,
            format: &record.format,
            id_prefix: &settings.id_prefix,
        };
        let mut document = match &settings.transformation {
            Some(transformer) => transformer.transform(&parser.to_xml()?, &context)?,
            None => parser.project()?,
        };
        // The backfill content is fixed here: `allfields` reflects the
        // base projection, not the enrichment fields attached below.
        let base_allfields = collect_allfields(&document);
        document.insert("id", record.id.clone());

        // Host/component linkage.
        if is_component {
            let host_record_id = record.host_record_id.as_deref().unwrap_or_default();
            match self
                .store
                .find_host(&record.source_id, host_record_id)
                .await?
            {
                Some(host) => {
                    document.insert("hierarchy_parent_id", host.id.clone());
                    let host_title = self
                        .parsers
                        .create(&host)
                        .ok()
                        .and_then(|host_parser| host_parser.title());
                    if let Some(title) = host_title {
                        document.insert("container_title", title.clone());
                        document.insert("hierarchy_parent_title", title);
                    }
                }
                None => {
                    warn!(
                        record_id = %record.id,
                        host_record_id = %host_record_id,
                        "Host record not found"
                    );
                    if let Some(title) = parser.container_title() {
                        document.insert("container_title", title);
                    }
                }
            }
            if let Some(volume) = parser.container_volume() {
                document.insert("container_volume", volume);
            }
            if let Some(issue) = parser.container_issue() {
                document.insert("container_issue", issue);
            }
            if let Some(start_page) = parser.container_start_page() {
                document.insert("container_start_page", start_page);
            }
            if let Some(reference) = parser.container_reference() {
                document.insert("container_reference", reference);
            }
        } else {
            for field in HIERARCHY_ID_FIELDS {
                prefix_values(&mut document, field, &record.source_id);
            }
        }
        if has_components {
            document.insert("is_hierarchy_id", record.id.clone());
            if let Some(title) = parser.title() {
                document.insert("is_hierarchy_title", title);
            }
        }

        // Defaults.
        document.insert_if_absent("institution", settings.institution.clone());

        // Mapping tables.
        for mapping in &settings.mappings {
            apply_mapping(&mut document, mapping);
        }

        // Hierarchical building.
        if self.config.is_hierarchical_facet("building") {
            self.prefix_building(&mut document, settings, record);
        }

        // Hierarchical facet expansion.
        for facet in self.config.hierarchical_facets() {
            if document.contains(facet) {
                document.expand_hierarchical(facet);
            }
        }

        // `allfields` backfill.
        if !document.contains("allfields") {
            document.insert("allfields", base_allfields);
        }

        // Timestamps and type.
        document.insert("first_indexed", format_instant(record.created));
        document.insert("last_indexed", format_instant(record.date));
        document.insert("recordtype", record.format.clone());
        if !document.contains("fullrecord") {
            document.insert("fullrecord", parser.to_xml()?);
        }
        if document.contains("format") {
            document.ensure_list("format");
        } else {
            document.insert("format", json!([record.format]));
        }

        if hidden {
            document.insert("hidden_component_boolean", true);
        }

        // Geocoding.
        if let Some(geo_field) = self.config.geocoding() {
            let geo_missing = document
                .get(geo_field)
                .map(|v| value_to_string(v).is_empty())
                .unwrap_or(true);
            if geo_missing && document.contains("geographic_facet") {
                let places = document.string_values("geographic_facet");
                let coordinates = self.geocode(places).await;
                if !coordinates.is_empty() {
                    document.insert(geo_field, coordinates);
                }
            }
        }

        // Final normalization.
        document.dedup_all_lists();
        document.strip_empty();

        Ok(Projection::Document(ProjectedRecord {
            document,
            merged_components,
        }))
    }

    /// Whether a component record is hidden behind its host under the
    /// source's component-part policy.
    fn is_hidden_component(&self, settings: &DataSourceSettings, format: &str) -> bool {
        let formats = &self.config.formats;
        match settings.component_parts {
            ComponentPartsPolicy::AsIs => false,
            ComponentPartsPolicy::MergeAll => true,
            ComponentPartsPolicy::MergeNonArticles => !formats.is_any_article(format),
            ComponentPartsPolicy::MergeNonEarticles => {
                !formats.is_any_article(format)
                    || (formats.is_article(format) && !formats.is_earticle(format))
            }
        }
    }

    /// Host-side decision: whether found component parts are merged into
    /// the host document.
    fn merges_components(&self, settings: &DataSourceSettings, host_format: &str) -> bool {
        let formats = &self.config.formats;
        settings.component_parts == ComponentPartsPolicy::MergeAll
            || !formats.is_any_journal(host_format)
            || (formats.is_journal(host_format)
                && settings.component_parts == ComponentPartsPolicy::MergeNonEarticles)
    }

    fn prefix_building(
        &self,
        document: &mut IndexDocument,
        settings: &DataSourceSettings,
        record: &Record,
    ) {
        let code = match settings.institution_in_building {
            InstitutionInBuilding::Driver => document
                .get_str("institution")
                .unwrap_or_default()
                .to_string(),
            InstitutionInBuilding::None => String::new(),
            InstitutionInBuilding::Source => record.source_id.clone(),
            InstitutionInBuilding::Institution => settings.institution.clone(),
        };
        if code.is_empty() {
            return;
        }
        if document.contains("building") {
            let prefixed: Vec<Value> = document
                .string_values("building")
                .into_iter()
                .map(|value| Value::String(format!("{code}/{value}")))
                .collect();
            document.insert("building", prefixed);
        } else {
            document.insert("building", json!([code]));
        }
    }

    /// Geocode the places of `geographic_facet` into `"lon lat"` entries.
    ///
    /// Lookup failures are tolerated with a warning; geocoding never fails
    /// a projection.
    async fn geocode(&self, places: Vec<String>) -> Vec<String> {
        let mut coordinates = Vec::new();
        'places: for place in places {
            let mut keys = vec![place.clone()];
            if place.contains(',') {
                keys.extend(place.split(',').map(str::to_string));
            }
            for key in keys {
                let key = key.trim().to_uppercase();
                if key.is_empty() {
                    continue;
                }
                let locations = match self.store.lookup_locations(&key).await {
                    Ok(locations) => locations,
                    Err(e) => {
                        warn!(place = %key, error = %e, "Location lookup failed");
                        continue;
                    }
                };
                if locations.is_empty() {
                    continue;
                }
                let definite = locations[0].is_definite();
                for location in &locations {
                    if definite && !location.is_definite() {
                        break;
                    }
                    coordinates.push(location.coordinates());
                }
                if definite {
                    break 'places;
                }
                break;
            }
        }
        coordinates
    }
}

/// Prefix every value of a field with `"<source_id>."`.
fn prefix_values(document: &mut IndexDocument, field: &str, source_id: &str) {
    let Some(value) = document.get(field).cloned() else {
        return;
    };
    let prefixed = match value {
        Value::Array(items) => Value::Array(
            items
                .iter()
                .map(|item| Value::String(format!("{source_id}.{}", value_to_string(item))))
                .collect(),
        ),
        other => Value::String(format!("{source_id}.{}", value_to_string(&other))),
    };
    document.insert(field.to_string(), prefixed);
}

/// Apply one mapping table to its field.
fn apply_mapping(document: &mut IndexDocument, mapping: &FieldMapping) {
    let table = &mapping.table;
    match document.get(&mapping.field).cloned() {
        Some(Value::Array(items)) if !items.is_empty() => {
            let mut mapped: Vec<Value> = Vec::with_capacity(items.len());
            for item in items {
                let value = value_to_string(&item);
                match table.map(&value) {
                    Some(replacement) => mapped.push(Value::String(replacement.to_string())),
                    None => mapped.push(Value::String(value)),
                }
            }
            // Mapped lists are deduplicated and reindexed.
            let mut seen = Vec::new();
            mapped.retain(|item| {
                if seen.contains(item) {
                    false
                } else {
                    seen.push(item.clone());
                    true
                }
            });
            document.insert(mapping.field.clone(), mapped);
        }
        Some(value) if !value_to_string(&value).is_empty() => {
            let scalar = value_to_string(&value);
            if let Some(replacement) = table.map(&scalar) {
                document.insert(mapping.field.clone(), replacement);
            }
        }
        _ => {
            if let Some(empty) = table.empty_value() {
                document.insert(mapping.field.clone(), empty);
            } else if let Some(empty_array) = table.empty_array_value() {
                document.insert(mapping.field.clone(), json!([empty_array]));
            }
        }
    }
}

/// Backfill entries for `allfields`: one stringified entry per field, with
/// case-insensitive dedup.
fn collect_allfields(document: &IndexDocument) -> Vec<String> {
    let mut entries: Vec<String> = Vec::new();
    let mut seen: Vec<String> = Vec::new();
    for (field, value) in document.iter() {
        if ALLFIELDS_EXCLUDED.contains(&field.as_str()) {
            continue;
        }
        let entry = value_to_string(value);
        if entry.is_empty() {
            continue;
        }
        let folded = entry.to_lowercase();
        if !seen.contains(&folded) {
            seen.push(folded);
            entries.push(entry);
        }
    }
    entries
}

/// ISO-8601 UTC instant for `first_indexed` / `last_indexed`.
fn format_instant(instant: DateTime<Utc>) -> String {
    instant.to_rfc3339_opts(SecondsFormat::Secs, true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use record_indexer_shared::MappingTable;

    #[test]
    fn test_format_instant_is_iso8601_utc() {
        let instant = Utc.with_ymd_and_hms(2023, 1, 1, 12, 30, 0).unwrap();
        assert_eq!(format_instant(instant), "2023-01-01T12:30:00Z");
    }

    #[test]
    fn test_prefix_values_handles_lists_and_scalars() {
        let mut document = IndexDocument::new();
        document.insert("hierarchy_top_id", "top");
        document.insert("hierarchy_parent_id", json!(["p1", "p2"]));
        prefix_values(&mut document, "hierarchy_top_id", "s1");
        prefix_values(&mut document, "hierarchy_parent_id", "s1");
        prefix_values(&mut document, "is_hierarchy_id", "s1");

        assert_eq!(document.get_str("hierarchy_top_id"), Some("s1.top"));
        assert_eq!(
            document.get("hierarchy_parent_id"),
            Some(&json!(["s1.p1", "s1.p2"]))
        );
        assert!(!document.contains("is_hierarchy_id"));
    }

    #[test]
    fn test_apply_mapping_with_default() {
        let mapping = FieldMapping {
            field: "category".to_string(),
            table: MappingTable::from_entries([("a", "Apple"), ("##default", "Other")]),
        };
        let mut document = IndexDocument::new();
        document.insert("category", json!(["a", "b"]));
        apply_mapping(&mut document, &mapping);

        assert_eq!(document.get("category"), Some(&json!(["Apple", "Other"])));
    }

    #[test]
    fn test_apply_mapping_deduplicates_mapped_list() {
        let mapping = FieldMapping {
            field: "category".to_string(),
            table: MappingTable::from_entries([("##default", "Other")]),
        };
        let mut document = IndexDocument::new();
        document.insert("category", json!(["x", "y"]));
        apply_mapping(&mut document, &mapping);

        assert_eq!(document.get("category"), Some(&json!(["Other"])));
    }

    #[test]
    fn test_apply_mapping_scalar_passthrough_without_default() {
        let mapping = FieldMapping {
            field: "category".to_string(),
            table: MappingTable::from_entries([("a", "Apple")]),
        };
        let mut document = IndexDocument::new();
        document.insert("category", "z");
        apply_mapping(&mut document, &mapping);

        assert_eq!(document.get_str("category"), Some("z"));
    }

    #[test]
    fn test_apply_mapping_empty_sentinels() {
        let scalar = FieldMapping {
            field: "category".to_string(),
            table: MappingTable::from_entries([("##empty", "Unknown")]),
        };
        let list = FieldMapping {
            field: "tags".to_string(),
            table: MappingTable::from_entries([("##emptyarray", "None")]),
        };
        let mut document = IndexDocument::new();
        apply_mapping(&mut document, &scalar);
        apply_mapping(&mut document, &list);

        assert_eq!(document.get_str("category"), Some("Unknown"));
        assert_eq!(document.get("tags"), Some(&json!(["None"])));
    }

    #[test]
    fn test_collect_allfields_skips_excluded_and_dedups() {
        let mut document = IndexDocument::new();
        document.insert("id", "s1.1");
        document.insert("fullrecord", "<record/>");
        document.insert("title", "T");
        document.insert("title_short", "t");
        document.insert("topic", json!(["a", "b"]));
        let entries = collect_allfields(&document);

        assert_eq!(entries, vec!["T".to_string(), "a b".to_string()]);
    }
}
