//! Dedup-group merge engine.
//!
//! Folds the projections of a dedup group's members into one merged
//! document. Multiplicity fields are unioned across members, `allfields`
//! is appended, checked title/author fields take the first child to supply
//! them, and everything else comes from the first child with `id` and
//! `fullrecord` stripped. The driver finalizes the group with a
//! case-insensitive dedup and stamps the merged identity.

use std::collections::HashSet;

use serde_json::{json, Value};

use record_indexer_shared::IndexDocument;

/// Fields whose values carry semantic multiplicity across merged members.
pub const DEFAULT_MERGED_FIELDS: &[&str] = &[
    "institution",
    "collection",
    "building",
    "language",
    "physical",
    "publisher",
    "publishDate",
    "contents",
    "url",
    "ctrlnum",
    "author2",
    "author_additional",
    "title_alt",
    "title_old",
    "title_new",
    "dateSpan",
    "series",
    "series2",
    "topic",
    "genre",
    "geographic",
    "era",
    "long_lat",
];

/// Fields taken from the first child to supply them; later children never
/// overwrite.
const CHECKED_FIELDS: &[&str] = &[
    "title_auth",
    "title",
    "title_short",
    "title_full",
    "title_sort",
    "author",
];

/// Combines projections of a dedup group under the per-field merge policy.
pub struct MergeEngine {
    merged_fields: HashSet<String>,
}

impl MergeEngine {
    pub fn new(merged_fields: impl IntoIterator<Item = String>) -> Self {
        Self {
            merged_fields: merged_fields.into_iter().collect(),
        }
    }

    /// Engine with the default multiplicity field list.
    pub fn with_defaults() -> Self {
        Self::new(DEFAULT_MERGED_FIELDS.iter().map(|f| f.to_string()))
    }

    fn is_multiplicity(&self, field: &str) -> bool {
        field.ends_with("_mv") || self.merged_fields.contains(field)
    }

    /// Fold one child projection into the merged accumulator.
    pub fn merge(&self, merged: &mut IndexDocument, child: &IndexDocument) {
        let child_id = child.id().unwrap_or_default().to_string();

        if merged.is_empty() {
            for (field, value) in child.iter() {
                if field == "id" || field == "fullrecord" {
                    continue;
                }
                merged.insert(field.clone(), value.clone());
            }
            merged.insert("local_ids_str_mv", json!([child_id]));
            return;
        }

        for (field, value) in child.iter() {
            if field == "id" || field == "fullrecord" {
                continue;
            }
            if field == "allfields" || self.is_multiplicity(field) {
                append_values(merged, field, value);
            } else if CHECKED_FIELDS.contains(&field.as_str()) {
                merged.insert_if_absent(field, value.clone());
            }
            // Any other field is taken from the first child only.
        }

        merged.append("local_ids_str_mv", child_id);
    }

    /// Group-end normalization: case-insensitive dedup of every
    /// multiplicity field and of `allfields`.
    pub fn finalize(&self, merged: &mut IndexDocument) {
        let fields: Vec<String> = merged.field_names().cloned().collect();
        for field in fields {
            if field == "allfields" || self.is_multiplicity(&field) {
                merged.ensure_list(&field);
                merged.dedup_list_ci(&field);
            }
        }
    }
}

impl Default for MergeEngine {
    fn default() -> Self {
        Self::with_defaults()
    }
}

/// Append a child field's elements to the merged field, promoting the
/// merged value to a list first.
fn append_values(merged: &mut IndexDocument, field: &str, value: &Value) {
    merged.ensure_list(field);
    match value {
        Value::Array(items) => {
            for item in items {
                merged.append(field, item.clone());
            }
        }
        other => merged.append(field, other.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn child(id: &str, fields: Value) -> IndexDocument {
        let mut doc = IndexDocument::from_value(fields);
        doc.insert("id", id);
        doc
    }

    #[test]
    fn test_first_child_seeds_without_id_and_fullrecord() {
        let engine = MergeEngine::with_defaults();
        let mut merged = IndexDocument::new();
        engine.merge(
            &mut merged,
            &child("a", json!({"title": "T", "fullrecord": "<record/>"})),
        );

        assert!(!merged.contains("id"));
        assert!(!merged.contains("fullrecord"));
        assert_eq!(merged.get_str("title"), Some("T"));
        assert_eq!(merged.get("local_ids_str_mv"), Some(&json!(["a"])));
    }

    #[test]
    fn test_merge_checked_fields_first_writer_wins() {
        let engine = MergeEngine::with_defaults();
        let mut merged = IndexDocument::new();
        engine.merge(&mut merged, &child("a", json!({"title": "T", "author": "A"})));
        engine.merge(&mut merged, &child("b", json!({"title": "T2", "author": "A2"})));

        assert_eq!(merged.get_str("title"), Some("T"));
        assert_eq!(merged.get_str("author"), Some("A"));
    }

    #[test]
    fn test_checked_field_filled_by_later_child_when_first_lacks_it() {
        let engine = MergeEngine::with_defaults();
        let mut merged = IndexDocument::new();
        engine.merge(&mut merged, &child("a", json!({"topic": ["t1"]})));
        engine.merge(&mut merged, &child("b", json!({"title": "T2"})));

        assert_eq!(merged.get_str("title"), Some("T2"));
    }

    #[test]
    fn test_multiplicity_fields_union_in_first_appearance_order() {
        let engine = MergeEngine::with_defaults();
        let mut merged = IndexDocument::new();
        engine.merge(&mut merged, &child("a", json!({"topic": ["t1"]})));
        engine.merge(&mut merged, &child("b", json!({"topic": ["t1", "t2"]})));
        engine.finalize(&mut merged);

        assert_eq!(merged.get("topic"), Some(&json!(["t1", "t2"])));
        assert_eq!(merged.get("local_ids_str_mv"), Some(&json!(["a", "b"])));
    }

    #[test]
    fn test_mv_suffix_implies_multiplicity() {
        let engine = MergeEngine::new(Vec::new());
        let mut merged = IndexDocument::new();
        engine.merge(&mut merged, &child("a", json!({"callnumber_str_mv": ["x"]})));
        engine.merge(&mut merged, &child("b", json!({"callnumber_str_mv": ["y"]})));
        engine.finalize(&mut merged);

        assert_eq!(merged.get("callnumber_str_mv"), Some(&json!(["x", "y"])));
    }

    #[test]
    fn test_other_fields_ignored_after_first_child() {
        let engine = MergeEngine::with_defaults();
        let mut merged = IndexDocument::new();
        engine.merge(&mut merged, &child("a", json!({"format": ["Book"]})));
        engine.merge(&mut merged, &child("b", json!({"format": ["Journal"]})));

        assert_eq!(merged.get("format"), Some(&json!(["Book"])));
    }

    #[test]
    fn test_allfields_appended_and_deduped_case_insensitively() {
        let engine = MergeEngine::with_defaults();
        let mut merged = IndexDocument::new();
        engine.merge(&mut merged, &child("a", json!({"allfields": ["T", "x"]})));
        engine.merge(&mut merged, &child("b", json!({"allfields": ["t", "y"]})));
        engine.finalize(&mut merged);

        assert_eq!(merged.get("allfields"), Some(&json!(["T", "x", "y"])));
    }
}
