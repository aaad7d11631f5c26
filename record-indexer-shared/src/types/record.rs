//! Stored record types.
//!
//! `Record` is the shape of a row in the record store; `RecordFilter` is the
//! query sent to enumeration and to the dedup-group aggregation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A bibliographic record as held in the record store.
///
/// The raw metadata payload is carried opaquely as JSON; format-specific
/// parsers turn it into index fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// Record identity, prefixed with the source id (e.g. `"s1.12"`).
    pub id: String,
    /// Owning data source.
    pub source_id: String,
    /// Metadata format of the payload.
    pub format: String,
    /// OAI identifier from harvesting, when the source provides one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub oai_id: Option<String>,
    /// Stable local key that component parts use to reference this record
    /// as their host.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub linking_id: Option<String>,
    /// Set on a component part: the `linking_id` of its host record.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host_record_id: Option<String>,
    /// Deduplication group key shared by records describing the same work.
    /// Absent for singletons.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dedup_key: Option<String>,
    /// The record's own dedup anchor when it is itself the representative
    /// of a group.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
    pub date: DateTime<Utc>,
    /// Tombstone flag.
    #[serde(default)]
    pub deleted: bool,
    /// Deferred-rebuild flag; such records are excluded from normal passes.
    #[serde(default)]
    pub update_needed: bool,
    /// Raw metadata payload for the format parser.
    #[serde(default)]
    pub metadata: serde_json::Value,
}

impl Record {
    /// Whether this record is a component part (points at a host record).
    pub fn is_component_part(&self) -> bool {
        self.host_record_id.is_some()
    }

    /// The id to remove from the index when this record is deleted: the
    /// record's own dedup anchor when set, otherwise its `_id`.
    pub fn delete_key(&self) -> &str {
        self.key.as_deref().unwrap_or(&self.id)
    }
}

/// Constraint on the presence of a dedup key in a record query.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DedupConstraint {
    /// No constraint.
    #[default]
    Any,
    /// Only records carrying a dedup key.
    Present,
    /// Only records without a dedup key.
    Absent,
}

/// Filter for record enumeration and the dedup-group aggregation.
///
/// Serialization is deterministic (field order is fixed by the struct), so
/// the serialized form doubles as the content address of the auxiliary
/// dedup-group table built for the filter.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RecordFilter {
    /// Restrict to one data source.
    pub source_id: Option<String>,
    /// Incremental window: only records updated at or after this instant.
    pub updated_since: Option<DateTime<Utc>>,
    /// Target a single record by `_id`; overrides the update-pending
    /// exclusion.
    pub single_id: Option<String>,
    /// Exclude records flagged `update_needed`.
    pub exclude_update_pending: bool,
    pub dedup: DedupConstraint,
}

impl RecordFilter {
    /// Filter over every record of every source, excluding update-pending
    /// ones.
    pub fn all() -> Self {
        Self {
            exclude_update_pending: true,
            ..Self::default()
        }
    }

    pub fn with_source(mut self, source_id: impl Into<String>) -> Self {
        self.source_id = Some(source_id.into());
        self
    }

    pub fn with_updated_since(mut self, instant: DateTime<Utc>) -> Self {
        self.updated_since = Some(instant);
        self
    }

    pub fn with_single_id(mut self, id: impl Into<String>) -> Self {
        self.single_id = Some(id.into());
        self
    }

    pub fn with_dedup(mut self, dedup: DedupConstraint) -> Self {
        self.dedup = dedup;
        self
    }

    /// Canonical JSON form used as the content address of the filter.
    pub fn canonical_json(&self) -> String {
        // Serialization of this struct cannot fail: every field is a plain
        // string/instant/flag.
        serde_json::to_string(self).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn make_record(id: &str) -> Record {
        Record {
            id: id.to_string(),
            source_id: "s1".to_string(),
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

    #[test]
    fn test_delete_key_prefers_dedup_anchor() {
        let mut record = make_record("s1.1");
        assert_eq!(record.delete_key(), "s1.1");

        record.key = Some("work-key".to_string());
        assert_eq!(record.delete_key(), "work-key");
    }

    #[test]
    fn test_component_part_detection() {
        let mut record = make_record("s1.1");
        assert!(!record.is_component_part());

        record.host_record_id = Some("host1".to_string());
        assert!(record.is_component_part());
    }

    #[test]
    fn test_filter_canonical_json_is_stable() {
        let instant = Utc.with_ymd_and_hms(2023, 6, 1, 12, 0, 0).unwrap();
        let a = RecordFilter::all()
            .with_source("s1")
            .with_updated_since(instant)
            .with_dedup(DedupConstraint::Present);
        let b = RecordFilter::all()
            .with_source("s1")
            .with_updated_since(instant)
            .with_dedup(DedupConstraint::Present);

        assert_eq!(a.canonical_json(), b.canonical_json());
        assert_ne!(
            a.canonical_json(),
            RecordFilter::all().canonical_json(),
            "different filters must not share a content address"
        );
    }
}
