//! Shared type definitions.

pub mod data_source;
pub mod document;
pub mod record;

pub use data_source::{
    ComponentPartsPolicy, DataSourceSettings, FieldMapping, FormatClasses, InstitutionInBuilding,
};
pub use document::IndexDocument;
pub use record::{DedupConstraint, Record, RecordFilter};
