//! # Record Indexer Shared
//!
//! Shared types for the bibliographic record search indexer: the stored
//! record shape, the projected index document, per-data-source settings,
//! mapping tables, and the parser/transformer seams that connect the
//! pipeline to the external record-format parsers.

pub mod mapping;
pub mod parser;
pub mod types;

pub use mapping::{MappingError, MappingTable};
pub use parser::{
    JsonParser, JsonParserFactory, ParserError, ParserFactory, RecordParser, RecordTransformer,
    TransformContext,
};
pub use types::{
    ComponentPartsPolicy, DataSourceSettings, DedupConstraint, FieldMapping, FormatClasses,
    IndexDocument, InstitutionInBuilding, Record, RecordFilter,
};
