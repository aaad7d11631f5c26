//! Parser and transformer seams.
//!
//! Format-specific metadata parsers are external collaborators; the
//! pipeline reaches them through `RecordParser` and builds them through a
//! `ParserFactory`. `JsonParser` is the built-in passthrough parser over
//! the JSON metadata payload, used by passthrough sources and tests.

use serde_json::{Map, Value};
use thiserror::Error;

use crate::types::document::value_to_string;
use crate::types::{IndexDocument, Record};

/// Errors from metadata parsing or post-projection transformation.
#[derive(Debug, Error)]
pub enum ParserError {
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("Malformed metadata in record {id}: {reason}")]
    MalformedMetadata { id: String, reason: String },

    #[error("Transformation failed: {0}")]
    Transformation(String),
}

/// Context parameters passed to a post-projection transformation.
#[derive(Debug, Clone, Copy)]
pub struct TransformContext<'a> {
    pub source_id: &'a str,
    pub institution: &'a str,
    pub format: &'a str,
    pub id_prefix: &'a str,
}

/// Post-projection transformation of a parser's XML output into index
/// fields.
pub trait RecordTransformer: Send + Sync {
    fn transform(
        &self,
        xml: &str,
        context: &TransformContext<'_>,
    ) -> Result<IndexDocument, ParserError>;
}

/// A format-specific metadata parser for one record.
pub trait RecordParser: Send {
    /// Native map projection of the metadata.
    fn project(&self) -> Result<IndexDocument, ParserError>;

    /// XML rendition of the metadata, used for `fullrecord` and as
    /// transformation input.
    fn to_xml(&self) -> Result<String, ParserError>;

    fn title(&self) -> Option<String>;

    fn container_title(&self) -> Option<String>;

    fn container_volume(&self) -> Option<String>;

    fn container_issue(&self) -> Option<String>;

    fn container_start_page(&self) -> Option<String>;

    fn container_reference(&self) -> Option<String>;

    /// Fold component part records into this host record. Returns the
    /// number of merged components.
    fn merge_component_parts(&mut self, components: &[Record]) -> usize;
}

/// Builds a parser for a record from its format and raw payload.
pub trait ParserFactory: Send + Sync {
    fn create(&self, record: &Record) -> Result<Box<dyn RecordParser>, ParserError>;
}

/// Passthrough parser over a JSON-object metadata payload.
///
/// Every payload field becomes an index field of the same name. Merged
/// component parts contribute their titles to `contents` and their authors
/// to `author2`.
#[derive(Debug)]
pub struct JsonParser {
    record_id: String,
    fields: Map<String, Value>,
    components: Vec<Map<String, Value>>,
}

impl JsonParser {
    pub fn new(record: &Record) -> Result<Self, ParserError> {
        let fields = match &record.metadata {
            Value::Object(fields) => fields.clone(),
            other => {
                return Err(ParserError::MalformedMetadata {
                    id: record.id.clone(),
                    reason: format!("expected a JSON object payload, got {other}"),
                })
            }
        };
        Ok(Self {
            record_id: record.id.clone(),
            fields,
            components: Vec::new(),
        })
    }

    fn field_string(&self, name: &str) -> Option<String> {
        self.fields
            .get(name)
            .filter(|v| !v.is_null())
            .map(value_to_string)
            .filter(|s| !s.is_empty())
    }
}

impl RecordParser for JsonParser {
    fn project(&self) -> Result<IndexDocument, ParserError> {
        let mut doc = IndexDocument::from_value(Value::Object(self.fields.clone()));
        for component in &self.components {
            if let Some(title) = component.get("title").filter(|v| !v.is_null()) {
                doc.append("contents", title.clone());
            }
            if let Some(author) = component.get("author").filter(|v| !v.is_null()) {
                doc.append("author2", author.clone());
            }
        }
        Ok(doc)
    }

    fn to_xml(&self) -> Result<String, ParserError> {
        let mut xml = format!("<record id=\"{}\">", escape_xml(&self.record_id));
        render_fields(&mut xml, &self.fields);
        for component in &self.components {
            xml.push_str("<component>");
            render_fields(&mut xml, component);
            xml.push_str("</component>");
        }
        xml.push_str("</record>");
        Ok(xml)
    }

    fn title(&self) -> Option<String> {
        self.field_string("title")
    }

    fn container_title(&self) -> Option<String> {
        self.field_string("container_title")
    }

    fn container_volume(&self) -> Option<String> {
        self.field_string("container_volume")
    }

    fn container_issue(&self) -> Option<String> {
        self.field_string("container_issue")
    }

    fn container_start_page(&self) -> Option<String> {
        self.field_string("container_start_page")
    }

    fn container_reference(&self) -> Option<String> {
        self.field_string("container_reference")
    }

    fn merge_component_parts(&mut self, components: &[Record]) -> usize {
        let mut merged = 0;
        for component in components {
            if let Value::Object(fields) = &component.metadata {
                self.components.push(fields.clone());
                merged += 1;
            }
        }
        merged
    }
}

/// Factory producing `JsonParser` for every format.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonParserFactory;

impl ParserFactory for JsonParserFactory {
    fn create(&self, record: &Record) -> Result<Box<dyn RecordParser>, ParserError> {
        Ok(Box::new(JsonParser::new(record)?))
    }
}

fn render_fields(xml: &mut String, fields: &Map<String, Value>) {
    for (name, value) in fields {
        match value {
            Value::Array(items) => {
                for item in items {
                    render_field(xml, name, item);
                }
            }
            other => render_field(xml, name, other),
        }
    }
}

fn render_field(xml: &mut String, name: &str, value: &Value) {
    xml.push_str("<field name=\"");
    xml.push_str(&escape_xml(name));
    xml.push_str("\">");
    xml.push_str(&escape_xml(&value_to_string(value)));
    xml.push_str("</field>");
}

fn escape_xml(input: &str) -> String {
    let mut escaped = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            other => escaped.push(other),
        }
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use serde_json::json;

    fn make_record(metadata: Value) -> Record {
        Record {
            id: "s1.1".to_string(),
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
            metadata,
        }
    }

    #[test]
    fn test_projection_carries_payload_fields() {
        let record = make_record(json!({"title": "T", "topic": ["t1", "t2"]}));
        let parser = JsonParser::new(&record).unwrap();
        let doc = parser.project().unwrap();

        assert_eq!(doc.get_str("title"), Some("T"));
        assert_eq!(doc.get("topic"), Some(&json!(["t1", "t2"])));
    }

    #[test]
    fn test_non_object_payload_is_rejected() {
        let record = make_record(json!("not an object"));
        let err = JsonParser::new(&record).unwrap_err();
        assert!(matches!(err, ParserError::MalformedMetadata { .. }));
    }

    #[test]
    fn test_merged_components_contribute_contents() {
        let record = make_record(json!({"title": "Host"}));
        let mut parser = JsonParser::new(&record).unwrap();

        let part = make_record(json!({"title": "Part 1", "author": "A"}));
        let count = parser.merge_component_parts(std::slice::from_ref(&part));
        assert_eq!(count, 1);

        let doc = parser.project().unwrap();
        assert_eq!(doc.get("contents"), Some(&json!("Part 1")));
        assert_eq!(doc.get("author2"), Some(&json!("A")));
    }

    #[test]
    fn test_xml_escapes_markup() {
        let record = make_record(json!({"title": "A & <B>"}));
        let parser = JsonParser::new(&record).unwrap();
        let xml = parser.to_xml().unwrap();

        assert!(xml.contains("A &amp; &lt;B&gt;"));
        assert!(xml.starts_with("<record id=\"s1.1\">"));
    }
}
