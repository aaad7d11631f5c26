//! Projected index document.
//!
//! An `IndexDocument` is the field map sent to the search backend: field
//! name to JSON value, where multi-valued fields are JSON arrays. The type
//! carries the normalization primitives the projector and merge engine are
//! built from.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A projected, field-oriented search index document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IndexDocument {
    #[serde(flatten)]
    fields: Map<String, Value>,
}

impl IndexDocument {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a document from a JSON object. Non-object values yield an
    /// empty document.
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::Object(fields) => Self { fields },
            _ => Self::default(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn contains(&self, field: &str) -> bool {
        self.fields.contains_key(field)
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    pub fn get_str(&self, field: &str) -> Option<&str> {
        self.fields.get(field).and_then(Value::as_str)
    }

    /// The document `id` field.
    pub fn id(&self) -> Option<&str> {
        self.get_str("id")
    }

    pub fn insert(&mut self, field: impl Into<String>, value: impl Into<Value>) {
        self.fields.insert(field.into(), value.into());
    }

    /// Set a field only when it is currently absent.
    pub fn insert_if_absent(&mut self, field: &str, value: impl Into<Value>) {
        if !self.fields.contains_key(field) {
            self.fields.insert(field.to_string(), value.into());
        }
    }

    pub fn remove(&mut self, field: &str) -> Option<Value> {
        self.fields.remove(field)
    }

    pub fn get_mut(&mut self, field: &str) -> Option<&mut Value> {
        self.fields.get_mut(field)
    }

    /// Append a value to a field, promoting an existing scalar to a list.
    pub fn append(&mut self, field: &str, value: impl Into<Value>) {
        let value = value.into();
        match self.fields.get_mut(field) {
            Some(Value::Array(items)) => items.push(value),
            Some(existing) => {
                let prior = existing.take();
                *existing = Value::Array(vec![prior, value]);
            }
            None => {
                self.fields.insert(field.to_string(), value);
            }
        }
    }

    /// Wrap a scalar field value into a single-element list.
    pub fn ensure_list(&mut self, field: &str) {
        if let Some(value) = self.fields.get_mut(field) {
            if !value.is_array() {
                let prior = value.take();
                *value = Value::Array(vec![prior]);
            }
        }
    }

    /// All values of a field as strings: a scalar yields one entry, a list
    /// yields one entry per element.
    pub fn string_values(&self, field: &str) -> Vec<String> {
        match self.fields.get(field) {
            None => Vec::new(),
            Some(Value::Array(items)) => items.iter().map(value_to_string).collect(),
            Some(value) => vec![value_to_string(value)],
        }
    }

    /// Iterate over the fields in storage order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.fields.iter()
    }

    pub fn field_names(&self) -> impl Iterator<Item = &String> {
        self.fields.keys()
    }

    /// Deduplicate a list field by exact value, preserving first
    /// appearance.
    pub fn dedup_list(&mut self, field: &str) {
        if let Some(Value::Array(items)) = self.fields.get_mut(field) {
            let mut seen = Vec::with_capacity(items.len());
            items.retain(|item| {
                if seen.contains(item) {
                    false
                } else {
                    seen.push(item.clone());
                    true
                }
            });
        }
    }

    /// Deduplicate a list field case-insensitively (on the stringified
    /// value), preserving first appearance.
    pub fn dedup_list_ci(&mut self, field: &str) {
        if let Some(Value::Array(items)) = self.fields.get_mut(field) {
            let mut seen: Vec<String> = Vec::with_capacity(items.len());
            items.retain(|item| {
                let folded = value_to_string(item).to_lowercase();
                if seen.contains(&folded) {
                    false
                } else {
                    seen.push(folded);
                    true
                }
            });
        }
    }

    /// Replace every value of a hierarchical facet field by its
    /// level-prefixed rungs: `"a/b/c"` becomes
    /// `["0/a", "1/a/b", "2/a/b/c"]`.
    pub fn expand_hierarchical(&mut self, field: &str) {
        let values = match self.fields.get(field) {
            Some(Value::Array(items)) => items.iter().map(value_to_string).collect::<Vec<_>>(),
            Some(value) => vec![value_to_string(value)],
            None => return,
        };

        let mut expanded = Vec::new();
        for value in values {
            let trimmed = value.trim_end_matches('/');
            if trimmed.is_empty() {
                continue;
            }
            let parts: Vec<&str> = trimmed.split('/').collect();
            for level in 0..parts.len() {
                expanded.push(Value::String(format!(
                    "{}/{}",
                    level,
                    parts[..=level].join("/")
                )));
            }
        }
        self.fields
            .insert(field.to_string(), Value::Array(expanded));
    }

    /// Drop fields whose value is empty, retaining literal `0`, `0.0` and
    /// `"0"`. Empty elements inside lists are dropped under the same rule.
    pub fn strip_empty(&mut self) {
        let mut fields = Map::new();
        for (name, mut value) in std::mem::take(&mut self.fields) {
            if let Value::Array(items) = &mut value {
                items.retain(|item| !is_empty_value(item));
            }
            if !is_empty_value(&value) {
                fields.insert(name, value);
            }
        }
        self.fields = fields;
    }

    /// Identity-deduplicate every list field.
    pub fn dedup_all_lists(&mut self) {
        let list_fields: Vec<String> = self
            .fields
            .iter()
            .filter(|(_, v)| v.is_array())
            .map(|(k, _)| k.clone())
            .collect();
        for field in list_fields {
            self.dedup_list(&field);
        }
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.fields)
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.fields
    }
}

/// Stringify a field value: strings verbatim, lists joined by a space.
pub fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Array(items) => items
            .iter()
            .map(value_to_string)
            .collect::<Vec<_>>()
            .join(" "),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn is_empty_value(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        Value::Bool(b) => !b,
        Value::Array(items) => items.is_empty(),
        Value::Object(fields) => fields.is_empty(),
        Value::Number(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_append_promotes_scalar_to_list() {
        let mut doc = IndexDocument::new();
        doc.insert("topic", "t1");
        doc.append("topic", "t2");

        assert_eq!(doc.get("topic"), Some(&json!(["t1", "t2"])));
    }

    #[test]
    fn test_expand_hierarchical() {
        let mut doc = IndexDocument::new();
        doc.insert("category", json!(["a/b/c"]));
        doc.expand_hierarchical("category");

        assert_eq!(
            doc.get("category"),
            Some(&json!(["0/a", "1/a/b", "2/a/b/c"]))
        );
    }

    #[test]
    fn test_expand_hierarchical_multiple_values_keep_order() {
        let mut doc = IndexDocument::new();
        doc.insert("building", json!(["INST/Main/Floor1", "INST/Main/Floor2"]));
        doc.expand_hierarchical("building");

        assert_eq!(
            doc.get("building"),
            Some(&json!([
                "0/INST",
                "1/INST/Main",
                "2/INST/Main/Floor1",
                "0/INST",
                "1/INST/Main",
                "2/INST/Main/Floor2"
            ]))
        );
    }

    #[test]
    fn test_strip_empty_retains_zeroes() {
        let mut doc = IndexDocument::new();
        doc.insert("a", "");
        doc.insert("b", json!(null));
        doc.insert("c", json!([]));
        doc.insert("count", 0);
        doc.insert("weight", 0.0);
        doc.insert("code", "0");
        doc.insert("list", json!(["", "x", null]));
        doc.strip_empty();

        assert!(!doc.contains("a"));
        assert!(!doc.contains("b"));
        assert!(!doc.contains("c"));
        assert_eq!(doc.get("count"), Some(&json!(0)));
        assert_eq!(doc.get("weight"), Some(&json!(0.0)));
        assert_eq!(doc.get("code"), Some(&json!("0")));
        assert_eq!(doc.get("list"), Some(&json!(["x"])));
    }

    #[test]
    fn test_dedup_list_ci_preserves_first_appearance() {
        let mut doc = IndexDocument::new();
        doc.insert("author2", json!(["Smith", "smith", "SMITH", "Jones"]));
        doc.dedup_list_ci("author2");

        assert_eq!(doc.get("author2"), Some(&json!(["Smith", "Jones"])));
    }

    #[test]
    fn test_value_to_string_joins_lists() {
        assert_eq!(value_to_string(&json!(["a", "b"])), "a b");
        assert_eq!(value_to_string(&json!("x")), "x");
        assert_eq!(value_to_string(&json!(7)), "7");
    }
}
