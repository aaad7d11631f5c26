//! JSON wire payloads of the backend update protocol.
//!
//! The delete batch deliberately repeats the `delete` key; the backend's
//! update format accepts duplicate keys in one envelope, so the body is
//! assembled textually rather than through a JSON map.

/// Commit request body.
pub const COMMIT: &str = "{\"commit\":{}}";

/// Optimize request body.
pub const OPTIMIZE: &str = "{\"optimize\":{}}";

/// A delete batch for a list of document ids.
pub fn delete_ids(ids: &[String]) -> String {
    let mut body = String::from("{");
    for (index, id) in ids.iter().enumerate() {
        if index > 0 {
            body.push(',');
        }
        body.push_str("\"delete\":{\"id\":");
        body.push_str(&escape_json_string(id));
        body.push('}');
    }
    body.push('}');
    body
}

/// A delete-by-query request removing every document of a source.
pub fn delete_by_id_prefix(source_id: &str) -> String {
    format!(
        "{{\"delete\":{{\"query\":{}}}}}",
        escape_json_string(&format!("id:{source_id}.*"))
    )
}

fn escape_json_string(value: &str) -> String {
    // String serialization cannot fail.
    serde_json::to_string(value).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delete_ids_repeats_delete_key() {
        let body = delete_ids(&["a".to_string(), "b".to_string()]);
        assert_eq!(body, "{\"delete\":{\"id\":\"a\"},\"delete\":{\"id\":\"b\"}}");
    }

    #[test]
    fn test_delete_ids_escapes_quotes() {
        let body = delete_ids(&["a\"b".to_string()]);
        assert_eq!(body, "{\"delete\":{\"id\":\"a\\\"b\"}}");
    }

    #[test]
    fn test_delete_by_id_prefix() {
        assert_eq!(
            delete_by_id_prefix("s1"),
            "{\"delete\":{\"query\":\"id:s1.*\"}}"
        );
    }
}
