use serde_json::Value;

/// Text stored for a payload value.
///
/// Objects and arrays become compact JSON; strings are stored raw; other
/// scalars keep their JSON text (`42`, `true`).
pub fn encode(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Inverse of [`encode`], lenient: text that parses as JSON is returned
/// parsed, anything else comes back as a plain string.
///
/// A string that happened to look like JSON (`"[1]"`, `"12"`) therefore
/// reads back structured.
pub fn decode(raw: Option<&str>) -> Option<Value> {
    let raw = raw?;
    Some(serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn composites_are_stored_as_compact_json() {
        assert_eq!(encode(&json!({"a": 1})), r#"{"a":1}"#);
        assert_eq!(encode(&json!([1, "x"])), r#"[1,"x"]"#);
        assert_eq!(decode(Some(r#"{"a":1}"#)), Some(json!({"a": 1})));
    }

    #[test]
    fn scalars_survive_a_round_trip() {
        for value in [json!("plain text"), json!(7), json!(1.5), json!(false)] {
            assert_eq!(decode(Some(encode(&value).as_str())), Some(value));
        }
    }

    #[test]
    fn json_looking_strings_read_back_structured() {
        let stored = encode(&json!("[1, 2]"));
        assert_eq!(decode(Some(stored.as_str())), Some(json!([1, 2])));
        assert_eq!(decode(Some("12")), Some(json!(12)));
    }

    #[test]
    fn missing_field_decodes_to_none() {
        assert_eq!(decode(None), None);
        assert_eq!(decode(Some("")), Some(json!("")));
    }
}
