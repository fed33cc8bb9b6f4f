use serde_json::Value;
use serde_json_path::JsonPath;
use tracing::debug;

use super::{ExtractedValue, evaluate};
use crate::config::Expectation;

/// Parse a response body as JSON
pub fn parse_document(body: &[u8]) -> Result<Value, String> {
    serde_json::from_slice(body).map_err(|e| format!("could not parse json: {e}"))
}

/// Resolve a JSON path selector against a parsed document.
///
/// Only the first node of the result is considered: arrays yield their length,
/// strings their value.
pub fn extract(document: &Value, selector: &str) -> Result<ExtractedValue, String> {
    let path = JsonPath::parse(selector)
        .map_err(|e| format!("could not parse json path {selector} : {e}"))?;

    let node = path
        .query(document)
        .first()
        .ok_or_else(|| format!("no result for {selector}"))?;

    Ok(match node {
        Value::Array(items) => ExtractedValue::Cardinality(items.len()),
        Value::String(text) => ExtractedValue::Text(text.clone()),
        other => {
            let kind = match other {
                Value::Null => "null",
                Value::Bool(_) => "bool",
                Value::Number(_) => "number",
                _ => "object",
            };
            debug!(selector, kind, "json path matched a value that is neither array nor string");
            ExtractedValue::Unsupported(kind)
        }
    })
}

/// Extract and evaluate in one step
pub fn check(document: &Value, selector: &str, expectation: &Expectation) -> Result<(), String> {
    let value = extract(document, selector)?;
    evaluate(&value, expectation).map_err(|info| format!("{selector}: {info}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Bound;

    fn doc(raw: &str) -> Value {
        parse_document(raw.as_bytes()).unwrap()
    }

    #[test]
    fn test_equals_string() {
        let world = doc(r#"{"hello":"world"}"#);
        assert!(check(&world, "$.hello", &Expectation::Equals("world".into())).is_ok());

        let mars = doc(r#"{"hello":"mars"}"#);
        let err = check(&mars, "$.hello", &Expectation::Equals("world".into())).unwrap_err();
        assert!(err.contains("actual: mars != expected: world"), "{err}");
    }

    #[test]
    fn test_array_cardinality() {
        let document = doc(r#"{"items":[1,2,3]}"#);
        assert!(check(&document, "$.items", &Expectation::Cardinality(Bound::Count(3))).is_ok());
        assert!(check(&document, "$.items", &Expectation::Cardinality(Bound::Min(4))).is_err());
        assert!(check(&document, "$.items", &Expectation::Cardinality(Bound::Max(3))).is_ok());
    }

    #[test]
    fn test_nested_and_indexed_selectors() {
        let document = doc(r#"{"data":{"users":[{"name":"ada"},{"name":"bob"}]}}"#);
        assert_eq!(
            extract(&document, "$.data.users[1].name").unwrap(),
            ExtractedValue::Text("bob".into())
        );
    }

    #[test]
    fn test_missing_node() {
        let document = doc(r#"{"hello":"world"}"#);
        let err = extract(&document, "$.nope").unwrap_err();
        assert_eq!(err, "no result for $.nope");
    }

    #[test]
    fn test_invalid_selector() {
        let document = doc("{}");
        assert!(extract(&document, "$[").unwrap_err().contains("could not parse json path"));
    }

    #[test]
    fn test_number_is_unsupported() {
        let document = doc(r#"{"n":4}"#);
        assert_eq!(extract(&document, "$.n").unwrap(), ExtractedValue::Unsupported("number"));
    }

    #[test]
    fn test_invalid_body() {
        assert!(parse_document(b"<html>").unwrap_err().starts_with("could not parse json"));
    }
}
