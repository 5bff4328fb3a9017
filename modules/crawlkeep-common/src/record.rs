use serde_json::Value;

/// Tagged variant over the three shapes a JSON-LD `<script>` block arrives
/// in. See the module design notes: array-of-nodes, `@graph`-wrapped, or a
/// single plain object.
#[derive(Debug, Clone)]
pub enum JsonLd {
    Array(Vec<Value>),
    Graph(Vec<Value>),
    Single(Value),
}

impl JsonLd {
    /// Parse a raw JSON-LD script block body. Returns `None` on malformed
    /// JSON — callers silently skip the block, per the extraction spec.
    pub fn parse(raw: &str) -> Option<Self> {
        let value: Value = serde_json::from_str(raw).ok()?;
        Some(Self::from_value(value))
    }

    pub fn from_value(value: Value) -> Self {
        match value {
            Value::Array(items) => JsonLd::Array(items),
            Value::Object(ref map) if map.contains_key("@graph") => {
                let graph = map
                    .get("@graph")
                    .and_then(Value::as_array)
                    .cloned()
                    .unwrap_or_default();
                JsonLd::Graph(graph)
            }
            other => JsonLd::Single(other),
        }
    }
}

/// Normalize `@type` (string or array-of-string, or absent) into a list.
pub fn types_of(node: &Value) -> Vec<String> {
    match node.get("@type") {
        Some(Value::String(s)) => vec![s.clone()],
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|v| v.as_str().map(String::from))
            .collect(),
        _ => Vec::new(),
    }
}

/// The JSON-LD identifier used for dedup: `@id`, falling back to `url`.
pub fn node_key(node: &Value) -> Option<String> {
    node.get("@id")
        .and_then(Value::as_str)
        .or_else(|| node.get("url").and_then(Value::as_str))
        .map(String::from)
}

/// A stored JSON record, tolerant of both shapes a record can be written
/// in: the flattened shape `{url, timestamp, ...fields}` produced by the
/// array/graph extraction paths, and the wrapper shape
/// `{schema: {...fields}, url, timestamp}` produced for plain objects.
///
/// Every later stage (embedding descriptor, DB document transform) reads
/// fields through this one accessor rather than assuming a shape.
pub struct Record<'a>(pub &'a Value);

impl<'a> Record<'a> {
    pub fn new(value: &'a Value) -> Self {
        Self(value)
    }

    /// Look up a field, checking the flattened root first, then the
    /// nested `schema` object the wrapper shape carries.
    pub fn field(&self, name: &str) -> Option<&'a Value> {
        self.0
            .get(name)
            .or_else(|| self.0.get("schema").and_then(|s| s.get(name)))
    }

    pub fn field_str(&self, name: &str) -> Option<&'a str> {
        self.field(name).and_then(Value::as_str)
    }

    pub fn url(&self) -> Option<&'a str> {
        self.0.get("url").and_then(Value::as_str)
    }

    pub fn types(&self) -> Vec<String> {
        match self.field("@type") {
            Some(Value::String(s)) => vec![s.clone()],
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(|v| v.as_str().map(String::from))
                .collect(),
            _ => Vec::new(),
        }
    }

    /// The underlying schema.org payload, unwrapped from the `schema`
    /// wrapper if present, else the flattened record itself.
    pub fn schema(&self) -> &'a Value {
        self.0.get("schema").unwrap_or(self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_array_shape() {
        let parsed = JsonLd::parse(r#"[{"@id":"a"},{"@id":"b"}]"#).unwrap();
        assert!(matches!(parsed, JsonLd::Array(items) if items.len() == 2));
    }

    #[test]
    fn parses_graph_shape() {
        let parsed = JsonLd::parse(r#"{"@context":"https://schema.org","@graph":[{"@id":"a"}]}"#)
            .unwrap();
        assert!(matches!(parsed, JsonLd::Graph(items) if items.len() == 1));
    }

    #[test]
    fn parses_plain_object_shape() {
        let parsed = JsonLd::parse(r#"{"@type":"Article","headline":"H"}"#).unwrap();
        assert!(matches!(parsed, JsonLd::Single(_)));
    }

    #[test]
    fn malformed_json_yields_none() {
        assert!(JsonLd::parse("not json").is_none());
    }

    #[test]
    fn types_of_handles_string_and_array() {
        assert_eq!(types_of(&json!({"@type": "Article"})), vec!["Article"]);
        assert_eq!(
            types_of(&json!({"@type": ["Article", "BlogPosting"]})),
            vec!["Article", "BlogPosting"]
        );
        assert!(types_of(&json!({})).is_empty());
    }

    #[test]
    fn node_key_prefers_id_over_url() {
        assert_eq!(
            node_key(&json!({"@id": "a1", "url": "https://x/a"})),
            Some("a1".to_string())
        );
        assert_eq!(
            node_key(&json!({"url": "https://x/a"})),
            Some("https://x/a".to_string())
        );
        assert_eq!(node_key(&json!({})), None);
    }

    #[test]
    fn record_reads_through_flattened_shape() {
        let value = json!({"url": "https://x/a", "timestamp": "t", "headline": "H"});
        let record = Record::new(&value);
        assert_eq!(record.field_str("headline"), Some("H"));
        assert_eq!(record.url(), Some("https://x/a"));
    }

    #[test]
    fn record_reads_through_wrapper_shape() {
        let value = json!({
            "url": "https://x/a",
            "timestamp": "t",
            "schema": {"headline": "H", "@type": "Article"}
        });
        let record = Record::new(&value);
        assert_eq!(record.field_str("headline"), Some("H"));
        assert_eq!(record.types(), vec!["Article"]);
    }
}
