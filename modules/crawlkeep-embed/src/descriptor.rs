use crawlkeep_common::Record;
use serde_json::{Map, Value};

/// Build the short descriptor text embedded for a record: the fields a
/// nearest-neighbor search benefits from, joined one-per-line in a fixed
/// order.
pub fn build_descriptor(record: &Value) -> String {
    let r = Record::new(record);
    let mut lines = Vec::new();

    let types = r.types();
    if !types.is_empty() {
        lines.push(format!("Type: {}", types.join(", ")));
    }

    if let Some(name) = r.field_str("name") {
        lines.push(format!("Name: {name}"));
    } else if let Some(headline) = r.field_str("headline") {
        lines.push(format!("Headline: {headline}"));
    }

    if let Some(description) = r.field_str("description") {
        lines.push(format!("Description: {description}"));
    }

    if types.iter().any(|t| t.eq_ignore_ascii_case("recipe")) {
        if let Some(ingredients) = r.field("recipeIngredient").and_then(Value::as_array) {
            let list: Vec<&str> = ingredients.iter().take(10).filter_map(Value::as_str).collect();
            if !list.is_empty() {
                lines.push(format!("Ingredients: {}", list.join(", ")));
            }
        }
    }

    if types.iter().any(|t| t.contains("Article")) {
        if let Some(body) = r.field_str("articleBody") {
            let truncated: String = body.chars().take(500).collect();
            lines.push(format!("Content: {truncated}"));
        }
    }

    lines.join("\n")
}

/// Build the metadata object persisted alongside an embedding: `@type`,
/// `name` (falling back to `headline`, then the key), `url`,
/// `description`, plus any top-level primitive fields from the source.
pub fn build_metadata(record: &Value, key: &str) -> Value {
    let r = Record::new(record);
    let name = r
        .field_str("name")
        .or_else(|| r.field_str("headline"))
        .unwrap_or(key);

    let mut map = Map::new();
    map.insert("@type".to_string(), r.field("@type").cloned().unwrap_or(Value::Null));
    map.insert("name".to_string(), Value::String(name.to_string()));
    map.insert("url".to_string(), Value::String(r.url().unwrap_or(key).to_string()));
    map.insert(
        "description".to_string(),
        r.field("description").cloned().unwrap_or(Value::Null),
    );

    if let Value::Object(obj) = record {
        for (k, v) in obj {
            if matches!(v, Value::String(_) | Value::Number(_) | Value::Bool(_)) && !map.contains_key(k) {
                map.insert(k.clone(), v.clone());
            }
        }
    }

    Value::Object(map)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn descriptor_joins_available_fields_in_order() {
        let record = json!({
            "@type": "Article",
            "headline": "H",
            "description": "D",
            "articleBody": "x".repeat(600),
        });
        let descriptor = build_descriptor(&record);
        assert!(descriptor.starts_with("Type: Article\nHeadline: H\nDescription: D\nContent: "));
        let content_line = descriptor.lines().last().unwrap();
        assert_eq!(content_line.trim_start_matches("Content: ").len(), 500);
    }

    #[test]
    fn descriptor_includes_recipe_ingredients() {
        let record = json!({
            "@type": "Recipe",
            "name": "Soup",
            "recipeIngredient": (1..=12).map(|n| format!("item{n}")).collect::<Vec<_>>(),
        });
        let descriptor = build_descriptor(&record);
        let ingredients_line = descriptor.lines().find(|l| l.starts_with("Ingredients:")).unwrap();
        assert_eq!(ingredients_line.matches(',').count(), 9);
    }

    #[test]
    fn metadata_falls_back_name_then_headline_then_key() {
        let with_name = json!({"name": "N", "url": "https://x/a"});
        assert_eq!(build_metadata(&with_name, "https://x/a")["name"], json!("N"));

        let with_headline = json!({"headline": "H", "url": "https://x/a"});
        assert_eq!(build_metadata(&with_headline, "https://x/a")["name"], json!("H"));

        let bare = json!({"url": "https://x/a"});
        assert_eq!(build_metadata(&bare, "https://x/a")["name"], json!("https://x/a"));
    }

    #[test]
    fn metadata_carries_top_level_primitives() {
        let record = json!({"url": "https://x/a", "extra_flag": true, "count": 3});
        let metadata = build_metadata(&record, "https://x/a");
        assert_eq!(metadata["extra_flag"], json!(true));
        assert_eq!(metadata["count"], json!(3));
    }
}
