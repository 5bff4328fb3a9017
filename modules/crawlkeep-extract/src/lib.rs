use std::collections::{HashMap, HashSet};
use std::sync::OnceLock;

use chrono::{DateTime, Utc};
use crawlkeep_common::{node_key, types_of, JsonLd};
use scraper::{Html, Selector};
use serde_json::{json, Map, Value};

/// Everything a single page's HTML contributed: the JSON records to
/// append to `json/<site>.json`, the newly-seen JSON-LD keys to persist,
/// and the type counts to fold into `status.json_stats`.
#[derive(Debug, Default)]
pub struct ExtractionOutcome {
    pub records: Vec<Value>,
    pub new_keys: Vec<String>,
    pub type_counts: HashMap<String, u64>,
}

fn ld_json_selector() -> &'static Selector {
    static SEL: OnceLock<Selector> = OnceLock::new();
    SEL.get_or_init(|| Selector::parse(r#"script[type="application/ld+json"]"#).unwrap())
}

/// Extract (or, failing that, synthesize) structured records from a
/// page's HTML body. `seen_keys` is the site's current dedup set; the
/// caller is responsible for persisting `new_keys` alongside it.
pub fn extract(html: &str, url: &str, timestamp: DateTime<Utc>, seen_keys: &HashSet<String>) -> ExtractionOutcome {
    let document = Html::parse_document(html);
    let mut outcome = ExtractionOutcome::default();
    let mut seen_in_page: HashSet<String> = HashSet::new();
    let mut any_block_parsed = false;

    for script in document.select(ld_json_selector()) {
        let raw: String = script.text().collect();
        let Some(parsed) = JsonLd::parse(raw.trim()) else {
            continue;
        };
        any_block_parsed = true;
        extract_block(parsed, url, timestamp, seen_keys, &mut seen_in_page, &mut outcome);
    }

    if !any_block_parsed {
        outcome.records.push(synthesize(&document, url, timestamp));
        let ty = outcome.records.last().and_then(|r| r.get("@type")).and_then(Value::as_str).unwrap_or("WebPage");
        *outcome.type_counts.entry(ty.to_string()).or_insert(0) += 1;
    }

    outcome
}

fn is_new(key: &str, seen_keys: &HashSet<String>, seen_in_page: &HashSet<String>) -> bool {
    !seen_keys.contains(key) && !seen_in_page.contains(key)
}

fn count_types(node: &Value, outcome: &mut ExtractionOutcome) {
    for ty in types_of(node) {
        *outcome.type_counts.entry(ty).or_insert(0) += 1;
    }
}

fn extract_block(
    parsed: JsonLd,
    url: &str,
    timestamp: DateTime<Utc>,
    seen_keys: &HashSet<String>,
    seen_in_page: &mut HashSet<String>,
    outcome: &mut ExtractionOutcome,
) {
    match parsed {
        JsonLd::Array(items) => {
            let mut new_elements = Vec::new();
            for item in items {
                let key = node_key(&item);
                let fresh = key
                    .as_deref()
                    .map(|k| is_new(k, seen_keys, seen_in_page))
                    .unwrap_or(true);
                if !fresh {
                    continue;
                }
                if let Some(k) = key {
                    seen_in_page.insert(k.clone());
                    outcome.new_keys.push(k);
                }
                count_types(&item, outcome);
                new_elements.push(item);
            }
            match new_elements.len() {
                0 => {}
                1 => {
                    let element = new_elements.into_iter().next().unwrap();
                    outcome.records.push(flatten(element, url, timestamp));
                }
                _ => {
                    outcome.records.push(json!({
                        "url": url,
                        "timestamp": timestamp,
                        "items": new_elements,
                    }));
                }
            }
        }
        JsonLd::Graph(entries) => {
            for entry in entries {
                let key = node_key(&entry);
                let emit = match &key {
                    None => true,
                    Some(k) => is_new(k, seen_keys, seen_in_page),
                };
                if !emit {
                    continue;
                }
                if let Some(k) = key {
                    seen_in_page.insert(k.clone());
                    outcome.new_keys.push(k);
                }
                count_types(&entry, outcome);
                outcome.records.push(flatten(entry, url, timestamp));
            }
        }
        JsonLd::Single(node) => {
            count_types(&node, outcome);
            outcome.records.push(json!({
                "schema": node,
                "url": url,
                "timestamp": timestamp,
            }));
        }
    }
}

/// Flatten `{url, timestamp, ...node}` — node's own `url`/`timestamp`
/// fields (if any) are shadowed by the page's.
fn flatten(node: Value, url: &str, timestamp: DateTime<Utc>) -> Value {
    let mut map = match node {
        Value::Object(map) => map,
        other => {
            let mut m = Map::new();
            m.insert("schema".to_string(), other);
            m
        }
    };
    map.insert("url".to_string(), json!(url));
    map.insert("timestamp".to_string(), json!(timestamp));
    Value::Object(map)
}

fn meta_content(document: &Html, selector: &str) -> Option<String> {
    let sel = Selector::parse(selector).ok()?;
    document
        .select(&sel)
        .next()
        .and_then(|el| el.value().attr("content"))
        .map(str::to_string)
}

/// Build a JSON-LD-like record from `<title>`, description meta, and
/// OpenGraph/article tags, when a page carries no JSON-LD at all.
fn synthesize(document: &Html, url: &str, timestamp: DateTime<Utc>) -> Value {
    let title_sel = Selector::parse("title").unwrap();
    let title = document
        .select(&title_sel)
        .next()
        .map(|el| el.text().collect::<String>())
        .filter(|s| !s.trim().is_empty());

    let description = meta_content(document, r#"meta[name="description"]"#)
        .or_else(|| meta_content(document, r#"meta[property="og:description"]"#));
    let og_title = meta_content(document, r#"meta[property="og:title"]"#);
    let headline = og_title.or(title).unwrap_or_default();

    let image_url = meta_content(document, r#"meta[property="og:image"]"#);
    let image_width = meta_content(document, r#"meta[property="og:image:width"]"#);
    let image_height = meta_content(document, r#"meta[property="og:image:height"]"#);

    let published = meta_content(document, r#"meta[property="article:published_time"]"#);
    let modified = meta_content(document, r#"meta[property="article:modified_time"]"#);

    let author_name = meta_content(document, r#"meta[name="author"]"#);
    let site_name = meta_content(document, r#"meta[property="og:site_name"]"#);
    let logo_url = meta_content(document, r#"meta[property="og:logo"]"#);

    let ty = if published.is_some() { "BlogPosting" } else { "WebPage" };

    let mut record = Map::new();
    record.insert("@context".into(), json!("https://schema.org"));
    record.insert("@type".into(), json!(ty));
    record.insert("headline".into(), json!(headline));
    if let Some(description) = description {
        record.insert("description".into(), json!(description));
    }
    if let Some(image_url) = image_url {
        let mut image = Map::new();
        image.insert("@type".into(), json!("ImageObject"));
        image.insert("url".into(), json!(image_url));
        if let Some(w) = image_width.as_ref().and_then(|s| s.parse::<i64>().ok()) {
            image.insert("width".into(), json!(w));
        }
        if let Some(h) = image_height.as_ref().and_then(|s| s.parse::<i64>().ok()) {
            image.insert("height".into(), json!(h));
        }
        record.insert("image".into(), Value::Object(image));
    }
    if let Some(published) = published {
        record.insert("datePublished".into(), json!(published));
    }
    if let Some(modified) = modified {
        record.insert("dateModified".into(), json!(modified));
    }
    if let Some(author_name) = author_name {
        record.insert(
            "author".into(),
            json!({"@type": "Person", "name": author_name}),
        );
    }
    if let Some(site_name) = site_name {
        let mut publisher = Map::new();
        publisher.insert("@type".into(), json!("Organization"));
        publisher.insert("name".into(), json!(site_name));
        if let Some(logo_url) = logo_url {
            publisher.insert(
                "logo".into(),
                json!({"@type": "ImageObject", "url": logo_url}),
            );
        }
        record.insert("publisher".into(), Value::Object(publisher));
    }
    record.insert(
        "mainEntityOfPage".into(),
        json!({"@type": "WebPage", "@id": url}),
    );
    record.insert("url".into(), json!(url));
    record.insert("timestamp".into(), json!(timestamp));

    Value::Object(record)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn now() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2026-01-01T00:00:00Z").unwrap().with_timezone(&Utc)
    }

    #[test]
    fn extracts_single_article() {
        let html = r#"<html><head><script type="application/ld+json">
            {"@type":"Article","@id":"a1","headline":"H"}
        </script></head></html>"#;
        let outcome = extract(html, "https://x/a", now(), &HashSet::new());
        assert_eq!(outcome.records.len(), 1);
        assert_eq!(outcome.new_keys, vec!["a1".to_string()]);
        assert_eq!(outcome.type_counts.get("Article"), Some(&1));
        assert_eq!(outcome.records[0]["headline"], json!("H"));
    }

    #[test]
    fn array_with_two_new_elements_wraps_in_items() {
        let html = r#"<html><head><script type="application/ld+json">
            [{"@id":"a1","@type":"Article"},{"@id":"a2","@type":"Article"}]
        </script></head></html>"#;
        let outcome = extract(html, "https://x/a", now(), &HashSet::new());
        assert_eq!(outcome.records.len(), 1);
        assert!(outcome.records[0].get("items").is_some());
        assert_eq!(outcome.type_counts.get("Article"), Some(&2));
    }

    #[test]
    fn array_dedups_against_seen_keys() {
        let mut seen = HashSet::new();
        seen.insert("a1".to_string());
        let html = r#"<html><head><script type="application/ld+json">
            [{"@id":"a1","@type":"Article"},{"@id":"a2","@type":"Article"}]
        </script></head></html>"#;
        let outcome = extract(html, "https://x/a", now(), &seen);
        // only a2 is new, single element flattens instead of wrapping
        assert_eq!(outcome.records.len(), 1);
        assert!(outcome.records[0].get("items").is_none());
        assert_eq!(outcome.new_keys, vec!["a2".to_string()]);
    }

    #[test]
    fn graph_shape_emits_one_record_per_entry() {
        let html = r#"<html><head><script type="application/ld+json">
            {"@context":"https://schema.org","@graph":[
                {"@id":"g1","@type":"Organization"},
                {"@id":"g2","@type":"WebSite"}
            ]}
        </script></head></html>"#;
        let outcome = extract(html, "https://x/a", now(), &HashSet::new());
        assert_eq!(outcome.records.len(), 2);
        assert_eq!(outcome.new_keys.len(), 2);
    }

    #[test]
    fn plain_object_is_wrapped_with_schema() {
        let html = r#"<html><head><script type="application/ld+json">
            {"@type":"WebPage","name":"Home"}
        </script></head></html>"#;
        let outcome = extract(html, "https://x/a", now(), &HashSet::new());
        assert_eq!(outcome.records.len(), 1);
        assert_eq!(outcome.records[0]["schema"]["name"], json!("Home"));
        assert_eq!(outcome.records[0]["url"], json!("https://x/a"));
    }

    #[test]
    fn malformed_json_block_is_skipped_and_triggers_synthesis() {
        let html = r#"<html><head>
            <title>My Page</title>
            <meta name="description" content="A description">
            <script type="application/ld+json">not json at all</script>
        </head></html>"#;
        let outcome = extract(html, "https://x/a", now(), &HashSet::new());
        assert_eq!(outcome.records.len(), 1);
        assert_eq!(outcome.records[0]["@type"], json!("WebPage"));
        assert_eq!(outcome.records[0]["headline"], json!("My Page"));
    }

    #[test]
    fn synthesis_picks_blogposting_when_published_time_present() {
        let html = r#"<html><head>
            <title>My Post</title>
            <meta property="article:published_time" content="2026-01-01T00:00:00Z">
        </head></html>"#;
        let outcome = extract(html, "https://x/a", now(), &HashSet::new());
        assert_eq!(outcome.records[0]["@type"], json!("BlogPosting"));
        assert_eq!(outcome.records[0]["datePublished"], json!("2026-01-01T00:00:00Z"));
    }

    #[test]
    fn synthesis_carries_context_and_main_entity() {
        let html = r#"<html><head><title>T</title></head></html>"#;
        let outcome = extract(html, "https://x/a", now(), &HashSet::new());
        assert_eq!(outcome.records[0]["@context"], json!("https://schema.org"));
        assert_eq!(outcome.records[0]["mainEntityOfPage"]["@id"], json!("https://x/a"));
    }

    #[test]
    fn array_type_as_list_counts_each_type() {
        let html = r#"<html><head><script type="application/ld+json">
            [{"@id":"a1","@type":["Article","BlogPosting"]}]
        </script></head></html>"#;
        let outcome = extract(html, "https://x/a", now(), &HashSet::new());
        assert_eq!(outcome.type_counts.get("Article"), Some(&1));
        assert_eq!(outcome.type_counts.get("BlogPosting"), Some(&1));
    }
}
