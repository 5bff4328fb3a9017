use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use crawlkeep_common::Record;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::Crawler;

/// Polls `urls/*.txt` on an interval; for every site whose URL list
/// changed, propagates removals through every downstream artifact
/// before any further crawling of that site resumes.
pub async fn run(crawler: Arc<Crawler>, period: Duration, cancel: CancellationToken) {
    let mut last_seen: HashMap<String, SystemTime> = HashMap::new();
    let mut interval = tokio::time::interval(period);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = interval.tick() => {
                if let Err(e) = tick(&crawler, &mut last_seen).await {
                    warn!(error = %e, "reconciler tick failed");
                }
            }
        }
    }
    info!("reconciler shut down");
}

async fn tick(crawler: &Crawler, last_seen: &mut HashMap<String, SystemTime>) -> anyhow::Result<()> {
    for site in crawler.store.list_sites().await? {
        let Some(mtime) = crawler.store.urls_mtime(&site).await else {
            continue;
        };
        let changed = last_seen.get(&site).map(|prev| *prev != mtime).unwrap_or(true);
        if !changed {
            continue;
        }
        last_seen.insert(site.clone(), mtime);
        reconcile_site(crawler, &site).await?;
    }
    Ok(())
}

/// Diff `json/<site>.json` against the current URL list and purge every
/// downstream artifact for URLs no longer present.
pub async fn reconcile_site(crawler: &Crawler, site: &str) -> anyhow::Result<()> {
    let current: HashSet<String> = crawler.store.read_urls(site).await?.into_iter().collect();
    let json_records = crawler.store.read_json(site).await?;

    let mut stored_json_urls: HashSet<String> = HashSet::new();
    for record in &json_records {
        if let Some(url) = Record::new(record).url() {
            stored_json_urls.insert(url.to_string());
        }
    }

    let deleted: Vec<String> = stored_json_urls.difference(&current).cloned().collect();
    if deleted.is_empty() {
        return Ok(());
    }

    let deleted_set: HashSet<&str> = deleted.iter().map(String::as_str).collect();

    for url in &deleted {
        let _ = crawler.store.delete_doc(site, url).await;
    }

    let retained_json: Vec<serde_json::Value> = json_records
        .into_iter()
        .filter(|r| match Record::new(r).url() {
            Some(u) => !deleted_set.contains(u),
            None => true,
        })
        .collect();

    let mut type_counts: HashMap<String, u64> = HashMap::new();
    for record in &retained_json {
        for ty in Record::new(record).types() {
            *type_counts.entry(ty).or_insert(0) += 1;
        }
    }
    let total_objects = retained_json.len() as u64;
    crawler.store.write_json(site, &retained_json).await?;

    let embeddings = crawler.store.read_embeddings(site).await?;
    let retained_embeddings: Vec<serde_json::Value> = embeddings
        .into_iter()
        .filter(|e| match e.get("key").and_then(serde_json::Value::as_str) {
            Some(k) => !deleted_set.contains(k),
            None => true,
        })
        .collect();
    crawler.store.write_embeddings(site, &retained_embeddings).await?;

    let processed_keys = crawler.store.read_processed_keys(site).await?;
    let retained_keys: HashSet<String> = processed_keys
        .into_iter()
        .filter(|k| !deleted_set.contains(k.as_str()))
        .collect();
    crawler.store.write_processed_keys(site, &retained_keys).await?;

    crawler.store.append_deleted_urls(site, &deleted).await?;

    if let Err(e) = crawler.vectordb.delete_documents_by_urls(site, &deleted).await {
        warn!(site, error = %e, "vector database deletion failed during reconciliation");
    }
    if let Err(e) = crawler.fga.delete_urls(site, &deleted).await {
        warn!(site, error = %e, "FGA deletion failed during reconciliation");
    }

    let mut crawled = 0u64;
    for url in &current {
        if crawler.store.doc_exists(site, url).await {
            crawled += 1;
        }
    }

    crawler
        .store
        .update_status(site, |s| {
            s.total_urls = current.len() as u64;
            s.crawled_urls = crawled;
            s.json_stats.total_objects = total_objects;
            s.json_stats.type_counts = type_counts.clone();
        })
        .await?;

    info!(site, removed = deleted.len(), "reconciled site after url list shrink");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::test_crawler;
    use serde_json::json;

    #[tokio::test]
    async fn reconcile_site_purges_every_downstream_artifact_for_a_removed_url() {
        let (crawler, _dir) = test_crawler().await;
        let site = "site";

        crawler.store.write_urls(site, &["https://x/a".into(), "https://x/b".into()]).await.unwrap();
        crawler.store.write_doc(site, "https://x/a", b"<html></html>").await.unwrap();
        crawler.store.write_doc(site, "https://x/b", b"<html></html>").await.unwrap();
        crawler
            .store
            .append_json(
                site,
                vec![
                    json!({"url": "https://x/a", "timestamp": "t", "@type": "Article"}),
                    json!({"url": "https://x/b", "timestamp": "t", "@type": "Article"}),
                ],
            )
            .await
            .unwrap();
        crawler
            .store
            .append_embeddings(
                site,
                vec![
                    json!({"key": "https://x/a", "embedding": [0.1]}),
                    json!({"key": "https://x/b", "embedding": [0.2]}),
                ],
            )
            .await
            .unwrap();
        crawler
            .store
            .write_processed_keys(site, &["https://x/a".to_string(), "https://x/b".to_string()].into_iter().collect())
            .await
            .unwrap();

        // Shrink the url list: https://x/a is no longer declared.
        crawler.store.write_urls(site, &["https://x/b".into()]).await.unwrap();

        reconcile_site(&crawler, site).await.unwrap();

        assert!(!crawler.store.doc_exists(site, "https://x/a").await);
        assert!(crawler.store.doc_exists(site, "https://x/b").await);

        let json_urls: Vec<String> = crawler
            .store
            .read_json(site)
            .await
            .unwrap()
            .iter()
            .filter_map(|r| Record::new(r).url().map(str::to_string))
            .collect();
        assert_eq!(json_urls, vec!["https://x/b".to_string()]);

        let embeddings = crawler.store.read_embeddings(site).await.unwrap();
        assert_eq!(embeddings.len(), 1);
        assert_eq!(embeddings[0]["key"], json!("https://x/b"));

        let processed = crawler.store.read_processed_keys(site).await.unwrap();
        assert!(!processed.contains("https://x/a"));
        assert!(processed.contains("https://x/b"));

        let status = crawler.store.read_status(site).await.unwrap();
        assert_eq!(status.total_urls, 1);
        assert_eq!(status.json_stats.total_objects, 1);
    }

    #[tokio::test]
    async fn reconcile_site_is_a_noop_when_nothing_was_removed() {
        let (crawler, _dir) = test_crawler().await;
        let site = "site";
        crawler.store.write_urls(site, &["https://x/a".into()]).await.unwrap();
        crawler.store.append_json(site, vec![json!({"url": "https://x/a", "timestamp": "t"})]).await.unwrap();

        reconcile_site(&crawler, site).await.unwrap();

        assert_eq!(crawler.store.read_json(site).await.unwrap().len(), 1);
    }
}
