use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::Crawler;

/// One unit of work: a site and a batch of embedding records not yet
/// uploaded to the external vector database.
pub type DbJob = (String, Vec<Value>);

const RECV_TIMEOUT: Duration = Duration::from_secs(5);

/// The single cooperative database worker. The vector database is a
/// single-writer resource — exactly one of these runs — so batches are
/// processed strictly sequentially, keeping at most one upload in
/// flight at a time.
pub async fn run(mut jobs: mpsc::Receiver<DbJob>, crawler: Arc<Crawler>, cancel: CancellationToken) {
    loop {
        let job = tokio::select! {
            _ = cancel.cancelled() => break,
            recv = tokio::time::timeout(RECV_TIMEOUT, jobs.recv()) => match recv {
                Ok(Some(job)) => job,
                Ok(None) => break,
                Err(_) => continue,
            },
        };

        let (site, batch) = job;
        if let Err(e) = process_batch(&crawler, &site, &batch).await {
            warn!(site, error = %e, "database batch failed, will retry on next watcher tick");
        }
    }
    info!("database worker shut down");
}

async fn process_batch(crawler: &Crawler, site: &str, batch: &[Value]) -> anyhow::Result<()> {
    let documents: Vec<Value> = batch.iter().map(|r| crawlkeep_vectordb::to_document(r, site)).collect();

    crawler
        .vectordb
        .upload_documents(documents)
        .await
        .map_err(|e| anyhow::anyhow!(e.to_string()))?;

    let keys: Vec<String> = batch
        .iter()
        .filter_map(|r| r.get("key").and_then(Value::as_str).map(String::from))
        .collect();

    if let Err(e) = crawler.fga.add_doc_permissions("*", &keys, site).await {
        error!(site, error = %e, "fga add_doc_permissions failed, keys still marked processed");
    }

    crawler.store.append_processed_keys(site, &keys).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::test_crawler;
    use serde_json::json;

    #[tokio::test]
    async fn process_batch_records_uploaded_keys_as_processed() {
        let (crawler, _dir) = test_crawler().await;
        let site = "site";
        let batch = vec![json!({
            "key": "https://x/a",
            "embedding": [0.1, 0.2],
            "timestamp": "t",
            "metadata": {"@type": "Article", "name": "A"},
            "schema_json": {"@type": "Article"},
        })];

        process_batch(&crawler, site, &batch).await.unwrap();

        let processed = crawler.store.read_processed_keys(site).await.unwrap();
        assert!(processed.contains("https://x/a"));
    }

    #[tokio::test]
    async fn process_batch_handles_multiple_records_in_one_upload() {
        let (crawler, _dir) = test_crawler().await;
        let site = "site";
        let batch = vec![
            json!({"key": "https://x/a", "embedding": [0.1], "metadata": {}}),
            json!({"key": "https://x/b", "embedding": [0.2], "metadata": {}}),
        ];

        process_batch(&crawler, site, &batch).await.unwrap();

        let processed = crawler.store.read_processed_keys(site).await.unwrap();
        assert!(processed.contains("https://x/a"));
        assert!(processed.contains("https://x/b"));
    }
}
