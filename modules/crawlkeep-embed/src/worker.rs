use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use crawlkeep_store::Store;
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::descriptor::{build_descriptor, build_metadata};
use crate::provider::EmbeddingProvider;

/// One unit of work: a site and a batch of JSON records not yet embedded.
pub type EmbedJob = (String, Vec<Value>);

const RECV_TIMEOUT: Duration = Duration::from_secs(5);

/// The single cooperative embedding worker. Consumes jobs sequentially —
/// within a batch, records are embedded one at a time to respect the
/// provider's own rate limits — and append-merges results into
/// `embeddings/<site>.json`. A failed batch is logged and abandoned
/// whole: the watcher's next tick resurrects it, since the failed
/// records' `url`s are still absent from the embeddings file.
pub async fn run(
    mut jobs: mpsc::Receiver<EmbedJob>,
    store: Arc<Store>,
    provider: Arc<dyn EmbeddingProvider>,
    cancel: CancellationToken,
) {
    loop {
        let job = tokio::select! {
            _ = cancel.cancelled() => break,
            recv = tokio::time::timeout(RECV_TIMEOUT, jobs.recv()) => match recv {
                Ok(Some(job)) => job,
                Ok(None) => break,
                Err(_) => continue,
            },
        };

        let (site, records) = job;
        match embed_batch(&records, provider.as_ref()).await {
            Ok(embedded) => {
                if let Err(e) = store.append_embeddings(&site, embedded).await {
                    error!(site, error = %e, "failed to persist embeddings batch");
                }
            }
            Err(e) => {
                warn!(site, error = %e, "embedding batch failed, will retry on next watcher tick");
            }
        }
    }
    info!("embedding worker shut down");
}

async fn embed_batch(
    records: &[Value],
    provider: &dyn EmbeddingProvider,
) -> anyhow::Result<Vec<Value>> {
    let mut out = Vec::with_capacity(records.len());
    let now = Utc::now();
    for record in records {
        let key = match crawlkeep_common::Record::new(record).url() {
            Some(url) => url.to_string(),
            None => continue,
        };
        let descriptor = build_descriptor(record);
        let embedding = provider
            .get_embedding(&descriptor)
            .await
            .map_err(|e| anyhow::anyhow!(e.to_string()))?;
        let metadata = build_metadata(record, &key);
        out.push(json!({
            "key": key,
            "embedding": embedding,
            "timestamp": now,
            "metadata": metadata,
            "schema_json": record,
        }));
    }
    Ok(out)
}

/// Recover the set of already-embedded keys for a site.
pub async fn embedded_keys(store: &Store, site: &str) -> anyhow::Result<HashSet<String>> {
    let embeddings = store.read_embeddings(site).await?;
    Ok(embeddings
        .into_iter()
        .filter_map(|e| e.get("key").and_then(Value::as_str).map(String::from))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::NoopEmbeddingProvider;

    #[tokio::test]
    async fn embed_batch_skips_keyless_records_and_sets_key_to_url() {
        let records = vec![
            json!({"url": "https://x/a", "headline": "H"}),
            json!({"no_url": true}),
        ];
        let out = embed_batch(&records, &NoopEmbeddingProvider).await.unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0]["key"], json!("https://x/a"));
        assert_eq!(out[0]["schema_json"]["headline"], json!("H"));
    }

    #[tokio::test]
    async fn embedded_keys_reads_existing_keys() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(Store::new(dir.path()).await.unwrap());
        store
            .append_embeddings("site", vec![json!({"key": "https://x/a", "embedding": []})])
            .await
            .unwrap();
        let keys = embedded_keys(&store, "site").await.unwrap();
        assert!(keys.contains("https://x/a"));
    }
}
