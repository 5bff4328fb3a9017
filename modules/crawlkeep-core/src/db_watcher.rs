use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use crawlkeep_store::Store;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::db_worker::DbJob;

/// Polls `embeddings/*.json` on an interval, enqueuing the subset of
/// each changed site's embedding records whose `key` is not yet in
/// `keys/<site>.json`.
pub async fn run(
    store: Arc<Store>,
    jobs: mpsc::Sender<DbJob>,
    period: Duration,
    batch_size: usize,
    cancel: CancellationToken,
) {
    let mut last_seen: HashMap<String, SystemTime> = HashMap::new();
    let mut interval = tokio::time::interval(period);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = interval.tick() => {
                if let Err(e) = tick(&store, &jobs, batch_size, &mut last_seen).await {
                    warn!(error = %e, "db watcher tick failed");
                }
            }
        }
    }
    info!("db watcher shut down");
}

async fn tick(
    store: &Store,
    jobs: &mpsc::Sender<DbJob>,
    batch_size: usize,
    last_seen: &mut HashMap<String, SystemTime>,
) -> anyhow::Result<()> {
    for site in store.list_sites().await? {
        let Some(mtime) = store.embeddings_mtime(&site).await else {
            continue;
        };
        let changed = last_seen.get(&site).map(|prev| *prev != mtime).unwrap_or(true);
        if !changed {
            continue;
        }
        last_seen.insert(site.clone(), mtime);

        let processed = store.read_processed_keys(&site).await?;
        let embeddings = store.read_embeddings(&site).await?;
        let pending: Vec<Value> = embeddings
            .into_iter()
            .filter(|e| {
                e.get("key")
                    .and_then(Value::as_str)
                    .map(|k| !processed.contains(k))
                    .unwrap_or(false)
            })
            .collect();

        if pending.is_empty() {
            continue;
        }

        for batch in pending.chunks(batch_size) {
            if jobs.send((site.clone(), batch.to_vec())).await.is_err() {
                return Ok(());
            }
        }
        info!(site = %site, count = pending.len(), "enqueued records for database upload");
    }
    Ok(())
}
