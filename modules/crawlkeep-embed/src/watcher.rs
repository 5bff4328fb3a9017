use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use crawlkeep_store::Store;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::worker::{embedded_keys, EmbedJob};

/// Polls `json/*.json` on an interval, tracking each site's modification
/// time. For every site whose JSON file changed since the last tick,
/// selects the records not yet embedded and enqueues them in batches.
pub async fn run(
    store: Arc<Store>,
    jobs: mpsc::Sender<EmbedJob>,
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
                    warn!(error = %e, "json watcher tick failed");
                }
            }
        }
    }
    info!("json watcher shut down");
}

async fn tick(
    store: &Store,
    jobs: &mpsc::Sender<EmbedJob>,
    batch_size: usize,
    last_seen: &mut HashMap<String, SystemTime>,
) -> anyhow::Result<()> {
    for site in store.list_sites().await? {
        let Some(mtime) = store.json_mtime(&site).await else {
            continue;
        };
        let changed = last_seen.get(&site).map(|prev| *prev != mtime).unwrap_or(true);
        if !changed {
            continue;
        }
        last_seen.insert(site.clone(), mtime);

        let already_embedded = embedded_keys(store, &site).await?;
        let records = store.read_json(&site).await?;
        // At most one embedding per key: when several records share a
        // `url`, keep only the most recently appended one.
        let mut seen_urls = std::collections::HashSet::new();
        let mut pending: Vec<_> = records
            .into_iter()
            .rev()
            .filter(|r| {
                let Some(u) = crawlkeep_common::Record::new(r).url() else {
                    return false;
                };
                if already_embedded.contains(u) || !seen_urls.insert(u.to_string()) {
                    return false;
                }
                true
            })
            .collect();
        pending.reverse();

        if pending.is_empty() {
            continue;
        }

        for batch in pending.chunks(batch_size) {
            if jobs.send((site.clone(), batch.to_vec())).await.is_err() {
                return Ok(());
            }
        }
        info!(site = %site, count = pending.len(), "enqueued records for embedding");
    }
    Ok(())
}
