use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::Crawler;

const PERIOD: Duration = Duration::from_secs(30);

/// Periodic housekeeping pass: reports each site's current queue depth
/// so a burst of newly-discovered URLs for one site is visible before it
/// has a chance to starve older, still-pending URLs from another — the
/// round-robin cursor and tail-only requeue already make that starvation
/// impossible, so this loop is observational rather than corrective.
pub async fn run(crawler: Arc<Crawler>, cancel: CancellationToken) {
    let mut interval = tokio::time::interval(PERIOD);
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = interval.tick() => {
                if let Ok(sites) = crawler.store.list_sites().await {
                    for site in sites {
                        let depth = crawler.queues.queue_len(&site).await;
                        if depth > 0 {
                            debug!(site, depth, "queue depth");
                        }
                    }
                }
            }
        }
    }
    info!("maintenance loop shut down");
}
