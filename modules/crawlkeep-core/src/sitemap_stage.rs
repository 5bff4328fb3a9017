use std::collections::HashSet;
use std::sync::Arc;

use crawlkeep_sitemap::SitemapExpander;
use tracing::{info, warn};

use crate::Crawler;

/// Runs sitemap discovery/expansion for a single newly-registered site to
/// completion, merging each batch into the URL list and the fetch queue
/// as it arrives rather than waiting for the whole walk to finish.
pub async fn run(crawler: Arc<Crawler>, site: String, seed_url: String, filter: Option<String>) {
    let expander = SitemapExpander::new(crawler.http.clone(), crawler.config.sitemap_fetch_timeout);
    let already: HashSet<String> = crawler
        .store
        .read_urls(&site)
        .await
        .unwrap_or_default()
        .into_iter()
        .collect();

    let outcome = expander.expand(&seed_url, filter.as_deref()).await;
    let seed_unreachable = outcome.batches.is_empty() && !outcome.errors.is_empty();

    for batch in outcome.batches {
        let merged = match crawler.store.merge_urls(&site, &batch).await {
            Ok(merged) => merged,
            Err(e) => {
                warn!(site, error = %e, "failed to merge sitemap batch into url list");
                continue;
            }
        };

        let fresh: Vec<String> = batch.iter().filter(|u| !already.contains(*u)).cloned().collect();
        if !fresh.is_empty() {
            crawler.queues.push_many(&site, fresh).await;
        }

        let total = merged.len() as u64;
        let _ = crawler.store.update_status(&site, |s| s.total_urls = total).await;
    }

    let _ = crawler
        .store
        .update_status(&site, |s| {
            s.sitemap_processed = true;
            s.processing = false;
            if seed_unreachable {
                s.error = Some(outcome.errors.join("; "));
            }
        })
        .await;
    crawler.sitemap_pending.lock().await.remove(&site);
    info!(site, "sitemap expansion complete");
}
