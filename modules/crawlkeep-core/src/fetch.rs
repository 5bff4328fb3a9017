use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use rand::Rng;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::domain_gate::Gate;
use crate::Crawler;

const USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0 Safari/537.36";

enum FetchOutcome {
    Success(Vec<u8>),
    TooManyRequests,
    Status(u16),
    Timeout,
    Transport,
}

async fn fetch_one(client: &reqwest::Client, url: &str, timeout: Duration) -> FetchOutcome {
    match client.get(url).header("User-Agent", USER_AGENT).timeout(timeout).send().await {
        Ok(resp) => {
            let status = resp.status();
            if status.as_u16() == 429 {
                FetchOutcome::TooManyRequests
            } else if status.is_success() {
                match resp.bytes().await {
                    Ok(body) => FetchOutcome::Success(body.to_vec()),
                    Err(_) => FetchOutcome::Transport,
                }
            } else {
                FetchOutcome::Status(status.as_u16())
            }
        }
        Err(e) if e.is_timeout() => FetchOutcome::Timeout,
        Err(_) => FetchOutcome::Transport,
    }
}

fn domain_of(url: &str) -> String {
    url::Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(str::to_string))
        .unwrap_or_else(|| url.to_string())
}

fn random_backoff() -> Duration {
    let secs: f64 = rand::thread_rng().gen_range(3.0..7.0);
    Duration::from_secs_f64(secs)
}

/// One of the fixed pool of cooperative fetch workers. Loops until
/// cancelled: asks the scheduler for a `(site, url)` pair, applies the
/// per-domain rate gate, fetches, and dispatches to extraction on 200.
pub async fn run(crawler: Arc<Crawler>, worker_id: usize, cancel: CancellationToken) {
    loop {
        if cancel.is_cancelled() {
            break;
        }

        let pending_sitemaps = crawler.sitemap_pending_snapshot().await;
        let picked = crawler.queues.next(|s| pending_sitemaps.contains(s)).await;

        let Some((site, url)) = picked else {
            tokio::time::sleep(Duration::from_secs(1)).await;
            continue;
        };

        let status = crawler.store.read_status(&site).await.unwrap_or_default();
        if status.paused {
            crawler.queues.requeue(&site, url).await;
            tokio::task::yield_now().await;
            continue;
        }

        if crawler.store.doc_exists(&site, &url).await {
            continue;
        }

        let domain = domain_of(&url);
        match crawler.domain_gate.check(&domain, crawler.config.min_delay_same_domain).await {
            Gate::InBackoff => {
                crawler.queues.requeue(&site, url).await;
                continue;
            }
            Gate::WaitThen(wait) => tokio::time::sleep(wait).await,
            Gate::Go => {}
        }

        let outcome = fetch_one(&crawler.http, &url, crawler.config.http_fetch_timeout).await;
        crawler.domain_gate.record_completion(&domain).await;

        match outcome {
            FetchOutcome::Success(body) => {
                if let Err(e) = crawler.store.write_doc(&site, &url, &body).await {
                    warn!(site, url, error = %e, "failed to write raw document");
                    continue;
                }
                if let Err(e) = crawler.run_extraction(&site, &url, &body).await {
                    warn!(site, url, error = %e, "extraction failed");
                }
                let _ = crawler.store.update_status(&site, |s| s.crawled_urls += 1).await;
            }
            FetchOutcome::TooManyRequests => {
                crawler.domain_gate.set_backoff(&domain, random_backoff()).await;
                crawler.queues.requeue(&site, url).await;
                let _ = crawler.store.update_status(&site, |s| s.record_error("429")).await;
            }
            FetchOutcome::Status(code) => {
                let _ = crawler
                    .store
                    .update_status(&site, |s| s.record_error(code.to_string()))
                    .await;
            }
            FetchOutcome::Timeout => {
                let _ = crawler.store.update_status(&site, |s| s.record_error("TIMEOUT")).await;
            }
            FetchOutcome::Transport => {
                let _ = crawler.store.update_status(&site, |s| s.record_error("ERROR")).await;
            }
        }
    }
    info!(worker_id, "fetch worker shut down");
}

impl Crawler {
    async fn run_extraction(&self, site: &str, url: &str, body: &[u8]) -> anyhow::Result<()> {
        let html = String::from_utf8_lossy(body).into_owned();
        let seen_keys = self.store.read_seen_keys(site).await?;
        let outcome = crawlkeep_extract::extract(&html, url, Utc::now(), &seen_keys);
        let total_new = outcome.records.len() as u64;
        let type_counts = outcome.type_counts.clone();
        self.store.append_json(site, outcome.records).await?;
        self.store.append_seen_keys(site, &outcome.new_keys).await?;
        self.store
            .update_status(site, |s| {
                s.json_stats.total_objects += total_new;
                for (ty, n) in &type_counts {
                    *s.json_stats.type_counts.entry(ty.clone()).or_insert(0) += n;
                }
            })
            .await?;
        Ok(())
    }
}
