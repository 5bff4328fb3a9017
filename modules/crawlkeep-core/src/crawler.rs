use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crawlkeep_common::{is_valid_site_name, site_name_from_url, CrawlerConfig, SiteStatus};
use crawlkeep_embed::EmbedJob;
use crawlkeep_embed::EmbeddingProvider;
use crawlkeep_fga::Fga;
use crawlkeep_store::Store;
use crawlkeep_vectordb::VectorDb;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::db_worker::DbJob;
use crate::error::CoreError;
use crate::{db_watcher, db_worker, fetch, maintenance, reconciler, sitemap_stage};
use crate::{domain_gate::DomainGate, queue::SiteQueues};

/// The dependency container every worker and every control-surface
/// handler shares: one `Store`, one HTTP client, the in-memory
/// scheduling state, and the three external collaborators. Always held
/// behind `Arc` so workers and the API router can each clone a handle.
pub struct Crawler {
    pub store: Arc<Store>,
    pub http: reqwest::Client,
    pub config: CrawlerConfig,
    pub queues: SiteQueues,
    pub domain_gate: DomainGate,
    pub embedding_provider: Arc<dyn EmbeddingProvider>,
    pub vectordb: Arc<dyn VectorDb>,
    pub fga: Arc<dyn Fga>,
    pub(crate) sitemap_pending: Mutex<HashSet<String>>,
    embed_jobs: mpsc::Sender<EmbedJob>,
    db_jobs: mpsc::Sender<DbJob>,
    embed_jobs_rx: Mutex<Option<mpsc::Receiver<EmbedJob>>>,
    db_jobs_rx: Mutex<Option<mpsc::Receiver<DbJob>>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RegisterOutcome {
    pub site_name: String,
    pub already_existed: bool,
    pub processing: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusView {
    pub site_name: String,
    #[serde(flatten)]
    pub status: SiteStatus,
    pub recent: Vec<Value>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SiteSummary {
    pub name: String,
    pub total_urls: u64,
    pub crawled_urls: u64,
    pub paused: bool,
    pub errors: HashMap<String, u64>,
    pub json_object_count: u64,
}

impl Crawler {
    pub fn new(
        config: CrawlerConfig,
        store: Arc<Store>,
        http: reqwest::Client,
        embedding_provider: Arc<dyn EmbeddingProvider>,
        vectordb: Arc<dyn VectorDb>,
        fga: Arc<dyn Fga>,
    ) -> Arc<Self> {
        let (embed_jobs, embed_jobs_rx) = mpsc::channel(64);
        let (db_jobs, db_jobs_rx) = mpsc::channel(64);
        Arc::new(Self {
            store,
            http,
            config,
            queues: SiteQueues::new(),
            domain_gate: DomainGate::new(),
            embedding_provider,
            vectordb,
            fga,
            sitemap_pending: Mutex::new(HashSet::new()),
            embed_jobs,
            db_jobs,
            embed_jobs_rx: Mutex::new(Some(embed_jobs_rx)),
            db_jobs_rx: Mutex::new(Some(db_jobs_rx)),
        })
    }

    pub(crate) async fn sitemap_pending_snapshot(&self) -> HashSet<String> {
        self.sitemap_pending.lock().await.clone()
    }

    async fn begin_registration(self: &Arc<Self>, site_name: String, seed_url: String, filter: Option<String>) {
        let status = SiteStatus::new(seed_url.clone());
        if let Err(e) = self.store.write_status(&site_name, &status).await {
            warn!(site = %site_name, error = %e, "failed to write initial status");
            return;
        }
        self.sitemap_pending.lock().await.insert(site_name.clone());
        let crawler = self.clone();
        tokio::spawn(sitemap_stage::run(crawler, site_name, seed_url, filter));
    }

    /// Register a new site from a seed URL, deriving the site name from
    /// the host unless one is supplied. Idempotent: re-registering the
    /// same `site_name` reports `already_existed=true` and does not
    /// touch any on-disk artifact (P4).
    pub async fn register_site(
        self: &Arc<Self>,
        seed_url: String,
        filter: Option<String>,
        site_name: Option<String>,
    ) -> Result<RegisterOutcome, CoreError> {
        let site_name = match site_name {
            Some(name) => {
                if !is_valid_site_name(&name) {
                    return Err(CoreError::InvalidSiteName(name));
                }
                name
            }
            None => site_name_from_url(&seed_url),
        };

        if self.store.site_exists(&site_name).await {
            return Ok(RegisterOutcome {
                site_name,
                already_existed: true,
                processing: false,
            });
        }

        self.begin_registration(site_name.clone(), seed_url, filter).await;
        Ok(RegisterOutcome {
            site_name,
            already_existed: false,
            processing: true,
        })
    }

    pub async fn toggle_pause(&self, site: &str) -> Result<bool, CoreError> {
        if !self.store.site_exists(site).await {
            return Err(CoreError::SiteNotFound(site.to_string()));
        }
        let status = self.store.update_status(site, |s| s.paused = !s.paused).await?;
        Ok(status.paused)
    }

    /// Full deletion: mark the site deleted in memory so in-flight
    /// workers drop its queued URLs, call the external collaborators,
    /// then remove every on-disk artifact.
    pub async fn delete_site(&self, site: &str) -> Result<(), CoreError> {
        if !self.store.site_exists(site).await {
            return Err(CoreError::SiteNotFound(site.to_string()));
        }
        self.queues.mark_deleted(site).await;
        self.sitemap_pending.lock().await.remove(site);

        if let Err(e) = self.vectordb.delete_documents_by_site(site).await {
            warn!(site, error = %e, "vector database site deletion failed");
        }
        if let Err(e) = self.fga.delete_site(site).await {
            warn!(site, error = %e, "FGA site deletion failed");
        }

        self.store.delete_site(site).await?;
        Ok(())
    }

    /// Delete then re-register against the same seed URL, preserving
    /// `original_url` (scenario 6: equivalent to a first-time
    /// registration against the same sitemap).
    pub async fn restart_crawl(self: &Arc<Self>, site: &str) -> Result<(), CoreError> {
        let status = self.store.read_status(site).await?;
        let original_url = status
            .original_url
            .clone()
            .ok_or_else(|| CoreError::SiteNotFound(site.to_string()))?;

        self.delete_site(site).await?;
        self.begin_registration(site.to_string(), original_url, None).await;
        Ok(())
    }

    pub async fn status(&self, site: &str) -> Result<StatusView, CoreError> {
        if !self.store.site_exists(site).await {
            return Err(CoreError::SiteNotFound(site.to_string()));
        }
        let status = self.store.read_status(site).await?;
        let mut records = self.store.read_json(site).await?;
        let split_at = records.len().saturating_sub(5);
        let recent: Vec<Value> = records.split_off(split_at).into_iter().rev().collect();
        Ok(StatusView {
            site_name: site.to_string(),
            status,
            recent,
        })
    }

    pub async fn list_sites(&self) -> Result<Vec<SiteSummary>, CoreError> {
        let mut out = Vec::new();
        for site in self.store.list_sites().await? {
            let status = self.store.read_status(&site).await?;
            out.push(SiteSummary {
                name: site,
                total_urls: status.total_urls,
                crawled_urls: status.crawled_urls,
                paused: status.paused,
                errors: status.errors,
                json_object_count: status.json_stats.total_objects,
            });
        }
        Ok(out)
    }

    /// Spawn the full worker pipeline: the fetch pool, the embedding and
    /// database watcher/worker pairs, the reconciler, and the periodic
    /// maintenance pass. Returns a `JoinSet` the caller awaits during
    /// shutdown after cancelling `cancel`.
    pub fn spawn_pipeline(self: &Arc<Self>, cancel: CancellationToken) -> JoinSet<()> {
        let mut tasks = JoinSet::new();

        for worker_id in 0..self.config.max_concurrent_fetchers {
            let crawler = self.clone();
            let cancel = cancel.clone();
            tasks.spawn(async move { fetch::run(crawler, worker_id, cancel).await });
        }

        let embed_jobs_rx = self
            .embed_jobs_rx
            .try_lock()
            .ok()
            .and_then(|mut guard| guard.take())
            .expect("pipeline spawned more than once");
        let db_jobs_rx = self
            .db_jobs_rx
            .try_lock()
            .ok()
            .and_then(|mut guard| guard.take())
            .expect("pipeline spawned more than once");

        {
            let store = self.store.clone();
            let provider = self.embedding_provider.clone();
            let cancel = cancel.clone();
            tasks.spawn(async move { crawlkeep_embed::run_worker(embed_jobs_rx, store, provider, cancel).await });
        }
        {
            let store = self.store.clone();
            let jobs = self.embed_jobs.clone();
            let period = self.config.json_watcher_period;
            let batch_size = self.config.embedding_batch_size;
            let cancel = cancel.clone();
            tasks.spawn(async move { crawlkeep_embed::run_watcher(store, jobs, period, batch_size, cancel).await });
        }

        {
            let crawler = self.clone();
            let cancel = cancel.clone();
            tasks.spawn(async move { db_worker::run(db_jobs_rx, crawler, cancel).await });
        }
        {
            let store = self.store.clone();
            let jobs = self.db_jobs.clone();
            let period = self.config.json_watcher_period;
            let batch_size = self.config.db_batch_size;
            let cancel = cancel.clone();
            tasks.spawn(async move { db_watcher::run(store, jobs, period, batch_size, cancel).await });
        }

        {
            let crawler = self.clone();
            let period = self.config.url_watcher_period;
            let cancel = cancel.clone();
            tasks.spawn(async move { reconciler::run(crawler, period, cancel).await });
        }

        {
            let crawler = self.clone();
            let cancel = cancel.clone();
            tasks.spawn(async move { maintenance::run(crawler, cancel).await });
        }

        tasks
    }
}
