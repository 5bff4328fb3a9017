use std::collections::{HashSet, VecDeque};

use tokio::sync::Mutex;

/// Per-site FIFOs plus a round-robin cursor, and the in-memory
/// deleted-sites set active workers consult so in-flight URLs for a
/// just-deleted site are dropped rather than dispatched.
#[derive(Default)]
pub struct SiteQueues {
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    queues: Vec<(String, VecDeque<String>)>,
    cursor: usize,
    deleted: HashSet<String>,
}

impl SiteQueues {
    pub fn new() -> Self {
        Self::default()
    }

    /// Push URLs onto a site's queue tail, creating the queue if absent.
    pub async fn push_many(&self, site: &str, urls: impl IntoIterator<Item = String>) {
        let mut inner = self.inner.lock().await;
        if inner.deleted.contains(site) {
            return;
        }
        if !inner.queues.iter().any(|(s, _)| s == site) {
            inner.queues.push((site.to_string(), VecDeque::new()));
        }
        let (_, entry) = inner.queues.iter_mut().find(|(s, _)| s == site).unwrap();
        entry.extend(urls);
    }

    /// Requeue a single URL at the tail of its site's queue (paused,
    /// 429, or backoff-not-elapsed retries all go through here).
    pub async fn requeue(&self, site: &str, url: String) {
        self.push_many(site, [url]).await;
    }

    /// Advance the round-robin cursor, skipping deleted and empty
    /// queues, and pop one URL from the next eligible site. The
    /// `skip` predicate additionally excludes sites still in the
    /// sitemap phase — callers pass a closure backed by the store's
    /// status lookup.
    pub async fn next<F>(&self, mut skip: F) -> Option<(String, String)>
    where
        F: FnMut(&str) -> bool,
    {
        let mut inner = self.inner.lock().await;
        if inner.queues.is_empty() {
            return None;
        }
        let len = inner.queues.len();
        for offset in 0..len {
            let idx = (inner.cursor + offset) % len;
            let site_deleted = inner.deleted.contains(&inner.queues[idx].0);
            if site_deleted || skip(&inner.queues[idx].0) {
                continue;
            }
            if let Some(url) = inner.queues[idx].1.pop_front() {
                inner.cursor = (idx + 1) % len;
                let site = inner.queues[idx].0.clone();
                return Some((site, url));
            }
        }
        None
    }

    pub async fn mark_deleted(&self, site: &str) {
        let mut inner = self.inner.lock().await;
        inner.deleted.insert(site.to_string());
        inner.queues.retain(|(s, _)| s != site);
    }

    pub async fn is_deleted(&self, site: &str) -> bool {
        self.inner.lock().await.deleted.contains(site)
    }

    pub async fn queue_len(&self, site: &str) -> usize {
        let inner = self.inner.lock().await;
        inner
            .queues
            .iter()
            .find(|(s, _)| s == site)
            .map(|(_, q)| q.len())
            .unwrap_or(0)
    }
}
