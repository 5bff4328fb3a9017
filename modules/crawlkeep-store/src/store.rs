use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use anyhow::{Context, Result};
use crawlkeep_common::SiteStatus;
use serde_json::Value;
use tracing::warn;

use crate::filename::url_to_filename;
use crate::lock::SiteLocks;

/// The sole persistence layer: on-disk, per-site artifacts under a
/// configurable root. Every method is crash-safe in the sense that a
/// reader can always observe either the old or the new whole-file
/// contents, never a partial write, by writing to a temp file and
/// renaming over the target.
pub struct Store {
    root: PathBuf,
    locks: SiteLocks,
}

impl Store {
    pub async fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        for dir in ["urls", "docs", "json", "embeddings", "keys", "status", "deleted"] {
            tokio::fs::create_dir_all(root.join(dir))
                .await
                .with_context(|| format!("creating data directory {dir}"))?;
        }
        Ok(Self {
            root,
            locks: SiteLocks::new(),
        })
    }

    fn urls_path(&self, site: &str) -> PathBuf {
        self.root.join("urls").join(format!("{site}.txt"))
    }

    fn docs_dir(&self, site: &str) -> PathBuf {
        self.root.join("docs").join(site)
    }

    fn doc_path(&self, site: &str, url: &str) -> PathBuf {
        self.docs_dir(site).join(url_to_filename(url))
    }

    fn json_path(&self, site: &str) -> PathBuf {
        self.root.join("json").join(format!("{site}.json"))
    }

    fn seen_keys_path(&self, site: &str) -> PathBuf {
        self.root.join("keys").join(format!("{site}.txt"))
    }

    fn processed_keys_path(&self, site: &str) -> PathBuf {
        self.root.join("keys").join(format!("{site}.json"))
    }

    fn embeddings_path(&self, site: &str) -> PathBuf {
        self.root.join("embeddings").join(format!("{site}.json"))
    }

    fn status_path(&self, site: &str) -> PathBuf {
        self.root.join("status").join(format!("{site}.json"))
    }

    fn deleted_path(&self, site: &str) -> PathBuf {
        self.root.join("deleted").join(format!("{site}.txt"))
    }

    // -- URL list ---------------------------------------------------------

    pub async fn read_urls(&self, site: &str) -> Result<Vec<String>> {
        read_lines(&self.urls_path(site)).await
    }

    /// Union `new_urls` into the existing list, sorted, written back
    /// whole-file. Returns the merged list.
    pub async fn merge_urls(&self, site: &str, new_urls: &[String]) -> Result<Vec<String>> {
        let _guard = self.locks.lock(site).await;
        let mut set: HashSet<String> = read_lines(&self.urls_path(site)).await?.into_iter().collect();
        set.extend(new_urls.iter().cloned());
        let mut merged: Vec<String> = set.into_iter().collect();
        merged.sort();
        write_lines(&self.urls_path(site), &merged).await?;
        Ok(merged)
    }

    pub async fn write_urls(&self, site: &str, urls: &[String]) -> Result<()> {
        let _guard = self.locks.lock(site).await;
        let mut sorted = urls.to_vec();
        sorted.sort();
        write_lines(&self.urls_path(site), &sorted).await
    }

    pub async fn urls_mtime(&self, site: &str) -> Option<SystemTime> {
        mtime(&self.urls_path(site)).await
    }

    // -- Raw documents ------------------------------------------------------

    pub async fn doc_exists(&self, site: &str, url: &str) -> bool {
        tokio::fs::try_exists(self.doc_path(site, url))
            .await
            .unwrap_or(false)
    }

    pub async fn write_doc(&self, site: &str, url: &str, body: &[u8]) -> Result<()> {
        tokio::fs::create_dir_all(self.docs_dir(site)).await?;
        atomic_write(&self.doc_path(site, url), body).await
    }

    pub async fn delete_doc(&self, site: &str, url: &str) -> Result<()> {
        let path = self.doc_path(site, url);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    // -- JSON records ---------------------------------------------------

    pub async fn read_json(&self, site: &str) -> Result<Vec<Value>> {
        read_json_array(&self.json_path(site)).await
    }

    pub async fn append_json(&self, site: &str, mut records: Vec<Value>) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }
        let _guard = self.locks.lock(site).await;
        let mut existing = read_json_array(&self.json_path(site)).await?;
        existing.append(&mut records);
        write_json_array(&self.json_path(site), &existing).await
    }

    pub async fn write_json(&self, site: &str, records: &[Value]) -> Result<()> {
        let _guard = self.locks.lock(site).await;
        write_json_array(&self.json_path(site), records).await
    }

    pub async fn json_mtime(&self, site: &str) -> Option<SystemTime> {
        mtime(&self.json_path(site)).await
    }

    // -- Seen keys (append-only, dedup) -----------------------------------

    pub async fn read_seen_keys(&self, site: &str) -> Result<HashSet<String>> {
        Ok(read_lines(&self.seen_keys_path(site)).await?.into_iter().collect())
    }

    pub async fn append_seen_keys(&self, site: &str, keys: &[String]) -> Result<()> {
        if keys.is_empty() {
            return Ok(());
        }
        let _guard = self.locks.lock(site).await;
        append_lines(&self.seen_keys_path(site), keys).await
    }

    // -- Embeddings -------------------------------------------------------

    pub async fn read_embeddings(&self, site: &str) -> Result<Vec<Value>> {
        read_json_array(&self.embeddings_path(site)).await
    }

    pub async fn append_embeddings(&self, site: &str, mut records: Vec<Value>) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }
        let mut existing = read_json_array(&self.embeddings_path(site)).await?;
        existing.append(&mut records);
        write_json_array(&self.embeddings_path(site), &existing).await
    }

    pub async fn write_embeddings(&self, site: &str, records: &[Value]) -> Result<()> {
        write_json_array(&self.embeddings_path(site), records).await
    }

    pub async fn embeddings_mtime(&self, site: &str) -> Option<SystemTime> {
        mtime(&self.embeddings_path(site)).await
    }

    // -- Processed keys -----------------------------------------------------

    pub async fn read_processed_keys(&self, site: &str) -> Result<HashSet<String>> {
        let value = read_json_array(&self.processed_keys_path(site)).await?;
        Ok(value
            .into_iter()
            .filter_map(|v| v.as_str().map(String::from))
            .collect())
    }

    pub async fn append_processed_keys(&self, site: &str, keys: &[String]) -> Result<()> {
        if keys.is_empty() {
            return Ok(());
        }
        let mut existing = self.read_processed_keys(site).await?;
        existing.extend(keys.iter().cloned());
        self.write_processed_keys(site, &existing).await
    }

    pub async fn write_processed_keys(&self, site: &str, keys: &HashSet<String>) -> Result<()> {
        let values: Vec<Value> = keys.iter().map(|k| Value::String(k.clone())).collect();
        write_json_array(&self.processed_keys_path(site), &values).await
    }

    // -- Status -----------------------------------------------------------

    pub async fn read_status(&self, site: &str) -> Result<SiteStatus> {
        let path = self.status_path(site);
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)
                .with_context(|| format!("parsing status for {site}"))?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(SiteStatus::default()),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn write_status(&self, site: &str, status: &SiteStatus) -> Result<()> {
        let _guard = self.locks.lock(site).await;
        let bytes = serde_json::to_vec_pretty(status)?;
        atomic_write(&self.status_path(site), &bytes).await
    }

    /// Read-modify-write a site's status under the per-site lock.
    pub async fn update_status<F>(&self, site: &str, f: F) -> Result<SiteStatus>
    where
        F: FnOnce(&mut SiteStatus),
    {
        let _guard = self.locks.lock(site).await;
        let mut status = match tokio::fs::read(self.status_path(site)).await {
            Ok(bytes) => serde_json::from_slice(&bytes).unwrap_or_default(),
            Err(_) => SiteStatus::default(),
        };
        f(&mut status);
        status.touch();
        let bytes = serde_json::to_vec_pretty(&status)?;
        atomic_write(&self.status_path(site), &bytes).await?;
        Ok(status)
    }

    // -- Deletion record ----------------------------------------------------

    /// Append-only audit trail of URLs the reconciler has removed,
    /// independent of `urls/<site>.txt` so a shrink can be told apart
    /// from a site that was never crawled.
    pub async fn append_deleted_urls(&self, site: &str, urls: &[String]) -> Result<()> {
        if urls.is_empty() {
            return Ok(());
        }
        let _guard = self.locks.lock(site).await;
        append_lines(&self.deleted_path(site), urls).await
    }

    // -- Site lifecycle -----------------------------------------------------

    pub async fn list_sites(&self) -> Result<Vec<String>> {
        let mut names = Vec::new();
        let mut entries = tokio::fs::read_dir(self.root.join("status")).await?;
        while let Some(entry) = entries.next_entry().await? {
            if let Some(name) = entry.path().file_stem().and_then(|s| s.to_str()) {
                if entry.path().extension().and_then(|e| e.to_str()) == Some("json") {
                    names.push(name.to_string());
                }
            }
        }
        Ok(names)
    }

    pub async fn site_exists(&self, site: &str) -> bool {
        tokio::fs::try_exists(self.status_path(site))
            .await
            .unwrap_or(false)
    }

    /// Remove every artifact owned by a site. Idempotent.
    pub async fn delete_site(&self, site: &str) -> Result<()> {
        let _guard = self.locks.lock(site).await;
        for path in [
            self.urls_path(site),
            self.json_path(site),
            self.embeddings_path(site),
            self.processed_keys_path(site),
            self.seen_keys_path(site),
            self.status_path(site),
            self.deleted_path(site),
        ] {
            remove_if_exists(&path).await?;
        }
        let docs_dir = self.docs_dir(site);
        if tokio::fs::try_exists(&docs_dir).await.unwrap_or(false) {
            tokio::fs::remove_dir_all(&docs_dir).await?;
        }
        Ok(())
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

async fn remove_if_exists(path: &Path) -> Result<()> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

async fn mtime(path: &Path) -> Option<SystemTime> {
    tokio::fs::metadata(path).await.ok()?.modified().ok()
}

async fn read_lines(path: &Path) -> Result<Vec<String>> {
    match tokio::fs::read_to_string(path).await {
        Ok(contents) => Ok(contents
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(String::from)
            .collect()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
        Err(e) => Err(e.into()),
    }
}

async fn write_lines(path: &Path, lines: &[String]) -> Result<()> {
    let mut contents = lines.join("\n");
    if !lines.is_empty() {
        contents.push('\n');
    }
    atomic_write(path, contents.as_bytes()).await
}

async fn append_lines(path: &Path, lines: &[String]) -> Result<()> {
    use tokio::io::AsyncWriteExt;
    let mut file = tokio::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await?;
    for line in lines {
        file.write_all(line.as_bytes()).await?;
        file.write_all(b"\n").await?;
    }
    Ok(())
}

async fn read_json_array(path: &Path) -> Result<Vec<Value>> {
    match tokio::fs::read(path).await {
        Ok(bytes) => {
            if bytes.is_empty() {
                return Ok(Vec::new());
            }
            match serde_json::from_slice::<Vec<Value>>(&bytes) {
                Ok(values) => Ok(values),
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "artifact is not a JSON array, treating as empty");
                    Ok(Vec::new())
                }
            }
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
        Err(e) => Err(e.into()),
    }
}

async fn write_json_array(path: &Path, values: &[Value]) -> Result<()> {
    let bytes = serde_json::to_vec_pretty(values)?;
    atomic_write(path, &bytes).await
}

/// Write via a sibling temp file then rename, so concurrent readers never
/// observe a partial write.
async fn atomic_write(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let tmp_path = path.with_extension(format!(
        "{}.tmp",
        path.extension().and_then(|e| e.to_str()).unwrap_or("")
    ));
    tokio::fs::write(&tmp_path, bytes).await?;
    tokio::fs::rename(&tmp_path, path).await?;
    Ok(())
}
