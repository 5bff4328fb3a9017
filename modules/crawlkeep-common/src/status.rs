use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Per-site JSON record statistics, recomputed by the reconciler and
/// updated incrementally by the extractor.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct JsonStats {
    #[serde(default)]
    pub total_objects: u64,
    #[serde(default)]
    pub type_counts: HashMap<String, u64>,
}

/// `status/<site>.json`: the single artifact touched by the scheduler,
/// the extractor, and the reconciler alike, hence guarded by the per-site
/// advisory lock the store maintains.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SiteStatus {
    #[serde(default)]
    pub total_urls: u64,
    #[serde(default)]
    pub crawled_urls: u64,
    #[serde(default)]
    pub paused: bool,
    #[serde(default)]
    pub processing: bool,
    /// Backward-compat default: sites written before this field existed
    /// are treated as not yet having completed sitemap expansion.
    #[serde(default)]
    pub sitemap_processed: bool,
    pub original_url: Option<String>,
    #[serde(default)]
    pub errors: HashMap<String, u64>,
    #[serde(default)]
    pub json_stats: JsonStats,
    #[serde(default)]
    pub error: Option<String>,
    pub last_updated: Option<DateTime<Utc>>,
}

impl Default for SiteStatus {
    fn default() -> Self {
        Self {
            total_urls: 0,
            crawled_urls: 0,
            paused: false,
            processing: false,
            sitemap_processed: false,
            original_url: None,
            errors: HashMap::new(),
            json_stats: JsonStats::default(),
            error: None,
            last_updated: None,
        }
    }
}

impl SiteStatus {
    pub fn new(original_url: impl Into<String>) -> Self {
        Self {
            original_url: Some(original_url.into()),
            processing: true,
            ..Default::default()
        }
    }

    pub fn record_error(&mut self, bucket: impl Into<String>) {
        *self.errors.entry(bucket.into()).or_insert(0) += 1;
    }

    pub fn touch(&mut self) {
        self.last_updated = Some(Utc::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_sitemap_processed_defaults_false() {
        let status: SiteStatus = serde_json::from_str(r#"{"total_urls": 3}"#).unwrap();
        assert!(!status.sitemap_processed);
        assert_eq!(status.total_urls, 3);
    }

    #[test]
    fn record_error_increments_bucket() {
        let mut status = SiteStatus::default();
        status.record_error("429");
        status.record_error("429");
        status.record_error("TIMEOUT");
        assert_eq!(status.errors.get("429"), Some(&2));
        assert_eq!(status.errors.get("TIMEOUT"), Some(&1));
    }
}
