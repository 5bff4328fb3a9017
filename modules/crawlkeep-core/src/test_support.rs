use std::sync::Arc;

use crawlkeep_common::CrawlerConfig;
use crawlkeep_embed::NoopEmbeddingProvider;
use crawlkeep_fga::NoopFga;
use crawlkeep_store::Store;
use crawlkeep_vectordb::NoopVectorDb;

use crate::Crawler;

/// Assemble a `Crawler` over a fresh temp-dir `Store` with every external
/// collaborator stubbed out, for tests that exercise scheduling,
/// reconciliation, or the database/embedding stages without a network.
pub(crate) async fn test_crawler() -> (Arc<Crawler>, tempfile::TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(Store::new(dir.path()).await.unwrap());
    let config = CrawlerConfig::for_tests(dir.path().to_path_buf());
    let http = reqwest::Client::new();
    let crawler = Crawler::new(
        config,
        store,
        http,
        Arc::new(NoopEmbeddingProvider),
        Arc::new(NoopVectorDb),
        Arc::new(NoopFga),
    );
    (crawler, dir)
}
