use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// Runtime configuration loaded from environment variables.
///
/// All timing/concurrency knobs default to the values this system was
/// specified against; only the external-service endpoints are required.
#[derive(Debug, Clone)]
pub struct CrawlerConfig {
    /// Root directory under which `urls/`, `docs/`, `json/`, `embeddings/`,
    /// `keys/`, `status/` live.
    pub data_root: PathBuf,

    /// Address the control façade binds to.
    pub bind_addr: String,

    /// Embedding provider base URL and API key.
    pub embedding_base_url: String,
    pub embedding_api_key: String,

    /// Vector database base URL and API key.
    pub vectordb_base_url: String,
    pub vectordb_api_key: String,

    /// FGA (fine-grained authorization) base URL and API key.
    pub fga_base_url: String,
    pub fga_api_key: String,

    pub max_concurrent_fetchers: usize,
    pub min_delay_same_domain: Duration,
    pub http_fetch_timeout: Duration,
    pub sitemap_fetch_timeout: Duration,
    pub json_watcher_period: Duration,
    pub url_watcher_period: Duration,
    pub embedding_batch_size: usize,
    pub db_batch_size: usize,
}

impl CrawlerConfig {
    /// Load configuration from environment variables, applying the spec's
    /// defaults for every timing/concurrency knob that isn't overridden.
    ///
    /// Panics with a clear message if a required variable is missing.
    pub fn from_env() -> Self {
        Self {
            data_root: PathBuf::from(
                env::var("CRAWLER_DATA_ROOT").unwrap_or_else(|_| "data".to_string()),
            ),
            bind_addr: env::var("CRAWLER_BIND_ADDR")
                .unwrap_or_else(|_| "0.0.0.0:8080".to_string()),
            embedding_base_url: required_env("EMBEDDING_BASE_URL"),
            embedding_api_key: required_env("EMBEDDING_API_KEY"),
            vectordb_base_url: required_env("VECTORDB_BASE_URL"),
            vectordb_api_key: required_env("VECTORDB_API_KEY"),
            fga_base_url: required_env("FGA_BASE_URL"),
            fga_api_key: required_env("FGA_API_KEY"),
            max_concurrent_fetchers: env_parse("MAX_CONCURRENT_FETCHERS", 10),
            min_delay_same_domain: Duration::from_millis(env_parse(
                "MIN_DELAY_SAME_DOMAIN_MS",
                1000,
            )),
            http_fetch_timeout: Duration::from_secs(env_parse("HTTP_FETCH_TIMEOUT_SECS", 30)),
            sitemap_fetch_timeout: Duration::from_secs(env_parse(
                "SITEMAP_FETCH_TIMEOUT_SECS",
                10,
            )),
            json_watcher_period: Duration::from_secs(env_parse("JSON_WATCHER_PERIOD_SECS", 30)),
            url_watcher_period: Duration::from_secs(env_parse("URL_WATCHER_PERIOD_SECS", 5)),
            embedding_batch_size: env_parse("EMBEDDING_BATCH_SIZE", 100),
            db_batch_size: env_parse("DB_BATCH_SIZE", 100),
        }
    }

    /// A configuration suitable for tests: all external endpoints point at
    /// `http://localhost:0`, data root is left to the caller to override.
    pub fn for_tests(data_root: PathBuf) -> Self {
        Self {
            data_root,
            bind_addr: "127.0.0.1:0".to_string(),
            embedding_base_url: "http://localhost:0".to_string(),
            embedding_api_key: "test".to_string(),
            vectordb_base_url: "http://localhost:0".to_string(),
            vectordb_api_key: "test".to_string(),
            fga_base_url: "http://localhost:0".to_string(),
            fga_api_key: "test".to_string(),
            max_concurrent_fetchers: 10,
            min_delay_same_domain: Duration::from_millis(1000),
            http_fetch_timeout: Duration::from_secs(30),
            sitemap_fetch_timeout: Duration::from_secs(10),
            json_watcher_period: Duration::from_secs(30),
            url_watcher_period: Duration::from_secs(5),
            embedding_batch_size: 100,
            db_batch_size: 100,
        }
    }

    /// Log the shape of every sensitive value without leaking it.
    pub fn log_redacted(&self) {
        let vars = [
            ("EMBEDDING_API_KEY", &self.embedding_api_key),
            ("VECTORDB_API_KEY", &self.vectordb_api_key),
            ("FGA_API_KEY", &self.fga_api_key),
        ];
        for (name, value) in vars {
            tracing::info!("{name} = ({} chars)", value.len());
        }
    }
}

fn required_env(key: &str) -> String {
    env::var(key).unwrap_or_else(|_| panic!("{key} environment variable is required"))
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
