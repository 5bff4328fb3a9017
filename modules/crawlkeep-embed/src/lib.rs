mod descriptor;
mod provider;
mod watcher;
mod worker;

pub use descriptor::{build_descriptor, build_metadata};
pub use provider::{EmbeddingProvider, HttpEmbeddingProvider, NoopEmbeddingProvider};
pub use watcher::run as run_watcher;
pub use worker::{embedded_keys, run as run_worker, EmbedJob};
