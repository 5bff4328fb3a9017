use thiserror::Error;

/// Errors surfaced by the sitemap expansion stage.
#[derive(Error, Debug)]
pub enum SitemapError {
    #[error("sitemap fetch failed: {0}")]
    Fetch(String),

    #[error("sitemap parse failed: {0}")]
    Parse(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Errors surfaced by external collaborator adapters (embedding, vector DB, FGA).
#[derive(Error, Debug)]
pub enum CollaboratorError {
    #[error("embedding provider error: {0}")]
    Embedding(String),

    #[error("vector database error: {0}")]
    VectorDb(String),

    #[error("FGA error: {0}")]
    Fga(String),
}

pub type Result<T, E = anyhow::Error> = std::result::Result<T, E>;
