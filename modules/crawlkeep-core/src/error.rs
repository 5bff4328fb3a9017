use thiserror::Error;

/// Errors the control surface can translate directly into HTTP status
/// codes, without the API layer needing to inspect an opaque `anyhow::Error`.
#[derive(Error, Debug)]
pub enum CoreError {
    #[error("invalid site name: {0}")]
    InvalidSiteName(String),

    #[error("site not found: {0}")]
    SiteNotFound(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
