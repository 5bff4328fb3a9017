use std::sync::Arc;

use crawlkeep_core::Crawler;

/// Shared state every handler closes over. Thin by design — handlers do
/// no business logic beyond validating input and calling through to the
/// `Crawler`.
#[derive(Clone)]
pub struct AppState {
    pub crawler: Arc<Crawler>,
}
