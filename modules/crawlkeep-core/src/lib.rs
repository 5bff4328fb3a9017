mod crawler;
mod db_watcher;
mod db_worker;
mod domain_gate;
mod error;
mod fetch;
mod maintenance;
mod queue;
mod reconciler;
mod sitemap_stage;
#[cfg(test)]
pub(crate) mod test_support;

pub use crawler::{Crawler, RegisterOutcome, SiteSummary, StatusView};
pub use error::CoreError;
