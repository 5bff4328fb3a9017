pub mod config;
pub mod error;
pub mod record;
pub mod site;
pub mod status;

pub use config::CrawlerConfig;
pub use error::{CollaboratorError, SitemapError};
pub use record::{node_key, types_of, JsonLd, Record};
pub use site::{is_valid_site_name, site_name_from_url};
pub use status::{JsonStats, SiteStatus};
