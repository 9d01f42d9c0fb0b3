pub mod config;
pub mod crawler;
pub mod error;
pub mod extract;
pub mod fetch;
pub mod models;
pub mod sanitize;
pub mod store;

pub use config::{AppConfig, CrawlerConfig};
pub use crawler::{crawl_once, spawn_crawler, CrawlerHandle};
pub use error::CrawlError;
pub use models::{
    Bookmark, DownloadCandidate, FeedCandidate, ReadLaterEntry, RetrievalStatus, RetrievedArticle,
};
pub use store::SqliteStore;
