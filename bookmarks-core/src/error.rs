use thiserror::Error;

#[derive(Debug, Error)]
pub enum CrawlError {
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),
    #[error("article extraction failed: {0}")]
    Extract(String),
    #[error("store error: {0}")]
    Store(#[from] sqlx::Error),
    #[error("crawler task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}
