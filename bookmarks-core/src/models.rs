use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A stored bookmark. The crawler only ever consumes the `readlater`
/// flag and the creation timestamp; everything else belongs to the
/// CRUD surface.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bookmark {
    pub url: String,
    pub title: String,
    pub description: String,
    pub tags: String,
    pub private: bool,
    pub readlater: bool,
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
}

/// A bookmark that should be enrolled into the download queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromRow)]
pub struct FeedCandidate {
    pub bookmark_id: i64,
    pub user_id: i64,
}

/// A queued candidate eligible for a download attempt.
#[derive(Debug, Clone, FromRow)]
pub struct DownloadCandidate {
    pub id: i64,
    pub url: String,
    pub attempt_count: i64,
}

/// Outcome of the last download attempt, as stored in the candidate
/// row. A candidate with no content and attempts left is pending.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetrievalStatus {
    Success,
    Failed,
}

impl RetrievalStatus {
    pub fn as_i64(self) -> i64 {
        match self {
            RetrievalStatus::Success => 0,
            RetrievalStatus::Failed => 1,
        }
    }
}

/// In-memory result of one successful fetch + extract attempt. Never
/// persisted as its own entity; its fields are written onto the
/// candidate row together with the sanitized content.
#[derive(Debug, Clone)]
pub struct RetrievedArticle {
    pub retrieved_at: DateTime<Utc>,
    pub title: String,
    pub byline: String,
    pub content: String,
    pub content_type: String,
}

/// One row of the per-user feed accessor: a candidate that either
/// succeeded or exhausted its attempts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadLaterEntry {
    pub url: String,
    pub successfully_retrieved: bool,
    pub title: String,
    pub byline: String,
    pub content: String,
    pub content_type: String,
    pub retrieval_time: Option<DateTime<Utc>>,
}
