use std::str::FromStr;

use chrono::{DateTime, TimeZone, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use tracing::debug;

use crate::models::{
    Bookmark, DownloadCandidate, FeedCandidate, ReadLaterEntry, RetrievalStatus, RetrievedArticle,
};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS users (
    id INTEGER NOT NULL PRIMARY KEY AUTOINCREMENT,
    username TEXT NOT NULL UNIQUE,
    feed_id TEXT,
    last_update INTEGER NOT NULL DEFAULT 0
);

CREATE TABLE IF NOT EXISTS bookmarks (
    id INTEGER NOT NULL PRIMARY KEY AUTOINCREMENT,
    user_id INTEGER NOT NULL,
    url TEXT NOT NULL UNIQUE,
    title TEXT,
    description TEXT,
    tags TEXT,
    private INTEGER NOT NULL DEFAULT 0,
    readlater INTEGER NOT NULL DEFAULT 0,
    created INTEGER NOT NULL,
    updated INTEGER NOT NULL,
    FOREIGN KEY(user_id) REFERENCES users(id)
);

CREATE INDEX IF NOT EXISTS bookmarks_created_idx ON bookmarks(created);

-- Read-later contents live in their own table: the candidates are a
-- small subset of all bookmarks and carry large content blobs.
-- retrieval_status: 0 = last attempt succeeded, 1 = last attempt failed.
CREATE TABLE IF NOT EXISTS read_later (
    id INTEGER NOT NULL PRIMARY KEY AUTOINCREMENT,
    user_id INTEGER NOT NULL,
    bookmark_id INTEGER NOT NULL,
    retrieval_attempt_count INTEGER NOT NULL DEFAULT 0,
    retrieval_status INTEGER NOT NULL DEFAULT 0,
    retrieval_time INTEGER,
    title TEXT,
    byline TEXT,
    content TEXT,
    content_type TEXT,
    FOREIGN KEY(user_id) REFERENCES users(id),
    FOREIGN KEY(bookmark_id) REFERENCES bookmarks(id) ON DELETE CASCADE
);
"#;

/// Handle on the bookmarks database. Cheap to clone; all mutations are
/// individual short transactions against the pool.
#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub async fn open(database_url: &str) -> Result<Self, sqlx::Error> {
        let options = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .foreign_keys(true)
            .journal_mode(SqliteJournalMode::Wal);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;
        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    /// Private in-memory database. Pinned to a single connection so
    /// the schema outlives individual pool checkouts.
    pub async fn in_memory() -> Result<Self, sqlx::Error> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .min_connections(1)
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;
        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    async fn migrate(&self) -> Result<(), sqlx::Error> {
        sqlx::raw_sql(SCHEMA).execute(&self.pool).await?;
        Ok(())
    }

    pub async fn create_user(&self, username: &str, feed_id: &str) -> Result<i64, sqlx::Error> {
        let result = sqlx::query("INSERT INTO users (username, feed_id) VALUES (?, ?)")
            .bind(username)
            .bind(feed_id)
            .execute(&self.pool)
            .await?;
        Ok(result.last_insert_rowid())
    }

    /// Resolve the owner of an unauthenticated feed URL token.
    pub async fn find_user_id_for_feed(&self, feed_id: &str) -> Result<Option<i64>, sqlx::Error> {
        let row = sqlx::query("SELECT id FROM users WHERE feed_id = ?")
            .bind(feed_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|row| row.get(0)))
    }

    /// Upsert on URL: storing an existing URL again updates the
    /// metadata in place, as the CRUD forms expect. RETURNING gives
    /// the row id on both paths; last_insert_rowid is stale on the
    /// conflict-update path.
    pub async fn add_bookmark(&self, user_id: i64, bookmark: &Bookmark) -> Result<i64, sqlx::Error> {
        let row = sqlx::query(
            "INSERT INTO bookmarks \
                 (user_id, url, title, description, tags, private, readlater, created, updated) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?) \
             ON CONFLICT(url) DO UPDATE SET \
                 title = excluded.title, description = excluded.description, \
                 tags = excluded.tags, private = excluded.private, \
                 readlater = excluded.readlater, updated = excluded.updated \
             RETURNING id",
        )
        .bind(user_id)
        .bind(&bookmark.url)
        .bind(&bookmark.title)
        .bind(&bookmark.description)
        .bind(&bookmark.tags)
        .bind(bookmark.private)
        .bind(bookmark.readlater)
        .bind(bookmark.created.timestamp())
        .bind(bookmark.updated.timestamp())
        .fetch_one(&self.pool)
        .await?;
        sqlx::query("UPDATE users SET last_update = ? WHERE id = ?")
            .bind(Utc::now().timestamp())
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(row.get(0))
    }

    /// Time of the user's last bookmark mutation, for cache headers on
    /// the serving side.
    pub async fn last_modified(&self, user_id: i64) -> Result<Option<DateTime<Utc>>, sqlx::Error> {
        let row = sqlx::query("SELECT last_update FROM users WHERE id = ?")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.and_then(|row| Utc.timestamp_opt(row.get(0), 0).single()))
    }

    /// Deleting a bookmark cascades to its candidate row.
    pub async fn delete_bookmark(&self, user_id: i64, url: &str) -> Result<(), sqlx::Error> {
        sqlx::query("DELETE FROM bookmarks WHERE user_id = ? AND url = ?")
            .bind(user_id)
            .bind(url)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Read-later bookmarks created after `cutoff` that have no
    /// candidate row yet. The LEFT JOIN predicate is what makes
    /// enrollment idempotent.
    pub async fn find_feed_candidates(&self, cutoff: i64) -> Result<Vec<FeedCandidate>, sqlx::Error> {
        sqlx::query_as(
            "SELECT b.id AS bookmark_id, b.user_id AS user_id \
             FROM bookmarks b LEFT JOIN read_later rl ON b.id = rl.bookmark_id \
             WHERE b.readlater = 1 AND b.created > ? AND rl.id IS NULL",
        )
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await
    }

    pub async fn save_feed_candidate(&self, candidate: &FeedCandidate) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT INTO read_later (user_id, bookmark_id, retrieval_attempt_count, retrieval_status) \
             VALUES (?, ?, 0, 0)",
        )
        .bind(candidate.user_id)
        .bind(candidate.bookmark_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Drop candidates whose source bookmark has aged out of the
    /// retention window. The bookmark itself is untouched.
    pub async fn prune_feed_candidates(&self, cutoff: i64) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "DELETE FROM read_later \
             WHERE bookmark_id IN ( \
                 SELECT b.id FROM bookmarks b \
                 WHERE b.readlater = 1 AND b.created < ?)",
        )
        .bind(cutoff)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    /// Admission control for one batch: candidates without content and
    /// with attempts to spare, capped at `batch_size`. Successful
    /// candidates have content and are never selected again; exhausted
    /// ones fail the attempt predicate.
    pub async fn candidates_to_download(
        &self,
        max_attempts: i64,
        batch_size: i64,
    ) -> Result<Vec<DownloadCandidate>, sqlx::Error> {
        sqlx::query_as(
            "SELECT rl.id AS id, b.url AS url, rl.retrieval_attempt_count AS attempt_count \
             FROM bookmarks b, read_later rl \
             WHERE b.id = rl.bookmark_id \
             AND rl.content IS NULL \
             AND rl.retrieval_attempt_count < ? \
             LIMIT ?",
        )
        .bind(max_attempts)
        .bind(batch_size)
        .fetch_all(&self.pool)
        .await
    }

    pub async fn mark_candidate_failed(
        &self,
        candidate_id: i64,
        attempts: i64,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE read_later SET retrieval_status = ?, retrieval_attempt_count = ? WHERE id = ?",
        )
        .bind(RetrievalStatus::Failed.as_i64())
        .bind(attempts)
        .bind(candidate_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn save_candidate_content(
        &self,
        candidate_id: i64,
        article: &RetrievedArticle,
        sanitized: &str,
        attempts: i64,
    ) -> Result<(), sqlx::Error> {
        debug!(candidate_id, "saving retrieved content");
        sqlx::query(
            "UPDATE read_later \
             SET retrieval_status = ?, retrieval_time = ?, title = ?, byline = ?, \
                 content = ?, content_type = ?, retrieval_attempt_count = ? \
             WHERE id = ?",
        )
        .bind(RetrievalStatus::Success.as_i64())
        .bind(article.retrieved_at.timestamp())
        .bind(&article.title)
        .bind(&article.byline)
        .bind(sanitized)
        .bind(&article.content_type)
        .bind(attempts)
        .bind(candidate_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Attempt count of a single candidate. Diagnostic accessor.
    pub async fn candidate_attempts(&self, candidate_id: i64) -> Result<Option<i64>, sqlx::Error> {
        let row = sqlx::query("SELECT retrieval_attempt_count FROM read_later WHERE id = ?")
            .bind(candidate_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|row| row.get(0)))
    }

    /// Feed accessor: for one user, every candidate that was
    /// successfully retrieved or has exhausted its attempts. This is
    /// the surface the RSS-serving collaborator renders.
    pub async fn read_later_entries(
        &self,
        user_id: i64,
        max_attempts: i64,
    ) -> Result<Vec<ReadLaterEntry>, sqlx::Error> {
        let rows = sqlx::query(
            "SELECT b.url, rl.retrieval_status, rl.retrieval_time, rl.title, rl.byline, \
                    rl.content, rl.content_type \
             FROM read_later rl, bookmarks b \
             WHERE rl.user_id = ? \
             AND rl.bookmark_id = b.id \
             AND ((rl.retrieval_status = 0 AND rl.content IS NOT NULL) \
                  OR rl.retrieval_attempt_count >= ?)",
        )
        .bind(user_id)
        .bind(max_attempts)
        .fetch_all(&self.pool)
        .await?;

        let mut entries = Vec::with_capacity(rows.len());
        for row in rows {
            let status: i64 = row.get("retrieval_status");
            let retrieval_time: Option<i64> = row.get("retrieval_time");
            entries.push(ReadLaterEntry {
                url: row.get("url"),
                successfully_retrieved: status == RetrievalStatus::Success.as_i64(),
                title: row.get::<Option<String>, _>("title").unwrap_or_default(),
                byline: row.get::<Option<String>, _>("byline").unwrap_or_default(),
                content: row.get::<Option<String>, _>("content").unwrap_or_default(),
                content_type: row
                    .get::<Option<String>, _>("content_type")
                    .unwrap_or_default(),
                retrieval_time: retrieval_time
                    .and_then(|secs| Utc.timestamp_opt(secs, 0).single()),
            });
        }
        Ok(entries)
    }
}
