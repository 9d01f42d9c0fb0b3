use chrono::Utc;
use reqwest::Client;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::CrawlerConfig;
use crate::error::CrawlError;
use crate::extract::extract_article;
use crate::fetch::fetch_content;
use crate::models::RetrievedArticle;
use crate::sanitize::sanitize;
use crate::store::SqliteStore;

/// Handle on the background crawler worker. Dropping it leaves the
/// worker running; `stop` cancels the timer loop and waits for the
/// task. An in-flight tick finishes its current candidate but no new
/// tick starts after the signal.
pub struct CrawlerHandle {
    cancel_tx: broadcast::Sender<()>,
    join: JoinHandle<()>,
}

impl CrawlerHandle {
    pub async fn stop(self) -> Result<(), CrawlError> {
        let _ = self.cancel_tx.send(());
        self.join.await.map_err(CrawlError::from)
    }
}

/// Spawn the single background worker that runs one tick per
/// configured interval until cancelled. Ticks never overlap: the timer
/// is consumed one event at a time and missed ticks are skipped.
pub fn spawn_crawler(store: SqliteStore, config: CrawlerConfig, client: Client) -> CrawlerHandle {
    let (cancel_tx, mut cancel_rx) = broadcast::channel(1);
    let join = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(config.interval());
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        info!("starting bookmark crawler");

        loop {
            // Cancellation wins a tie with an elapsed timer: no new
            // tick starts once the shutdown signal is in flight.
            tokio::select! {
                biased;
                _ = cancel_rx.recv() => {
                    info!("crawler shutdown requested");
                    break;
                }
                _ = ticker.tick() => {
                    crawl_once(&store, &client, &config).await;
                }
            }
        }
    });

    CrawlerHandle { cancel_tx, join }
}

/// One scheduler tick: enroll new candidates, prune aged-out ones,
/// then drain one bounded download batch. The retention cutoff is
/// computed once so discovery and pruning share the same window. A
/// storage failure in either phase ends the tick early; the next tick
/// retries from scratch, which is safe because both phases are
/// idempotent.
pub async fn crawl_once(store: &SqliteStore, client: &Client, config: &CrawlerConfig) {
    let cutoff = config.feed_cutoff(Utc::now());

    match enroll_candidates(store, cutoff).await {
        Ok(enrolled) if enrolled > 0 => info!(enrolled, "enrolled new read-later candidates"),
        Ok(_) => {}
        Err(err) => {
            warn!(error = %err, "candidate discovery failed, ending tick");
            return;
        }
    }

    match prune_candidates(store, cutoff).await {
        Ok(pruned) if pruned > 0 => info!(pruned, "pruned aged-out candidates"),
        Ok(_) => {}
        Err(err) => {
            warn!(error = %err, "candidate pruning failed, ending tick");
            return;
        }
    }

    process_batch(store, client, config).await;
}

/// Find read-later bookmarks created inside the retention window that
/// have no candidate row yet and enroll them as pending.
pub async fn enroll_candidates(store: &SqliteStore, cutoff: i64) -> Result<usize, CrawlError> {
    let candidates = store.find_feed_candidates(cutoff).await?;
    let count = candidates.len();
    for candidate in candidates {
        debug!(bookmark_id = candidate.bookmark_id, "enrolling candidate");
        store.save_feed_candidate(&candidate).await?;
    }
    Ok(count)
}

/// Remove candidates whose source bookmark fell out of the window.
pub async fn prune_candidates(store: &SqliteStore, cutoff: i64) -> Result<u64, CrawlError> {
    store
        .prune_feed_candidates(cutoff)
        .await
        .map_err(CrawlError::from)
}

/// Drain one bounded batch of pending candidates, strictly one at a
/// time. Every attempt bumps the candidate's attempt count exactly
/// once, success or failure. A persistence error is logged and the
/// candidate is left as-is; the attempt count was not durably bumped,
/// so the next tick retries it.
pub async fn process_batch(store: &SqliteStore, client: &Client, config: &CrawlerConfig) {
    let candidates = match store
        .candidates_to_download(config.max_download_attempts, config.max_batch_size)
        .await
    {
        Ok(candidates) => candidates,
        Err(err) => {
            warn!(error = %err, "failed to select download batch");
            return;
        }
    };

    for candidate in candidates {
        let attempts = candidate.attempt_count + 1;
        let outcome = match download_article(client, &candidate.url, config).await {
            Ok(article) => {
                let sanitized = sanitize(&article.content);
                store
                    .save_candidate_content(candidate.id, &article, &sanitized, attempts)
                    .await
            }
            Err(err) => {
                warn!(url = %candidate.url, error = %err, "download failed, marking candidate");
                store.mark_candidate_failed(candidate.id, attempts).await
            }
        };
        if let Err(err) = outcome {
            warn!(candidate_id = candidate.id, error = %err, "failed to persist attempt result");
        }
    }
}

/// Fetch one URL under the configured bounds and extract its article.
async fn download_article(
    client: &Client,
    url: &str,
    config: &CrawlerConfig,
) -> Result<RetrievedArticle, CrawlError> {
    debug!(url, "downloading content");
    let body = fetch_content(
        client,
        url,
        config.fetch_timeout(),
        config.max_content_size_bytes,
    )
    .await?;
    let extracted = extract_article(&body.bytes, url)?;
    Ok(RetrievedArticle {
        retrieved_at: Utc::now(),
        title: extracted.title,
        byline: extracted.byline,
        content: extracted.content,
        content_type: body.content_type,
    })
}
