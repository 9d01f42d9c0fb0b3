use std::time::Duration;

use chrono::Utc;
use reqwest::Client;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use bookmarks_core::crawler::{crawl_once, enroll_candidates, process_batch};
use bookmarks_core::fetch::fetch_content;
use bookmarks_core::{spawn_crawler, Bookmark, CrawlerConfig, SqliteStore};

fn sample_article() -> String {
    let paragraph = "Down by the quay the cats held their morning parliament, weighing \
        the fishmongers by gait and by generosity before the first stalls opened. ";
    format!(
        "<html><head><title>Concerning Cats</title>\
         <meta name=\"author\" content=\"Jane Doe\"></head>\
         <body><article><h1>Concerning Cats</h1>\
         <p>{p}</p><p>{p}</p><p>{p}</p><p>{p}</p><p>{p}</p>\
         <script>alert('tracking')</script>\
         </article></body></html>",
        p = paragraph.repeat(4)
    )
}

fn test_config() -> CrawlerConfig {
    CrawlerConfig {
        crawl_interval_seconds: 1,
        fetch_timeout_seconds: 2,
        max_content_size_bytes: 2 * 1024 * 1024,
        max_download_attempts: 3,
        max_batch_size: 20,
        retention_months: 6,
    }
}

fn read_later_bookmark(url: &str) -> Bookmark {
    let now = Utc::now();
    Bookmark {
        url: url.to_owned(),
        title: "saved for later".to_owned(),
        description: String::new(),
        tags: String::new(),
        private: false,
        readlater: true,
        created: now,
        updated: now,
    }
}

async fn store_with_user() -> (SqliteStore, i64) {
    let store = SqliteStore::in_memory().await.unwrap();
    let user_id = store.create_user("alice", "feed-token-1").await.unwrap();
    (store, user_id)
}

#[tokio::test]
async fn a_full_tick_downloads_and_persists_a_well_formed_article() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/post"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_raw(sample_article().into_bytes(), "text/html; charset=utf-8"),
        )
        .mount(&server)
        .await;

    let (store, user_id) = store_with_user().await;
    store
        .add_bookmark(user_id, &read_later_bookmark(&format!("{}/post", server.uri())))
        .await
        .unwrap();

    let config = test_config();
    let client = Client::new();
    crawl_once(&store, &client, &config).await;

    let entries = store.read_later_entries(user_id, 3).await.unwrap();
    assert_eq!(entries.len(), 1);
    let entry = &entries[0];
    assert!(entry.successfully_retrieved);
    assert_eq!(entry.title, "Concerning Cats");
    assert_eq!(entry.byline, "Jane Doe");
    assert!(entry.content.contains("fishmongers"));
    assert!(!entry.content.contains("<script"));
    assert!(!entry.content.contains("alert"));
    assert!(entry.content_type.starts_with("text/html"));
    assert!(entry.retrieval_time.is_some());

    // Success is terminal: no later batch selects the candidate again.
    let pending = store.candidates_to_download(3, 10).await.unwrap();
    assert!(pending.is_empty());
}

#[tokio::test]
async fn failed_downloads_are_retried_until_attempts_are_exhausted() {
    let server = MockServer::start().await;
    // A readable body with no article in it: the fetch succeeds and
    // extraction fails, which must count as a normal failed attempt.
    Mock::given(method("GET"))
        .and(path("/missing"))
        .respond_with(ResponseTemplate::new(404).set_body_string("not here"))
        .mount(&server)
        .await;

    let (store, user_id) = store_with_user().await;
    store
        .add_bookmark(
            user_id,
            &read_later_bookmark(&format!("{}/missing", server.uri())),
        )
        .await
        .unwrap();

    let config = test_config();
    let client = Client::new();
    let cutoff = config.feed_cutoff(Utc::now());
    enroll_candidates(&store, cutoff).await.unwrap();
    let candidate_id = store.candidates_to_download(3, 10).await.unwrap()[0].id;

    // One attempt per tick, never more.
    for expected_attempts in 1..=3 {
        process_batch(&store, &client, &config).await;
        assert_eq!(
            store.candidate_attempts(candidate_id).await.unwrap(),
            Some(expected_attempts)
        );
    }

    // Terminal failure: excluded from selection, attempts frozen.
    assert!(store.candidates_to_download(3, 10).await.unwrap().is_empty());
    process_batch(&store, &client, &config).await;
    assert_eq!(store.candidate_attempts(candidate_id).await.unwrap(), Some(3));

    let entries = store.read_later_entries(user_id, 3).await.unwrap();
    assert_eq!(entries.len(), 1);
    assert!(!entries[0].successfully_retrieved);
    assert!(entries[0].content.is_empty());
}

#[tokio::test]
async fn a_timed_out_fetch_marks_the_candidate_failed_but_retryable() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/slow"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(sample_article())
                .set_delay(Duration::from_secs(5)),
        )
        .mount(&server)
        .await;

    let (store, user_id) = store_with_user().await;
    store
        .add_bookmark(user_id, &read_later_bookmark(&format!("{}/slow", server.uri())))
        .await
        .unwrap();

    let config = CrawlerConfig {
        fetch_timeout_seconds: 1,
        ..test_config()
    };
    let client = Client::new();
    crawl_once(&store, &client, &config).await;

    // Still selectable on the next tick, with exactly one attempt recorded.
    let pending = store.candidates_to_download(3, 10).await.unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].attempt_count, 1);

    // Content fields stay empty until the feed shows it as exhausted.
    let entries = store.read_later_entries(user_id, 3).await.unwrap();
    assert!(entries.is_empty());
}

#[tokio::test]
async fn an_unreachable_host_counts_as_a_failed_attempt() {
    let (store, user_id) = store_with_user().await;
    // Nothing listens on port 1.
    store
        .add_bookmark(user_id, &read_later_bookmark("http://127.0.0.1:1/nope"))
        .await
        .unwrap();

    let config = test_config();
    let client = Client::new();
    crawl_once(&store, &client, &config).await;

    let pending = store.candidates_to_download(3, 10).await.unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].attempt_count, 1);
}

#[tokio::test]
async fn a_batch_processes_at_most_the_configured_number_of_candidates() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404).set_body_string("nope"))
        .mount(&server)
        .await;

    let (store, user_id) = store_with_user().await;
    for i in 0..25 {
        store
            .add_bookmark(
                user_id,
                &read_later_bookmark(&format!("{}/item/{i}", server.uri())),
            )
            .await
            .unwrap();
    }

    let config = test_config();
    let client = Client::new();
    let cutoff = config.feed_cutoff(Utc::now());
    assert_eq!(enroll_candidates(&store, cutoff).await.unwrap(), 25);

    process_batch(&store, &client, &config).await;

    let all = store.candidates_to_download(3, 100).await.unwrap();
    assert_eq!(all.len(), 25);
    let attempted = all.iter().filter(|c| c.attempt_count == 1).count();
    let untouched = all.iter().filter(|c| c.attempt_count == 0).count();
    assert_eq!(attempted, 20);
    assert_eq!(untouched, 5);
}

#[tokio::test]
async fn enrollment_is_idempotent_across_ticks() {
    let (store, user_id) = store_with_user().await;
    store
        .add_bookmark(user_id, &read_later_bookmark("http://example.com/once"))
        .await
        .unwrap();

    let cutoff = test_config().feed_cutoff(Utc::now());
    assert_eq!(enroll_candidates(&store, cutoff).await.unwrap(), 1);
    assert_eq!(enroll_candidates(&store, cutoff).await.unwrap(), 0);
}

#[tokio::test]
async fn no_tick_starts_after_the_crawler_is_stopped() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404).set_body_string("nope"))
        .mount(&server)
        .await;

    let (store, user_id) = store_with_user().await;
    store
        .add_bookmark(
            user_id,
            &read_later_bookmark(&format!("{}/item", server.uri())),
        )
        .await
        .unwrap();

    // Keep attempts far from exhaustion so a still-running worker
    // would keep bumping the count every second.
    let config = CrawlerConfig {
        crawl_interval_seconds: 1,
        max_download_attempts: 100,
        ..test_config()
    };
    let handle = spawn_crawler(store.clone(), config, Client::new());

    // Wait until at least one tick has recorded an attempt.
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        let pending = store.candidates_to_download(100, 10).await.unwrap();
        if pending.first().map_or(false, |c| c.attempt_count >= 1) {
            break;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "crawler never ran a tick"
        );
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    // stop() joins the worker, so the count must be frozen afterwards
    // even though several intervals elapse.
    handle.stop().await.unwrap();
    let frozen = store.candidates_to_download(100, 10).await.unwrap()[0].attempt_count;

    tokio::time::sleep(Duration::from_millis(2500)).await;
    let after = store.candidates_to_download(100, 10).await.unwrap()[0].attempt_count;
    assert_eq!(after, frozen);
}

#[tokio::test]
async fn the_fetcher_never_reads_past_the_byte_ceiling() {
    let server = MockServer::start().await;
    let big_body = "x".repeat(100 * 1024);
    Mock::given(method("GET"))
        .and(path("/big"))
        .respond_with(ResponseTemplate::new(200).set_body_string(big_body))
        .mount(&server)
        .await;

    let client = Client::new();
    let body = fetch_content(
        &client,
        &format!("{}/big", server.uri()),
        Duration::from_secs(2),
        1024,
    )
    .await
    .unwrap();
    assert_eq!(body.bytes.len(), 1024);
}
