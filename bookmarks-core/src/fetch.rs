use std::time::Duration;

use bytes::{Bytes, BytesMut};
use futures_util::StreamExt;
use reqwest::header::CONTENT_TYPE;
use reqwest::Client;
use tracing::debug;

use crate::error::CrawlError;

/// Raw result of a bounded download.
#[derive(Debug, Clone)]
pub struct FetchedBody {
    pub bytes: Bytes,
    pub content_type: String,
}

/// GET `url` with a wall-clock timeout, reading at most `max_bytes` of
/// the body. The body is streamed and truncated at the cap instead of
/// trusting any declared length, so an oversized or hostile response
/// never buffers past the ceiling. The body is read whatever the
/// status code; a page without an article body fails at extraction.
pub async fn fetch_content(
    client: &Client,
    url: &str,
    timeout: Duration,
    max_bytes: usize,
) -> Result<FetchedBody, CrawlError> {
    let response = client.get(url).timeout(timeout).send().await?;
    let content_type = response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default()
        .to_owned();

    let mut body = BytesMut::new();
    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        let remaining = max_bytes - body.len();
        if chunk.len() >= remaining {
            body.extend_from_slice(&chunk[..remaining]);
            debug!(url, max_bytes, "response exceeded the size cap, truncating");
            break;
        }
        body.extend_from_slice(&chunk);
    }

    Ok(FetchedBody {
        bytes: body.freeze(),
        content_type,
    })
}
