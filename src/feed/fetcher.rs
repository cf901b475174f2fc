use futures::StreamExt;
use reqwest::header::USER_AGENT;
use std::time::Duration;
use thiserror::Error;

use super::parser::{parse_feed, FeedDocument, ParseError};

/// Client label sent with every feed request
pub const CLIENT_LABEL: &str = "gator";

const MAX_FEED_SIZE: usize = 10 * 1024 * 1024; // 10MB
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Errors that can occur while fetching a feed.
///
/// Transport problems and parse failures are kept apart so callers can tell a
/// dead server from a broken document.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Network-level error (DNS, connection, TLS, etc.)
    #[error("Request failed: {0}")]
    Network(#[from] reqwest::Error),
    /// HTTP response with non-2xx status code
    #[error("HTTP error: status {0}")]
    HttpStatus(u16),
    /// Request exceeded the configured timeout
    #[error("Request timed out")]
    Timeout,
    /// Response body exceeded the size limit
    #[error("Response too large")]
    ResponseTooLarge,
    /// Response was incomplete (received fewer bytes than Content-Length)
    #[error("Incomplete response: expected {expected} bytes, received {received}")]
    IncompleteResponse { expected: u64, received: usize },
    /// Body could not be parsed as a feed
    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),
}

/// HTTP client for feed documents.
///
/// Cheap to clone; clones share one connection pool. Each call to
/// [`FeedClient::fetch`] makes exactly one request and never retries; the
/// returned future can be dropped at any point to abort the request.
#[derive(Clone)]
pub struct FeedClient {
    http: reqwest::Client,
    timeout: Duration,
    max_body_bytes: usize,
}

impl FeedClient {
    /// Build a client with connection pooling and the given per-request timeout.
    pub fn new(timeout: Duration) -> Result<Self, FetchError> {
        let http = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::limited(10))
            .pool_max_idle_per_host(4)
            .pool_idle_timeout(Duration::from_secs(30))
            .tcp_keepalive(Duration::from_secs(60))
            .timeout(timeout)
            .build()?;
        Ok(Self::with_client(http, timeout))
    }

    /// Wrap an existing `reqwest::Client`.
    pub fn with_client(http: reqwest::Client, timeout: Duration) -> Self {
        Self {
            http,
            timeout,
            max_body_bytes: MAX_FEED_SIZE,
        }
    }

    /// Override the response size limit (defaults to 10MB).
    pub fn max_body_bytes(mut self, limit: usize) -> Self {
        self.max_body_bytes = limit;
        self
    }

    /// Fetch `url` once and parse the body as a feed document.
    ///
    /// # Errors
    ///
    /// - [`FetchError::Network`] - Connection, DNS or TLS errors
    /// - [`FetchError::Timeout`] - Request exceeded the timeout
    /// - [`FetchError::HttpStatus`] - Non-2xx HTTP response
    /// - [`FetchError::ResponseTooLarge`] / [`FetchError::IncompleteResponse`] - Body problems
    /// - [`FetchError::Parse`] - Body is not a well-formed feed
    pub async fn fetch(&self, url: &str) -> Result<FeedDocument, FetchError> {
        let bytes = self.fetch_bytes(url).await?;
        let doc = parse_feed(&bytes)?;
        tracing::debug!(
            url = %url,
            title = %doc.title,
            items = doc.items.len(),
            "Feed parsed"
        );
        Ok(doc)
    }

    async fn fetch_bytes(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        let request = self.http.get(url).header(USER_AGENT, CLIENT_LABEL).send();

        let response = tokio::time::timeout(self.timeout, request)
            .await
            .map_err(|_| FetchError::Timeout)?
            .map_err(map_reqwest_error)?;

        if !response.status().is_success() {
            return Err(FetchError::HttpStatus(response.status().as_u16()));
        }

        tokio::time::timeout(self.timeout, read_limited_bytes(response, self.max_body_bytes))
            .await
            .map_err(|_| FetchError::Timeout)?
    }
}

impl Default for FeedClient {
    fn default() -> Self {
        Self::with_client(reqwest::Client::new(), DEFAULT_TIMEOUT)
    }
}

fn map_reqwest_error(err: reqwest::Error) -> FetchError {
    if err.is_timeout() {
        FetchError::Timeout
    } else {
        FetchError::Network(err)
    }
}

async fn read_limited_bytes(
    response: reqwest::Response,
    limit: usize,
) -> Result<Vec<u8>, FetchError> {
    let expected_length = response.content_length();

    // Fast path: check Content-Length header
    if let Some(len) = expected_length {
        if len > limit as u64 {
            return Err(FetchError::ResponseTooLarge);
        }
    }

    let mut bytes = Vec::new();
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(map_reqwest_error)?;
        if bytes.len().saturating_add(chunk.len()) > limit {
            return Err(FetchError::ResponseTooLarge);
        }
        bytes.extend_from_slice(&chunk);
    }

    if let Some(expected) = expected_length {
        if (bytes.len() as u64) < expected {
            return Err(FetchError::IncompleteResponse {
                expected,
                received: bytes.len(),
            });
        }
    }

    Ok(bytes)
}
