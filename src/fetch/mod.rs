//! HTTP plumbing for the subway feeds and the alert document.

mod api_key;
mod basic;
mod client;

pub use api_key::{ApiKey, MTA_API_KEY_HEADER};
pub use basic::BasicClient;
pub use client::HttpClient;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tracing::{debug, warn};

use crate::error::FetchError;
use crate::feeds::FeedSource;

/// Per-request timeout for the binary trip feeds.
pub const FEED_TIMEOUT: Duration = Duration::from_secs(15);

/// Fetches `url` with a GET request bounded by `timeout`.
///
/// Any non-2xx status is reported as [`FetchError::HttpStatus`].
pub async fn fetch_bytes<C: HttpClient + ?Sized>(
    client: &C,
    url: &str,
    timeout: Duration,
) -> Result<Bytes, FetchError> {
    let parsed =
        reqwest::Url::parse(url).map_err(|e| FetchError::InvalidUrl(format!("{url}: {e}")))?;
    let mut req = reqwest::Request::new(reqwest::Method::GET, parsed);
    *req.timeout_mut() = Some(timeout);

    let resp = client.execute(req).await?;

    let status = resp.status();
    if !status.is_success() {
        return Err(FetchError::HttpStatus(status.as_u16()));
    }

    let bytes = resp.bytes().await.map_err(|e| {
        warn!(error = %e, "Failed to read response body");
        FetchError::InvalidResponse
    })?;

    debug!(bytes = bytes.len(), "Response received");
    Ok(bytes)
}

/// Builds the client used for every request: plain, or wrapped with the MTA
/// API key header when one is configured.
pub fn build_client(api_key: Option<&str>) -> Result<Arc<dyn HttpClient>, FetchError> {
    let basic = BasicClient::new()?;
    let client: Arc<dyn HttpClient> = match api_key {
        Some(key) => Arc::new(ApiKey::mta(basic, key)?),
        None => Arc::new(basic),
    };
    Ok(client)
}

/// Source of raw feed payloads, one fetch per [`FeedSource`].
#[async_trait]
pub trait FeedTransport: Send + Sync {
    async fn fetch_feed(&self, feed: FeedSource) -> Result<Bytes, FetchError>;
}

/// Fetches feeds over HTTP from `base_url`.
pub struct HttpFeedTransport<C> {
    client: C,
    base_url: String,
    timeout: Duration,
}

impl<C: HttpClient> HttpFeedTransport<C> {
    pub fn new(client: C, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            timeout: FEED_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl<C: HttpClient> FeedTransport for HttpFeedTransport<C> {
    #[tracing::instrument(skip(self, feed), fields(feed = %feed))]
    async fn fetch_feed(&self, feed: FeedSource) -> Result<Bytes, FetchError> {
        fetch_bytes(&self.client, &feed.url(&self.base_url), self.timeout).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio::sync::oneshot;

    /// Serves one canned HTTP response and hands back the raw request text.
    async fn serve_once(response: &'static str) -> (String, oneshot::Receiver<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (tx, rx) = oneshot::channel();

        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = vec![0u8; 4096];
            let n = socket.read(&mut buf).await.unwrap();
            let _ = tx.send(String::from_utf8_lossy(&buf[..n]).into_owned());
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.shutdown().await.unwrap();
        });

        (format!("http://{addr}"), rx)
    }

    #[tokio::test]
    async fn test_fetch_bytes_returns_body() {
        let (base, _) =
            serve_once("HTTP/1.1 200 OK\r\nContent-Length: 3\r\nConnection: close\r\n\r\nabc").await;
        let client = BasicClient::new().unwrap();

        let bytes = fetch_bytes(&client, &base, FEED_TIMEOUT).await.unwrap();
        assert_eq!(&bytes[..], b"abc");
    }

    #[tokio::test]
    async fn test_non_success_status_is_reported() {
        let (base, _) = serve_once(
            "HTTP/1.1 503 Service Unavailable\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
        )
        .await;
        let transport = HttpFeedTransport::new(BasicClient::new().unwrap(), base);

        let err = transport.fetch_feed(FeedSource::L).await.unwrap_err();
        assert!(matches!(err, FetchError::HttpStatus(503)));
    }

    #[tokio::test]
    async fn test_api_key_header_is_sent() {
        let (base, request) =
            serve_once("HTTP/1.1 200 OK\r\nContent-Length: 0\r\nConnection: close\r\n\r\n").await;
        let client = build_client(Some("secret")).unwrap();
        let transport = HttpFeedTransport::new(client, base);

        transport.fetch_feed(FeedSource::G).await.unwrap();

        let request = request.await.unwrap();
        assert!(request.starts_with("GET /nyct%2Fgtfs-g "));
        assert!(request.to_lowercase().contains("x-api-key: secret"));
    }

    #[tokio::test]
    async fn test_timeout_bounds_a_stalled_server() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            // hold the connection open without answering
            tokio::time::sleep(Duration::from_secs(30)).await;
            drop(socket);
        });

        let client = BasicClient::new().unwrap();
        let started = std::time::Instant::now();
        let err = fetch_bytes(&client, &format!("http://{addr}/feed"), Duration::from_millis(200))
            .await
            .unwrap_err();

        assert!(matches!(&err, FetchError::Request(e) if e.is_timeout()));
        assert!(started.elapsed() < Duration::from_secs(10));
        server.abort();
    }

    #[tokio::test]
    async fn test_invalid_url_is_reported() {
        let client = BasicClient::new().unwrap();
        let err = fetch_bytes(&client, "not a url", FEED_TIMEOUT).await.unwrap_err();
        assert!(matches!(err, FetchError::InvalidUrl(_)));
    }

    #[test]
    fn test_invalid_api_key_is_rejected() {
        let err = ApiKey::mta(BasicClient::new().unwrap(), "bad\nkey").err();
        assert!(matches!(err, Some(FetchError::InvalidApiKey(_))));
    }
}
