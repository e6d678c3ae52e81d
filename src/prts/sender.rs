use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use log::{debug, warn};
use parking_lot::RwLock;
use reqwest::Client;
use thiserror::Error;

/// Errors produced while fetching a URL.
#[derive(Error, Debug)]
pub(crate) enum FetchError {
    #[error("Request to {url} timed out")]
    Timeout { url: String },

    #[error("Request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Request to {url} returned HTTP {status}")]
    Status { url: String, status: u16 },
}

/// Plain GET access to the wiki. Implemented by [RequestSender] and by test fakes.
#[async_trait]
pub(crate) trait HttpFetch: Send + Sync {
    /// Fetches the body of `url`. Any non-success status is an error.
    async fn get(&self, url: &str, timeout: Duration) -> Result<Vec<u8>, FetchError>;

    /// Fetches `url` and decodes the body as UTF-8.
    async fn get_text(&self, url: &str, timeout: Duration) -> Result<String, FetchError> {
        let body = self.get(url, timeout).await?;
        Ok(String::from_utf8_lossy(&body).into_owned())
    }
}

/// Counters describing what the sender has done so far.
#[derive(Debug, Default, Clone)]
pub(crate) struct RequestStats {
    pub(crate) total_requests: u64,
    pub(crate) failed_requests: u64,
    pub(crate) timeouts: u64,
    pub(crate) bytes_downloaded: u64,
}

impl RequestStats {
    pub(crate) fn format_stats(&self) -> String {
        format!(
            "Requests: {} | Failed: {} | Timeouts: {} | Downloaded: {:.1} MB",
            self.total_requests,
            self.failed_requests,
            self.timeouts,
            self.bytes_downloaded as f64 / (1024.0 * 1024.0)
        )
    }
}

/// The sender used for every HTTP request to the wiki.
#[derive(Clone, Debug)]
pub(crate) struct RequestSender {
    client: Client,
    stats: Arc<RwLock<RequestStats>>,
}

impl RequestSender {
    /// Builds a sender that identifies itself with `user_agent`.
    pub(crate) fn new(user_agent: &str) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .user_agent(user_agent)
            .connect_timeout(Duration::from_secs(10))
            .pool_idle_timeout(Duration::from_secs(90))
            .tcp_nodelay(true)
            .gzip(true)
            .deflate(true)
            .brotli(true)
            .use_rustls_tls()
            .build()?;

        Ok(Self {
            client,
            stats: Arc::new(RwLock::new(RequestStats::default())),
        })
    }

    pub(crate) fn stats(&self) -> RequestStats {
        self.stats.read().clone()
    }

    fn record_failure(&self, timed_out: bool) {
        let mut stats = self.stats.write();
        stats.failed_requests += 1;
        if timed_out {
            stats.timeouts += 1;
        }
    }
}

#[async_trait]
impl HttpFetch for RequestSender {
    async fn get(&self, url: &str, timeout: Duration) -> Result<Vec<u8>, FetchError> {
        let start_time = Instant::now();
        self.stats.write().total_requests += 1;

        let transport = |source: reqwest::Error| {
            if source.is_timeout() {
                FetchError::Timeout { url: url.to_string() }
            } else {
                FetchError::Transport { url: url.to_string(), source }
            }
        };

        let response = match self.client.get(url).timeout(timeout).send().await {
            Ok(response) => response,
            Err(e) => {
                self.record_failure(e.is_timeout());
                warn!("GET {} failed in {:?}: {}", url, start_time.elapsed(), e);
                return Err(transport(e));
            }
        };

        let status = response.status();
        if !status.is_success() {
            self.record_failure(false);
            warn!("GET {} -> {}", url, status);
            return Err(FetchError::Status { url: url.to_string(), status: status.as_u16() });
        }

        let bytes = match response.bytes().await {
            Ok(bytes) => bytes,
            Err(e) => {
                self.record_failure(e.is_timeout());
                return Err(transport(e));
            }
        };

        self.stats.write().bytes_downloaded += bytes.len() as u64;
        debug!("GET {} -> {} ({} bytes) in {:?}", url, status, bytes.len(), start_time.elapsed());

        Ok(bytes.to_vec())
    }
}
