use futures::StreamExt;
use rand::seq::SliceRandom;
use rand::Rng;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, USER_AGENT};
use reqwest::redirect::Policy;
use std::time::Duration;
use thiserror::Error;

use super::{parse_feed, scrape_page, RawItem};
use crate::config::{Config, FetchMode, SourceConfig};

const MAX_RESPONSE_SIZE: usize = 10 * 1024 * 1024; // 10MB
const MAX_REDIRECTS: usize = 5;

/// Errors that can occur while fetching one source.
///
/// Every variant is scoped to a single source: [`Fetcher::fetch_all`] logs it
/// and moves on to the next one.
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
    /// Feed document could not be parsed as RSS, Atom or JSON Feed
    #[error("Parse error: {0}")]
    Parse(String),
    /// Response body exceeded the 10MB size limit
    #[error("Response too large")]
    ResponseTooLarge,
    /// Response was incomplete (received fewer bytes than Content-Length)
    #[error("Incomplete response: expected {expected} bytes, received {received}")]
    IncompleteResponse { expected: u64, received: usize },
}

/// Politeness and extraction settings shared by every request.
#[derive(Debug, Clone)]
pub struct FetchSettings {
    pub max_items_per_source: usize,
    pub request_timeout: Duration,
    /// Bounds of the random delay slept before each source request
    pub min_delay: Duration,
    pub max_delay: Duration,
    /// Fixed pause between consecutive sources in `fetch_all`
    pub source_pause: Duration,
    pub user_agents: Vec<String>,
}

impl FetchSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_items_per_source: config.max_items_per_source,
            request_timeout: config.request_timeout(),
            min_delay: Duration::from_millis(config.min_delay_ms),
            max_delay: Duration::from_millis(config.max_delay_ms),
            source_pause: Duration::from_millis(config.source_pause_ms),
            user_agents: config.user_agents.clone(),
        }
    }

    /// Settings with all pacing disabled.
    pub fn without_delays(mut self) -> Self {
        self.min_delay = Duration::ZERO;
        self.max_delay = Duration::ZERO;
        self.source_pause = Duration::ZERO;
        self
    }
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

/// Redirect policy with loop detection and limited hops.
fn create_redirect_policy() -> Policy {
    Policy::custom(|attempt| {
        if attempt.previous().len() >= MAX_REDIRECTS {
            return attempt.error(format!("Too many redirects (max {MAX_REDIRECTS})"));
        }

        let url = attempt.url();
        if attempt.previous().iter().any(|prev| prev.as_str() == url.as_str()) {
            return attempt.error("Redirect loop detected");
        }

        tracing::debug!(
            from = %attempt.previous().last().map(|u| u.as_str()).unwrap_or("initial"),
            to = %url,
            hop = attempt.previous().len() + 1,
            "Following redirect"
        );
        attempt.follow()
    })
}

/// HTTP source fetcher.
///
/// Requests go out one source at a time with a randomized delay before each
/// and a rotating `User-Agent`. Nothing is retried; a failed source simply
/// contributes no items until the next run.
#[derive(Debug, Clone)]
pub struct Fetcher {
    client: reqwest::Client,
    settings: FetchSettings,
}

impl Fetcher {
    pub fn new(settings: FetchSettings) -> Result<Self, FetchError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static(
                "text/html,application/xhtml+xml,application/xml;q=0.9,image/webp,*/*;q=0.8",
            ),
        );
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.5"));

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .redirect(create_redirect_policy())
            .pool_max_idle_per_host(2)
            .pool_idle_timeout(Duration::from_secs(30))
            .tcp_keepalive(Duration::from_secs(60))
            .timeout(settings.request_timeout)
            .build()?;

        Ok(Self { client, settings })
    }

    /// Fetches and extracts one source according to its mode.
    ///
    /// # Errors
    ///
    /// - [`FetchError::Network`] - Connection or TLS errors
    /// - [`FetchError::Timeout`] - Request exceeded the configured timeout
    /// - [`FetchError::HttpStatus`] - Non-2xx HTTP response
    /// - [`FetchError::ResponseTooLarge`] - Response exceeded 10MB
    /// - [`FetchError::Parse`] - Feed-mode body is not a feed
    pub async fn fetch_source(&self, source: &SourceConfig) -> Result<Vec<RawItem>, FetchError> {
        let delay = self.request_delay();
        if !delay.is_zero() {
            tracing::trace!(source = %source.name, delay_ms = delay.as_millis() as u64, "Pacing request");
            tokio::time::sleep(delay).await;
        }

        let mut request = self.client.get(&source.url);
        if let Some(agent) = self.pick_user_agent() {
            request = request.header(USER_AGENT, agent);
        }

        let response = tokio::time::timeout(self.settings.request_timeout, request.send())
            .await
            .map_err(|_| FetchError::Timeout)?
            .map_err(|e| {
                if e.is_timeout() {
                    FetchError::Timeout
                } else {
                    FetchError::Network(e)
                }
            })?;

        if !response.status().is_success() {
            return Err(FetchError::HttpStatus(response.status().as_u16()));
        }

        let bytes = tokio::time::timeout(
            self.settings.request_timeout,
            read_limited_bytes(response, MAX_RESPONSE_SIZE),
        )
        .await
        .map_err(|_| FetchError::Timeout)??;

        let max_items = self.settings.max_items_per_source;
        let items = match source.mode {
            FetchMode::Feed => parse_feed(&bytes, source, max_items)
                .map_err(|e| FetchError::Parse(e.to_string()))?,
            FetchMode::PageScrape => scrape_page(&String::from_utf8_lossy(&bytes), source, max_items),
        };

        tracing::info!(
            source = %source.name,
            mode = ?source.mode,
            items = items.len(),
            "Fetched source"
        );
        Ok(items)
    }

    /// Fetches every enabled source in order and returns the union of their items.
    ///
    /// A failing source is logged and contributes nothing; this never fails.
    pub async fn fetch_all(&self, sources: &[SourceConfig]) -> Vec<RawItem> {
        let mut items = Vec::new();
        let mut first = true;

        for source in sources.iter().filter(|s| s.enabled) {
            if !first && !self.settings.source_pause.is_zero() {
                tokio::time::sleep(self.settings.source_pause).await;
            }
            first = false;

            match self.fetch_source(source).await {
                Ok(found) => items.extend(found),
                Err(e) => {
                    tracing::warn!(
                        source = %source.name,
                        url = %source.url,
                        error = %e,
                        "Source fetch failed, skipping"
                    );
                }
            }
        }

        items
    }

    fn request_delay(&self) -> Duration {
        let min = self.settings.min_delay.as_millis() as u64;
        let max = self.settings.max_delay.as_millis() as u64;
        if max <= min {
            return Duration::from_millis(min);
        }
        Duration::from_millis(rand::thread_rng().gen_range(min..=max))
    }

    fn pick_user_agent(&self) -> Option<&str> {
        self.settings
            .user_agents
            .choose(&mut rand::thread_rng())
            .map(String::as_str)
            .filter(|ua| !ua.trim().is_empty())
    }
}

async fn read_limited_bytes(
    response: reqwest::Response,
    limit: usize,
) -> Result<Vec<u8>, FetchError> {
    let expected_length = response.content_length();

    // Fast path: check Content-Length header
    if let Some(len) = expected_length {
        if len as usize > limit {
            return Err(FetchError::ResponseTooLarge);
        }
    }

    let mut bytes = Vec::new();
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(FetchError::Network)?;
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
