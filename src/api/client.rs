//! Typed REST client for the lead-management backend.
//!
//! One [`ApiClient`] is built from [`Config`] and cloned wherever a
//! component needs network access (reqwest clients are cheap to clone).
//! Every request goes through a single timeout/classify/decode path; the
//! authentication gate itself is assumed satisfied — the client only
//! attaches the configured bearer token.

use crate::api::types::{EventSummary, LeadDetail, LeadSummary, Page, Scope};
use crate::config::Config;
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use std::time::Duration;
use thiserror::Error;
use url::Url;

/// Errors that can occur while talking to the backend.
///
/// Everything here is recoverable from the pipeline's point of view: the
/// caller decides whether to surface it (bootstrap, load-more) or swallow
/// and retry on the next natural trigger (poll tick, enrichment access).
#[derive(Debug, Error)]
pub enum FetchError {
    /// Network-level error (DNS, connection, TLS, etc.)
    #[error("Request failed: {0}")]
    Network(#[from] reqwest::Error),
    /// Request exceeded the configured timeout
    #[error("Request timed out")]
    Timeout,
    /// HTTP response with non-2xx status code
    #[error("HTTP error: status {0}")]
    HttpStatus(u16),
    /// Response body could not be decoded as the expected JSON shape
    #[error("Invalid response body: {0}")]
    Decode(String),
    /// The configured base URL is not parseable
    #[error("Invalid base URL: {0}")]
    BaseUrl(String),
}

impl FetchError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, FetchError::HttpStatus(404))
    }
}

/// Ties a summary type to its paginated list endpoint.
pub trait PagedCollection: DeserializeOwned + Send + 'static {
    /// Endpoint path relative to the API base.
    const PATH: &'static str;
}

impl PagedCollection for LeadSummary {
    const PATH: &'static str = "processed_leads/";
}

impl PagedCollection for EventSummary {
    const PATH: &'static str = "lead-events/";
}

#[derive(Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base: Url,
    token: Option<SecretString>,
    timeout: Duration,
}

impl ApiClient {
    /// Build a client from configuration.
    ///
    /// The base URL is normalized to end with a slash so relative joins
    /// behave predictably.
    pub fn new(config: &Config) -> Result<Self, FetchError> {
        let mut base = config.base_url.clone();
        if !base.ends_with('/') {
            base.push('/');
        }
        let base = Url::parse(&base).map_err(|e| FetchError::BaseUrl(e.to_string()))?;
        let http = reqwest::Client::builder()
            .build()
            .map_err(FetchError::Network)?;

        Ok(Self {
            http,
            base,
            token: config.api_token.clone().map(SecretString::from),
            timeout: Duration::from_secs(config.request_timeout_secs),
        })
    }

    /// First page of a paginated collection, scoped to a business filter.
    pub async fn first_page<T: PagedCollection>(
        &self,
        scope: &Scope,
    ) -> Result<Page<T>, FetchError> {
        let mut url = self.join(T::PATH)?;
        if let Some(id) = scope.business_id() {
            url.query_pairs_mut().append_pair("business_id", id);
        }
        self.get_json(url).await
    }

    /// Fetch an opaque cursor URL verbatim. The backend owns the cursor
    /// format; we never inspect or rebuild it.
    pub async fn page_at<T: PagedCollection>(&self, cursor: &str) -> Result<Page<T>, FetchError> {
        let url = Url::parse(cursor).map_err(|e| FetchError::Decode(e.to_string()))?;
        self.get_json(url).await
    }

    /// Delta endpoint: events with `event_id > after_id`, flat array
    /// (no pagination envelope).
    pub async fn events_after(
        &self,
        scope: &Scope,
        after_id: i64,
    ) -> Result<Vec<EventSummary>, FetchError> {
        let mut url = self.join(EventSummary::PATH)?;
        {
            let mut pairs = url.query_pairs_mut();
            pairs.append_pair("after_id", &after_id.to_string());
            if let Some(id) = scope.business_id() {
                pairs.append_pair("business_id", id);
            }
        }
        self.get_json(url).await
    }

    /// Heavyweight detail record for one lead. 404s are returned as
    /// [`FetchError::HttpStatus`] — the detail cache translates them into
    /// the typed fallback.
    pub async fn lead_detail(&self, lead_id: &str) -> Result<LeadDetail, FetchError> {
        let url = self.record_url(&["lead-details", lead_id])?;
        self.get_json(url).await
    }

    /// Best-effort "latest event for this lead" lookup used for
    /// cross-linking. 404 and an empty body both mean "no event".
    pub async fn latest_event(&self, lead_id: &str) -> Result<Option<EventSummary>, FetchError> {
        let url = self.record_url(&["lead-events", lead_id, "latest"])?;
        let response = match self.send(url).await {
            Ok(r) => r,
            Err(e) if e.is_not_found() => return Ok(None),
            Err(e) => return Err(e),
        };
        let bytes = response.bytes().await.map_err(FetchError::Network)?;
        let body = bytes.as_ref();
        if body.is_empty() || body == b"null" || body == b"{}" {
            return Ok(None);
        }
        serde_json::from_slice(body)
            .map(Some)
            .map_err(|e| FetchError::Decode(e.to_string()))
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    fn join(&self, path: &str) -> Result<Url, FetchError> {
        self.base
            .join(path)
            .map_err(|e| FetchError::BaseUrl(e.to_string()))
    }

    /// URL for a single-record endpoint, with path segments escaped
    /// (lead ids are backend-supplied strings). A trailing empty segment
    /// yields the trailing slash the backend routes expect.
    fn record_url(&self, segments: &[&str]) -> Result<Url, FetchError> {
        let mut url = self.base.clone();
        {
            let mut parts = url
                .path_segments_mut()
                .map_err(|_| FetchError::BaseUrl("base URL cannot have segments".into()))?;
            parts.pop_if_empty();
            for segment in segments {
                parts.push(segment);
            }
            parts.push("");
        }
        Ok(url)
    }

    async fn send(&self, url: Url) -> Result<reqwest::Response, FetchError> {
        let mut request = self.http.get(url.clone());
        if let Some(token) = &self.token {
            request = request.header("Authorization", format!("Bearer {}", token.expose_secret()));
        }

        let response = tokio::time::timeout(self.timeout, request.send())
            .await
            .map_err(|_| FetchError::Timeout)?
            .map_err(FetchError::Network)?;

        let status = response.status();
        if !status.is_success() {
            tracing::debug!(url = %url, status = %status, "Backend returned error status");
            return Err(FetchError::HttpStatus(status.as_u16()));
        }
        Ok(response)
    }

    async fn get_json<T: DeserializeOwned>(&self, url: Url) -> Result<T, FetchError> {
        let response = self.send(url).await?;
        let bytes = response.bytes().await.map_err(FetchError::Network)?;
        serde_json::from_slice(&bytes).map_err(|e| FetchError::Decode(e.to_string()))
    }
}
