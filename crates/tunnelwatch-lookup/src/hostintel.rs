//! Host-intelligence client used for geolocation.
//!
//! Speaks the Shodan host endpoint (`GET /shodan/host/{ip}`); only the
//! handful of fields the enrichment pipeline needs are deserialized.

use async_trait::async_trait;
use governor::{DefaultDirectRateLimiter, RateLimiter};
use reqwest::Client as HttpClient;
use serde::Deserialize;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument, warn};
use tunnelwatch_core::{GeoPoint, LookupFailure, LookupResult, MonitorError};
use url::Url;

use crate::config::RateLimitConfig;
use crate::traits::GeoLookup;

/// The public host-intelligence API base URL
pub const DEFAULT_BASE_URL: &str = "https://api.shodan.io";

/// Default request timeout
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Coordinates from a host record; other fields are ignored
#[derive(Debug, Clone, Default, Deserialize)]
pub struct HostSummary {
    /// Latitude coordinate
    #[serde(default)]
    pub latitude: Option<f64>,

    /// Longitude coordinate
    #[serde(default)]
    pub longitude: Option<f64>,
}

impl HostSummary {
    /// Coordinates, if both halves are present
    #[must_use]
    pub fn location(&self) -> Option<GeoPoint> {
        GeoPoint::from_pair(self.latitude, self.longitude)
    }
}

/// Rate-limited host-intelligence client. Cheap to clone.
#[derive(Clone)]
pub struct HostIntelClient {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    http: HttpClient,
    api_key: String,
    base_url: String,
    timeout: Duration,
    rate_limiter: DefaultDirectRateLimiter,
}

impl std::fmt::Debug for HostIntelClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostIntelClient")
            .field("base_url", &self.inner.base_url)
            .field("timeout", &self.inner.timeout)
            .finish_non_exhaustive()
    }
}

impl HostIntelClient {
    /// Create a builder for custom configuration
    #[must_use]
    pub fn builder(api_key: impl Into<String>) -> HostIntelClientBuilder {
        HostIntelClientBuilder::new(api_key)
    }

    /// Fetch the host summary for an address
    #[instrument(skip(self), fields(service = "host-intel"))]
    pub async fn host(&self, ip: IpAddr) -> LookupResult<HostSummary> {
        self.inner.rate_limiter.until_ready().await;

        let url = self.host_url(ip)?;
        debug!(ip = %ip, "GET host summary");

        let response = self
            .inner
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| self.transport_failure(&e))?;

        let status = response.status();
        if status.is_success() {
            let body = response
                .text()
                .await
                .map_err(|e| self.transport_failure(&e))?;
            serde_json::from_str(&body).map_err(|e| LookupFailure::Malformed(e.to_string()))
        } else {
            Err(Self::status_failure(status.as_u16(), ip, response).await)
        }
    }

    fn host_url(&self, ip: IpAddr) -> LookupResult<Url> {
        let mut url = Url::parse(&format!("{}/shodan/host/{ip}", self.inner.base_url))
            .map_err(|e| LookupFailure::Unavailable(format!("invalid base URL: {e}")))?;
        url.query_pairs_mut()
            .append_pair("key", &self.inner.api_key)
            .append_pair("minify", "true");
        Ok(url)
    }

    fn transport_failure(&self, err: &reqwest::Error) -> LookupFailure {
        if err.is_timeout() {
            LookupFailure::Timeout(self.inner.timeout)
        } else {
            LookupFailure::Network(err.to_string())
        }
    }

    /// Convert an error response to a lookup failure
    async fn status_failure(status: u16, ip: IpAddr, response: reqwest::Response) -> LookupFailure {
        let body = response.text().await.unwrap_or_default();

        // Try to parse error message from JSON
        let message = serde_json::from_str::<serde_json::Value>(&body)
            .ok()
            .and_then(|v| v.get("error").and_then(|e| e.as_str()).map(String::from))
            .unwrap_or(body);

        match status {
            404 => LookupFailure::NotFound(ip.to_string()),
            401 | 403 => LookupFailure::Unavailable(format!("unauthorized: {message}")),
            429 => {
                warn!("rate limited by host-intel service");
                LookupFailure::Network("rate limited".into())
            }
            _ => LookupFailure::Network(format!("HTTP {status}: {message}")),
        }
    }
}

#[async_trait]
impl GeoLookup for HostIntelClient {
    async fn locate(&self, ip: IpAddr) -> LookupResult<GeoPoint> {
        self.host(ip).await?.location().ok_or_else(|| {
            LookupFailure::Malformed("host record has no complete coordinate pair".into())
        })
    }
}

/// Builder for configuring a [`HostIntelClient`]
pub struct HostIntelClientBuilder {
    api_key: String,
    base_url: String,
    timeout: Duration,
    user_agent: String,
    rate_limit: RateLimitConfig,
}

impl HostIntelClientBuilder {
    /// Create a new builder with the given API key
    #[must_use]
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout: DEFAULT_TIMEOUT,
            user_agent: format!("tunnelwatch/{}", env!("CARGO_PKG_VERSION")),
            rate_limit: RateLimitConfig::default(),
        }
    }

    /// Set the base URL (useful for testing)
    #[must_use]
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    /// Set the request timeout
    #[must_use]
    pub const fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the User-Agent header
    #[must_use]
    pub fn user_agent(mut self, agent: impl Into<String>) -> Self {
        self.user_agent = agent.into();
        self
    }

    /// Set the request budget
    #[must_use]
    pub const fn rate_limit(mut self, config: RateLimitConfig) -> Self {
        self.rate_limit = config;
        self
    }

    /// Build the client
    pub fn build(self) -> tunnelwatch_core::Result<HostIntelClient> {
        let http = HttpClient::builder()
            .timeout(self.timeout)
            .connect_timeout(self.timeout)
            .user_agent(&self.user_agent)
            .gzip(true)
            .build()
            .map_err(|e| MonitorError::Config(format!("failed to build HTTP client: {e}")))?;

        Ok(HostIntelClient {
            inner: Arc::new(ClientInner {
                http,
                api_key: self.api_key,
                base_url: self.base_url,
                timeout: self.timeout,
                rate_limiter: RateLimiter::direct(self.rate_limit.quota()),
            }),
        })
    }
}
