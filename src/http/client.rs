//! Thin HTTP client
//!
//! Wraps a `reqwest::Client` with:
//! - A base URL that request paths are resolved against
//! - Default headers (preview media types, user agent)
//! - An optional local throttle so the process stays polite between tokens
//!
//! It makes exactly one attempt per call. Retry and token rotation live in
//! [`RequestExecutor`](super::RequestExecutor).

use super::rate_limit::{Throttle, ThrottleConfig};
use crate::error::Result;
use crate::types::{ApiClass, JsonValue, Method};
use reqwest::{Client, Response};
use std::collections::HashMap;
use std::time::Duration;
use tracing::debug;

/// Default API root
pub const DEFAULT_API_URL: &str = "https://api.github.com/";

/// Topics (mercy), reactions (squirrel-girl) and issue events (starfox) previews
pub const PREVIEW_ACCEPT: &str = "application/vnd.github.mercy-preview+json,\
application/vnd.github.squirrel-girl-preview,\
application/vnd.github.starfox-preview+json";

/// Configuration for the HTTP client
#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    /// Base URL for relative request paths
    pub base_url: String,
    /// Request timeout
    pub timeout: Duration,
    /// Local throttle configuration
    pub throttle: Option<ThrottleConfig>,
    /// Default headers for all requests
    pub default_headers: HashMap<String, String>,
    /// User agent string
    pub user_agent: String,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        let mut default_headers = HashMap::new();
        default_headers.insert("Accept".to_string(), PREVIEW_ACCEPT.to_string());
        Self {
            base_url: DEFAULT_API_URL.to_string(),
            timeout: Duration::from_secs(30),
            throttle: Some(ThrottleConfig::default()),
            default_headers,
            user_agent: format!("gh-harvest/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl HttpClientConfig {
    /// Create a new config builder
    pub fn builder() -> HttpClientConfigBuilder {
        HttpClientConfigBuilder::default()
    }
}

/// Builder for HTTP client config
#[derive(Default)]
pub struct HttpClientConfigBuilder {
    config: HttpClientConfig,
}

impl HttpClientConfigBuilder {
    /// Set the base URL
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.config.base_url = url.into();
        self
    }

    /// Set the request timeout
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = timeout;
        self
    }

    /// Set the local throttle
    pub fn throttle(mut self, config: ThrottleConfig) -> Self {
        self.config.throttle = Some(config);
        self
    }

    /// Disable the local throttle
    pub fn no_throttle(mut self) -> Self {
        self.config.throttle = None;
        self
    }

    /// Add a default header
    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.config.default_headers.insert(key.into(), value.into());
        self
    }

    /// Set user agent
    pub fn user_agent(mut self, agent: impl Into<String>) -> Self {
        self.config.user_agent = agent.into();
        self
    }

    /// Build the config
    pub fn build(self) -> HttpClientConfig {
        self.config
    }
}

/// One fully rendered request
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedRequest {
    /// HTTP method
    pub method: Method,
    /// Path relative to the API root, or an absolute URL
    pub url: String,
    /// Query parameters
    pub query: Vec<(String, String)>,
    /// JSON body
    pub body: Option<JsonValue>,
    /// Rate-limit class the request counts against
    pub class: ApiClass,
}

impl PreparedRequest {
    /// GET request, classified from its URL
    pub fn get(url: impl Into<String>) -> Self {
        let url = url.into();
        Self {
            method: Method::GET,
            class: ApiClass::of(&url),
            url,
            query: Vec::new(),
            body: None,
        }
    }

    /// POST request with a JSON body, classified from its URL
    pub fn post(url: impl Into<String>, body: JsonValue) -> Self {
        let url = url.into();
        Self {
            method: Method::POST,
            class: ApiClass::of(&url),
            url,
            query: Vec::new(),
            body: Some(body),
        }
    }

    /// Add a query parameter
    #[must_use]
    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    /// Same request against a follow-up URL that already carries its query
    #[must_use]
    pub fn follow(&self, url: impl Into<String>) -> Self {
        let url = url.into();
        Self {
            method: self.method,
            class: ApiClass::of(&url),
            url,
            query: Vec::new(),
            body: self.body.clone(),
        }
    }
}

/// HTTP client
pub struct HttpClient {
    client: Client,
    config: HttpClientConfig,
    throttle: Option<Throttle>,
}

impl HttpClient {
    /// Create a new HTTP client with default configuration
    pub fn new() -> Result<Self> {
        Self::with_config(HttpClientConfig::default())
    }

    /// Create a new HTTP client with custom configuration
    pub fn with_config(config: HttpClientConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .user_agent(&config.user_agent)
            .build()?;

        let throttle = config.throttle.as_ref().map(Throttle::new);

        Ok(Self {
            client,
            config,
            throttle,
        })
    }

    /// Get the underlying reqwest client
    pub fn inner(&self) -> &Client {
        &self.client
    }

    /// Client configuration
    pub fn config(&self) -> &HttpClientConfig {
        &self.config
    }

    /// Send one request, optionally authorized
    pub async fn send(
        &self,
        request: &PreparedRequest,
        authorization: Option<&str>,
    ) -> std::result::Result<Response, reqwest::Error> {
        if let Some(ref throttle) = self.throttle {
            throttle.wait().await;
        }

        let full_url = self.build_url(&request.url);
        let mut req = self
            .client
            .request(request.method.into(), &full_url)
            .timeout(self.config.timeout);

        for (key, value) in &self.config.default_headers {
            req = req.header(key.as_str(), value.as_str());
        }

        if let Some(authorization) = authorization {
            req = req.header("Authorization", authorization);
        }

        if !request.query.is_empty() {
            req = req.query(&request.query);
        }

        if let Some(ref body) = request.body {
            req = req.json(body);
        }

        debug!(method = ?request.method, url = %full_url, "sending request");
        req.send().await
    }

    /// Check if throttling is enabled
    pub fn has_throttle(&self) -> bool {
        self.throttle.is_some()
    }

    /// Build full URL from path
    pub fn build_url(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            return path.to_string();
        }

        let base = self.config.base_url.trim_end_matches('/');
        let path = path.trim_start_matches('/');
        format!("{base}/{path}")
    }
}

impl std::fmt::Debug for HttpClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpClient")
            .field("config", &self.config)
            .field("has_throttle", &self.throttle.is_some())
            .finish_non_exhaustive()
    }
}
