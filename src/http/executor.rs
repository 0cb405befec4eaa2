//! Request executor
//!
//! Issues calls through a pooled token, keeps the token's bookkeeping current
//! from every response, and classifies the outcome:
//!
//! - 2xx → `Success`
//! - 404 / 410 → `NotFound` (terminal, not retried)
//! - 403 with zero remaining, or 403/429 with `Retry-After` → `RateLimited`
//! - 401 → `CredentialInvalid` (token excluded for the rest of the run)
//! - anything else, including transport failures → `TransientError`
//!
//! [`RequestExecutor::fetch_with_retry`] is the caller-side loop on top of that: rotate
//! or sleep on rate limits, retry transient failures a bounded number of
//! times, and only surface what is left.

use super::client::{HttpClient, PreparedRequest};
use super::retry::RetryPolicy;
use crate::error::{Error, Result};
use crate::shutdown::{sleep_or_cancel, SharedShutdown};
use crate::token::{parse_rate_headers, Acquire, RateLimit, Token, TokenPool};
use crate::types::{unix_now, ApiClass, JsonValue, UnixTime};
use async_trait::async_trait;
use futures::future::join_all;
use reqwest::header::HeaderMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// How long a token rejected without a reset time stays out of rotation
const UNKNOWN_RESET_SECS: i64 = 60;

/// A successful, decoded response
#[derive(Debug, Clone)]
pub struct ApiResponse {
    /// HTTP status
    pub status: u16,
    /// Response headers (rate limits, `Link`)
    pub headers: HeaderMap,
    /// Decoded JSON body, `Null` for an empty body
    pub body: JsonValue,
    /// URL as requested
    pub url: String,
}

/// Outcome of one call through one token
#[derive(Debug, Clone)]
pub enum FetchResult {
    /// 2xx with a decodable body
    Success(ApiResponse),
    /// The entity does not exist
    NotFound,
    /// The token is out of quota; `reset` is when it refills, if known
    RateLimited {
        /// Unix time the quota refills
        reset: Option<UnixTime>,
    },
    /// The credential was rejected
    CredentialInvalid,
    /// Anything that may heal by itself
    TransientError(String),
}

/// Status-level classification, before the body is read
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseKind {
    /// 2xx
    Success,
    /// 404 / 410
    NotFound,
    /// Quota exhausted or secondary rate limit
    RateLimited {
        /// Unix time the quota refills, if known
        reset: Option<UnixTime>,
    },
    /// 401
    CredentialInvalid,
    /// Retryable failure
    Transient,
}

/// Classify a response by status and rate-limit headers
pub fn classify_status(status: u16, headers: &HeaderMap, now: UnixTime) -> ResponseKind {
    match status {
        200..=299 => ResponseKind::Success,
        404 | 410 => ResponseKind::NotFound,
        401 => ResponseKind::CredentialInvalid,
        403 | 429 => {
            let limit = parse_rate_headers(headers);
            if limit.is_some_and(|l| l.remaining == Some(0)) {
                return ResponseKind::RateLimited {
                    reset: limit.and_then(|l| l.reset),
                };
            }
            match retry_after(headers) {
                Some(secs) => ResponseKind::RateLimited {
                    reset: Some(now + secs),
                },
                None if status == 429 => ResponseKind::RateLimited { reset: None },
                None => ResponseKind::Transient,
            }
        }
        _ => ResponseKind::Transient,
    }
}

/// GraphQL reports quota exhaustion as a 200 with an error of type `RATE_LIMITED`
pub fn is_graphql_rate_limited(body: &JsonValue) -> bool {
    body.get("errors")
        .and_then(JsonValue::as_array)
        .is_some_and(|errors| {
            errors
                .iter()
                .any(|e| e.get("type").and_then(JsonValue::as_str) == Some("RATE_LIMITED"))
        })
}

fn retry_after(headers: &HeaderMap) -> Option<i64> {
    headers
        .get("retry-after")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.trim().parse().ok())
}

/// Result of a request after the retry policy has run
#[derive(Debug, Clone)]
pub enum Fetched {
    /// The entity exists and this is its page
    Found(ApiResponse),
    /// The entity does not exist
    NotFound,
}

/// Anything that can fetch one page: the executor, or a scripted fake in tests
#[async_trait]
pub trait PageFetcher: Send + Sync {
    /// Fetch one request, retrying as the implementation sees fit
    async fn fetch(&self, request: &PreparedRequest) -> Result<Fetched>;
}

/// Executes requests through the token pool
#[derive(Debug)]
pub struct RequestExecutor {
    client: HttpClient,
    pool: Arc<TokenPool>,
    policy: RetryPolicy,
    shutdown: Option<SharedShutdown>,
}

impl RequestExecutor {
    /// Create an executor with the default retry policy
    pub fn new(client: HttpClient, pool: Arc<TokenPool>) -> Self {
        Self {
            client,
            pool,
            policy: RetryPolicy::default(),
            shutdown: None,
        }
    }

    /// Set the retry policy
    #[must_use]
    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Let sleeps observe a shutdown signal
    #[must_use]
    pub fn with_shutdown(mut self, shutdown: SharedShutdown) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    /// The token pool
    pub fn pool(&self) -> &Arc<TokenPool> {
        &self.pool
    }

    /// The retry policy
    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Issue one call through `token` and classify it
    ///
    /// The token's limits for the request class are updated from the
    /// response headers whatever the outcome.
    pub async fn execute(&self, token: &Token, request: &PreparedRequest) -> FetchResult {
        let authorization = token.authorization();
        let response = match self.client.send(request, authorization.as_deref()).await {
            Ok(response) => response,
            Err(e) => {
                self.pool.release(token, request.class);
                return FetchResult::TransientError(format!("transport error: {e}"));
            }
        };

        let status = response.status().as_u16();
        let headers = response.headers().clone();
        let counted = self.pool.update(token, &headers, request.class);

        match classify_status(status, &headers, unix_now()) {
            ResponseKind::Success => {}
            ResponseKind::NotFound => return FetchResult::NotFound,
            ResponseKind::RateLimited { reset } => return FetchResult::RateLimited { reset },
            ResponseKind::CredentialInvalid => {
                self.pool.mark_invalid(token, "401 Unauthorized");
                return FetchResult::CredentialInvalid;
            }
            ResponseKind::Transient => {
                if !counted {
                    self.pool.release(token, request.class);
                }
                let body = response.text().await.unwrap_or_default();
                return FetchResult::TransientError(format!("HTTP {status}: {}", truncate(&body)));
            }
        }

        let text = match response.text().await {
            Ok(text) => text,
            Err(e) => return FetchResult::TransientError(format!("failed to read body: {e}")),
        };
        let body = if text.trim().is_empty() {
            JsonValue::Null
        } else {
            match serde_json::from_str(&text) {
                Ok(body) => body,
                Err(e) => return FetchResult::TransientError(format!("invalid JSON body: {e}")),
            }
        };

        if request.class == ApiClass::Graphql && is_graphql_rate_limited(&body) {
            return FetchResult::RateLimited {
                reset: parse_rate_headers(&headers).and_then(|l| l.reset),
            };
        }

        FetchResult::Success(ApiResponse {
            status,
            headers,
            body,
            url: request.url.clone(),
        })
    }

    /// Acquire, execute, and apply the retry policy until the request
    /// succeeds, is found missing, or the transient budget runs out
    ///
    /// The budget counts consecutive transient failures; a rate-limit or
    /// credential rotation starts it over.
    pub async fn fetch_with_retry(&self, request: &PreparedRequest) -> Result<Fetched> {
        let mut transient_failures = 0u32;

        loop {
            self.check_cancelled()?;

            let token = match self.pool.acquire(request.class)? {
                Acquire::Ready(token) => token,
                wait @ Acquire::Wait { .. } => {
                    let now = unix_now();
                    let delay = wait.wait_duration(now).unwrap_or_default() + self.policy.reset_grace;
                    info!(
                        class = %request.class,
                        seconds = delay.as_secs(),
                        "all tokens exhausted, sleeping until the earliest reset"
                    );
                    self.pause(delay).await?;
                    continue;
                }
            };

            match self.execute(&token, request).await {
                FetchResult::Success(response) => return Ok(Fetched::Found(response)),
                FetchResult::NotFound => {
                    debug!(url = %request.url, "entity not found");
                    return Ok(Fetched::NotFound);
                }
                FetchResult::RateLimited { reset } => {
                    debug!(token = %token.label(), ?reset, "token not ready, rotating");
                    transient_failures = 0;
                    let now = unix_now();
                    let known = token.limit(request.class);
                    // A reset at or before our clock still parks the token for a second.
                    let reset = reset
                        .or(known.reset)
                        .unwrap_or(now + UNKNOWN_RESET_SECS)
                        .max(now + 1);
                    self.pool.record(
                        &token,
                        request.class,
                        RateLimit {
                            remaining: Some(0),
                            reset: Some(reset),
                            limit: known.limit,
                        },
                    );
                }
                FetchResult::CredentialInvalid => {
                    debug!(token = %token.label(), "credential rejected, rotating");
                    transient_failures = 0;
                }
                FetchResult::TransientError(cause) => {
                    transient_failures += 1;
                    if transient_failures >= self.policy.max_transient_attempts {
                        return Err(Error::TransientExhausted {
                            url: request.url.clone(),
                            attempts: transient_failures,
                            cause,
                        });
                    }
                    let delay = self.policy.backoff_for(transient_failures - 1);
                    warn!(
                        url = %request.url,
                        attempt = transient_failures,
                        max = self.policy.max_transient_attempts,
                        %cause,
                        "transient failure, retrying in {delay:?}"
                    );
                    self.pause(delay).await?;
                }
            }
        }
    }

    /// Seed a token's limits from the `rate_limit` endpoint
    ///
    /// The probe does not count against the quota, so it is sent even on
    /// exhausted tokens and without going through `acquire`.
    pub async fn probe(&self, token: &Token) -> Result<()> {
        let request = PreparedRequest::get("rate_limit");
        let response = self
            .client
            .send(&request, token.authorization().as_deref())
            .await?;
        let status = response.status().as_u16();

        if status == 401 {
            self.pool.mark_invalid(token, "401 Unauthorized on rate_limit probe");
            return Err(Error::CredentialInvalid {
                token: token.index(),
                message: "401 Unauthorized".to_string(),
            });
        }
        if !(200..300).contains(&status) {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::http_status(status, truncate(&body)));
        }

        let payload: JsonValue = response.json().await?;
        self.pool.apply_probe(token, &payload)?;
        debug!(
            token = %token.label(),
            core = ?token.limit(ApiClass::Core).remaining,
            search = ?token.limit(ApiClass::Search).remaining,
            "token probed"
        );
        Ok(())
    }

    /// Probe every token concurrently; individual failures are logged, not fatal
    pub async fn probe_all(&self) -> Result<()> {
        let probes = self
            .pool
            .tokens()
            .iter()
            .filter(|token| !token.is_invalid())
            .map(|token| async move { (token, self.probe(token).await) });

        for (token, result) in join_all(probes).await {
            if let Err(e) = result {
                warn!(token = %token.label(), error = %e, "rate limit probe failed");
            }
        }

        if self.pool.usable() == 0 {
            return Err(Error::NoUsableTokens);
        }
        info!(
            tokens = self.pool.len(),
            usable = self.pool.usable(),
            "token limits synchronized"
        );
        Ok(())
    }

    fn check_cancelled(&self) -> Result<()> {
        match &self.shutdown {
            Some(shutdown) if shutdown.is_shutdown_requested() => Err(Error::Cancelled),
            _ => Ok(()),
        }
    }

    async fn pause(&self, delay: Duration) -> Result<()> {
        sleep_or_cancel(delay, self.shutdown.as_deref()).await
    }
}

#[async_trait]
impl PageFetcher for RequestExecutor {
    async fn fetch(&self, request: &PreparedRequest) -> Result<Fetched> {
        self.fetch_with_retry(request).await
    }
}

fn truncate(body: &str) -> String {
    const MAX: usize = 200;
    if body.len() <= MAX {
        return body.to_string();
    }
    let mut end = MAX;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &body[..end])
}
