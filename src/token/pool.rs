//! Token pool with round-robin, readiness-filtered selection
//!
//! Selection is not sticky: any token that still has quota for the requested
//! class may be returned. The round-robin cursor is an `AtomicUsize` and every
//! readiness check happens under the token's own lock, so concurrent workers
//! cannot both claim the last request of a token.

use super::types::{Acquire, RateLimit, Secret, Token, TokenHandle, TokenSnapshot};
use crate::error::{Error, Result};
use crate::types::{unix_now, ApiClass, JsonValue, UnixTime};
use reqwest::header::HeaderMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Credentials whose probed core limit is below this are treated as revoked
pub const DEFAULT_MIN_CORE_LIMIT: u64 = 100;

/// Fallback when a token is exhausted but its reset time is unknown
const UNKNOWN_RESET_RETRY_SECS: i64 = 60;

/// Pool of credentials
#[derive(Debug)]
pub struct TokenPool {
    tokens: Vec<TokenHandle>,
    next_index: AtomicUsize,
    min_core_limit: u64,
}

impl TokenPool {
    /// Build a pool from credential strings
    ///
    /// An empty list yields a single anonymous token.
    pub fn new(credentials: Vec<String>) -> Self {
        let tokens: Vec<TokenHandle> = if credentials.is_empty() {
            warn!("No tokens provided. GitHub API will be limited to 60 requests an hour");
            vec![Arc::new(Token::new(0, None))]
        } else {
            credentials
                .into_iter()
                .enumerate()
                .map(|(index, credential)| Arc::new(Token::new(index, Some(Secret::new(credential)))))
                .collect()
        };

        info!(tokens = tokens.len(), "token pool initialized");
        Self {
            tokens,
            next_index: AtomicUsize::new(0),
            min_core_limit: DEFAULT_MIN_CORE_LIMIT,
        }
    }

    /// Pool with only the anonymous token
    pub fn anonymous() -> Self {
        Self::new(Vec::new())
    }

    /// Override the "too small to be real" core limit threshold
    #[must_use]
    pub fn with_min_core_limit(mut self, min_core_limit: u64) -> Self {
        self.min_core_limit = min_core_limit;
        self
    }

    /// Number of tokens, never zero
    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    /// Always false, kept for API symmetry with `len`
    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// All tokens in pool order
    pub fn tokens(&self) -> &[TokenHandle] {
        &self.tokens
    }

    /// Token by pool index
    pub fn get(&self, index: usize) -> Option<&TokenHandle> {
        self.tokens.get(index)
    }

    /// Get a ready token for `class` now, or the time one will be ready
    pub fn acquire(&self, class: ApiClass) -> Result<Acquire> {
        self.acquire_at(class, unix_now())
    }

    /// Same as [`acquire`](Self::acquire) with an explicit clock
    pub fn acquire_at(&self, class: ApiClass, now: UnixTime) -> Result<Acquire> {
        let n = self.tokens.len();
        let start = self.next_index.fetch_add(1, Ordering::Relaxed) % n;

        let mut earliest_reset: Option<UnixTime> = None;
        let mut any_valid = false;

        for offset in 0..n {
            let token = &self.tokens[(start + offset) % n];
            let mut state = token.lock();
            if state.invalid {
                continue;
            }
            any_valid = true;

            let limit = state.limits.entry(class).or_default();
            if limit.is_exhausted(now) {
                let reset = limit.reset.unwrap_or(now + UNKNOWN_RESET_RETRY_SECS);
                earliest_reset = Some(earliest_reset.map_or(reset, |e| e.min(reset)));
                continue;
            }

            if limit.window_passed(now) {
                // The window rolled over; the next response will tell us the new numbers.
                *limit = RateLimit {
                    limit: limit.limit,
                    ..RateLimit::unknown()
                };
            }
            if let Some(remaining) = limit.remaining.as_mut() {
                *remaining = remaining.saturating_sub(1);
            }
            drop(state);

            debug!(token = %token.label(), %class, "token acquired");
            return Ok(Acquire::Ready(Arc::clone(token)));
        }

        if !any_valid {
            return Err(Error::NoUsableTokens);
        }

        let until = earliest_reset.unwrap_or(now + UNKNOWN_RESET_RETRY_SECS);
        debug!(%class, until, "all tokens exhausted");
        Ok(Acquire::Wait { until })
    }

    /// Overwrite the token's limit for `class` from response headers
    ///
    /// Returns false and leaves the state untouched when the headers are absent.
    pub fn update(&self, token: &Token, headers: &HeaderMap, class: ApiClass) -> bool {
        match parse_rate_headers(headers) {
            Some(limit) => {
                self.record(token, class, limit);
                true
            }
            None => false,
        }
    }

    /// Return a request reserved by `acquire` that the server never counted
    ///
    /// Only a known `remaining` is restored, and never above the window size.
    pub fn release(&self, token: &Token, class: ApiClass) {
        let mut state = token.lock();
        if let Some(limit) = state.limits.get_mut(&class) {
            if let Some(remaining) = limit.remaining.as_mut() {
                let restored = remaining.saturating_add(1);
                *remaining = limit.limit.map_or(restored, |size| restored.min(size));
            }
        }
    }

    /// Overwrite the token's limit for `class`
    pub fn record(&self, token: &Token, class: ApiClass, limit: RateLimit) {
        token.lock().limits.insert(class, limit);
    }

    /// Seed every class from a `rate_limit` payload
    ///
    /// Accepts either the full response or its `resources` object. Classes
    /// missing from the payload become unknown. A credentialed token whose
    /// core limit is below the configured threshold is flagged invalid.
    pub fn apply_probe(&self, token: &Token, payload: &JsonValue) -> Result<()> {
        let resources = payload.get("resources").unwrap_or(payload);
        if !resources.is_object() {
            return Err(Error::schema("rate_limit payload has no resources object"));
        }

        let mut core_limit = None;
        {
            let mut state = token.lock();
            for class in ApiClass::ALL {
                let entry = resources.get(class.as_str());
                let limit = RateLimit {
                    remaining: entry.and_then(|e| e.get("remaining")).and_then(JsonValue::as_u64),
                    reset: entry.and_then(|e| e.get("reset")).and_then(JsonValue::as_i64),
                    limit: entry.and_then(|e| e.get("limit")).and_then(JsonValue::as_u64),
                };
                if class == ApiClass::Core {
                    core_limit = limit.limit;
                }
                state.limits.insert(class, limit);
            }
        }

        if !token.is_anonymous() {
            if let Some(limit) = core_limit.filter(|limit| *limit < self.min_core_limit) {
                self.mark_invalid(
                    token,
                    &format!("core limit {limit} is below {}", self.min_core_limit),
                );
            }
        }
        Ok(())
    }

    /// Permanently exclude a token from selection for this run
    pub fn mark_invalid(&self, token: &Token, reason: &str) {
        let mut state = token.lock();
        if !state.invalid {
            state.invalid = true;
            warn!(token = %token.label(), reason, "credential flagged invalid");
        }
    }

    /// Number of tokens still eligible for selection
    pub fn usable(&self) -> usize {
        self.tokens.iter().filter(|t| !t.is_invalid()).count()
    }

    /// Per-token view of the current limits
    pub fn snapshot(&self) -> Vec<TokenSnapshot> {
        self.tokens
            .iter()
            .map(|token| TokenSnapshot {
                index: token.index(),
                anonymous: token.is_anonymous(),
                invalid: token.is_invalid(),
                limits: ApiClass::ALL
                    .iter()
                    .map(|class| (*class, token.limit(*class)))
                    .collect(),
            })
            .collect()
    }
}

/// Read the three standard rate-limit headers
///
/// Returns `None` unless `X-RateLimit-Remaining` is present and numeric.
pub fn parse_rate_headers(headers: &HeaderMap) -> Option<RateLimit> {
    fn header<T: std::str::FromStr>(headers: &HeaderMap, name: &str) -> Option<T> {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.trim().parse().ok())
    }

    let remaining = header::<u64>(headers, "x-ratelimit-remaining")?;
    Some(RateLimit {
        remaining: Some(remaining),
        reset: header(headers, "x-ratelimit-reset"),
        limit: header(headers, "x-ratelimit-limit"),
    })
}
