//! Token types
//!
//! A token is long-lived: it is created when the pool is built and mutated
//! after every response carrying rate-limit headers, or by an explicit probe.

use crate::types::{ApiClass, UnixTime};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// Sensitive value - redacted in Debug/Display/logs
#[derive(Clone, PartialEq, Eq)]
pub struct Secret(String);

impl Secret {
    /// Wrap a sensitive string
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Expose the inner value (use sparingly)
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[REDACTED]")
    }
}

impl fmt::Display for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[REDACTED]")
    }
}

/// Last known quota for one API class
///
/// `None` means unknown. Unknown is never read as unlimited: a token with
/// unknown remaining is only handed out so that the response can teach us
/// the real numbers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RateLimit {
    /// Requests left in the current window
    pub remaining: Option<u64>,
    /// Unix time at which the window resets
    pub reset: Option<UnixTime>,
    /// Size of the window
    pub limit: Option<u64>,
}

impl RateLimit {
    /// Nothing known yet
    pub fn unknown() -> Self {
        Self::default()
    }

    /// Fully known limit
    pub fn new(remaining: u64, reset: UnixTime, limit: u64) -> Self {
        Self {
            remaining: Some(remaining),
            reset: Some(reset),
            limit: Some(limit),
        }
    }

    /// Whether anything has been learned about this class
    pub fn is_known(&self) -> bool {
        self.remaining.is_some()
    }

    /// Zero requests left and the window has not rolled over yet
    ///
    /// A zero with an unknown reset is also exhausted.
    pub fn is_exhausted(&self, now: UnixTime) -> bool {
        self.remaining == Some(0) && self.reset.map_or(true, |reset| reset > now)
    }

    /// The recorded window has already reset
    pub fn window_passed(&self, now: UnixTime) -> bool {
        self.reset.is_some_and(|reset| reset <= now)
    }
}

#[derive(Debug, Default)]
pub(crate) struct TokenState {
    pub(crate) limits: HashMap<ApiClass, RateLimit>,
    pub(crate) invalid: bool,
}

/// One credential and its per-class limits
#[derive(Debug)]
pub struct Token {
    index: usize,
    credential: Option<Secret>,
    state: Mutex<TokenState>,
}

/// Shared handle to a pooled token
pub type TokenHandle = Arc<Token>;

impl Token {
    pub(crate) fn new(index: usize, credential: Option<Secret>) -> Self {
        Self {
            index,
            credential,
            state: Mutex::new(TokenState::default()),
        }
    }

    /// Position in the pool
    pub fn index(&self) -> usize {
        self.index
    }

    /// The credential, absent for the anonymous token
    pub fn credential(&self) -> Option<&Secret> {
        self.credential.as_ref()
    }

    /// Whether this is the unauthenticated fallback token
    pub fn is_anonymous(&self) -> bool {
        self.credential.is_none()
    }

    /// Value for the `Authorization` header
    pub fn authorization(&self) -> Option<String> {
        self.credential
            .as_ref()
            .map(|secret| format!("token {}", secret.expose()))
    }

    /// Current limit for a class
    pub fn limit(&self, class: ApiClass) -> RateLimit {
        self.lock().limits.get(&class).copied().unwrap_or_default()
    }

    /// Whether the token was excluded from selection
    pub fn is_invalid(&self) -> bool {
        self.lock().invalid
    }

    /// Short label for logs, never the credential itself
    pub fn label(&self) -> String {
        if self.is_anonymous() {
            format!("#{} (anonymous)", self.index)
        } else {
            format!("#{}", self.index)
        }
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, TokenState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Outcome of asking the pool for a token
#[derive(Debug, Clone)]
pub enum Acquire {
    /// A token with quota left for the class; one request is reserved on it
    Ready(TokenHandle),
    /// Every usable token is exhausted; the earliest one resets at `until`
    Wait {
        /// Unix time of the earliest reset
        until: UnixTime,
    },
}

impl Acquire {
    /// Check if a token was handed out
    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Ready(_))
    }

    /// The token, if one was handed out
    pub fn token(&self) -> Option<&TokenHandle> {
        match self {
            Self::Ready(token) => Some(token),
            Self::Wait { .. } => None,
        }
    }

    /// How long to sleep from `now` before trying again
    pub fn wait_duration(&self, now: UnixTime) -> Option<Duration> {
        match self {
            Self::Ready(_) => None,
            Self::Wait { until } => Some(Duration::from_secs((until - now).max(0) as u64)),
        }
    }
}

/// Human-readable view of one token, as printed by the `limits` command
#[derive(Debug, Clone)]
pub struct TokenSnapshot {
    /// Position in the pool
    pub index: usize,
    /// Unauthenticated fallback token
    pub anonymous: bool,
    /// Excluded from selection
    pub invalid: bool,
    /// Limits per class, in [`ApiClass::ALL`] order
    pub limits: Vec<(ApiClass, RateLimit)>,
}

/// Format the time until `reset` as `XmYs`, or `never` when unknown
pub fn renews_in(reset: Option<UnixTime>, now: UnixTime) -> String {
    match reset {
        None => "never".to_string(),
        Some(reset) => {
            let secs = (reset - now).max(0);
            format!("{}m{}s", secs / 60, secs % 60)
        }
    }
}
