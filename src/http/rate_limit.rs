//! Local request throttle
//!
//! Uses the governor crate for a token-bucket throttle applied to every
//! outgoing request regardless of which credential carries it. This is
//! independent of the per-credential quotas tracked by the token pool: it
//! only smooths bursts so a large pool does not hammer the API.

use governor::clock::DefaultClock;
use governor::middleware::NoOpMiddleware;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter as Governor};
use std::num::NonZeroU32;
use std::sync::Arc;

/// Configuration for the local throttle
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThrottleConfig {
    /// Sustained requests per second
    pub requests_per_second: u32,
    /// Burst size
    pub burst_size: u32,
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self {
            requests_per_second: 10,
            burst_size: 10,
        }
    }
}

impl ThrottleConfig {
    /// Create a new throttle config
    pub fn new(requests_per_second: u32, burst_size: u32) -> Self {
        Self {
            requests_per_second,
            burst_size,
        }
    }

    /// Throttle allowing `n` requests per second with an equal burst
    pub fn per_second(n: u32) -> Self {
        Self::new(n, n)
    }
}

/// Token bucket throttle
#[derive(Clone)]
pub struct Throttle {
    limiter: Arc<Governor<NotKeyed, InMemoryState, DefaultClock, NoOpMiddleware>>,
}

impl Throttle {
    /// Create a throttle from config; zero values are raised to one
    pub fn new(config: &ThrottleConfig) -> Self {
        let rate = NonZeroU32::new(config.requests_per_second).unwrap_or(NonZeroU32::MIN);
        let burst = NonZeroU32::new(config.burst_size).unwrap_or(NonZeroU32::MIN);
        let quota = Quota::per_second(rate).allow_burst(burst);

        Self {
            limiter: Arc::new(Governor::direct(quota)),
        }
    }

    /// Wait until a request may be sent
    pub async fn wait(&self) {
        self.limiter.until_ready().await;
    }

    /// Take a permit if one is available right now
    pub fn try_acquire(&self) -> bool {
        self.limiter.check().is_ok()
    }
}

impl std::fmt::Debug for Throttle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Throttle").finish()
    }
}
