//! Token pool module
//!
//! Tracks credentials and their per-class rate-limit state.
//!
//! # Overview
//!
//! - `Token` - one credential plus its last known limits per [`ApiClass`](crate::types::ApiClass)
//! - `TokenPool` - round-robin selection filtered by readiness
//! - `Acquire` - either a ready token or the earliest time one will be ready
//! - Credential loading and validation from the environment

mod credentials;
mod pool;
mod types;

pub use credentials::{credentials_from_env, is_valid_credential, parse_credentials, TOKENS_ENV, TOKEN_ENV};
pub use pool::{parse_rate_headers, TokenPool, DEFAULT_MIN_CORE_LIMIT};
pub use types::{renews_in, Acquire, RateLimit, Secret, Token, TokenHandle, TokenSnapshot};
