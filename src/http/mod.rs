//! HTTP layer
//!
//! Everything between a rendered request and a classified response.
//!
//! # Overview
//!
//! - `HttpClient` - one attempt per call against the API root, with a local throttle
//! - `RequestExecutor` - token acquisition, response classification, retry and rotation
//! - `RetryPolicy` - bounded transient retries and the grace period after resets
//! - `PageFetcher` - the seam pagination is written against

mod client;
mod executor;
mod rate_limit;
mod retry;

pub use client::{
    HttpClient, HttpClientConfig, HttpClientConfigBuilder, PreparedRequest, DEFAULT_API_URL,
    PREVIEW_ACCEPT,
};
pub use executor::{
    classify_status, is_graphql_rate_limited, ApiResponse, FetchResult, Fetched, PageFetcher,
    RequestExecutor, ResponseKind,
};
pub use rate_limit::{Throttle, ThrottleConfig};
pub use retry::RetryPolicy;
