// Allow common clippy pedantic lints that aren't critical for this codebase
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::cast_lossless)]
#![allow(clippy::too_many_lines)]
#![allow(clippy::ref_option)]
#![allow(clippy::unused_self)]
#![allow(clippy::struct_excessive_bools)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::items_after_statements)]
#![allow(clippy::unnecessary_wraps)]
#![allow(clippy::match_same_arms)]
#![allow(clippy::match_wildcard_for_single_variants)]
#![allow(clippy::needless_pass_by_value)]
#![allow(clippy::unused_async)]

//! # gh-harvest
//!
//! Token-pooled, rate-limit aware harvesting of paginated GitHub REST and
//! GraphQL endpoints.
//!
//! ## Features
//!
//! - **Token Pool**: Round-robin over many credentials, per API class quotas
//! - **Rate Limits**: Learned from response headers and the `rate_limit` probe
//! - **Bounded Retry**: Transient failures retried a fixed number of times
//! - **Pagination**: Link header and GraphQL cursor pages, resumable by cursor
//! - **Harvest Loop**: Per-target state machine with batched, append-only output
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use gh_harvest::config::Settings;
//! use gh_harvest::endpoint::find;
//! use gh_harvest::harvest::Harvester;
//! use gh_harvest::http::{HttpClient, RequestExecutor};
//! use gh_harvest::output::OutputFormat;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> gh_harvest::Result<()> {
//!     let settings = Settings::load(None)?;
//!     let client = HttpClient::with_config(settings.http_config())?;
//!     let executor = RequestExecutor::new(client, Arc::new(settings.token_pool()))
//!         .with_policy(settings.retry_policy());
//!
//!     let harvester = Harvester::new(
//!         Arc::new(executor),
//!         OutputFormat::Csv.sink(),
//!         settings.harvest_config("repo_info.csv"),
//!     );
//!     let targets = vec!["rust-lang/cargo".to_string()];
//!     let report = harvester.run(&find("repo_info")?, &targets).await?;
//!     println!("{} rows", report.rows_written);
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────┐
//! │                 Harvester (per-target state machine)          │
//! │   targets → PageStream → rows → RecordSink   checkpoint       │
//! └───────────────────────────────────────────────────────────────┘
//!                                 │
//! ┌────────────┬──────────────────┴─────┬────────────┬────────────┐
//! │  Endpoint  │  Pagination            │  Executor  │  Tokens    │
//! ├────────────┼────────────────────────┼────────────┼────────────┤
//! │ Catalog    │ Link header            │ Classify   │ Pool       │
//! │ Templates  │ GraphQL cursor         │ Retry      │ Probe      │
//! │ Extractors │ Single page            │ Throttle   │ Wait hint  │
//! └────────────┴────────────────────────┴────────────┴────────────┘
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::doc_markdown)]
#![allow(missing_docs)]

// ============================================================================
// Module declarations
// ============================================================================

/// Error types for the crate
pub mod error;

/// Common types and type aliases
pub mod types;

/// Credentials and per-class rate limits
pub mod token;

/// HTTP client, request executor and retry policy
pub mod http;

/// Endpoint descriptors and the built-in catalog
pub mod endpoint;

/// Template interpolation
pub mod template;

/// Pagination strategies and page streams
pub mod pagination;

/// Append-only record sinks
pub mod output;

/// Harvest checkpointing
pub mod state;

/// Harvest loop
pub mod harvest;

/// Cancellation signal
pub mod shutdown;

/// Run settings
pub mod config;

/// Command-line interface
pub mod cli;

// ============================================================================
// Re-exports
// ============================================================================

pub use error::{Error, Result};
pub use types::*;

// Re-export commonly used types
pub use endpoint::{catalog, find, EndpointDescriptor};
pub use harvest::{HarvestConfig, HarvestReport, Harvester};
pub use http::RequestExecutor;
pub use token::TokenPool;

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Crate name
pub const NAME: &str = env!("CARGO_PKG_NAME");
