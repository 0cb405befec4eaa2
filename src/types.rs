//! Common types used throughout gh-harvest
//!
//! This module contains shared type definitions, type aliases,
//! and utility types used across multiple modules.

use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// Type Aliases
// ============================================================================

/// JSON value type (re-exported from serde_json)
pub type JsonValue = serde_json::Value;

/// JSON object type
pub type JsonObject = serde_json::Map<String, JsonValue>;

/// One harvested record, a flat-ish JSON object
pub type Row = JsonObject;

/// Unix timestamp in seconds
pub type UnixTime = i64;

/// Current unix time in seconds
pub fn unix_now() -> UnixTime {
    chrono::Utc::now().timestamp()
}

// ============================================================================
// API Class
// ============================================================================

/// Independently rate-limited group of endpoints
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApiClass {
    /// Regular REST endpoints
    Core,
    /// `search/*` endpoints
    Search,
    /// The GraphQL endpoint
    Graphql,
}

impl ApiClass {
    /// All classes, in the order they are probed and reported
    pub const ALL: [ApiClass; 3] = [ApiClass::Core, ApiClass::Search, ApiClass::Graphql];

    /// Classify a request path (relative to the API root) or absolute URL
    pub fn of(url: &str) -> Self {
        let path = strip_api_root(url);
        if path.starts_with("search/") || path == "search" {
            ApiClass::Search
        } else if path.starts_with("graphql") {
            ApiClass::Graphql
        } else {
            ApiClass::Core
        }
    }

    /// Name used by the `rate_limit` endpoint
    pub fn as_str(self) -> &'static str {
        match self {
            ApiClass::Core => "core",
            ApiClass::Search => "search",
            ApiClass::Graphql => "graphql",
        }
    }
}

impl fmt::Display for ApiClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Drop scheme and host so absolute next-page links classify like paths
fn strip_api_root(url: &str) -> &str {
    let rest = url
        .strip_prefix("https://")
        .or_else(|| url.strip_prefix("http://"));
    let path = match rest {
        Some(rest) => rest.split_once('/').map_or("", |(_, path)| path),
        None => url,
    };
    path.trim_start_matches('/')
}

// ============================================================================
// HTTP Types
// ============================================================================

/// HTTP method
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
    #[default]
    GET,
    POST,
}

impl From<Method> for reqwest::Method {
    fn from(method: Method) -> Self {
        match method {
            Method::GET => reqwest::Method::GET,
            Method::POST => reqwest::Method::POST,
        }
    }
}

// ============================================================================
// Backoff Type
// ============================================================================

/// Type of backoff for retries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackoffType {
    /// Constant delay between retries
    #[default]
    Constant,
    /// Linear increase in delay
    Linear,
    /// Exponential increase in delay
    Exponential,
}

// ============================================================================
// Targets
// ============================================================================

/// Normalize a repository reference to `owner/repo`
///
/// Accepts `owner/repo`, `github.com/owner/repo` and full URLs, strips a
/// trailing slash and any `.git` suffixes, and lowercases (the API is case
/// insensitive, so this makes duplicates detectable).
pub fn canonical_repo(reference: &str) -> String {
    let mut repo = reference.trim().to_lowercase();
    for prefix in ["http://", "https://", "www.", "github.com/", "github.com"] {
        if let Some(stripped) = repo.strip_prefix(prefix) {
            repo = stripped.to_string();
        }
    }
    if let Some(stripped) = repo.strip_suffix('/') {
        repo = stripped.to_string();
    }
    while let Some(stripped) = repo.strip_suffix(".git") {
        repo = stripped.to_string();
    }
    repo
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_class_of() {
        assert_eq!(ApiClass::of("repos/a/b/issues"), ApiClass::Core);
        assert_eq!(ApiClass::of("search/repositories"), ApiClass::Search);
        assert_eq!(ApiClass::of("/search/code"), ApiClass::Search);
        assert_eq!(ApiClass::of("graphql"), ApiClass::Graphql);
        assert_eq!(
            ApiClass::of("https://api.github.com/search/issues?page=2"),
            ApiClass::Search
        );
        assert_eq!(
            ApiClass::of("http://127.0.0.1:4321/repos/a/b/commits?page=3"),
            ApiClass::Core
        );
    }

    #[test]
    fn test_api_class_serde() {
        let class: ApiClass = serde_json::from_str("\"search\"").unwrap();
        assert_eq!(class, ApiClass::Search);
        assert_eq!(serde_json::to_string(&ApiClass::Graphql).unwrap(), "\"graphql\"");
        assert_eq!(ApiClass::Core.to_string(), "core");
    }

    #[test]
    fn test_method_conversion() {
        let get: reqwest::Method = Method::GET.into();
        assert_eq!(reqwest::Method::GET, get);
        let post: reqwest::Method = Method::POST.into();
        assert_eq!(reqwest::Method::POST, post);
    }

    #[test]
    fn test_canonical_repo() {
        assert_eq!(canonical_repo("pandas-DEV/pandas"), "pandas-dev/pandas");
        assert_eq!(
            canonical_repo("http://github.com/django/django.git"),
            "django/django"
        );
        assert_eq!(canonical_repo("https://github.com/A/B/"), "a/b");
        assert_eq!(canonical_repo("  rust-lang/rust.git.git "), "rust-lang/rust");
    }
}
