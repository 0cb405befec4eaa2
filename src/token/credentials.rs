//! Credential source
//!
//! Credentials come from process configuration as a comma separated list.
//! Entries that do not look like a GitHub token are dropped with a warning.

use regex::Regex;
use std::sync::LazyLock;
use tracing::warn;

/// GitHub tokens are exactly 40 characters: classic hex tokens and `ghp_` style alike
static CREDENTIAL_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_]{40}$").expect("valid credential regex"));

/// Environment variable holding a comma separated token list
pub const TOKENS_ENV: &str = "GITHUB_API_TOKENS";

/// Single-token fallback variable
pub const TOKEN_ENV: &str = "GITHUB_TOKEN";

/// Check the fixed-length token format
pub fn is_valid_credential(candidate: &str) -> bool {
    CREDENTIAL_REGEX.is_match(candidate)
}

/// Split and validate a comma separated credential list
pub fn parse_credentials(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .filter_map(|entry| {
            if is_valid_credential(entry) {
                Some(entry.to_string())
            } else {
                warn!(
                    length = entry.len(),
                    "discarding credential with unexpected format"
                );
                None
            }
        })
        .collect()
}

/// Load credentials from `GITHUB_API_TOKENS`, falling back to `GITHUB_TOKEN`
pub fn credentials_from_env() -> Vec<String> {
    let tokens = std::env::var(TOKENS_ENV)
        .map(|raw| parse_credentials(&raw))
        .unwrap_or_default();
    if !tokens.is_empty() {
        return tokens;
    }

    std::env::var(TOKEN_ENV)
        .map(|raw| parse_credentials(&raw))
        .unwrap_or_default()
}
