//! Settings for a harvest run
//!
//! Settings come from an optional YAML file with every field defaulted, then
//! from the environment. Command-line flags are applied last by the CLI.

use crate::error::{Error, Result};
use crate::harvest::HarvestConfig;
use crate::http::{HttpClientConfig, RetryPolicy, ThrottleConfig, DEFAULT_API_URL};
use crate::output::OutputFormat;
use crate::token::{parse_credentials, TokenPool, DEFAULT_MIN_CORE_LIMIT, TOKENS_ENV, TOKEN_ENV};
use crate::types::BackoffType;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

// ============================================================================
// Settings
// ============================================================================

/// Complete run settings
#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    /// API root
    pub api_url: String,

    /// Per-request timeout
    pub timeout_secs: u64,

    /// Local politeness throttle shared by all tokens (0 disables it)
    pub requests_per_second: u32,

    /// Consecutive transient failures before a target fails
    pub max_transient_attempts: u32,

    /// Delay between transient retries
    pub transient_backoff_secs: u64,

    /// How the transient delay grows
    pub backoff: BackoffType,

    /// Extra sleep past a reset time
    pub reset_grace_secs: u64,

    /// Credentialed tokens with a lower core limit are treated as invalid
    pub min_core_limit: u64,

    /// Finished targets per flush
    pub batch_size: usize,

    /// Interval between token re-probes
    pub sync_window_secs: u64,

    /// Default output file
    pub output: Option<PathBuf>,

    /// Default checkpoint file
    pub state: Option<PathBuf>,

    /// Output format
    pub format: OutputFormat,

    /// User agent override
    pub user_agent: Option<String>,

    /// Credentials; the environment takes precedence
    #[serde(skip_serializing)]
    pub tokens: Vec<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            timeout_secs: 30,
            requests_per_second: 10,
            max_transient_attempts: 3,
            transient_backoff_secs: 10,
            backoff: BackoffType::Constant,
            reset_grace_secs: 10,
            min_core_limit: DEFAULT_MIN_CORE_LIMIT,
            batch_size: 100,
            sync_window_secs: 3600,
            output: None,
            state: None,
            format: OutputFormat::Csv,
            user_agent: None,
            tokens: Vec::new(),
        }
    }
}

impl fmt::Debug for Settings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Settings")
            .field("api_url", &self.api_url)
            .field("timeout_secs", &self.timeout_secs)
            .field("requests_per_second", &self.requests_per_second)
            .field("max_transient_attempts", &self.max_transient_attempts)
            .field("transient_backoff_secs", &self.transient_backoff_secs)
            .field("backoff", &self.backoff)
            .field("reset_grace_secs", &self.reset_grace_secs)
            .field("min_core_limit", &self.min_core_limit)
            .field("batch_size", &self.batch_size)
            .field("sync_window_secs", &self.sync_window_secs)
            .field("output", &self.output)
            .field("state", &self.state)
            .field("format", &self.format)
            .field("user_agent", &self.user_agent)
            .field("tokens", &format_args!("[{} REDACTED]", self.tokens.len()))
            .finish()
    }
}

impl Settings {
    /// Parse settings from YAML
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }
        let settings: Self = serde_yaml::from_str(yaml)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Load settings from a YAML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(Error::FileNotFound {
                path: path.display().to_string(),
            });
        }
        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    /// Settings from an optional file, then the process environment
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut settings = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        settings.apply_env(|key| std::env::var(key).ok());
        Ok(settings)
    }

    /// Apply environment overrides through `lookup`
    ///
    /// `GITHUB_API_TOKENS` wins over `GITHUB_TOKEN`, and either wins over
    /// tokens from the file. Malformed credentials are discarded.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        for key in [TOKENS_ENV, TOKEN_ENV] {
            if let Some(raw) = lookup(key) {
                let tokens = parse_credentials(&raw);
                if !tokens.is_empty() {
                    self.tokens = tokens;
                    return;
                }
            }
        }
        self.tokens = parse_credentials(&self.tokens.join(","));
    }

    /// Check value ranges
    pub fn validate(&self) -> Result<()> {
        url::Url::parse(&self.api_url)?;
        if self.timeout_secs == 0 {
            return Err(Error::invalid_value("timeout_secs", "must be positive"));
        }
        if self.batch_size == 0 {
            return Err(Error::invalid_value("batch_size", "must be positive"));
        }
        if self.max_transient_attempts == 0 {
            return Err(Error::invalid_value(
                "max_transient_attempts",
                "must allow at least one attempt",
            ));
        }
        Ok(())
    }

    // ========================================================================
    // Component builders
    // ========================================================================

    /// HTTP client configuration
    pub fn http_config(&self) -> HttpClientConfig {
        let mut builder = HttpClientConfig::builder()
            .base_url(self.api_url.clone())
            .timeout(Duration::from_secs(self.timeout_secs));
        builder = if self.requests_per_second == 0 {
            builder.no_throttle()
        } else {
            builder.throttle(ThrottleConfig::per_second(self.requests_per_second))
        };
        if let Some(agent) = &self.user_agent {
            builder = builder.user_agent(agent.clone());
        }
        builder.build()
    }

    /// Retry policy for the executor
    pub fn retry_policy(&self) -> RetryPolicy {
        let defaults = RetryPolicy::default();
        RetryPolicy::default()
            .with_max_attempts(self.max_transient_attempts)
            .with_backoff(
                self.backoff,
                Duration::from_secs(self.transient_backoff_secs),
                defaults.max_backoff,
            )
            .with_reset_grace(Duration::from_secs(self.reset_grace_secs))
    }

    /// Token pool over the configured credentials
    pub fn token_pool(&self) -> TokenPool {
        TokenPool::new(self.tokens.clone()).with_min_core_limit(self.min_core_limit)
    }

    /// Harvest configuration writing to `destination`
    pub fn harvest_config(&self, destination: impl Into<PathBuf>) -> HarvestConfig {
        HarvestConfig::new(destination)
            .with_batch_size(self.batch_size)
            .with_sync_window(Duration::from_secs(self.sync_window_secs))
    }
}
