//! Configuration types for the DNM system
//!
//! This module defines the configuration structures shared by the core and
//! its plugin crates, plus the [`VariableSource`] seam through which
//! environment values are read.

use crate::domain::normalize_domain;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

/// Prefix shared by every DNM environment variable
pub const ENV_PREFIX: &str = "DNM";

/// Default label carrying a reverse-proxy routing rule
pub const DEFAULT_RULE_LABEL: &str = "traefik.http.routers.web.rule";

/// Read-only lookup of named configuration values
///
/// Production code uses [`ProcessEnv`]; tests use a `HashMap<String, String>`.
pub trait VariableSource: Send + Sync {
    /// Get a value by its full name (e.g. `DNM_DOMAIN_NAME`)
    ///
    /// Empty values are reported as absent.
    fn get(&self, key: &str) -> Option<String>;
}

/// Variables from the process environment
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessEnv;

impl VariableSource for ProcessEnv {
    fn get(&self, key: &str) -> Option<String> {
        std::env::var(key).ok().filter(|v| !v.is_empty())
    }
}

impl VariableSource for HashMap<String, String> {
    fn get(&self, key: &str) -> Option<String> {
        HashMap::get(self, key).filter(|v| !v.is_empty()).cloned()
    }
}

/// Build a conventional variable name: `PREFIX_KEY`, upper-cased
pub fn variable_name(prefix: &str, key: &str) -> String {
    format!("{}_{}", prefix, key).to_uppercase()
}

/// Provider credentials (secret values)
///
/// The Debug implementation lists key names only, never values.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderCredentials(HashMap<String, String>);

impl ProviderCredentials {
    /// Create an empty credential set
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a credential (builder style)
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    /// Insert a credential
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }

    /// Get a credential value
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    /// Get a required credential, failing with a configuration error
    pub fn require(&self, key: &str) -> crate::Result<&str> {
        self.get(key)
            .filter(|v| !v.is_empty())
            .ok_or_else(|| crate::Error::config(format!("Missing credential '{}'", key)))
    }
}

impl fmt::Debug for ProviderCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut keys: Vec<&String> = self.0.keys().collect();
        keys.sort();
        f.debug_map()
            .entries(keys.into_iter().map(|k| (k, "<REDACTED>")))
            .finish()
    }
}

/// Everything a provider factory needs to build a provider
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Provider name as registered (e.g. "OVH", "CLOUDFLARE")
    pub provider: String,

    /// Base domain (zone) to manage
    pub domain_name: String,

    /// CNAME target for created records
    pub target: String,

    /// Provider-specific credentials
    pub credentials: ProviderCredentials,

    /// Log mutations instead of performing them
    #[serde(default)]
    pub dry_run: bool,
}

impl ProviderConfig {
    /// Create a provider configuration; `target` defaults to the domain
    ///
    /// Both names are stored in [`normalize_domain`] form, so
    /// `example.com.` and `example.com` configure the same zone.
    pub fn new(
        provider: impl Into<String>,
        domain_name: impl Into<String>,
        target: Option<String>,
        credentials: ProviderCredentials,
    ) -> Self {
        let domain_name = normalize_domain(&domain_name.into());
        let target = target.map_or_else(|| domain_name.clone(), |t| normalize_domain(&t));
        Self {
            provider: provider.into(),
            domain_name,
            target,
            credentials,
            dry_run: false,
        }
    }

    /// Enable or disable dry-run mode
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }
}

/// Retry policy for provider calls made by the manager
///
/// Removals retry transient errors ([`crate::Error::is_transient`]); creates
/// retry only errors where the request was never sent ([`crate::Error::is_unsent`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Maximum number of retries after the first attempt
    #[serde(default = "default_max_retries")]
    pub max_retries: usize,

    /// Delay between attempts (in milliseconds)
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
}

impl RetryPolicy {
    /// A policy that never retries
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            retry_delay_ms: 0,
        }
    }

    /// Delay between attempts
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            retry_delay_ms: default_retry_delay_ms(),
        }
    }
}

/// Reconnect policy for the runtime event subscription
///
/// Backoff doubles from `initial_backoff_ms` up to `max_backoff_ms`.
/// `max_attempts = 0` stops ingestion on the first transport error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconnectPolicy {
    /// Consecutive reconnect attempts before ingestion gives up
    #[serde(default = "default_reconnect_attempts")]
    pub max_attempts: u32,

    /// First backoff delay (in milliseconds)
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,

    /// Backoff ceiling (in milliseconds)
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
}

impl ReconnectPolicy {
    /// A policy that never reconnects
    pub fn disabled() -> Self {
        Self {
            max_attempts: 0,
            ..Self::default()
        }
    }

    /// Backoff before reconnect attempt `attempt` (1-based)
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        let delay = self
            .initial_backoff_ms
            .saturating_mul(1u64 << exponent)
            .min(self.max_backoff_ms);
        Duration::from_millis(delay)
    }
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            max_attempts: default_reconnect_attempts(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
        }
    }
}

/// Event listener configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListenerConfig {
    /// Label holding a `Host(`...`)` routing rule
    #[serde(default = "default_rule_label")]
    pub rule_label: String,

    /// Dequeue timeout; bounds how long a stop request can go unnoticed
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Event subscription reconnect policy
    #[serde(default)]
    pub reconnect: ReconnectPolicy,
}

impl ListenerConfig {
    /// Dequeue timeout as a duration
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Set the routing-rule label
    pub fn with_rule_label(mut self, label: impl Into<String>) -> Self {
        self.rule_label = label.into();
        self
    }

    /// Set the reconnect policy
    pub fn with_reconnect(mut self, reconnect: ReconnectPolicy) -> Self {
        self.reconnect = reconnect;
        self
    }

    /// Set the dequeue timeout
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval_ms = interval.as_millis() as u64;
        self
    }

    /// Validate the listener configuration
    pub fn validate(&self) -> crate::Result<()> {
        if self.rule_label.trim().is_empty() {
            return Err(crate::Error::config("Routing rule label cannot be empty"));
        }
        if self.poll_interval_ms == 0 {
            return Err(crate::Error::config("Poll interval must be > 0"));
        }
        if self.reconnect.initial_backoff_ms > self.reconnect.max_backoff_ms {
            return Err(crate::Error::config(
                "Reconnect initial backoff cannot exceed the maximum backoff",
            ));
        }
        Ok(())
    }
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            rule_label: default_rule_label(),
            poll_interval_ms: default_poll_interval_ms(),
            reconnect: ReconnectPolicy::default(),
        }
    }
}

fn default_rule_label() -> String {
    DEFAULT_RULE_LABEL.to_string()
}

fn default_poll_interval_ms() -> u64 {
    1000
}

fn default_max_retries() -> usize {
    2
}

fn default_retry_delay_ms() -> u64 {
    2000
}

fn default_reconnect_attempts() -> u32 {
    5
}

fn default_initial_backoff_ms() -> u64 {
    1000
}

fn default_max_backoff_ms() -> u64 {
    30_000
}
