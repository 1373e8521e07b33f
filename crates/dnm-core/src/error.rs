//! Error types for the DNM system
//!
//! This module defines all error types used throughout the workspace.
//! The variants fall into four families:
//!
//! - configuration (`Config`, `MissingVariables`, `UnknownProvider`): fatal at startup
//! - domain syntax (`InvalidDomain`): fatal at provider construction
//! - provider (`Provider`, `Authentication`, `RateLimited`, `NotFound`, `Http`,
//!   `Connect`):
//!   recovered at the [`SubdomainManager`](crate::SubdomainManager) boundary
//! - runtime transport (`Transport`): ends the current event subscription

use thiserror::Error;

/// Result type alias for DNM operations
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for the DNM system
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// One or more required variables are absent
    #[error(
        "Missing {context}: {}.\nSet the following environment variables:\n{}",
        .variables.join(", "),
        .variables.join("\n")
    )]
    MissingVariables {
        /// What the variables were needed for
        context: String,
        /// Every missing variable name, in lookup order
        variables: Vec<String>,
    },

    /// Provider name is not registered
    #[error("Provider '{name}' is not registered (available: {})", .available.join(", "))]
    UnknownProvider {
        /// Requested provider name
        name: String,
        /// Registered provider names
        available: Vec<String>,
    },

    /// Malformed domain or hostname
    #[error("The domain name '{0}' is not valid")]
    InvalidDomain(String),

    /// Runtime event stream errors
    #[error("Event transport error: {0}")]
    Transport(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// HTTP client errors after the request was sent (timeout, body read)
    #[error("HTTP error: {0}")]
    Http(String),

    /// The provider could not be reached; the request was never sent
    #[error("Connection failed: {0}")]
    Connect(String),

    /// Authentication errors
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// Rate limiting errors
    #[error("Rate limited: {0}")]
    RateLimited(String),

    /// Zone or record not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Provider-specific error
    #[error("Provider error ({provider}): {message}")]
    Provider {
        /// Provider name
        provider: String,
        /// Error message
        message: String,
        /// Whether retrying the same request may succeed
        transient: bool,
    },

    /// Generic error with context
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a missing-variables error
    pub fn missing_variables(context: impl Into<String>, variables: Vec<String>) -> Self {
        Self::MissingVariables {
            context: context.into(),
            variables,
        }
    }

    /// Create an invalid domain error
    pub fn invalid_domain(name: impl Into<String>) -> Self {
        Self::InvalidDomain(name.into())
    }

    /// Create a transport error
    pub fn transport(msg: impl Into<String>) -> Self {
        Self::Transport(msg.into())
    }

    /// Create an HTTP error
    pub fn http(msg: impl Into<String>) -> Self {
        Self::Http(msg.into())
    }

    /// Create a connection error
    pub fn connect(msg: impl Into<String>) -> Self {
        Self::Connect(msg.into())
    }

    /// Create an authentication error
    pub fn auth(msg: impl Into<String>) -> Self {
        Self::Authentication(msg.into())
    }

    /// Create a rate limit error
    pub fn rate_limited(msg: impl Into<String>) -> Self {
        Self::RateLimited(msg.into())
    }

    /// Create a "not found" error
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// Create a permanent provider-specific error
    pub fn provider(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Provider {
            provider: provider.into(),
            message: message.into(),
            transient: false,
        }
    }

    /// Create a provider-specific error that may succeed on retry (5xx)
    pub fn provider_transient(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Provider {
            provider: provider.into(),
            message: message.into(),
            transient: true,
        }
    }

    /// Map a non-success HTTP status from a provider API to an error
    ///
    /// - 401/403 → [`Error::Authentication`]
    /// - 404 → [`Error::NotFound`]
    /// - 429 → [`Error::RateLimited`]
    /// - 5xx → transient [`Error::Provider`]
    /// - anything else → permanent [`Error::Provider`]
    pub fn from_status(provider: &str, context: &str, status: u16, body: &str) -> Self {
        match status {
            401 | 403 => Self::auth(format!(
                "{provider}: invalid credentials or insufficient permissions ({context}, status {status})"
            )),
            404 => Self::not_found(format!("{provider}: {context} (status {status})")),
            429 => Self::rate_limited(format!(
                "{provider}: rate limit exceeded ({context}, status {status})"
            )),
            500..=599 => Self::provider_transient(
                provider,
                format!("server error (transient) during {context}: {status} - {body}"),
            ),
            _ => Self::provider(provider, format!("{context} failed: {status} - {body}")),
        }
    }

    /// Whether the failed operation is worth retrying
    pub fn is_transient(&self) -> bool {
        match self {
            Self::RateLimited(_)
            | Self::Http(_)
            | Self::Connect(_)
            | Self::Transport(_)
            | Self::Io(_) => true,
            Self::Provider { transient, .. } => *transient,
            _ => false,
        }
    }

    /// Whether the provider certainly did not act on the request
    ///
    /// Only these errors allow repeating a non-idempotent call such as a
    /// record creation: the connection never opened, or the request was
    /// rejected before processing.
    pub fn is_unsent(&self) -> bool {
        matches!(self, Self::Connect(_) | Self::RateLimited(_))
    }

    /// Whether this error belongs to the configuration family
    pub fn is_config(&self) -> bool {
        matches!(
            self,
            Self::Config(_) | Self::MissingVariables { .. } | Self::UnknownProvider { .. }
        )
    }
}

/// Helper for converting anyhow::Error to our Error type
impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Self::Other(err.to_string())
    }
}
