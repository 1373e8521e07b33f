//! Subdomain manager
//!
//! The single entry point for "ensure this hostname has / no longer has a
//! record". The manager:
//! - Extracts the subdomain from a full hostname
//! - Dispatches to the bound [`SubdomainProvider`]
//! - Retries failed provider calls per [`RetryPolicy`] (creates only when never sent)
//! - Logs and suppresses every failure
//!
//! Nothing returned from this module is an `Err`: a hostname outside the
//! zone is a routing decision and a provider failure is an outcome.

use crate::config::RetryPolicy;
use crate::domain::BaseDomain;
use crate::error::{Error, Result};
use crate::traits::{RemoveOutcome, SubdomainProvider};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// What a manager call did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionOutcome {
    /// Record created
    Added {
        subdomain: String,
    },
    /// Records deleted
    Removed {
        subdomain: String,
        count: usize,
    },
    /// Remove found nothing to delete
    NotFound {
        subdomain: String,
    },
    /// Hostname does not map to a subdomain of the zone
    Skipped {
        hostname: String,
    },
    /// Provider call failed after all attempts
    Failed {
        subdomain: String,
        error: String,
    },
}

impl ActionOutcome {
    /// Whether the outcome is a provider failure
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }
}

/// Operation name carried into log lines
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Operation {
    Add,
    Remove,
}

impl Operation {
    /// Whether a failed attempt may be repeated
    ///
    /// Removal looks records up before deleting, so any transient error can
    /// be retried. A create is only repeated when the provider never acted on
    /// it, otherwise a retry could leave duplicate records.
    fn may_retry(self, e: &Error) -> bool {
        match self {
            Self::Add => e.is_unsent(),
            Self::Remove => e.is_transient(),
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Add => f.write_str("add"),
            Self::Remove => f.write_str("remove"),
        }
    }
}

/// Orchestrates extraction and provider dispatch
pub struct SubdomainManager {
    provider: Arc<dyn SubdomainProvider>,
    base: BaseDomain,
    retry: RetryPolicy,
}

impl SubdomainManager {
    /// Create a manager bound to a provider
    ///
    /// The base domain is taken from the provider and parsed once.
    ///
    /// # Returns
    ///
    /// - `Err(Error::InvalidDomain)`: If the provider reports an invalid zone
    pub fn new(provider: Arc<dyn SubdomainProvider>, retry: RetryPolicy) -> Result<Self> {
        let base = BaseDomain::parse(provider.domain_name())?;
        info!(
            provider = provider.provider_name(),
            domain = %base,
            max_retries = retry.max_retries,
            "Subdomain manager initialized"
        );
        Ok(Self {
            provider,
            base,
            retry,
        })
    }

    /// The managed zone
    pub fn base_domain(&self) -> &BaseDomain {
        &self.base
    }

    /// The bound provider's name
    pub fn provider_name(&self) -> &'static str {
        self.provider.provider_name()
    }

    /// Ensure a CNAME record exists for `full_domain`
    pub async fn add_subdomain(&self, full_domain: &str) -> ActionOutcome {
        debug!(hostname = %full_domain, "Attempting to add subdomain");
        let Some(subdomain) = self.extract(full_domain) else {
            return ActionOutcome::Skipped {
                hostname: full_domain.to_string(),
            };
        };

        info!(
            subdomain = %subdomain,
            domain = %self.base,
            provider = self.provider_name(),
            "Adding subdomain"
        );

        let provider = &self.provider;
        let sub = subdomain.as_str();
        match guard(Operation::Add, sub, provider.provider_name(), &self.retry, move || {
            provider.add_subdomain(sub)
        })
        .await
        {
            Ok(()) => {
                info!(subdomain = %subdomain, "Successfully added subdomain");
                ActionOutcome::Added { subdomain }
            }
            Err(error) => ActionOutcome::Failed { subdomain, error },
        }
    }

    /// Ensure no CNAME record exists for `full_domain`
    pub async fn remove_subdomain(&self, full_domain: &str) -> ActionOutcome {
        debug!(hostname = %full_domain, "Attempting to remove subdomain");
        let Some(subdomain) = self.extract(full_domain) else {
            return ActionOutcome::Skipped {
                hostname: full_domain.to_string(),
            };
        };

        info!(
            subdomain = %subdomain,
            domain = %self.base,
            provider = self.provider_name(),
            "Removing subdomain"
        );

        let provider = &self.provider;
        let sub = subdomain.as_str();
        match guard(Operation::Remove, sub, provider.provider_name(), &self.retry, move || {
            provider.remove_subdomain(sub)
        })
        .await
        {
            Ok(RemoveOutcome::Removed { count }) => {
                info!(subdomain = %subdomain, count, "Successfully removed subdomain");
                ActionOutcome::Removed { subdomain, count }
            }
            Ok(RemoveOutcome::NotFound) => {
                info!(subdomain = %subdomain, "No record found for subdomain, nothing to remove");
                ActionOutcome::NotFound { subdomain }
            }
            Err(error) => ActionOutcome::Failed { subdomain, error },
        }
    }

    fn extract(&self, full_domain: &str) -> Option<String> {
        let subdomain = self.base.extract(full_domain);
        if subdomain.is_none() {
            error!(
                hostname = %full_domain,
                domain = %self.base,
                "Invalid subdomain for domain, ignoring"
            );
        }
        subdomain
    }
}

/// Run a provider operation, retrying what `op` allows and logging failures
///
/// Returns the operation's value, or the final error rendered as a string
/// once it has been logged with operation, subdomain and provider context.
async fn guard<T, F, Fut>(
    op: Operation,
    subdomain: &str,
    provider: &str,
    policy: &RetryPolicy,
    mut call: F,
) -> std::result::Result<T, String>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 0;
    loop {
        match call().await {
            Ok(value) => return Ok(value),
            Err(e) if op.may_retry(&e) && attempt < policy.max_retries => {
                attempt += 1;
                warn!(
                    operation = %op,
                    subdomain = %subdomain,
                    provider = %provider,
                    attempt,
                    error = %e,
                    "Provider request not completed, retrying"
                );
                tokio::time::sleep(policy.retry_delay()).await;
            }
            Err(e) => {
                log_failure(op, subdomain, provider, &e);
                return Err(e.to_string());
            }
        }
    }
}

fn log_failure(op: Operation, subdomain: &str, provider: &str, e: &Error) {
    error!(
        operation = %op,
        subdomain = %subdomain,
        provider = %provider,
        error = %e,
        "Failed to {} subdomain '{}'",
        op,
        subdomain
    );
}
