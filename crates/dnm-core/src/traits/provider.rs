// # Subdomain Provider Trait
//
// Defines the interface for managing CNAME records at a DNS backend.
//
// ## Implementations
//
// - OVH: `dnm-provider-ovh` crate
// - Cloudflare: `dnm-provider-cloudflare` crate
//
// ## Usage
//
// ```rust,ignore
// use dnm_core::SubdomainProvider;
//
// #[tokio::main]
// async fn main() -> anyhow::Result<()> {
//     let provider = /* SubdomainProvider implementation */;
//
//     provider.authenticate().await?;
//     provider.add_subdomain("api").await?;    // api.example.com CNAME target
//     provider.remove_subdomain("api").await?;
//
//     Ok(())
// }
// ```

use async_trait::async_trait;

/// Default TTL for created CNAME records (seconds)
pub const DEFAULT_RECORD_TTL: u32 = 3600;

/// Record type managed by every provider
pub const RECORD_TYPE: &str = "CNAME";

/// Result of a remove operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoveOutcome {
    /// Matching records were deleted
    Removed {
        /// How many records were deleted
        count: usize,
    },
    /// No matching record existed (no-op)
    NotFound,
}

/// Trait for DNS backend implementations
///
/// A provider is bound to one zone (`domain_name`) and one CNAME `target`
/// for its whole lifetime. Both are validated by the factory before the
/// provider is constructed.
///
/// # Thread Safety
///
/// Implementations must be thread-safe and usable across async tasks.
///
/// # Responsibilities
///
/// - ✅ Perform API calls to their backend only
/// - ✅ Memoize a zone identifier once resolved
/// - ✅ Space out bursts of deletions (random 100–500 ms delay)
/// - ❌ Retry failed calls (owned by `SubdomainManager`)
/// - ❌ Decide which hostnames belong to the zone (owned by `SubdomainManager`)
/// - ❌ Spawn background tasks
#[async_trait]
pub trait SubdomainProvider: Send + Sync {
    /// Obtain or validate a session with the backend
    ///
    /// Called exactly once, after construction and before any record
    /// operation. Failure is fatal to startup.
    async fn authenticate(&self) -> Result<(), crate::Error>;

    /// Create a CNAME record `subdomain.domain_name → target`
    ///
    /// # Parameters
    ///
    /// - `subdomain`: Label(s) relative to the zone (e.g. "api" or "a.b")
    ///
    /// # Returns
    ///
    /// - `Ok(())`: Record created
    /// - `Err(Error)`: If the backend rejected the request
    async fn add_subdomain(&self, subdomain: &str) -> Result<(), crate::Error>;

    /// Delete the CNAME record(s) for `subdomain`
    ///
    /// Zero matching records is not an error.
    ///
    /// # Returns
    ///
    /// - `Ok(RemoveOutcome)`: What was deleted, or `NotFound`
    /// - `Err(Error)`: If a lookup or deletion failed
    async fn remove_subdomain(&self, subdomain: &str) -> Result<RemoveOutcome, crate::Error>;

    /// The zone this provider manages
    fn domain_name(&self) -> &str;

    /// The CNAME target of created records
    fn target(&self) -> &str;

    /// Get the provider name (for logging/debugging)
    fn provider_name(&self) -> &'static str;
}

/// Helper trait for constructing providers from configuration
///
/// Each factory declares the credentials its provider needs; the
/// [`ProviderRegistry`](crate::ProviderRegistry) resolves them before
/// calling [`ProviderFactory::create`].
pub trait ProviderFactory: Send + Sync {
    /// Credential keys that must be present (e.g. `["api_token"]`)
    fn credential_keys(&self) -> &'static [&'static str];

    /// Credential keys that may be present
    fn optional_keys(&self) -> &'static [&'static str] {
        &[]
    }

    /// Whether record operations need a zone-id lookup round trip
    fn requires_zone_lookup(&self) -> bool;

    /// Create a provider instance from configuration
    ///
    /// Implementations validate `domain_name` and `target` with
    /// [`validate_domain`](crate::validate_domain) and fail with
    /// `Error::InvalidDomain` before building any client.
    fn create(
        &self,
        config: &crate::config::ProviderConfig,
    ) -> Result<Box<dyn SubdomainProvider>, crate::Error>;
}
