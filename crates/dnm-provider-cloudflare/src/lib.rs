// # Cloudflare Subdomain Provider
//
// This crate provides a Cloudflare implementation of `SubdomainProvider`:
// CNAME records `<subdomain>.<domain> → <target>` in a Cloudflare zone.
//
// ## Behaviour
//
// - ✅ Bearer token verified once at startup (`authenticate`)
// - ✅ Zone ID resolved on first use and memoized for the provider's lifetime
// - ✅ HTTP timeout configured (30 seconds)
// - ✅ Status mapping: 401/403 auth, 404 not found, 429 rate limited, 5xx transient
// - ✅ Dry-run mode (lookups performed, mutations logged and skipped)
// - ❌ NO retry logic (owned by SubdomainManager)
// - ❌ NO background tasks
//
// ## Security Requirements
//
// - API token NEVER appears in logs or Debug output
// - API token MUST be provided via `DNM_CLOUDFLARE_API_TOKEN`
//
// ## API Reference
//
// - Cloudflare API v4: https://developers.cloudflare.com/api/
// - Verify Token: GET `/user/tokens/verify`
// - List Zones: GET `/zones?name=...`
// - List DNS Records: GET `/zones/:zone_id/dns_records?type=CNAME&name=...`
// - Create DNS Record: POST `/zones/:zone_id/dns_records`
// - Delete DNS Record: DELETE `/zones/:zone_id/dns_records/:record_id`

use async_trait::async_trait;
use dnm_core::config::ProviderConfig;
use dnm_core::traits::{DEFAULT_RECORD_TTL, ProviderFactory, RECORD_TYPE, RemoveOutcome, SubdomainProvider};
use dnm_core::{Error, Result, validate_domain};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

/// Cloudflare API base URL
const CLOUDFLARE_API_BASE: &str = "https://api.cloudflare.com/client/v4";

/// Default HTTP timeout for API requests (30 seconds)
const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Provider name used in logs and errors
const PROVIDER_NAME: &str = "cloudflare";

/// Response envelope shared by every Cloudflare v4 endpoint
#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    success: bool,
    #[serde(default)]
    errors: Vec<ApiMessage>,
    result: Option<T>,
}

#[derive(Debug, Deserialize)]
struct ApiMessage {
    #[serde(default)]
    code: i64,
    #[serde(default)]
    message: String,
}

impl<T> ApiResponse<T> {
    fn into_result(self, context: &str) -> Result<T> {
        if !self.success {
            let messages: Vec<String> = self
                .errors
                .iter()
                .map(|e| format!("{} ({})", e.message, e.code))
                .collect();
            return Err(Error::provider(
                PROVIDER_NAME,
                format!("{} rejected: {}", context, messages.join("; ")),
            ));
        }
        self.result.ok_or_else(|| {
            Error::provider(PROVIDER_NAME, format!("{}: response has no result", context))
        })
    }
}

#[derive(Debug, Deserialize)]
struct Zone {
    id: String,
}

#[derive(Debug, Deserialize)]
struct DnsRecord {
    id: String,
}

#[derive(Debug, Deserialize)]
struct TokenStatus {
    status: String,
}

#[derive(Debug, Serialize)]
struct CreateRecord<'a> {
    #[serde(rename = "type")]
    record_type: &'a str,
    name: &'a str,
    content: &'a str,
    ttl: u32,
    proxied: bool,
}

/// Cloudflare subdomain provider
///
/// # Zone Memoization
///
/// The zone ID is looked up by domain name on the first record operation
/// (or taken from `DNM_CLOUDFLARE_ZONE_ID`) and reused afterwards.
///
/// # Dry-Run Mode
///
/// When `dry_run` is true, the provider will:
/// - Perform all GET requests (zone lookup, record lookup)
/// - Log the intended POST/DELETE
/// - **NOT** actually modify DNS records
pub struct CloudflareProvider {
    /// Cloudflare API token
    /// ⚠️ NEVER log this value
    api_token: String,

    /// Zone managed by this provider
    domain_name: String,

    /// CNAME target
    target: String,

    /// HTTP client for API requests
    client: reqwest::Client,

    /// API base URL (overridable for tests)
    api_base: String,

    /// Zone ID, resolved once
    zone_id: OnceCell<String>,

    /// Dry-run mode: if true, perform GET requests but skip mutations
    dry_run: bool,
}

// Custom Debug implementation that hides the API token
impl std::fmt::Debug for CloudflareProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CloudflareProvider")
            .field("api_token", &"<REDACTED>")
            .field("domain_name", &self.domain_name)
            .field("target", &self.target)
            .field("zone_id", &self.zone_id.get())
            .field("dry_run", &self.dry_run)
            .finish()
    }
}

impl CloudflareProvider {
    /// Create a new Cloudflare provider
    ///
    /// # Parameters
    ///
    /// - `api_token`: Cloudflare API token with Zone:DNS:Edit permissions
    /// - `domain_name`: Zone to manage (e.g. "example.com")
    /// - `target`: CNAME target of created records
    /// - `dry_run`: If true, perform GET requests but skip mutations
    ///
    /// # Returns
    ///
    /// - `Err(Error::Config)`: If the token is empty or the HTTP client
    ///   cannot be built
    pub fn new(
        api_token: impl Into<String>,
        domain_name: impl Into<String>,
        target: impl Into<String>,
        dry_run: bool,
    ) -> Result<Self> {
        let api_token = api_token.into();
        if api_token.is_empty() {
            return Err(Error::config("Cloudflare API token cannot be empty"));
        }

        let client = reqwest::Client::builder()
            .timeout(DEFAULT_HTTP_TIMEOUT)
            .build()
            .map_err(|e| Error::config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            api_token,
            domain_name: domain_name.into(),
            target: target.into(),
            client,
            api_base: CLOUDFLARE_API_BASE.to_string(),
            zone_id: OnceCell::new(),
            dry_run,
        })
    }

    /// Point the provider at another API base URL
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_string();
        self
    }

    /// Use a known zone ID instead of looking it up
    pub fn with_zone_id(mut self, zone_id: impl Into<String>) -> Self {
        self.zone_id = OnceCell::new_with(Some(zone_id.into()));
        self
    }

    /// Whether mutations are skipped
    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    /// Fully qualified record name for a subdomain
    fn record_name(&self, subdomain: &str) -> String {
        format!("{}.{}", subdomain, self.domain_name)
    }

    /// Send a request and unwrap the Cloudflare envelope
    async fn execute<T: DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
        context: &str,
    ) -> Result<T> {
        let response = request
            .bearer_auth(&self.api_token)
            .send()
            .await
            .map_err(|e| {
                if e.is_connect() {
                    Error::connect(format!("{}: {}", context, e))
                } else {
                    Error::http(format!("{}: request failed: {}", context, e))
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unable to read error response".to_string());
            return Err(Error::from_status(PROVIDER_NAME, context, status.as_u16(), &body));
        }

        let envelope: ApiResponse<T> = response.json().await.map_err(|e| {
            Error::provider(PROVIDER_NAME, format!("Failed to parse {} response: {}", context, e))
        })?;
        envelope.into_result(context)
    }

    /// Get the zone ID, looking it up on first use
    ///
    /// # API Call
    ///
    /// ```http
    /// GET /zones?name=example.com
    /// Authorization: Bearer <token>
    /// ```
    async fn zone_id(&self) -> Result<&str> {
        let zone_id = self
            .zone_id
            .get_or_try_init(|| async {
                debug!(domain = %self.domain_name, "Looking up zone ID");
                let zones: Vec<Zone> = self
                    .execute(
                        self.client
                            .get(format!("{}/zones", self.api_base))
                            .query(&[("name", self.domain_name.as_str())]),
                        "zone lookup",
                    )
                    .await?;

                let zone = zones.into_iter().next().ok_or_else(|| {
                    Error::not_found(format!("Zone ID for domain '{}' not found", self.domain_name))
                })?;
                debug!(domain = %self.domain_name, zone_id = %zone.id, "Found zone ID");
                Ok::<_, Error>(zone.id)
            })
            .await?;
        Ok(zone_id.as_str())
    }

    /// IDs of the CNAME records named `record_name`
    ///
    /// # API Call
    ///
    /// ```http
    /// GET /zones/:zone_id/dns_records?type=CNAME&name=api.example.com
    /// Authorization: Bearer <token>
    /// ```
    async fn find_record_ids(&self, zone_id: &str, record_name: &str) -> Result<Vec<String>> {
        let records: Vec<DnsRecord> = self
            .execute(
                self.client
                    .get(format!("{}/zones/{}/dns_records", self.api_base, zone_id))
                    .query(&[("type", RECORD_TYPE), ("name", record_name)]),
                "record lookup",
            )
            .await?;
        Ok(records.into_iter().map(|r| r.id).collect())
    }
}

#[async_trait]
impl SubdomainProvider for CloudflareProvider {
    /// Verify the API token
    ///
    /// ```http
    /// GET /user/tokens/verify
    /// ```
    async fn authenticate(&self) -> Result<()> {
        let token: TokenStatus = self
            .execute(
                self.client.get(format!("{}/user/tokens/verify", self.api_base)),
                "token verification",
            )
            .await?;

        if token.status != "active" {
            return Err(Error::auth(format!(
                "{}: API token is {}",
                PROVIDER_NAME, token.status
            )));
        }

        debug!("Cloudflare API token verified");
        Ok(())
    }

    /// Create the CNAME record
    ///
    /// ```http
    /// POST /zones/:zone_id/dns_records
    /// {"type": "CNAME", "name": "api.example.com", "content": "<target>", "ttl": 3600, "proxied": false}
    /// ```
    async fn add_subdomain(&self, subdomain: &str) -> Result<()> {
        let zone_id = self.zone_id().await?;
        let name = self.record_name(subdomain);
        let payload = CreateRecord {
            record_type: RECORD_TYPE,
            name: &name,
            content: &self.target,
            ttl: DEFAULT_RECORD_TTL,
            proxied: false,
        };

        if self.dry_run {
            info!(
                record = %name,
                target = %self.target,
                "[DRY-RUN] Would create CNAME record"
            );
            return Ok(());
        }

        let _: serde_json::Value = self
            .execute(
                self.client
                    .post(format!("{}/zones/{}/dns_records", self.api_base, zone_id))
                    .json(&payload),
                "record creation",
            )
            .await?;

        info!(record = %name, target = %self.target, "Added CNAME record");
        Ok(())
    }

    /// Delete the first CNAME record matching the subdomain
    ///
    /// ```http
    /// DELETE /zones/:zone_id/dns_records/:record_id
    /// ```
    async fn remove_subdomain(&self, subdomain: &str) -> Result<RemoveOutcome> {
        let zone_id = self.zone_id().await?;
        let name = self.record_name(subdomain);
        let record_ids = self.find_record_ids(zone_id, &name).await?;

        let Some(record_id) = record_ids.first() else {
            debug!(record = %name, "No CNAME record to remove");
            return Ok(RemoveOutcome::NotFound);
        };

        if record_ids.len() > 1 {
            warn!(
                record = %name,
                matches = record_ids.len(),
                "Several CNAME records match, removing the first only"
            );
        }

        if self.dry_run {
            info!(record = %name, record_id = %record_id, "[DRY-RUN] Would delete CNAME record");
            return Ok(RemoveOutcome::Removed { count: 1 });
        }

        let _: serde_json::Value = self
            .execute(
                self.client.delete(format!(
                    "{}/zones/{}/dns_records/{}",
                    self.api_base, zone_id, record_id
                )),
                "record deletion",
            )
            .await?;

        info!(record = %name, record_id = %record_id, "Removed CNAME record");
        Ok(RemoveOutcome::Removed { count: 1 })
    }

    fn domain_name(&self) -> &str {
        &self.domain_name
    }

    fn target(&self) -> &str {
        &self.target
    }

    fn provider_name(&self) -> &'static str {
        PROVIDER_NAME
    }
}

/// Factory for creating Cloudflare providers
pub struct CloudflareFactory;

impl ProviderFactory for CloudflareFactory {
    fn credential_keys(&self) -> &'static [&'static str] {
        &["api_token"]
    }

    fn optional_keys(&self) -> &'static [&'static str] {
        &["zone_id"]
    }

    fn requires_zone_lookup(&self) -> bool {
        true
    }

    fn create(&self, config: &ProviderConfig) -> Result<Box<dyn SubdomainProvider>> {
        validate_domain(&config.domain_name)?;
        validate_domain(&config.target)?;
        let api_token = config.credentials.require("api_token")?;

        if config.dry_run {
            warn!("Cloudflare provider running in DRY-RUN mode - no changes will be made");
        }

        let mut provider = CloudflareProvider::new(
            api_token,
            config.domain_name.as_str(),
            config.target.as_str(),
            config.dry_run,
        )?;
        if let Some(zone_id) = config.credentials.get("zone_id") {
            provider = provider.with_zone_id(zone_id);
        }

        Ok(Box::new(provider))
    }
}

/// Register the Cloudflare provider with a registry
///
/// This function should be called during initialization to make the
/// Cloudflare provider available.
///
/// # Example
///
/// ```rust
/// use dnm_core::ProviderRegistry;
///
/// let registry = ProviderRegistry::new();
/// dnm_provider_cloudflare::register(&registry);
/// assert!(registry.has("cloudflare"));
/// ```
pub fn register(registry: &dnm_core::ProviderRegistry) {
    registry.register(PROVIDER_NAME, Box::new(CloudflareFactory));
}
