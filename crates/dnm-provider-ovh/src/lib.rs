// # OVH Subdomain Provider
//
// This crate provides an OVH implementation of `SubdomainProvider`:
// CNAME records in an OVH-hosted DNS zone, addressed by zone name.
//
// ## Behaviour
//
// - ✅ Signed requests (application key, application secret, consumer key)
// - ✅ Clock synchronised with the API server at startup (`authenticate`)
// - ✅ Zone existence confirmed at startup, listing available zones if absent
// - ✅ Zone refreshed after every successful mutation
// - ✅ All matching records deleted, spaced by a random 100–500 ms delay
// - ✅ Dry-run mode (lookups performed, mutations logged and skipped)
// - ❌ NO retry logic (owned by SubdomainManager)
//
// ## Request Signature
//
// ```text
// X-Ovh-Signature: "$1$" + sha1_hex(AS + "+" + CK + "+" + METHOD + "+" + URL + "+" + BODY + "+" + TIMESTAMP)
// ```
//
// ## API Reference
//
// - Server time: GET `/auth/time`
// - Zone: GET `/domain/zone/{zone}`
// - List records: GET `/domain/zone/{zone}/record?fieldType=CNAME&subDomain=...`
// - Create record: POST `/domain/zone/{zone}/record`
// - Delete record: DELETE `/domain/zone/{zone}/record/{id}`
// - Apply changes: POST `/domain/zone/{zone}/refresh`

use async_trait::async_trait;
use dnm_core::config::ProviderConfig;
use dnm_core::traits::{DEFAULT_RECORD_TTL, ProviderFactory, RECORD_TYPE, RemoveOutcome, SubdomainProvider};
use dnm_core::{Error, Result, validate_domain};
use rand::Rng;
use reqwest::Method;
use serde::Serialize;
use serde::de::DeserializeOwned;
use sha1::{Digest, Sha1};
use std::ops::RangeInclusive;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Default HTTP timeout for API requests (30 seconds)
const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Provider name used in logs and errors
const PROVIDER_NAME: &str = "ovh";

/// Endpoint used when `DNM_OVH_ENDPOINT` is not set
pub const DEFAULT_ENDPOINT: &str = "ovh-eu";

/// Delay between consecutive deletions (milliseconds)
const DELETE_JITTER_MS: RangeInclusive<u64> = 100..=500;

/// Resolve an endpoint alias or URL to an API base URL
///
/// # Returns
///
/// - `Ok(url)`: For `ovh-eu`, `ovh-ca`, `ovh-us` or an `http(s)://` URL
/// - `Err(Error::Config)`: For anything else
pub fn resolve_endpoint(endpoint: &str) -> Result<String> {
    match endpoint {
        "ovh-eu" => Ok("https://eu.api.ovh.com/1.0".to_string()),
        "ovh-ca" => Ok("https://ca.api.ovh.com/1.0".to_string()),
        "ovh-us" => Ok("https://api.us.ovhcloud.com/1.0".to_string()),
        url if url.starts_with("https://") || url.starts_with("http://") => {
            Ok(url.trim_end_matches('/').to_string())
        }
        other => Err(Error::config(format!(
            "Unknown OVH endpoint '{}' (expected ovh-eu, ovh-ca, ovh-us or a URL)",
            other
        ))),
    }
}

/// Compute the `X-Ovh-Signature` header value
pub fn sign(
    application_secret: &str,
    consumer_key: &str,
    method: &str,
    url: &str,
    body: &str,
    timestamp: i64,
) -> String {
    let mut hasher = Sha1::new();
    hasher.update(
        format!(
            "{}+{}+{}+{}+{}+{}",
            application_secret, consumer_key, method, url, body, timestamp
        )
        .as_bytes(),
    );
    format!("$1${}", hex::encode(hasher.finalize()))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateRecord<'a> {
    field_type: &'a str,
    sub_domain: &'a str,
    target: &'a str,
    ttl: u32,
}

/// OVH subdomain provider
///
/// # Dry-Run Mode
///
/// When `dry_run` is true, the provider will:
/// - Perform all GET requests (time, zone, record lookup)
/// - Log the intended POST/DELETE
/// - **NOT** modify or refresh the zone
pub struct OvhProvider {
    application_key: String,

    /// ⚠️ NEVER log this value
    application_secret: String,

    /// ⚠️ NEVER log this value
    consumer_key: String,

    /// API base URL, e.g. `https://eu.api.ovh.com/1.0`
    api_base: String,

    /// Zone managed by this provider
    domain_name: String,

    /// CNAME target
    target: String,

    client: reqwest::Client,

    /// Server time minus local time (seconds), set by `authenticate`
    time_delta: AtomicI64,

    dry_run: bool,
}

// Custom Debug implementation that hides the secrets
impl std::fmt::Debug for OvhProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OvhProvider")
            .field("application_key", &self.application_key)
            .field("application_secret", &"<REDACTED>")
            .field("consumer_key", &"<REDACTED>")
            .field("api_base", &self.api_base)
            .field("domain_name", &self.domain_name)
            .field("target", &self.target)
            .field("dry_run", &self.dry_run)
            .finish()
    }
}

impl OvhProvider {
    /// Create a new OVH provider
    ///
    /// # Parameters
    ///
    /// - `application_key`, `application_secret`, `consumer_key`: API credentials
    /// - `api_base`: Resolved API base URL (see [`resolve_endpoint`])
    /// - `domain_name`: Zone to manage
    /// - `target`: CNAME target of created records
    /// - `dry_run`: If true, perform GET requests but skip mutations
    pub fn new(
        application_key: impl Into<String>,
        application_secret: impl Into<String>,
        consumer_key: impl Into<String>,
        api_base: impl Into<String>,
        domain_name: impl Into<String>,
        target: impl Into<String>,
        dry_run: bool,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(DEFAULT_HTTP_TIMEOUT)
            .build()
            .map_err(|e| Error::config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            application_key: application_key.into(),
            application_secret: application_secret.into(),
            consumer_key: consumer_key.into(),
            api_base: api_base.into().trim_end_matches('/').to_string(),
            domain_name: domain_name.into(),
            target: target.into(),
            client,
            time_delta: AtomicI64::new(0),
            dry_run,
        })
    }

    /// Whether mutations are skipped
    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    fn zone_path(&self) -> String {
        format!("/domain/zone/{}", self.domain_name)
    }

    fn timestamp(&self) -> i64 {
        chrono::Utc::now().timestamp() + self.time_delta.load(Ordering::Relaxed)
    }

    /// Send a signed request and decode the JSON response
    ///
    /// An empty response body decodes as JSON `null`.
    async fn call<T: DeserializeOwned>(
        &self,
        method: Method,
        path_and_query: &str,
        body: Option<String>,
        context: &str,
    ) -> Result<T> {
        let url = format!("{}{}", self.api_base, path_and_query);
        let body = body.unwrap_or_default();
        let timestamp = self.timestamp();
        let signature = sign(
            &self.application_secret,
            &self.consumer_key,
            method.as_str(),
            &url,
            &body,
            timestamp,
        );

        let mut request = self
            .client
            .request(method, &url)
            .header("X-Ovh-Application", &self.application_key)
            .header("X-Ovh-Consumer", &self.consumer_key)
            .header("X-Ovh-Timestamp", timestamp.to_string())
            .header("X-Ovh-Signature", signature)
            .header("Content-Type", "application/json");
        if !body.is_empty() {
            request = request.body(body);
        }

        let response = request
            .send()
            .await
            .map_err(|e| request_error(context, e))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| Error::http(format!("{}: failed to read response: {}", context, e)))?;

        if !status.is_success() {
            return Err(Error::from_status(PROVIDER_NAME, context, status.as_u16(), &text));
        }

        let text = if text.trim().is_empty() { "null" } else { text.as_str() };
        serde_json::from_str(text).map_err(|e| {
            Error::provider(PROVIDER_NAME, format!("Failed to parse {} response: {}", context, e))
        })
    }

    /// Synchronise the request clock with the API server
    ///
    /// ```http
    /// GET /auth/time
    /// ```
    async fn sync_time(&self) -> Result<()> {
        let url = format!("{}/auth/time", self.api_base);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| request_error("time sync", e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::from_status(PROVIDER_NAME, "time sync", status.as_u16(), &body));
        }

        let server_time: i64 = response.json().await.map_err(|e| {
            Error::provider(PROVIDER_NAME, format!("Failed to parse server time: {}", e))
        })?;
        let delta = server_time - chrono::Utc::now().timestamp();
        self.time_delta.store(delta, Ordering::Relaxed);
        debug!(delta_secs = delta, "Synchronised clock with OVH API");
        Ok(())
    }

    /// Apply pending zone changes
    ///
    /// ```http
    /// POST /domain/zone/{zone}/refresh
    /// ```
    async fn refresh_zone(&self) -> Result<()> {
        let _: serde_json::Value = self
            .call(
                Method::POST,
                &format!("{}/refresh", self.zone_path()),
                None,
                "zone refresh",
            )
            .await?;
        debug!(domain = %self.domain_name, "Zone refreshed");
        Ok(())
    }

    /// Refresh after a mutation that already went through
    ///
    /// OVH applies pending changes on the next successful refresh, so a
    /// failure is only logged.
    async fn refresh_after_change(&self, subdomain: &str) {
        if let Err(e) = self.refresh_zone().await {
            warn!(
                subdomain = %subdomain,
                domain = %self.domain_name,
                error = %e,
                "Zone refresh failed after record change"
            );
        }
    }
}

/// Map a failed send; connection failures mean the request never left
fn request_error(context: &str, e: reqwest::Error) -> Error {
    if e.is_connect() {
        Error::connect(format!("{}: {}", context, e))
    } else {
        Error::http(format!("{}: request failed: {}", context, e))
    }
}

#[async_trait]
impl SubdomainProvider for OvhProvider {
    /// Synchronise the clock and confirm the zone exists
    ///
    /// A missing zone fails with the list of zones the credentials can see.
    async fn authenticate(&self) -> Result<()> {
        self.sync_time().await?;

        let zone: Result<serde_json::Value> = self
            .call(Method::GET, &self.zone_path(), None, "zone lookup")
            .await;

        match zone {
            Ok(_) => {
                debug!(domain = %self.domain_name, "OVH zone confirmed");
                Ok(())
            }
            Err(Error::NotFound(_)) => {
                let available: Vec<String> = self
                    .call(Method::GET, "/domain/zone", None, "zone listing")
                    .await?;
                Err(Error::not_found(format!(
                    "The domain '{}' does not exist! Available domains: [{}]",
                    self.domain_name,
                    available.join(", ")
                )))
            }
            Err(e) => Err(e),
        }
    }

    /// Create the CNAME record, then refresh the zone
    ///
    /// ```http
    /// POST /domain/zone/{zone}/record
    /// {"fieldType": "CNAME", "subDomain": "api", "target": "<target>", "ttl": 3600}
    /// ```
    async fn add_subdomain(&self, subdomain: &str) -> Result<()> {
        let payload = CreateRecord {
            field_type: RECORD_TYPE,
            sub_domain: subdomain,
            target: &self.target,
            ttl: DEFAULT_RECORD_TTL,
        };
        let body = serde_json::to_string(&payload)?;

        if self.dry_run {
            info!(
                subdomain = %subdomain,
                domain = %self.domain_name,
                payload = %body,
                "[DRY-RUN] Would create CNAME record"
            );
            return Ok(());
        }

        let created: serde_json::Value = self
            .call(
                Method::POST,
                &format!("{}/record", self.zone_path()),
                Some(body),
                "record creation",
            )
            .await?;
        debug!(response = %created, "OVH record created");

        // The record exists from here on; a failed refresh must not fail the create
        self.refresh_after_change(subdomain).await;

        info!(
            subdomain = %subdomain,
            domain = %self.domain_name,
            target = %self.target,
            "Added CNAME record"
        );
        Ok(())
    }

    /// Delete every matching CNAME record, then refresh the zone
    async fn remove_subdomain(&self, subdomain: &str) -> Result<RemoveOutcome> {
        let record_ids: Vec<u64> = self
            .call(
                Method::GET,
                &format!(
                    "{}/record?fieldType={}&subDomain={}",
                    self.zone_path(),
                    RECORD_TYPE,
                    subdomain
                ),
                None,
                "record lookup",
            )
            .await?;

        if record_ids.is_empty() {
            debug!(subdomain = %subdomain, "No CNAME record to remove");
            return Ok(RemoveOutcome::NotFound);
        }

        if self.dry_run {
            info!(
                subdomain = %subdomain,
                records = ?record_ids,
                "[DRY-RUN] Would delete CNAME records"
            );
            return Ok(RemoveOutcome::Removed {
                count: record_ids.len(),
            });
        }

        for (i, record_id) in record_ids.iter().enumerate() {
            if i > 0 {
                let delay = Duration::from_millis(rand::rng().random_range(DELETE_JITTER_MS));
                tokio::time::sleep(delay).await;
            }

            let _: serde_json::Value = self
                .call(
                    Method::DELETE,
                    &format!("{}/record/{}", self.zone_path(), record_id),
                    None,
                    "record deletion",
                )
                .await?;
            debug!(subdomain = %subdomain, record_id, "Deleted CNAME record");
        }

        self.refresh_after_change(subdomain).await;

        info!(
            subdomain = %subdomain,
            domain = %self.domain_name,
            count = record_ids.len(),
            "Removed CNAME records"
        );
        Ok(RemoveOutcome::Removed {
            count: record_ids.len(),
        })
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

/// Factory for creating OVH providers
pub struct OvhFactory;

impl ProviderFactory for OvhFactory {
    fn credential_keys(&self) -> &'static [&'static str] {
        &["application_key", "application_secret", "consumer_key"]
    }

    fn optional_keys(&self) -> &'static [&'static str] {
        &["endpoint"]
    }

    fn requires_zone_lookup(&self) -> bool {
        false
    }

    fn create(&self, config: &ProviderConfig) -> Result<Box<dyn SubdomainProvider>> {
        validate_domain(&config.domain_name)?;
        validate_domain(&config.target)?;

        let credentials = &config.credentials;
        let api_base =
            resolve_endpoint(credentials.get("endpoint").unwrap_or(DEFAULT_ENDPOINT))?;

        if config.dry_run {
            warn!("OVH provider running in DRY-RUN mode - no changes will be made");
        }

        Ok(Box::new(OvhProvider::new(
            credentials.require("application_key")?,
            credentials.require("application_secret")?,
            credentials.require("consumer_key")?,
            api_base,
            config.domain_name.as_str(),
            config.target.as_str(),
            config.dry_run,
        )?))
    }
}

/// Register the OVH provider with a registry
///
/// # Example
///
/// ```rust
/// use dnm_core::ProviderRegistry;
///
/// let registry = ProviderRegistry::new();
/// dnm_provider_ovh::register(&registry);
/// assert!(registry.has("ovh"));
/// ```
pub fn register(registry: &dnm_core::ProviderRegistry) {
    registry.register(PROVIDER_NAME, Box::new(OvhFactory));
}

#[cfg(test)]
mod tests {
    use super::*;
    use dnm_core::config::ProviderCredentials;

    fn credentials() -> ProviderCredentials {
        ProviderCredentials::new()
            .with("application_key", "AK")
            .with("application_secret", "AS")
            .with("consumer_key", "CK")
    }

    #[test]
    fn test_signature_get() {
        assert_eq!(
            sign(
                "AS",
                "CK",
                "GET",
                "https://eu.api.ovh.com/1.0/domain/zone/example.com/record?fieldType=CNAME&subDomain=api",
                "",
                1_700_000_000,
            ),
            "$1$9932ae1e205bb4d9789c0a32fc4d3db0921fb8b8"
        );
    }

    #[test]
    fn test_signature_covers_body() {
        let body = serde_json::to_string(&CreateRecord {
            field_type: "CNAME",
            sub_domain: "api",
            target: "example.com",
            ttl: 3600,
        })
        .unwrap();
        assert_eq!(
            body,
            r#"{"fieldType":"CNAME","subDomain":"api","target":"example.com","ttl":3600}"#
        );
        assert_eq!(
            sign(
                "AS",
                "CK",
                "POST",
                "https://eu.api.ovh.com/1.0/domain/zone/example.com/record",
                &body,
                1_700_000_000,
            ),
            "$1$6382ca56aa21596cad8715ec207d03cf62605eb8"
        );
    }

    #[test]
    fn test_resolve_endpoint() {
        assert_eq!(resolve_endpoint("ovh-eu").unwrap(), "https://eu.api.ovh.com/1.0");
        assert_eq!(resolve_endpoint("ovh-ca").unwrap(), "https://ca.api.ovh.com/1.0");
        assert_eq!(
            resolve_endpoint("http://127.0.0.1:8080/").unwrap(),
            "http://127.0.0.1:8080"
        );
        assert!(resolve_endpoint("kimsufi-eu-typo").is_err());
    }

    #[test]
    fn test_factory_creation() {
        let config = ProviderConfig::new("OVH", "example.com", None, credentials());
        let provider = OvhFactory.create(&config).unwrap();
        assert_eq!(provider.provider_name(), "ovh");
        assert_eq!(provider.target(), "example.com");
    }

    #[test]
    fn test_factory_uses_domain_without_root_dot() {
        let config = ProviderConfig::new("OVH", "example.com.", None, credentials());
        let provider = OvhFactory.create(&config).unwrap();
        assert_eq!(provider.domain_name(), "example.com");
        assert_eq!(provider.target(), "example.com");
    }

    #[test]
    fn test_factory_rejects_invalid_domain() {
        let config = ProviderConfig::new("OVH", "not a domain", None, credentials());
        assert!(matches!(OvhFactory.create(&config), Err(Error::InvalidDomain(_))));
    }

    #[test]
    fn test_factory_rejects_unknown_endpoint() {
        let config = ProviderConfig::new(
            "OVH",
            "example.com",
            None,
            credentials().with("endpoint", "mars-1"),
        );
        assert!(matches!(OvhFactory.create(&config), Err(Error::Config(_))));
    }

    #[test]
    fn test_secrets_not_exposed_in_debug() {
        let provider = OvhProvider::new(
            "AK",
            "super_secret_as",
            "super_secret_ck",
            "https://eu.api.ovh.com/1.0",
            "example.com",
            "example.com",
            false,
        )
        .unwrap();

        let debug_str = format!("{:?}", provider);
        assert!(!debug_str.contains("super_secret"));
        assert!(debug_str.contains("OvhProvider"));
    }
}
