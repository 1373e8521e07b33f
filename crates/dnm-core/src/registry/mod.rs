//! Explicit provider registry
//!
//! The registry maps provider names to factories, avoiding hardcoded
//! if-else chains. Nothing registers itself: each provider crate exports a
//! `register()` function and the daemon calls it at startup.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use dnm_core::{ProcessEnv, ProviderRegistry};
//!
//! let registry = ProviderRegistry::new();
//! dnm_provider_ovh::register(&registry);
//! dnm_provider_cloudflare::register(&registry);
//!
//! // Reads DNM_OVH_* credentials and DNM_DOMAIN_NAME / DNM_TARGET,
//! // constructs the provider and authenticates it.
//! let provider = registry.create_provider("ovh", &ProcessEnv).await?;
//! ```
//!
//! ## Variable Naming
//!
//! | value            | variable                    |
//! |------------------|-----------------------------|
//! | credential `key` | `DNM_<PROVIDER>_<KEY>`      |
//! | base domain      | `DNM_DOMAIN_NAME`           |
//! | CNAME target     | `DNM_TARGET` (default: base domain) |
//! | dry-run switch   | `DNM_MODE=dry-run`          |

use crate::config::{ENV_PREFIX, ProviderConfig, ProviderCredentials, VariableSource, variable_name};
use crate::error::{Error, Result};
use crate::traits::{ProviderFactory, SubdomainProvider};
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::{debug, info, warn};

/// Detail key for the base domain
const DOMAIN_NAME_KEY: &str = "domain_name";

/// Detail key for the CNAME target
const TARGET_KEY: &str = "target";

/// Key selecting live or dry-run mode
const MODE_KEY: &str = "mode";

/// Provider registry for plugin-based provider creation
///
/// ## Thread Safety
///
/// The registry uses interior mutability with RwLock, allowing concurrent
/// reads and exclusive writes.
#[derive(Default)]
pub struct ProviderRegistry {
    /// Registered factories, keyed by upper-cased provider name
    providers: RwLock<HashMap<String, Arc<dyn ProviderFactory>>>,
}

impl ProviderRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a provider factory
    ///
    /// Names are case-insensitive; registering a name twice replaces the
    /// earlier factory.
    ///
    /// # Parameters
    ///
    /// - `name`: Provider name (e.g., "ovh", "cloudflare")
    /// - `factory`: Factory object for creating provider instances
    pub fn register(&self, name: impl Into<String>, factory: Box<dyn ProviderFactory>) {
        let name = name.into().to_uppercase();
        let mut providers = self
            .providers
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        if providers.insert(name.clone(), Arc::from(factory)).is_some() {
            warn!(provider = %name, "Provider registered twice, replacing factory");
        }
    }

    /// Look up a factory by name
    ///
    /// # Returns
    ///
    /// - `Ok(factory)`: The registered factory
    /// - `Err(Error::UnknownProvider)`: If nothing is registered under `name`
    pub fn get(&self, name: &str) -> Result<Arc<dyn ProviderFactory>> {
        let providers = self.providers.read().unwrap_or_else(PoisonError::into_inner);
        providers
            .get(&name.to_uppercase())
            .cloned()
            .ok_or_else(|| Error::UnknownProvider {
                name: name.to_string(),
                available: sorted_keys(&providers),
            })
    }

    /// Resolve the configuration for a provider from named variables
    ///
    /// Every missing variable, credentials and domain details alike, is
    /// reported in a single [`Error::MissingVariables`].
    pub fn resolve_config(&self, name: &str, vars: &dyn VariableSource) -> Result<ProviderConfig> {
        let factory = self.get(name)?;
        let provider = name.to_uppercase();
        let key_prefix = format!("{}_{}", ENV_PREFIX, provider);

        let mut missing = Vec::new();
        let mut credentials = ProviderCredentials::new();

        for key in factory.credential_keys() {
            let var = variable_name(&key_prefix, key);
            match vars.get(&var) {
                Some(value) => credentials.insert(*key, value),
                None => missing.push(var),
            }
        }

        for key in factory.optional_keys() {
            if let Some(value) = vars.get(&variable_name(&key_prefix, key)) {
                credentials.insert(*key, value);
            }
        }

        let domain_var = variable_name(ENV_PREFIX, DOMAIN_NAME_KEY);
        let domain_name = vars.get(&domain_var);
        if domain_name.is_none() {
            missing.push(domain_var);
        }

        let domain_name = match domain_name {
            Some(domain_name) if missing.is_empty() => domain_name,
            _ => {
                return Err(Error::missing_variables(
                    format!("configuration for provider '{}'", provider),
                    missing,
                ));
            }
        };

        let target = vars.get(&variable_name(ENV_PREFIX, TARGET_KEY));
        let dry_run = vars
            .get(&variable_name(ENV_PREFIX, MODE_KEY))
            .is_some_and(|mode| mode.eq_ignore_ascii_case("dry-run"));

        Ok(ProviderConfig::new(provider, domain_name, target, credentials).with_dry_run(dry_run))
    }

    /// Create and authenticate a provider
    ///
    /// Construction order: credentials → domain details → factory (which
    /// validates domain and target) → `authenticate()`.
    ///
    /// # Returns
    ///
    /// - `Ok(provider)`: An authenticated provider
    /// - `Err(Error)`: Unknown provider, missing variables, invalid domain,
    ///   or authentication failure
    pub async fn create_provider(
        &self,
        name: &str,
        vars: &dyn VariableSource,
    ) -> Result<Arc<dyn SubdomainProvider>> {
        let config = self.resolve_config(name, vars)?;
        self.create_from_config(&config).await
    }

    /// Create and authenticate a provider from an explicit configuration
    pub async fn create_from_config(
        &self,
        config: &ProviderConfig,
    ) -> Result<Arc<dyn SubdomainProvider>> {
        let factory = self.get(&config.provider)?;

        debug!(
            provider = %config.provider,
            domain = %config.domain_name,
            target = %config.target,
            zone_lookup = factory.requires_zone_lookup(),
            "Constructing provider"
        );

        let provider: Arc<dyn SubdomainProvider> = Arc::from(factory.create(config)?);
        provider.authenticate().await?;

        info!(
            provider = provider.provider_name(),
            domain = provider.domain_name(),
            target = provider.target(),
            dry_run = config.dry_run,
            "Provider authenticated"
        );

        Ok(provider)
    }

    /// List all registered provider names
    pub fn list(&self) -> Vec<String> {
        let providers = self.providers.read().unwrap_or_else(PoisonError::into_inner);
        sorted_keys(&providers)
    }

    /// Check if a provider name is registered
    pub fn has(&self, name: &str) -> bool {
        let providers = self.providers.read().unwrap_or_else(PoisonError::into_inner);
        providers.contains_key(&name.to_uppercase())
    }
}

fn sorted_keys(providers: &HashMap<String, Arc<dyn ProviderFactory>>) -> Vec<String> {
    let mut names: Vec<String> = providers.keys().cloned().collect();
    names.sort();
    names
}
