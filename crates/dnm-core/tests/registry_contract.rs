//! Architectural Contract Test: Provider Registry
//!
//! This test verifies explicit, name-keyed provider construction.
//!
//! Constraints verified:
//! - Only explicitly registered providers can be created
//! - Every missing variable is reported in one error
//! - Domain and target are validated before authentication
//! - Authentication runs exactly once per created provider
//!
//! If this test fails, someone has added:
//! - Self-registration or hard-coded provider selection
//! - Fail-fast variable lookup that hides further missing values

mod common;

use common::*;
use dnm_core::config::ProviderConfig;
use dnm_core::error::{Error, Result};
use dnm_core::{ProviderFactory, ProviderRegistry, SubdomainProvider, validate_domain};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio_test::{assert_err, assert_ok};

struct MockFactory {
    created: Arc<AtomicUsize>,
}

impl ProviderFactory for MockFactory {
    fn credential_keys(&self) -> &'static [&'static str] {
        &["api_token", "account"]
    }

    fn requires_zone_lookup(&self) -> bool {
        true
    }

    fn create(&self, config: &ProviderConfig) -> Result<Box<dyn SubdomainProvider>> {
        validate_domain(&config.domain_name)?;
        validate_domain(&config.target)?;
        config.credentials.require("api_token")?;
        self.created.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MockProvider::new()))
    }
}

fn registry() -> (ProviderRegistry, Arc<AtomicUsize>) {
    let created = Arc::new(AtomicUsize::new(0));
    let registry = ProviderRegistry::new();
    registry.register(
        "mock",
        Box::new(MockFactory {
            created: created.clone(),
        }),
    );
    (registry, created)
}

fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

#[tokio::test]
async fn registered_provider_is_created_and_authenticated() {
    let (registry, created) = registry();

    let provider = assert_ok!(
        registry
            .create_provider(
                "MOCK",
                &vars(&[
                    ("DNM_MOCK_API_TOKEN", "t0ken"),
                    ("DNM_MOCK_ACCOUNT", "acct"),
                    ("DNM_DOMAIN_NAME", "example.com"),
                ]),
            )
            .await
    );

    assert_eq!(provider.provider_name(), "mock");
    assert_eq!(created.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn unregistered_provider_is_rejected() {
    let (registry, _) = registry();

    let err = assert_err!(
        registry
            .create_provider("cloudflare", &vars(&[("DNM_DOMAIN_NAME", "example.com")]))
            .await
            .map(|_| ())
    );

    assert!(matches!(err, Error::UnknownProvider { .. }));
    assert!(err.is_config());
}

#[tokio::test]
async fn all_missing_variables_are_reported_at_once() {
    let (registry, created) = registry();

    let err = assert_err!(registry.create_provider("mock", &vars(&[])).await.map(|_| ()));

    match err {
        Error::MissingVariables { variables, .. } => assert_eq!(
            variables,
            vec![
                "DNM_MOCK_API_TOKEN".to_string(),
                "DNM_MOCK_ACCOUNT".to_string(),
                "DNM_DOMAIN_NAME".to_string(),
            ]
        ),
        other => panic!("expected MissingVariables, got {:?}", other),
    }
    assert_eq!(created.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn invalid_domain_fails_construction() {
    let (registry, created) = registry();

    let err = assert_err!(
        registry
            .create_provider(
                "mock",
                &vars(&[
                    ("DNM_MOCK_API_TOKEN", "t0ken"),
                    ("DNM_MOCK_ACCOUNT", "acct"),
                    ("DNM_DOMAIN_NAME", "not a domain"),
                ]),
            )
            .await
            .map(|_| ())
    );
    assert!(matches!(err, Error::InvalidDomain(_)));

    let err = assert_err!(
        registry
            .create_provider(
                "mock",
                &vars(&[
                    ("DNM_MOCK_API_TOKEN", "t0ken"),
                    ("DNM_MOCK_ACCOUNT", "acct"),
                    ("DNM_DOMAIN_NAME", "example.com"),
                    ("DNM_TARGET", "-bad-.com"),
                ]),
            )
            .await
            .map(|_| ())
    );
    assert!(matches!(err, Error::InvalidDomain(_)));
    assert_eq!(created.load(Ordering::SeqCst), 0);
}
