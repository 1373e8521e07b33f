//! Architectural Contract Test: Subdomain Manager
//!
//! This test verifies that the manager is the error boundary between the
//! event pipeline and the DNS backend.
//!
//! Constraints verified:
//! - add then remove leaves zero records
//! - remove with no matching record completes and reports not-found
//! - Provider errors surface as outcomes, never as panics or `Err`
//! - Permanent errors are not retried
//!
//! If this test fails, someone has added:
//! - Error propagation out of the manager
//! - Retries that do not distinguish transient from permanent failures

mod common;

use common::*;
use dnm_core::{ActionOutcome, RetryPolicy, SubdomainManager};
use std::sync::Arc;

#[tokio::test]
async fn add_then_remove_leaves_zero_records() {
    let provider = MockProvider::new();
    let manager = manager_for(MockProvider::sharing_state_with(&provider));

    assert_eq!(
        manager.add_subdomain("api.example.com").await,
        ActionOutcome::Added {
            subdomain: "api".to_string()
        }
    );
    assert_eq!(provider.records(), vec!["api".to_string()]);

    assert_eq!(
        manager.remove_subdomain("api.example.com").await,
        ActionOutcome::Removed {
            subdomain: "api".to_string(),
            count: 1
        }
    );
    assert!(provider.records().is_empty());
}

#[tokio::test]
async fn remove_without_match_reports_not_found() {
    let provider = MockProvider::new();
    let manager = manager_for(MockProvider::sharing_state_with(&provider));

    let outcome = manager.remove_subdomain("ghost.example.com").await;

    assert_eq!(
        outcome,
        ActionOutcome::NotFound {
            subdomain: "ghost".to_string()
        }
    );
    assert!(!outcome.is_failure());
    assert_eq!(provider.calls(), vec![Call::Remove("ghost".to_string())]);
}

#[tokio::test]
async fn nested_and_single_label_hostnames() {
    let provider = MockProvider::new();
    let manager = manager_for(MockProvider::sharing_state_with(&provider));

    manager.add_subdomain("x.y.example.com").await;
    manager.add_subdomain("standalone").await;

    assert_eq!(
        provider.calls(),
        vec![
            Call::Add("x.y".to_string()),
            Call::Add("standalone".to_string())
        ]
    );
}

#[tokio::test]
async fn permanent_provider_error_is_suppressed_without_retry() {
    let provider = MockProvider::new();
    provider.fail_adds(true);
    provider.fail_removes(true);

    let manager = SubdomainManager::new(
        Arc::new(MockProvider::sharing_state_with(&provider)),
        RetryPolicy {
            max_retries: 3,
            retry_delay_ms: 1,
        },
    )
    .unwrap();

    let added = manager.add_subdomain("api.example.com").await;
    let removed = manager.remove_subdomain("api.example.com").await;

    assert!(matches!(added, ActionOutcome::Failed { ref subdomain, .. } if subdomain == "api"));
    assert!(removed.is_failure());

    // One call each: permanent errors are not retried
    assert_eq!(
        provider.calls(),
        vec![Call::Add("api".to_string()), Call::Remove("api".to_string())]
    );
}

#[tokio::test]
async fn manager_reports_bound_zone() {
    let manager = manager_for(MockProvider::new());
    assert_eq!(manager.base_domain().as_str(), DOMAIN);
    assert_eq!(manager.provider_name(), "mock");
}
