//! Test doubles and common utilities for contract tests
//!
//! This module provides minimal test doubles that verify architectural
//! constraints without talking to a real runtime or DNS backend.

#![allow(dead_code)]

use dnm_core::config::ListenerConfig;
use dnm_core::error::{Error, Result};
use dnm_core::traits::{EventAction, EventFilter, EventSource, EventStream, LifecycleEvent};
use dnm_core::{ReconnectPolicy, RemoveOutcome, RetryPolicy, SubdomainManager, SubdomainProvider};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

/// Base domain used by every contract test
pub const DOMAIN: &str = "example.com";

/// A provider call, as recorded by [`MockProvider`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Add(String),
    Remove(String),
}

/// An in-memory DNS backend
///
/// Records are kept as a list of subdomains so duplicates are visible.
/// Failure switches make the next add or remove return a permanent
/// provider error.
pub struct MockProvider {
    records: Arc<Mutex<Vec<String>>>,
    calls: Arc<Mutex<Vec<Call>>>,
    fail_adds: Arc<AtomicBool>,
    fail_removes: Arc<AtomicBool>,
    panic_on: Arc<Mutex<Option<String>>>,
    delay: Duration,
}

impl MockProvider {
    pub fn new() -> Self {
        Self {
            records: Arc::new(Mutex::new(Vec::new())),
            calls: Arc::new(Mutex::new(Vec::new())),
            fail_adds: Arc::new(AtomicBool::new(false)),
            fail_removes: Arc::new(AtomicBool::new(false)),
            panic_on: Arc::new(Mutex::new(None)),
            delay: Duration::ZERO,
        }
    }

    /// Make every call take `delay`
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn fail_adds(&self, fail: bool) {
        self.fail_adds.store(fail, Ordering::SeqCst);
    }

    pub fn fail_removes(&self, fail: bool) {
        self.fail_removes.store(fail, Ordering::SeqCst);
    }

    /// Panic when asked to add this subdomain
    pub fn panic_on(&self, subdomain: &str) {
        *self.panic_on.lock().unwrap() = Some(subdomain.to_string());
    }

    /// Pre-populate a record
    pub fn seed(&self, subdomain: &str) {
        self.records.lock().unwrap().push(subdomain.to_string());
    }

    pub fn records(&self) -> Vec<String> {
        self.records.lock().unwrap().clone()
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    /// Create a provider sharing state with an existing one
    pub fn sharing_state_with(other: &Self) -> Self {
        Self {
            records: Arc::clone(&other.records),
            calls: Arc::clone(&other.calls),
            fail_adds: Arc::clone(&other.fail_adds),
            fail_removes: Arc::clone(&other.fail_removes),
            panic_on: Arc::clone(&other.panic_on),
            delay: other.delay,
        }
    }
}

#[async_trait::async_trait]
impl SubdomainProvider for MockProvider {
    async fn authenticate(&self) -> Result<()> {
        Ok(())
    }

    async fn add_subdomain(&self, subdomain: &str) -> Result<()> {
        self.calls.lock().unwrap().push(Call::Add(subdomain.to_string()));
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self.panic_on.lock().unwrap().as_deref() == Some(subdomain) {
            panic!("mock provider exploded on {}", subdomain);
        }
        if self.fail_adds.load(Ordering::SeqCst) {
            return Err(Error::provider("mock", "record creation rejected"));
        }
        self.records.lock().unwrap().push(subdomain.to_string());
        Ok(())
    }

    async fn remove_subdomain(&self, subdomain: &str) -> Result<RemoveOutcome> {
        self.calls.lock().unwrap().push(Call::Remove(subdomain.to_string()));
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self.fail_removes.load(Ordering::SeqCst) {
            return Err(Error::provider("mock", "record deletion rejected"));
        }
        let mut records = self.records.lock().unwrap();
        let before = records.len();
        records.retain(|r| r != subdomain);
        match before - records.len() {
            0 => Ok(RemoveOutcome::NotFound),
            count => Ok(RemoveOutcome::Removed { count }),
        }
    }

    fn domain_name(&self) -> &str {
        DOMAIN
    }

    fn target(&self) -> &str {
        DOMAIN
    }

    fn provider_name(&self) -> &'static str {
        "mock"
    }
}

/// An event source driven by the test
///
/// Each `subscribe()` takes the next queued stream; once they run out the
/// subscription fails with a transport error.
pub struct ControlledEventSource {
    streams: Mutex<VecDeque<mpsc::UnboundedReceiver<Result<LifecycleEvent>>>>,
    subscribe_count: AtomicUsize,
}

impl ControlledEventSource {
    /// Create a source with one subscription
    pub fn new() -> (Self, mpsc::UnboundedSender<Result<LifecycleEvent>>) {
        let (source, mut senders) = Self::with_subscriptions(1);
        (source, senders.remove(0))
    }

    /// Create a source serving `count` consecutive subscriptions
    pub fn with_subscriptions(
        count: usize,
    ) -> (Self, Vec<mpsc::UnboundedSender<Result<LifecycleEvent>>>) {
        let mut streams = VecDeque::new();
        let mut senders = Vec::new();
        for _ in 0..count {
            let (tx, rx) = mpsc::unbounded_channel();
            streams.push_back(rx);
            senders.push(tx);
        }
        let source = Self {
            streams: Mutex::new(streams),
            subscribe_count: AtomicUsize::new(0),
        };
        (source, senders)
    }

    pub fn subscribe_count(&self) -> usize {
        self.subscribe_count.load(Ordering::SeqCst)
    }
}

impl EventSource for ControlledEventSource {
    fn subscribe(&self, _filter: &EventFilter) -> EventStream {
        self.subscribe_count.fetch_add(1, Ordering::SeqCst);
        match self.streams.lock().unwrap().pop_front() {
            Some(rx) => Box::pin(tokio_stream::wrappers::UnboundedReceiverStream::new(rx)),
            None => Box::pin(tokio_stream::once(Err(Error::transport(
                "no more subscriptions",
            )))),
        }
    }

    fn endpoint(&self) -> String {
        "controlled://test".to_string()
    }
}

/// Container create event carrying a `hostname` attribute
pub fn create_event(hostname: &str) -> Result<LifecycleEvent> {
    Ok(LifecycleEvent::container(
        EventAction::Create,
        [("name", "web"), ("hostname", hostname)],
    ))
}

/// Container destroy event carrying a `hostname` attribute
pub fn destroy_event(hostname: &str) -> Result<LifecycleEvent> {
    Ok(LifecycleEvent::container(
        EventAction::Destroy,
        [("name", "web"), ("hostname", hostname)],
    ))
}

/// Manager over a provider, without retries
pub fn manager_for(provider: MockProvider) -> Arc<SubdomainManager> {
    Arc::new(
        SubdomainManager::new(Arc::new(provider), RetryPolicy::none())
            .expect("manager construction succeeds"),
    )
}

/// Listener config with a short poll interval and no reconnects
pub fn fast_config() -> ListenerConfig {
    ListenerConfig::default()
        .with_poll_interval(Duration::from_millis(20))
        .with_reconnect(ReconnectPolicy::disabled())
}

/// Poll `condition` until it holds or two seconds pass
pub async fn eventually(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}
