//! Container event listener
//!
//! The EventListener turns the runtime's lifecycle stream into serialized
//! subdomain operations:
//! - An ingestion task subscribes to create/destroy events, resolves a
//!   hostname for each and enqueues a [`QueuedAction`]
//! - A processing task dequeues actions one at a time and hands them to
//!   the [`SubdomainManager`]
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐
//! │ EventSource │─── LifecycleEvent ───┐
//! └─────────────┘                      │
//!                                      ▼
//!                             ┌─────────────────┐
//!                             │ ingestion task  │
//!                             └─────────────────┘
//!                                      │ QueuedAction (FIFO)
//!                                      ▼
//!                             ┌─────────────────┐
//!                             │ processing task │
//!                             └─────────────────┘
//!                                      │
//!                                      ▼
//!                            ┌──────────────────┐
//!                            │ SubdomainManager │
//!                            └──────────────────┘
//! ```
//!
//! ## Ordering
//!
//! Actions are applied in arrival order and never concurrently, so a
//! create followed by a destroy for the same container always reaches the
//! provider in that order.

use crate::config::{ListenerConfig, ReconnectPolicy};
use crate::error::{Error, Result};
use crate::manager::SubdomainManager;
use crate::traits::{EventAction, EventFilter, EventSource, LifecycleEvent};
use regex::Regex;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, LazyLock};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_stream::StreamExt;
use tracing::{debug, error, info, trace, warn};

/// Attribute consulted when no routing rule is present
const HOSTNAME_ATTRIBUTE: &str = "hostname";

/// Attribute naming the container (for logging)
const NAME_ATTRIBUTE: &str = "name";

/// Matches the first host of a `Host(`...`)` routing rule
static HOST_RULE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Host\(`(.+?)`\)").expect("host rule pattern is valid"));

/// Extract the hostname from a reverse-proxy routing rule
///
/// `Host(`a.example.com`) || Host(`b.example.com`)` yields `a.example.com`.
pub fn parse_routing_rule(rule: &str) -> Option<&str> {
    HOST_RULE
        .captures(rule)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
}

/// Operation requested for a hostname
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionKind {
    /// Container created: ensure a record exists
    Add,
    /// Container destroyed: ensure no record exists
    Remove,
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Add => f.write_str("add"),
            Self::Remove => f.write_str("remove"),
        }
    }
}

/// A unit of work waiting for the processing task
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueuedAction {
    /// What to do
    pub kind: ActionKind,
    /// Full hostname the subdomain is extracted from
    pub subdomain_source: String,
}

impl QueuedAction {
    /// Create a new action
    pub fn new(kind: ActionKind, subdomain_source: impl Into<String>) -> Self {
        Self {
            kind,
            subdomain_source: subdomain_source.into(),
        }
    }

    /// Map a lifecycle event to an action
    ///
    /// The hostname comes from the routing rule in `rule_label` when that
    /// label parses, otherwise from the `hostname` attribute.
    ///
    /// # Returns
    ///
    /// - `Some(action)`: For container create/destroy events with a hostname
    /// - `None`: For every other event
    pub fn from_event(event: &LifecycleEvent, rule_label: &str) -> Option<Self> {
        if !EventFilter::container_lifecycle().matches(event) {
            return None;
        }

        let kind = match event.action {
            EventAction::Create => ActionKind::Add,
            EventAction::Destroy => ActionKind::Remove,
            _ => return None,
        };

        let hostname = event
            .attribute(rule_label)
            .and_then(parse_routing_rule)
            .or_else(|| event.attribute(HOSTNAME_ATTRIBUTE))
            .filter(|h| !h.trim().is_empty())?;

        Some(Self::new(kind, hostname.trim()))
    }
}

/// Listener lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenerState {
    /// Constructed, not yet started
    Idle,
    /// Ingestion and processing tasks running
    Listening,
    /// Stopped; cannot be restarted
    Stopped,
}

/// Counters collected while the listener runs
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ListenerReport {
    /// Events delivered by the source
    pub events_received: u64,
    /// Actions placed on the queue
    pub actions_enqueued: u64,
    /// Actions handed to the manager
    pub actions_processed: u64,
    /// Processed actions that failed or panicked
    pub actions_failed: u64,
    /// Actions still queued when the listener stopped
    pub actions_discarded: u64,
    /// Re-subscriptions after a transport error or closed stream
    pub reconnects: u64,
}

#[derive(Debug, Default)]
struct Counters {
    events_received: AtomicU64,
    actions_enqueued: AtomicU64,
    actions_processed: AtomicU64,
    actions_failed: AtomicU64,
    actions_discarded: AtomicU64,
    reconnects: AtomicU64,
}

impl Counters {
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self) -> ListenerReport {
        ListenerReport {
            events_received: self.events_received.load(Ordering::Relaxed),
            actions_enqueued: self.actions_enqueued.load(Ordering::Relaxed),
            actions_processed: self.actions_processed.load(Ordering::Relaxed),
            actions_failed: self.actions_failed.load(Ordering::Relaxed),
            actions_discarded: self.actions_discarded.load(Ordering::Relaxed),
            reconnects: self.reconnects.load(Ordering::Relaxed),
        }
    }
}

/// Container event listener
///
/// ## Lifecycle
///
/// 1. Create with [`EventListener::new()`]
/// 2. Start with [`EventListener::start()`] (spawns two tasks)
/// 3. Optionally await [`EventListener::ingestion_closed()`]
/// 4. Stop with [`EventListener::stop()`]
///
/// A stopped listener cannot be restarted. Dropping a running listener
/// signals both tasks to stop without waiting for them.
pub struct EventListener {
    source: Arc<dyn EventSource>,
    manager: Arc<SubdomainManager>,
    config: ListenerConfig,
    state: ListenerState,
    stop_tx: watch::Sender<bool>,
    ingestion_done: watch::Sender<bool>,
    counters: Arc<Counters>,
    ingestion: Option<JoinHandle<()>>,
    processing: Option<JoinHandle<()>>,
}

impl EventListener {
    /// Create a new listener
    ///
    /// # Parameters
    ///
    /// - `source`: Runtime event source
    /// - `manager`: Manager every action is dispatched to
    /// - `config`: Listener configuration
    pub fn new(
        source: Arc<dyn EventSource>,
        manager: Arc<SubdomainManager>,
        config: ListenerConfig,
    ) -> Self {
        let (stop_tx, _) = watch::channel(false);
        let (ingestion_done, _) = watch::channel(false);
        Self {
            source,
            manager,
            config,
            state: ListenerState::Idle,
            stop_tx,
            ingestion_done,
            counters: Arc::new(Counters::default()),
            ingestion: None,
            processing: None,
        }
    }

    /// Current lifecycle state
    pub fn state(&self) -> ListenerState {
        self.state
    }

    /// Counters so far
    pub fn report(&self) -> ListenerReport {
        self.counters.snapshot()
    }

    /// Start ingestion and processing
    ///
    /// Must be called from within a Tokio runtime.
    ///
    /// # Returns
    ///
    /// - `Ok(())`: Both tasks spawned
    /// - `Err(Error)`: If the listener was already started, or the
    ///   configuration is invalid
    pub fn start(&mut self) -> Result<()> {
        if self.state != ListenerState::Idle {
            return Err(Error::Other(format!(
                "Event listener cannot be started from state {:?}",
                self.state
            )));
        }
        self.config.validate()?;

        let (tx, rx) = mpsc::unbounded_channel();

        let ingestion = Ingestion {
            source: Arc::clone(&self.source),
            rule_label: self.config.rule_label.clone(),
            reconnect: self.config.reconnect,
            tx,
            stop_rx: self.stop_tx.subscribe(),
            done_tx: self.ingestion_done.clone(),
            counters: Arc::clone(&self.counters),
        };

        let processing = Processing {
            manager: Arc::clone(&self.manager),
            rx,
            stop_rx: self.stop_tx.subscribe(),
            poll_interval: self.config.poll_interval(),
            counters: Arc::clone(&self.counters),
        };

        self.ingestion = Some(tokio::spawn(ingestion.run()));
        self.processing = Some(tokio::spawn(processing.run()));
        self.state = ListenerState::Listening;

        info!(
            endpoint = %self.source.endpoint(),
            provider = self.manager.provider_name(),
            domain = %self.manager.base_domain(),
            "Listening for container events"
        );

        Ok(())
    }

    /// Resolve once the ingestion task has ended
    ///
    /// Ingestion ends on stop, or when reconnect attempts are exhausted.
    /// Returns immediately for a listener that was never started.
    pub async fn ingestion_closed(&self) {
        if self.state == ListenerState::Idle {
            return;
        }
        let mut done = self.ingestion_done.subscribe();
        let _ = done.wait_for(|closed| *closed).await;
    }

    /// Stop both tasks and wait for them to exit
    ///
    /// An in-flight provider call is allowed to finish; actions still in the
    /// queue are logged and discarded. Calling `stop` again is a no-op.
    pub async fn stop(&mut self) -> ListenerReport {
        match self.state {
            ListenerState::Stopped => return self.report(),
            ListenerState::Idle => {
                self.state = ListenerState::Stopped;
                return self.report();
            }
            ListenerState::Listening => {}
        }

        info!("Stopping event listener");
        self.stop_tx.send_replace(true);

        for (name, handle) in [
            ("ingestion", self.ingestion.take()),
            ("processing", self.processing.take()),
        ] {
            if let Some(handle) = handle {
                if let Err(e) = handle.await {
                    error!(task = name, error = %e, "Listener task ended abnormally");
                }
            }
        }

        self.state = ListenerState::Stopped;
        let report = self.report();
        info!(
            events = report.events_received,
            processed = report.actions_processed,
            failed = report.actions_failed,
            discarded = report.actions_discarded,
            "Event listener stopped"
        );
        report
    }
}

impl Drop for EventListener {
    fn drop(&mut self) {
        self.stop_tx.send_replace(true);
    }
}

/// State owned by the ingestion task
struct Ingestion {
    source: Arc<dyn EventSource>,
    rule_label: String,
    reconnect: ReconnectPolicy,
    tx: mpsc::UnboundedSender<QueuedAction>,
    stop_rx: watch::Receiver<bool>,
    done_tx: watch::Sender<bool>,
    counters: Arc<Counters>,
}

impl Ingestion {
    async fn run(mut self) {
        let filter = EventFilter::container_lifecycle();
        let mut attempts: u32 = 0;

        'subscribe: while !*self.stop_rx.borrow() {
            let mut stream = self.source.subscribe(&filter);
            debug!(endpoint = %self.source.endpoint(), "Subscribed to container events");

            let reason = loop {
                tokio::select! {
                    biased;

                    _ = self.stop_rx.changed() => break 'subscribe,

                    item = stream.next() => match item {
                        Some(Ok(event)) => {
                            attempts = 0;
                            if !self.handle(&event) {
                                break 'subscribe;
                            }
                        }
                        Some(Err(e)) => break e.to_string(),
                        None => break "event stream closed".to_string(),
                    },
                }
            };
            drop(stream);

            if *self.stop_rx.borrow() {
                break;
            }

            attempts += 1;
            if attempts > self.reconnect.max_attempts {
                error!(
                    endpoint = %self.source.endpoint(),
                    reason = %reason,
                    attempts = attempts - 1,
                    "Event subscription lost and reconnect attempts exhausted"
                );
                break;
            }

            let delay = self.reconnect.backoff(attempts);
            warn!(
                endpoint = %self.source.endpoint(),
                reason = %reason,
                attempt = attempts,
                max_attempts = self.reconnect.max_attempts,
                delay_ms = delay.as_millis() as u64,
                "Event subscription lost, reconnecting"
            );
            Counters::bump(&self.counters.reconnects);

            tokio::select! {
                _ = self.stop_rx.changed() => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }

        info!("Event ingestion stopped");
        self.done_tx.send_replace(true);
    }

    /// Enqueue the action for one event; false once the queue is gone
    fn handle(&self, event: &LifecycleEvent) -> bool {
        Counters::bump(&self.counters.events_received);

        let container = event.attribute(NAME_ATTRIBUTE).unwrap_or("<unnamed>");
        trace!(
            entity = event.entity_type.as_str(),
            action = event.action.as_str(),
            container = %container,
            "Event received"
        );

        let Some(action) = QueuedAction::from_event(event, &self.rule_label) else {
            debug!(
                action = event.action.as_str(),
                container = %container,
                "Event carries no usable hostname, ignoring"
            );
            return true;
        };

        info!(
            action = %action.kind,
            hostname = %action.subdomain_source,
            container = %container,
            "Container {} event queued",
            event.action.as_str()
        );

        if self.tx.send(action).is_err() {
            warn!("Action queue closed, ending ingestion");
            return false;
        }
        Counters::bump(&self.counters.actions_enqueued);
        true
    }
}

/// State owned by the processing task
struct Processing {
    manager: Arc<SubdomainManager>,
    rx: mpsc::UnboundedReceiver<QueuedAction>,
    stop_rx: watch::Receiver<bool>,
    poll_interval: Duration,
    counters: Arc<Counters>,
}

impl Processing {
    async fn run(mut self) {
        loop {
            if *self.stop_rx.borrow() {
                break;
            }

            match tokio::time::timeout(self.poll_interval, self.rx.recv()).await {
                Ok(Some(action)) => self.dispatch(action).await,
                Ok(None) => {
                    debug!("Action queue closed and drained");
                    break;
                }
                Err(_) => trace!("Action queue idle"),
            }
        }

        self.rx.close();
        while let Ok(action) = self.rx.try_recv() {
            Counters::bump(&self.counters.actions_discarded);
            warn!(
                action = %action.kind,
                hostname = %action.subdomain_source,
                "Discarding queued action at shutdown"
            );
        }

        info!("Action processing stopped");
    }

    /// Run one action to completion
    ///
    /// The manager call runs on its own task so a panic is contained and
    /// counted as a failure; it is awaited before the next dequeue.
    async fn dispatch(&self, action: QueuedAction) {
        let manager = Arc::clone(&self.manager);
        let kind = action.kind;
        let hostname = action.subdomain_source;

        debug!(action = %kind, hostname = %hostname, "Processing action");

        let task_hostname = hostname.clone();
        let handle = tokio::spawn(async move {
            match kind {
                ActionKind::Add => manager.add_subdomain(&task_hostname).await,
                ActionKind::Remove => manager.remove_subdomain(&task_hostname).await,
            }
        });

        Counters::bump(&self.counters.actions_processed);
        match handle.await {
            Ok(outcome) => {
                if outcome.is_failure() {
                    Counters::bump(&self.counters.actions_failed);
                }
                debug!(action = %kind, hostname = %hostname, outcome = ?outcome, "Action processed");
            }
            Err(e) => {
                Counters::bump(&self.counters.actions_failed);
                error!(
                    action = %kind,
                    hostname = %hostname,
                    error = %e,
                    "Unexpected failure while processing action"
                );
            }
        }
    }
}
