//! Core traits for the DNM system
//!
//! This module defines the abstract interfaces that all implementations must follow.
//!
//! - [`SubdomainProvider`]: Create/delete CNAME records at a DNS backend
//! - [`EventSource`]: Subscribe to container lifecycle events

pub mod event_source;
pub mod provider;

pub use event_source::{EntityType, EventAction, EventFilter, EventSource, EventStream, LifecycleEvent};
pub use provider::{DEFAULT_RECORD_TTL, ProviderFactory, RECORD_TYPE, RemoveOutcome, SubdomainProvider};
