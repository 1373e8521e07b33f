// # dnm-core
//
// Core library for container-driven subdomain provisioning.
//
// ## Architecture Overview
//
// Container lifecycle events are turned into DNS records at an external
// provider:
// - **domain**: hostname validation and subdomain extraction (pure)
// - **SubdomainProvider**: Trait for adding/removing CNAME records at a DNS backend
// - **EventSource**: Trait for subscribing to a container runtime's event stream
// - **ProviderRegistry**: Explicit, name-keyed registry of provider factories
// - **SubdomainManager**: Extraction + provider dispatch, never fails outward
// - **EventListener**: Ingestion and processing tasks joined by a FIFO queue
//
// ## Design Principles
//
// 1. **Separation of Concerns**: Core logic is separate from provider and runtime crates
// 2. **Event-Driven**: Runtime events arrive as async streams
// 3. **Plugin-Based**: Providers are registered explicitly, no hard-coded if-else
// 4. **Library-First**: The daemon is a thin layer over this crate
// 5. **Isolation**: One bad event never stops the pipeline

pub mod config;
pub mod domain;
pub mod error;
pub mod listener;
pub mod manager;
pub mod registry;
pub mod traits;

// Re-export core types for convenience
pub use config::{ListenerConfig, ProcessEnv, ProviderConfig, ReconnectPolicy, RetryPolicy, VariableSource};
pub use domain::{BaseDomain, extract_subdomain, is_valid_hostname, normalize_domain, validate_domain};
pub use error::{Error, Result};
pub use listener::{ActionKind, EventListener, ListenerReport, ListenerState, QueuedAction, parse_routing_rule};
pub use manager::{ActionOutcome, SubdomainManager};
pub use registry::ProviderRegistry;
pub use traits::{EventSource, LifecycleEvent, ProviderFactory, RemoveOutcome, SubdomainProvider};
