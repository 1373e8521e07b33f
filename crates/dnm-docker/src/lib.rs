// # Docker Event Source
//
// This crate implements `EventSource` over the Docker Engine API
// (`GET /events`) using the `bollard` client, delivering container
// lifecycle events as a stream.
//
// ## Endpoints
//
// - `unix:///var/run/docker.sock` (default): local socket
// - `tcp://host:2375`: remote daemon, treated as `http://host:2375`
// - `http://...`: remote daemon or socket proxy
//
// ## Stream Semantics
//
// Each `subscribe()` opens a new connection on a background task:
// - decoded events are forwarded in order
// - events that do not map to a `LifecycleEvent` are logged and skipped
// - a connection or API failure is forwarded as `Err(Error::Transport)`,
//   then the stream ends
// - the remote closing the response ends the stream
// - dropping the stream closes the connection
//
// No reconnect logic lives here; the listener owns that policy.

use bollard::Docker;
use bollard::models::EventMessage;
use bollard::system::EventsOptions;
use dnm_core::traits::{EventFilter, EventSource, EventStream, LifecycleEvent};
use dnm_core::{Error, Result};
use std::collections::HashMap;
use std::path::PathBuf;
use tokio::sync::mpsc;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::{debug, info, warn};

/// Endpoint used when `DNM_DOCKER_BASE_URL` is not set
pub const DEFAULT_DOCKER_ENDPOINT: &str = "unix:///var/run/docker.sock";

/// Request timeout in seconds; bounds the wait for response headers only
const REQUEST_TIMEOUT_SECS: u64 = 120;

/// Where the Docker Engine API is reached
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DockerEndpoint {
    /// Local unix socket
    Unix(PathBuf),
    /// HTTP base URL, without trailing slash
    Http(String),
}

impl DockerEndpoint {
    /// Parse an endpoint string
    ///
    /// # Returns
    ///
    /// - `Err(Error::Config)`: For unsupported schemes or empty addresses
    pub fn parse(endpoint: &str) -> Result<Self> {
        let endpoint = endpoint.trim();
        let parsed = if let Some(path) = endpoint.strip_prefix("unix://") {
            Self::Unix(PathBuf::from(path))
        } else if let Some(addr) = endpoint.strip_prefix("tcp://") {
            Self::Http(format!("http://{}", addr.trim_end_matches('/')))
        } else if endpoint.starts_with("http://") {
            Self::Http(endpoint.trim_end_matches('/').to_string())
        } else if endpoint.starts_with('/') {
            Self::Unix(PathBuf::from(endpoint))
        } else {
            return Err(Error::config(format!(
                "Unsupported Docker endpoint '{}' (expected unix://, tcp:// or http://)",
                endpoint
            )));
        };

        let empty = match &parsed {
            Self::Unix(path) => path.as_os_str().is_empty(),
            Self::Http(url) => url.ends_with("://"),
        };
        if empty {
            return Err(Error::config(format!("Docker endpoint '{}' has no address", endpoint)));
        }
        Ok(parsed)
    }

    /// Build a client for this endpoint
    ///
    /// The client connects lazily; failures surface on the first request.
    fn connect(&self) -> Result<Docker> {
        let client = match self {
            #[cfg(unix)]
            Self::Unix(path) => Docker::connect_with_unix(
                &path.to_string_lossy(),
                REQUEST_TIMEOUT_SECS,
                bollard::API_DEFAULT_VERSION,
            ),
            #[cfg(not(unix))]
            Self::Unix(path) => {
                return Err(Error::transport(format!(
                    "Unix sockets are not supported on this platform: {}",
                    path.display()
                )));
            }
            Self::Http(url) => {
                Docker::connect_with_http(url, REQUEST_TIMEOUT_SECS, bollard::API_DEFAULT_VERSION)
            }
        };
        client.map_err(|e| Error::transport(format!("Failed to connect to Docker at {}: {}", self, e)))
    }
}

impl std::fmt::Display for DockerEndpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unix(path) => write!(f, "unix://{}", path.display()),
            Self::Http(url) => f.write_str(url),
        }
    }
}

/// Build the `/events` filters for a subscription
///
/// `{"type": ["container"], "event": ["create", "destroy"]}`
pub fn event_filters(filter: &EventFilter) -> HashMap<String, Vec<String>> {
    let mut filters = HashMap::new();
    filters.insert(
        "type".to_string(),
        vec![filter.entity_type.as_str().to_string()],
    );
    if !filter.actions.is_empty() {
        filters.insert(
            "event".to_string(),
            filter.actions.iter().map(|a| a.as_str().to_string()).collect(),
        );
    }
    filters
}

/// Map a Docker event message onto a lifecycle event
///
/// Goes through the Engine's wire shape, so the mapping stays the one
/// `LifecycleEvent` already decodes.
pub fn lifecycle_event(message: &EventMessage) -> Option<LifecycleEvent> {
    match serde_json::to_value(message).and_then(serde_json::from_value) {
        Ok(event) => Some(event),
        Err(e) => {
            warn!(error = %e, "Skipping undecodable Docker event");
            None
        }
    }
}

/// Docker Engine event source
#[derive(Debug, Clone)]
pub struct DockerEventSource {
    endpoint: DockerEndpoint,
}

impl DockerEventSource {
    /// Create an event source for an endpoint string
    ///
    /// Nothing is connected until [`EventSource::subscribe`] is called.
    pub fn new(endpoint: &str) -> Result<Self> {
        let endpoint = DockerEndpoint::parse(endpoint)?;
        info!(endpoint = %endpoint, "Docker event source configured");
        Ok(Self { endpoint })
    }

    /// The parsed endpoint
    pub fn docker_endpoint(&self) -> &DockerEndpoint {
        &self.endpoint
    }
}

type EventSender = mpsc::UnboundedSender<Result<LifecycleEvent>>;

impl EventSource for DockerEventSource {
    fn subscribe(&self, filter: &EventFilter) -> EventStream {
        let (tx, rx) = mpsc::unbounded_channel();

        let endpoint = self.endpoint.clone();
        let filters = event_filters(filter);

        tokio::spawn(async move {
            debug!(endpoint = %endpoint, filters = ?filters, "Opening Docker event stream");

            let result = tokio::select! {
                result = stream_events(&endpoint, filters, &tx) => result,
                // Subscriber dropped the stream
                _ = tx.closed() => Ok(()),
            };

            match result {
                Ok(()) => debug!(endpoint = %endpoint, "Docker event stream ended"),
                Err(e) => {
                    let _ = tx.send(Err(e));
                }
            }
        });

        Box::pin(UnboundedReceiverStream::new(rx))
    }

    fn endpoint(&self) -> String {
        self.endpoint.to_string()
    }
}

async fn stream_events(
    endpoint: &DockerEndpoint,
    filters: HashMap<String, Vec<String>>,
    tx: &EventSender,
) -> Result<()> {
    let docker = endpoint.connect()?;
    let options = EventsOptions::<String> {
        filters,
        ..Default::default()
    };

    let mut events = Box::pin(docker.events(Some(options)));
    let mut connected = false;

    while let Some(item) = events.next().await {
        let message = item.map_err(|e| Error::transport(format!("Docker event stream failed: {}", e)))?;
        if !connected {
            info!(endpoint = %endpoint, "Connected to Docker event stream");
            connected = true;
        }
        if let Some(event) = lifecycle_event(&message)
            && tx.send(Ok(event)).is_err()
        {
            return Ok(());
        }
    }
    Ok(())
}
