// # Event Source Trait
//
// Defines the interface for subscribing to a container runtime's lifecycle
// event stream.
//
// ## Implementations
//
// - Docker Engine API: `dnm-docker` crate
//
// ## Usage
//
// ```rust,ignore
// use dnm_core::traits::{EventFilter, EventSource};
// use tokio_stream::StreamExt;
//
// let source = /* EventSource implementation */;
// let mut events = source.subscribe(&EventFilter::container_lifecycle());
// while let Some(event) = events.next().await {
//     println!("{:?}", event?);
// }
// ```

use serde::{Deserialize, Deserializer};
use std::collections::HashMap;
use std::pin::Pin;
use tokio_stream::Stream;

/// Kind of runtime entity an event is about
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EntityType {
    Container,
    Image,
    Network,
    Volume,
    Other(String),
}

impl EntityType {
    /// Wire name of the entity type
    pub fn as_str(&self) -> &str {
        match self {
            Self::Container => "container",
            Self::Image => "image",
            Self::Network => "network",
            Self::Volume => "volume",
            Self::Other(name) => name,
        }
    }
}

impl From<&str> for EntityType {
    fn from(value: &str) -> Self {
        match value {
            "container" => Self::Container,
            "image" => Self::Image,
            "network" => Self::Network,
            "volume" => Self::Volume,
            other => Self::Other(other.to_string()),
        }
    }
}

/// Lifecycle action reported by the runtime
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EventAction {
    Create,
    Destroy,
    Start,
    Stop,
    Die,
    Other(String),
}

impl EventAction {
    /// Wire name of the action
    pub fn as_str(&self) -> &str {
        match self {
            Self::Create => "create",
            Self::Destroy => "destroy",
            Self::Start => "start",
            Self::Stop => "stop",
            Self::Die => "die",
            Self::Other(name) => name,
        }
    }
}

impl From<&str> for EventAction {
    fn from(value: &str) -> Self {
        match value {
            "create" => Self::Create,
            "destroy" => Self::Destroy,
            "start" => Self::Start,
            "stop" => Self::Stop,
            "die" => Self::Die,
            other => Self::Other(other.to_string()),
        }
    }
}

/// A single lifecycle event, as decoded from the runtime
///
/// Deserializes from the Docker Engine shape:
///
/// ```json
/// {"Type": "container", "Action": "create",
///  "Actor": {"ID": "4f1c…", "Attributes": {"name": "web", "hostname": "web.example.com"}}}
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LifecycleEvent {
    /// Entity the event is about
    pub entity_type: EntityType,
    /// What happened
    pub action: EventAction,
    /// Runtime attributes (name, hostname, labels, ...)
    pub attributes: HashMap<String, String>,
}

impl LifecycleEvent {
    /// Create a new event
    pub fn new(
        entity_type: EntityType,
        action: EventAction,
        attributes: HashMap<String, String>,
    ) -> Self {
        Self {
            entity_type,
            action,
            attributes,
        }
    }

    /// Convenience constructor for container events
    pub fn container<K, V>(action: EventAction, attributes: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self::new(
            EntityType::Container,
            action,
            attributes
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    /// Get an attribute value
    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).map(String::as_str)
    }
}

#[derive(Deserialize)]
struct WireActor {
    #[serde(rename = "Attributes", default)]
    attributes: Option<HashMap<String, String>>,
}

#[derive(Deserialize)]
struct WireEvent {
    #[serde(rename = "Type", default)]
    entity_type: Option<String>,
    #[serde(rename = "Action", default)]
    action: Option<String>,
    #[serde(rename = "Actor", default)]
    actor: Option<WireActor>,
}

impl<'de> Deserialize<'de> for LifecycleEvent {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let wire = WireEvent::deserialize(deserializer)?;
        Ok(Self {
            entity_type: EntityType::from(wire.entity_type.unwrap_or_default().as_str()),
            action: EventAction::from(wire.action.unwrap_or_default().as_str()),
            attributes: wire.actor.and_then(|a| a.attributes).unwrap_or_default(),
        })
    }
}

/// Subscription filter
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventFilter {
    /// Entity type to receive
    pub entity_type: EntityType,
    /// Actions to receive; empty means all
    pub actions: Vec<EventAction>,
}

impl EventFilter {
    /// Container create/destroy events only
    pub fn container_lifecycle() -> Self {
        Self {
            entity_type: EntityType::Container,
            actions: vec![EventAction::Create, EventAction::Destroy],
        }
    }

    /// Whether an event passes this filter
    pub fn matches(&self, event: &LifecycleEvent) -> bool {
        event.entity_type == self.entity_type
            && (self.actions.is_empty() || self.actions.contains(&event.action))
    }
}

/// Stream of decoded events; an `Err` item reports a transport failure
pub type EventStream = Pin<Box<dyn Stream<Item = Result<LifecycleEvent, crate::Error>> + Send + 'static>>;

/// Trait for container runtime event sources
///
/// # Stream Contract
///
/// - Yields events in the order the runtime emitted them
/// - Ends (`None`) when the remote closes the stream
/// - Yields `Err(Error::Transport)` on a broken connection, then ends
/// - Dropping the stream releases the connection
///
/// Reconnecting is the caller's decision; a source never retries on its own.
pub trait EventSource: Send + Sync {
    /// Open a new subscription
    fn subscribe(&self, filter: &EventFilter) -> EventStream;

    /// Endpoint description (for logging)
    fn endpoint(&self) -> String;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_docker_event() {
        let json = r#"{
            "status": "create",
            "id": "4f1c",
            "Type": "container",
            "Action": "create",
            "Actor": {
                "ID": "4f1c",
                "Attributes": {
                    "name": "web",
                    "hostname": "web.example.com",
                    "traefik.http.routers.web.rule": "Host(`web.example.com`)"
                }
            },
            "scope": "local",
            "time": 1700000000,
            "timeNano": 1700000000000000000
        }"#;

        let event: LifecycleEvent = serde_json::from_str(json).unwrap();
        assert_eq!(event.entity_type, EntityType::Container);
        assert_eq!(event.action, EventAction::Create);
        assert_eq!(event.attribute("hostname"), Some("web.example.com"));
        assert_eq!(event.attribute("name"), Some("web"));
    }

    #[test]
    fn test_decode_unknown_kinds_and_missing_actor() {
        let event: LifecycleEvent =
            serde_json::from_str(r#"{"Type": "plugin", "Action": "enable"}"#).unwrap();
        assert_eq!(event.entity_type, EntityType::Other("plugin".to_string()));
        assert_eq!(event.action, EventAction::Other("enable".to_string()));
        assert!(event.attributes.is_empty());
    }

    #[test]
    fn test_decode_null_fields() {
        let event: LifecycleEvent =
            serde_json::from_str(r#"{"Type": null, "Action": "create", "Actor": {"ID": "4f1c", "Attributes": null}}"#)
                .unwrap();
        assert_eq!(event.entity_type, EntityType::Other(String::new()));
        assert_eq!(event.action, EventAction::Create);
        assert!(event.attributes.is_empty());
    }

    #[test]
    fn test_filter_matches() {
        let filter = EventFilter::container_lifecycle();
        let create = LifecycleEvent::container(EventAction::Create, [("name", "web")]);
        let start = LifecycleEvent::container(EventAction::Start, [("name", "web")]);
        let image = LifecycleEvent::new(EntityType::Image, EventAction::Destroy, HashMap::new());

        assert!(filter.matches(&create));
        assert!(!filter.matches(&start));
        assert!(!filter.matches(&image));
    }
}
