//! Outbound event addressing.
//!
//! A resolver turns an event context into the topic to publish on and the
//! message key to publish with. Agents and hubs resolve mirror-image
//! routes, so each role gets its own resolver behind [`AddressResolver`].

use crate::keys::MessageKey;
use crate::topics::{SubscriptionPattern, Topic, TopicError, TopicScheme};
use cebus_core::{
    Action, EventContext, EventTypeError, Identity, IdentityError, CLUSTER_ALL,
    EXTENSION_CLUSTER_NAME, EXTENSION_ORIGINAL_SOURCE, SOURCE_ALL,
};

/// Default topic agents publish on when no routing context is attached.
pub const AGENT_SENDER_TOPIC: &str = "agentevents";

/// Default topic sources publish on when no routing context is attached.
pub const SOURCE_SENDER_TOPIC: &str = "sourceevents";

/// Resolved address of one outbound event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutingContext {
    /// Topic to publish on
    pub topic: Topic,
    /// Partition/compaction key
    pub message_key: MessageKey,
}

/// Patterns an endpoint subscribes to at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionSet(Vec<SubscriptionPattern>);

impl SubscriptionSet {
    /// Wrap a list of patterns.
    #[must_use]
    pub fn new(patterns: Vec<SubscriptionPattern>) -> Self {
        Self(patterns)
    }

    /// Iterate over the patterns.
    pub fn iter(&self) -> impl Iterator<Item = &SubscriptionPattern> {
        self.0.iter()
    }

    /// Number of patterns.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the set is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Whether any pattern matches `topic`.
    #[must_use]
    pub fn matches(&self, topic: &str) -> bool {
        self.0.iter().any(|pattern| pattern.matches(topic))
    }
}

impl<'a> IntoIterator for &'a SubscriptionSet {
    type Item = &'a SubscriptionPattern;
    type IntoIter = std::slice::Iter<'a, SubscriptionPattern>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// Role-specific address resolution.
pub trait AddressResolver: Send + Sync {
    /// Identity of the local endpoint.
    fn local_identity(&self) -> &Identity;

    /// Compute the routing context for an outbound event.
    ///
    /// # Errors
    ///
    /// Returns error if the event type is malformed or the identity
    /// extension this role needs is missing.
    fn resolve(&self, context: &EventContext) -> Result<RoutingContext, RoutingError>;

    /// Patterns covering everything this endpoint must receive.
    fn subscriptions(&self) -> SubscriptionSet;

    /// Fixed outbound topic for this role.
    fn sender_topic(&self) -> &'static str;
}

/// Resolver for an agent representing one cluster.
#[derive(Debug, Clone)]
pub struct AgentAddressResolver {
    cluster_name: Identity,
    scheme: TopicScheme,
}

impl AgentAddressResolver {
    /// Create a resolver for `cluster_name` using the default topic scheme.
    #[must_use]
    pub fn new(cluster_name: Identity) -> Self {
        Self::with_scheme(cluster_name, TopicScheme::default())
    }

    /// Create a resolver with a custom topic scheme.
    #[must_use]
    pub fn with_scheme(cluster_name: Identity, scheme: TopicScheme) -> Self {
        Self {
            cluster_name,
            scheme,
        }
    }
}

impl AddressResolver for AgentAddressResolver {
    fn local_identity(&self) -> &Identity {
        &self.cluster_name
    }

    fn resolve(&self, context: &EventContext) -> Result<RoutingContext, RoutingError> {
        let event_type = context.parsed_type()?;
        let original_source = required_extension(context, EXTENSION_ORIGINAL_SOURCE)?;
        let cluster = self.cluster_name.as_str();

        // TODO: a source list would let the agent address several hubs without a broadcast.
        if event_type.action == Action::ResyncRequest && original_source == SOURCE_ALL {
            return Ok(RoutingContext {
                topic: self.scheme.agent_broadcast(cluster)?,
                message_key: MessageKey::broadcast(cluster),
            });
        }

        Ok(RoutingContext {
            topic: self.scheme.agent_events(original_source, cluster)?,
            message_key: MessageKey::point_to_point(original_source, cluster),
        })
    }

    fn subscriptions(&self) -> SubscriptionSet {
        SubscriptionSet::new(self.scheme.agent_subscriptions(self.cluster_name.as_str()))
    }

    fn sender_topic(&self) -> &'static str {
        AGENT_SENDER_TOPIC
    }
}

/// Resolver for a hub acting as one source.
#[derive(Debug, Clone)]
pub struct SourceAddressResolver {
    source_id: Identity,
    scheme: TopicScheme,
}

impl SourceAddressResolver {
    /// Create a resolver for `source_id` using the default topic scheme.
    #[must_use]
    pub fn new(source_id: Identity) -> Self {
        Self::with_scheme(source_id, TopicScheme::default())
    }

    /// Create a resolver with a custom topic scheme.
    #[must_use]
    pub fn with_scheme(source_id: Identity, scheme: TopicScheme) -> Self {
        Self { source_id, scheme }
    }
}

impl AddressResolver for SourceAddressResolver {
    fn local_identity(&self) -> &Identity {
        &self.source_id
    }

    fn resolve(&self, context: &EventContext) -> Result<RoutingContext, RoutingError> {
        let event_type = context.parsed_type()?;
        let cluster_name = required_extension(context, EXTENSION_CLUSTER_NAME)?;
        let source = self.source_id.as_str();

        if event_type.action == Action::ResyncRequest && cluster_name == CLUSTER_ALL {
            return Ok(RoutingContext {
                topic: self.scheme.source_broadcast(source)?,
                message_key: MessageKey::broadcast(source),
            });
        }

        Ok(RoutingContext {
            topic: self.scheme.source_events(source, cluster_name)?,
            message_key: MessageKey::point_to_point(source, cluster_name),
        })
    }

    fn subscriptions(&self) -> SubscriptionSet {
        SubscriptionSet::new(self.scheme.source_subscriptions(self.source_id.as_str()))
    }

    fn sender_topic(&self) -> &'static str {
        SOURCE_SENDER_TOPIC
    }
}

fn required_extension<'a>(
    context: &'a EventContext,
    name: &'static str,
) -> Result<&'a str, RoutingError> {
    let value = context
        .extension(name)
        .filter(|value| !value.is_empty())
        .ok_or(RoutingError::MissingExtension(name))?;
    Identity::new(value).map_err(|error| RoutingError::InvalidExtension { name, error })?;
    Ok(value)
}

/// Errors for address resolution.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RoutingError {
    /// Event type could not be parsed
    #[error("malformed event type: {0}")]
    MalformedEventType(#[from] EventTypeError),
    /// Required identity extension is absent or empty
    #[error("missing extension: {0}")]
    MissingExtension(&'static str),
    /// Identity extension cannot fill a single topic level
    #[error("invalid extension {name}: {error}")]
    InvalidExtension {
        /// Extension name
        name: &'static str,
        /// Why the value was rejected
        error: IdentityError,
    },
    /// Topic template could not be fully bound
    #[error("topic error: {0}")]
    Topic(#[from] TopicError),
}
