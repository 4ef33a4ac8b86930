//! Cloud events options: the seam between addressing and the broker.

use crate::config::{ConfigMap, MqttSettings};
use crate::error::TransportError;
use crate::mqtt;
use crate::protocol::{CloudEventsProtocol, MqttProtocol};
use crate::sink::{error_channel, ErrorReceiver, ErrorSink};
use cebus_core::{EventContext, Identity};
use cebus_proto::{
    AddressResolver, AgentAddressResolver, RoutingContext, SourceAddressResolver,
    SubscriptionSet, TopicScheme,
};

/// Capabilities a transport variant provides to cloud event clients.
pub trait CloudEventsOptions: Send + Sync {
    /// Protocol type produced by this transport.
    type Protocol: CloudEventsProtocol;

    /// Compute the routing context to attach to an outbound event.
    ///
    /// # Errors
    ///
    /// Returns error if the event cannot be addressed.
    fn with_context(&self, context: &EventContext) -> Result<RoutingContext, TransportError>;

    /// Build the broker-facing protocol and start its background work.
    ///
    /// # Errors
    ///
    /// Returns error if the connection parameters or subscription patterns
    /// are invalid.
    fn protocol(&self) -> Result<Self::Protocol, TransportError>;

    /// Receiver for errors reported after construction.
    fn error_chan(&self) -> ErrorReceiver;
}

/// MQTT options for one endpoint, generic over its addressing role.
#[derive(Debug)]
pub struct BusOptions<R> {
    config: ConfigMap,
    identity: Identity,
    resolver: R,
    errors: ErrorSink,
    error_receiver: ErrorReceiver,
}

/// Options for an agent representing one cluster.
pub type AgentOptions = BusOptions<AgentAddressResolver>;

/// Options for a hub acting as one source.
pub type SourceOptions = BusOptions<SourceAddressResolver>;

impl<R: AddressResolver> BusOptions<R> {
    fn with_resolver(mut config: ConfigMap, identity: Identity, resolver: R) -> Self {
        if config.with_default_group_id(&identity) {
            tracing::debug!(group_id = %identity, "Using own identity as consumer group");
        }
        if config.with_default_client_id(&identity) {
            tracing::debug!(client_id = %identity, "Using own identity as client id");
        }
        let (errors, error_receiver) = error_channel();

        Self {
            config,
            identity,
            resolver,
            errors,
            error_receiver,
        }
    }

    /// Effective connection parameters after defaults were applied.
    #[must_use]
    pub fn config(&self) -> &ConfigMap {
        &self.config
    }

    /// Identity of this endpoint instance.
    #[must_use]
    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    /// Addressing role of this endpoint.
    #[must_use]
    pub fn resolver(&self) -> &R {
        &self.resolver
    }

    /// Patterns registered when the protocol is built.
    #[must_use]
    pub fn subscriptions(&self) -> SubscriptionSet {
        self.resolver.subscriptions()
    }
}

impl AgentOptions {
    /// Create options for agent `agent_id` serving `cluster_name`.
    #[must_use]
    pub fn new(config: ConfigMap, cluster_name: Identity, agent_id: Identity) -> Self {
        Self::with_resolver(config, agent_id, AgentAddressResolver::new(cluster_name))
    }

    /// Create options with a custom topic scheme.
    #[must_use]
    pub fn with_scheme(
        config: ConfigMap,
        cluster_name: Identity,
        agent_id: Identity,
        scheme: TopicScheme,
    ) -> Self {
        Self::with_resolver(
            config,
            agent_id,
            AgentAddressResolver::with_scheme(cluster_name, scheme),
        )
    }

    /// Cluster this agent represents.
    #[must_use]
    pub fn cluster_name(&self) -> &Identity {
        self.resolver.local_identity()
    }
}

impl SourceOptions {
    /// Create options for source `source_id`.
    #[must_use]
    pub fn new(config: ConfigMap, source_id: Identity) -> Self {
        Self::with_resolver(
            config,
            source_id.clone(),
            SourceAddressResolver::new(source_id),
        )
    }
}

impl<R: AddressResolver> CloudEventsOptions for BusOptions<R> {
    type Protocol = MqttProtocol;

    fn with_context(&self, context: &EventContext) -> Result<RoutingContext, TransportError> {
        let routing = self.resolver.resolve(context)?;
        tracing::trace!(
            topic = %routing.topic,
            message_key = %routing.message_key,
            event_id = %context.id,
            "Resolved event address"
        );
        Ok(routing)
    }

    fn protocol(&self) -> Result<MqttProtocol, TransportError> {
        let settings = MqttSettings::from_config(&self.config)?;
        let filters = self
            .resolver
            .subscriptions()
            .iter()
            .map(|pattern| mqtt::subscription_filter(pattern, &settings.group_id))
            .collect::<Result<Vec<_>, _>>()?;

        tracing::info!(
            identity = %self.identity,
            host = %settings.host,
            port = settings.port,
            group_id = %settings.group_id,
            "Starting MQTT transport"
        );

        MqttProtocol::start(
            &settings,
            &filters,
            self.resolver.sender_topic(),
            self.errors.clone(),
        )
    }

    fn error_chan(&self) -> ErrorReceiver {
        self.error_receiver.clone()
    }
}
