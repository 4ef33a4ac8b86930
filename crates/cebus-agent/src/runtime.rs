//! Agent runtime orchestration.

use crate::config::AgentConfig;
use anyhow::{Context, Result};
use cebus_core::{
    Action, CloudEvent, EventContext, EventDataType, EventType, Identity, SubResource,
    EXTENSION_CLUSTER_NAME, EXTENSION_ORIGINAL_SOURCE, SOURCE_ALL,
};
use cebus_proto::topics::ParsedTopic;
use cebus_proto::TopicScheme;
use cebus_transport::{AgentOptions, CloudEventsClient, ErrorReceiver, InboundEvent};
use std::time::Duration;

/// Resource the agent resyncs with hubs.
fn manifests() -> EventDataType {
    EventDataType {
        group: "io.cebus.works".to_string(),
        version: "v1".to_string(),
        resource: "manifests".to_string(),
    }
}

fn heartbeats() -> EventDataType {
    EventDataType {
        group: "io.cebus.agents".to_string(),
        version: "v1".to_string(),
        resource: "heartbeats".to_string(),
    }
}

/// The main agent runtime.
pub struct Agent {
    config: AgentConfig,
    cluster_name: Identity,
    agent_id: Identity,
    scheme: TopicScheme,
}

impl Agent {
    /// Create a new agent.
    ///
    /// # Errors
    ///
    /// Returns error if the cluster name or agent id is empty.
    pub fn new(config: AgentConfig, agent_id: String) -> Result<Self> {
        let cluster_name =
            Identity::new(config.cluster_name.clone()).context("Invalid cluster name")?;
        let agent_id = Identity::new(agent_id).context("Invalid agent id")?;

        Ok(Self {
            config,
            cluster_name,
            agent_id,
            scheme: TopicScheme::default(),
        })
    }

    /// Run the agent's main loop.
    ///
    /// # Errors
    ///
    /// Returns error if the transport cannot be started.
    pub async fn run(self) -> Result<()> {
        tracing::info!(
            cluster_name = %self.cluster_name,
            agent_id = %self.agent_id,
            "Starting agent runtime"
        );

        let options = AgentOptions::new(
            self.config.transport.clone(),
            self.cluster_name.clone(),
            self.agent_id.clone(),
        );
        for pattern in &options.subscriptions() {
            tracing::info!(%pattern, "Registered subscription");
        }

        let client = CloudEventsClient::new(options).context("Failed to start transport")?;
        // Publishes can wait on a full request queue; errors must still be read.
        let error_drain = tokio::spawn(drain_errors(client.errors()));

        if self.config.resync_on_start {
            client
                .publish(self.resync_request())
                .await
                .context("Failed to publish resync request")?;
            tracing::info!("Requested resync from all sources");
        }

        let heartbeat_source = self.config.heartbeat.source.clone();
        let mut heartbeat = tokio::time::interval(self.config.heartbeat.interval);
        heartbeat.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        tracing::info!("Agent running, press Ctrl+C to stop");

        loop {
            tokio::select! {
                inbound = client.receive() => {
                    let Some(inbound) = inbound else {
                        tracing::warn!("Transport closed");
                        break;
                    };
                    if let Some(reply) = self.reply_to(&inbound) {
                        if let Err(err) = client.publish(reply).await {
                            tracing::warn!(error = %err, "Failed to publish resync response");
                        }
                    }
                }

                _ = heartbeat.tick(), if heartbeat_source.is_some() => {
                    if let Some(source) = heartbeat_source.as_deref() {
                        if let Err(err) = client.publish(self.heartbeat(source)).await {
                            tracing::warn!(error = %err, source, "Failed to publish heartbeat");
                        }
                    }
                }

                // Handle shutdown
                _ = tokio::signal::ctrl_c() => {
                    tracing::info!("Shutdown signal received");
                    break;
                }
            }
        }

        client.close().await;
        // Let the queued disconnect reach the broker.
        tokio::time::sleep(Duration::from_millis(100)).await;
        error_drain.abort();

        tracing::info!("Agent stopped");
        Ok(())
    }

    /// Decide how to answer an inbound event.
    ///
    /// A status resync request from a source is answered with a resync
    /// response addressed to that source. Everything else is only logged.
    fn reply_to(&self, inbound: &InboundEvent) -> Option<CloudEvent> {
        let Some(ParsedTopic { role, source, .. }) = self.scheme.parse(&inbound.topic) else {
            tracing::warn!(topic = %inbound.topic, "Event on unexpected topic");
            return None;
        };

        let event_type = match inbound.event.context.parsed_type() {
            Ok(event_type) => event_type,
            Err(err) => {
                tracing::warn!(error = %err, topic = %inbound.topic, "Dropping event");
                return None;
            }
        };

        tracing::info!(
            topic = %inbound.topic,
            ?role,
            source = ?source,
            message_key = ?inbound.message_key.as_ref().map(ToString::to_string),
            event_type = %event_type,
            event_id = %inbound.event.context.id,
            "Received event"
        );

        if event_type.action != Action::ResyncRequest
            || event_type.sub_resource != SubResource::Status
        {
            return None;
        }

        let source = source?;
        let response_type =
            EventType::new(event_type.data_type, SubResource::Status, Action::ResyncResponse);
        let context = self
            .context(&response_type)
            .with_extension(EXTENSION_ORIGINAL_SOURCE, source);
        Some(CloudEvent::new(context, Some(self.status_payload())))
    }

    fn resync_request(&self) -> CloudEvent {
        let event_type = EventType::new(manifests(), SubResource::Spec, Action::ResyncRequest);
        let context = self
            .context(&event_type)
            .with_extension(EXTENSION_ORIGINAL_SOURCE, SOURCE_ALL);
        CloudEvent::new(context, Some(self.status_payload()))
    }

    fn heartbeat(&self, source: &str) -> CloudEvent {
        let event_type = EventType::new(heartbeats(), SubResource::Status, Action::UpdateRequest);
        let context = self
            .context(&event_type)
            .with_extension(EXTENSION_ORIGINAL_SOURCE, source);
        CloudEvent::new(context, Some(self.status_payload()))
    }

    fn context(&self, event_type: &EventType) -> EventContext {
        EventContext::new(self.agent_id.as_str(), event_type)
            .with_extension(EXTENSION_CLUSTER_NAME, self.cluster_name.as_str())
    }

    fn status_payload(&self) -> serde_json::Value {
        serde_json::json!({
            "clusterName": self.cluster_name.as_str(),
            "agentId": self.agent_id.as_str(),
        })
    }
}

/// Log transport errors until every sink is gone.
async fn drain_errors(errors: ErrorReceiver) {
    while let Some(err) = errors.recv().await {
        tracing::warn!(error = %err, "Transport error");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cebus_proto::{AddressResolver, AgentAddressResolver};
    use cebus_transport::{error_channel, TransportError};

    fn agent() -> Agent {
        let config = AgentConfig {
            cluster_name: "cluster7".to_string(),
            ..AgentConfig::default()
        };
        Agent::new(config, "agent-7a".to_string()).unwrap()
    }

    fn inbound(topic: &str, event_type: &str) -> InboundEvent {
        let context = EventContext::new("hub", &EventType::parse(event_type).unwrap());
        InboundEvent {
            topic: topic.to_string(),
            message_key: None,
            event: CloudEvent::new(context, None),
        }
    }

    #[test]
    fn startup_resync_is_broadcast() {
        let agent = agent();
        let resolver = AgentAddressResolver::new(agent.cluster_name.clone());

        let routing = resolver.resolve(&agent.resync_request().context).unwrap();
        assert_eq!(routing.topic.name(), "agentbroadcast.cluster7");
        assert_eq!(routing.message_key.as_str(), "cluster7");
    }

    #[test]
    fn heartbeat_goes_to_source() {
        let agent = agent();
        let resolver = AgentAddressResolver::new(agent.cluster_name.clone());

        let routing = resolver.resolve(&agent.heartbeat("hub").context).unwrap();
        assert_eq!(routing.topic.name(), "agentevents.hub.cluster7");
        assert_eq!(routing.message_key.as_str(), "hub@cluster7");
    }

    #[test]
    fn status_resync_from_source_gets_response() {
        let agent = agent();
        let request = inbound(
            "sourceevents.hub.cluster7",
            "io.cebus.works.v1.manifests.status.resync-request",
        );

        let reply = agent.reply_to(&request).unwrap();
        let reply_type = reply.context.parsed_type().unwrap();
        assert_eq!(reply_type.action, Action::ResyncResponse);
        assert_eq!(reply_type.sub_resource, SubResource::Status);
        assert_eq!(reply.context.extension(EXTENSION_ORIGINAL_SOURCE), Some("hub"));
    }

    #[test]
    fn broadcast_status_resync_answers_broadcasting_source() {
        let agent = agent();
        let request = inbound(
            "sourcebroadcast.hub-2",
            "io.cebus.works.v1.manifests.status.resync-request",
        );

        let reply = agent.reply_to(&request).unwrap();
        assert_eq!(reply.context.extension(EXTENSION_ORIGINAL_SOURCE), Some("hub-2"));
    }

    #[test]
    fn other_events_get_no_reply() {
        let agent = agent();

        assert!(agent
            .reply_to(&inbound(
                "sourceevents.hub.cluster7",
                "io.cebus.works.v1.manifests.spec.create-request",
            ))
            .is_none());
        assert!(agent
            .reply_to(&inbound(
                "unrelated.topic",
                "io.cebus.works.v1.manifests.status.resync-request",
            ))
            .is_none());
    }

    #[test]
    fn empty_agent_id_rejected() {
        assert!(Agent::new(AgentConfig::default(), String::new()).is_err());
    }

    #[test]
    fn dotted_cluster_name_rejected() {
        let config = AgentConfig {
            cluster_name: "prod.eu".to_string(),
            ..AgentConfig::default()
        };
        assert!(Agent::new(config, "agent-7a".to_string()).is_err());
    }

    #[test]
    fn dotted_source_cannot_be_answered() {
        let agent = agent();
        let request = inbound(
            "sourceevents.hub.eu.cluster7",
            "io.cebus.works.v1.manifests.status.resync-request",
        );

        assert!(agent.reply_to(&request).is_none());
    }

    #[tokio::test]
    async fn error_drain_keeps_reporters_moving() {
        let (sink, receiver) = error_channel();
        let drain = tokio::spawn(drain_errors(receiver));

        for attempt in 0..5 {
            tokio::time::timeout(
                Duration::from_secs(1),
                sink.report(TransportError::Runtime(format!("connect attempt {attempt}"))),
            )
            .await
            .expect("report blocked while the agent was busy");
        }

        drop(sink);
        drain.await.unwrap();
    }
}
