use cebus_core::{
    CloudEvent, EventContext, EventType, Identity, EXTENSION_CLUSTER_NAME,
    EXTENSION_ORIGINAL_SOURCE,
};
use cebus_transport::config::{BROKER, GROUP_ID};
use cebus_transport::{
    AgentOptions, CloudEventsClient, CloudEventsOptions, CloudEventsProtocol, ConfigMap,
    SourceOptions, TransportError,
};
use std::time::Duration;
use tokio::time::timeout;
use uuid::Uuid;

fn identity(name: &str) -> Identity {
    Identity::new(name).unwrap()
}

#[tokio::test]
async fn connection_errors_reach_error_sink() {
    // Nothing listens on port 1, so the first connect attempt fails.
    let config: ConfigMap = [(BROKER, "tcp://127.0.0.1:1")].into_iter().collect();
    let options = AgentOptions::new(config, identity("cluster7"), identity("agent-7a"));
    let errors = options.error_chan();

    let protocol = options.protocol().unwrap();

    let error = timeout(Duration::from_secs(10), errors.recv())
        .await
        .expect("timeout waiting for transport error")
        .expect("error sink closed");
    assert!(matches!(error, TransportError::Runtime(_)), "{error:?}");

    protocol.close().await;
    assert!(protocol.receive().await.is_none());
}

#[tokio::test]
async fn closed_protocol_rejects_sends() {
    let config: ConfigMap = [(BROKER, "tcp://127.0.0.1:1")].into_iter().collect();
    let options = AgentOptions::new(config, identity("cluster7"), identity("agent-7a"));
    let client = CloudEventsClient::new(options).unwrap();

    client.close().await;

    let event_type = EventType::parse("io.cebus.works.v1.manifests.status.update-request").unwrap();
    let context = EventContext::new("agent-7a", &event_type)
        .with_extension(EXTENSION_ORIGINAL_SOURCE, "hub");
    let result = client.publish(CloudEvent::new(context, None)).await;
    assert_eq!(result, Err(TransportError::Closed));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn hub_to_agent_roundtrip() {
    if std::env::var("CEBUS_INTEGRATION").is_err() {
        eprintln!("Skipping integration test; set CEBUS_INTEGRATION=1 to run");
        return;
    }

    let broker =
        std::env::var("CEBUS_MQTT_BROKER").unwrap_or_else(|_| "tcp://localhost:1883".to_string());
    let cluster = format!("cluster-{}", Uuid::new_v4().simple());

    let agent_config: ConfigMap = [(BROKER, broker.as_str())].into_iter().collect();
    let agent = CloudEventsClient::new(AgentOptions::new(
        agent_config,
        identity(&cluster),
        identity(&format!("agent-{cluster}")),
    ))
    .unwrap();

    let hub_config: ConfigMap = [(BROKER, broker.as_str()), (GROUP_ID, "hub-integration")]
        .into_iter()
        .collect();
    let hub = CloudEventsClient::new(SourceOptions::new(hub_config, identity("hub"))).unwrap();

    tokio::time::sleep(Duration::from_millis(500)).await;

    let event_type = EventType::parse("io.cebus.works.v1.manifests.spec.create-request").unwrap();
    let context =
        EventContext::new("hub", &event_type).with_extension(EXTENSION_CLUSTER_NAME, &cluster);
    let sent_id = context.id.clone();
    hub.publish(CloudEvent::new(context, Some(serde_json::json!({"name": "nginx"}))))
        .await
        .unwrap();

    let inbound = timeout(Duration::from_secs(5), agent.receive())
        .await
        .expect("timeout waiting for event")
        .expect("agent closed");

    assert_eq!(inbound.topic, format!("sourceevents.hub.{cluster}"));
    assert_eq!(
        inbound.message_key.map(|key| key.to_string()),
        Some(format!("hub@{cluster}"))
    );
    assert_eq!(inbound.event.context.id, sent_id);

    agent.close().await;
    hub.close().await;
}
