//! MQTT-backed cloud events protocol.

use crate::config::MqttSettings;
use crate::error::TransportError;
use crate::mqtt;
use crate::sink::ErrorSink;
use async_trait::async_trait;
use cebus_core::CloudEvent;
use cebus_proto::{MessageKey, RoutingContext};
use rumqttc::{
    AsyncClient, Event, EventLoop, MqttOptions, Outgoing, Packet, QoS, SubscribeReasonCode,
};
use std::collections::BTreeMap;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;

/// Extension carrying the message key inside the event envelope.
pub const EXTENSION_PARTITION_KEY: &str = "partitionkey";

const RECONNECT_DELAY: Duration = Duration::from_secs(5);

/// An event received from the bus.
#[derive(Debug, Clone, PartialEq)]
pub struct InboundEvent {
    /// Bus topic the event arrived on
    pub topic: String,
    /// Message key attached by the sender
    pub message_key: Option<MessageKey>,
    /// The event itself
    pub event: CloudEvent,
}

/// Outcome of a publish as seen by the broker client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryReport {
    /// Broker acknowledged the publish
    Acknowledged {
        /// Packet id of the publish
        pkid: u16,
    },
    /// Publishes still unacknowledged when the connection failed.
    ///
    /// The client retransmits them after reconnecting, so they may still
    /// be delivered, possibly twice. Each packet id is reported once per
    /// publish.
    Interrupted {
        /// Packet ids of the affected publishes
        pkids: Vec<u16>,
        /// Connection error that interrupted them
        error: String,
    },
}

/// QoS 1 publishes awaiting their PubAck.
#[derive(Debug, Default)]
struct InFlight {
    /// Packet id to whether its interruption was already reported
    pending: BTreeMap<u16, bool>,
}

impl InFlight {
    fn sent(&mut self, pkid: u16) {
        self.pending.insert(pkid, false);
    }

    fn acknowledged(&mut self, pkid: u16) {
        self.pending.remove(&pkid);
    }

    /// Packet ids interrupted for the first time; they stay tracked until
    /// acknowledged.
    fn interrupted(&mut self) -> Vec<u16> {
        self.pending
            .iter_mut()
            .filter(|(_, reported)| !**reported)
            .map(|(pkid, reported)| {
                *reported = true;
                *pkid
            })
            .collect()
    }
}

/// Broker-facing protocol handed out by
/// [`CloudEventsOptions::protocol`](crate::CloudEventsOptions::protocol).
#[async_trait]
pub trait CloudEventsProtocol: Send + Sync {
    /// Publish an event.
    ///
    /// With a routing context the event goes to its topic carrying its key;
    /// without one it goes to the role's fixed sender topic.
    ///
    /// # Errors
    ///
    /// Returns error if the event cannot be encoded, the topic cannot be
    /// expressed on this transport, or the protocol is closed.
    async fn send(
        &self,
        routing: Option<&RoutingContext>,
        event: CloudEvent,
    ) -> Result<(), TransportError>;

    /// Wait for the next inbound event. Returns `None` once closed.
    async fn receive(&self) -> Option<InboundEvent>;

    /// Stop background work and disconnect.
    async fn close(&self);
}

/// Protocol over an MQTT broker.
pub struct MqttProtocol {
    client: AsyncClient,
    sender_topic: &'static str,
    inbound: Mutex<mpsc::Receiver<InboundEvent>>,
    cancel: CancellationToken,
}

impl MqttProtocol {
    /// Build the client, queue the subscriptions and start the event-loop
    /// driver and the delivery-report relay.
    ///
    /// Must be called from within a Tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns error if a subscription cannot be queued. No background work
    /// is started in that case.
    pub(crate) fn start(
        settings: &MqttSettings,
        filters: &[String],
        sender_topic: &'static str,
        errors: ErrorSink,
    ) -> Result<Self, TransportError> {
        let mut mqtt_options =
            MqttOptions::new(&settings.client_id, &settings.host, settings.port);
        mqtt_options.set_keep_alive(settings.keep_alive);

        let (client, eventloop) = AsyncClient::new(mqtt_options, settings.channel_capacity);

        for filter in filters {
            tracing::info!(filter, "Subscribing to bus topics");
            client
                .try_subscribe(filter.as_str(), QoS::AtLeastOnce)
                .map_err(|e| TransportError::Config(format!("cannot subscribe {filter}: {e}")))?;
        }

        let cancel = CancellationToken::new();
        let (inbound_tx, inbound_rx) = mpsc::channel(settings.channel_capacity);
        let (report_tx, report_rx) = mpsc::channel(settings.channel_capacity);

        tokio::spawn(drive_event_loop(
            eventloop,
            inbound_tx,
            report_tx,
            errors.clone(),
            cancel.clone(),
        ));
        tokio::spawn(relay_delivery_reports(report_rx, errors, cancel.clone()));

        Ok(Self {
            client,
            sender_topic,
            inbound: Mutex::new(inbound_rx),
            cancel,
        })
    }

    /// Token cancelled when the protocol shuts down.
    #[must_use]
    pub fn cancellation(&self) -> CancellationToken {
        self.cancel.clone()
    }
}

#[async_trait]
impl CloudEventsProtocol for MqttProtocol {
    async fn send(
        &self,
        routing: Option<&RoutingContext>,
        mut event: CloudEvent,
    ) -> Result<(), TransportError> {
        if self.cancel.is_cancelled() {
            return Err(TransportError::Closed);
        }

        let topic = match routing {
            Some(routing) => {
                event.context.extensions.insert(
                    EXTENSION_PARTITION_KEY.to_string(),
                    routing.message_key.to_string(),
                );
                mqtt::topic_name(&routing.topic)?
            }
            None => self.sender_topic.to_string(),
        };

        let payload = event
            .to_json()
            .map_err(|e| TransportError::Encode(e.to_string()))?;

        tracing::debug!(
            topic,
            event_id = %event.context.id,
            payload_len = payload.len(),
            "Publishing event"
        );

        self.client
            .publish(topic, QoS::AtLeastOnce, false, payload)
            .await
            .map_err(|e| TransportError::Publish(e.to_string()))
    }

    async fn receive(&self) -> Option<InboundEvent> {
        let mut inbound = self.inbound.lock().await;
        tokio::select! {
            () = self.cancel.cancelled() => None,
            event = inbound.recv() => event,
        }
    }

    async fn close(&self) {
        if self.cancel.is_cancelled() {
            return;
        }
        self.cancel.cancel();
        if let Err(err) = self.client.try_disconnect() {
            tracing::debug!(error = %err, "Disconnect request not queued");
        }
        tracing::info!("Transport closed");
    }
}

impl Drop for MqttProtocol {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Poll the MQTT event loop until cancelled.
///
/// Connection errors go straight to the error sink; publish
/// acknowledgements and interrupted publishes go to the relay.
async fn drive_event_loop(
    mut eventloop: EventLoop,
    inbound: mpsc::Sender<InboundEvent>,
    reports: mpsc::Sender<DeliveryReport>,
    errors: ErrorSink,
    cancel: CancellationToken,
) {
    let mut in_flight = InFlight::default();

    loop {
        let event = tokio::select! {
            () = cancel.cancelled() => break,
            event = eventloop.poll() => event,
        };

        match event {
            Ok(Event::Incoming(Packet::Publish(publish))) => {
                let topic = mqtt::bus_topic(&publish.topic);
                let event = match CloudEvent::from_json(&publish.payload) {
                    Ok(event) => event,
                    Err(err) => {
                        tracing::warn!(
                            error = %err,
                            topic,
                            payload_len = publish.payload.len(),
                            "Failed to decode cloud event"
                        );
                        continue;
                    }
                };

                let message_key = event
                    .context
                    .extension(EXTENSION_PARTITION_KEY)
                    .map(MessageKey::from_raw);
                tracing::debug!(topic, event_id = %event.context.id, "Received event");

                let inbound_event = InboundEvent {
                    topic,
                    message_key,
                    event,
                };
                let delivered = tokio::select! {
                    () = cancel.cancelled() => break,
                    result = inbound.send(inbound_event) => result.is_ok(),
                };
                if !delivered {
                    tracing::warn!("Inbound receiver dropped, stopping event loop");
                    break;
                }
            }
            Ok(Event::Outgoing(Outgoing::Publish(pkid))) => {
                in_flight.sent(pkid);
            }
            Ok(Event::Incoming(Packet::PubAck(ack))) => {
                in_flight.acknowledged(ack.pkid);
                let _ = reports
                    .send(DeliveryReport::Acknowledged { pkid: ack.pkid })
                    .await;
            }
            Ok(Event::Incoming(Packet::SubAck(suback))) => {
                if suback
                    .return_codes
                    .iter()
                    .any(|code| matches!(code, SubscribeReasonCode::Failure))
                {
                    let error = TransportError::Runtime(format!(
                        "subscription {} rejected by broker",
                        suback.pkid
                    ));
                    if !report_unless_cancelled(&errors, error, &cancel).await {
                        break;
                    }
                } else {
                    tracing::info!(pkid = suback.pkid, "Subscription acknowledged");
                }
            }
            Ok(Event::Incoming(Packet::ConnAck(_))) => {
                tracing::info!("Connected to MQTT broker");
            }
            Ok(_) => {}
            Err(err) => {
                tracing::error!(error = %err, "MQTT error");
                let error = TransportError::Runtime(err.to_string());
                if !report_unless_cancelled(&errors, error, &cancel).await {
                    break;
                }

                let pkids = in_flight.interrupted();
                if !pkids.is_empty() {
                    let _ = reports
                        .send(DeliveryReport::Interrupted {
                            pkids,
                            error: err.to_string(),
                        })
                        .await;
                }

                tokio::select! {
                    () = cancel.cancelled() => break,
                    () = tokio::time::sleep(RECONNECT_DELAY) => {}
                }
            }
        }
    }

    tracing::debug!("MQTT event loop stopped");
}

/// Forward interrupted deliveries onto the error sink until cancelled or the
/// report stream ends.
pub(crate) async fn relay_delivery_reports(
    mut reports: mpsc::Receiver<DeliveryReport>,
    errors: ErrorSink,
    cancel: CancellationToken,
) {
    loop {
        let report = tokio::select! {
            () = cancel.cancelled() => break,
            report = reports.recv() => report,
        };

        match report {
            Some(DeliveryReport::Acknowledged { pkid }) => {
                tracing::trace!(pkid, "Publish acknowledged");
            }
            Some(DeliveryReport::Interrupted { pkids, error }) => {
                tracing::warn!(?pkids, error, "Publishes interrupted before acknowledgement");
                let error = TransportError::Delivery(format!(
                    "{} publish(es) interrupted before acknowledgement ({pkids:?}), \
                     retransmitted after reconnect and possibly delivered twice: {error}",
                    pkids.len()
                ));
                if !report_unless_cancelled(&errors, error, &cancel).await {
                    break;
                }
            }
            None => break,
        }
    }

    tracing::debug!("Delivery relay stopped");
}

/// Report an error unless shutdown wins the wait for the reader.
///
/// Returns `false` if cancelled first.
async fn report_unless_cancelled(
    errors: &ErrorSink,
    error: TransportError,
    cancel: &CancellationToken,
) -> bool {
    tokio::select! {
        () = cancel.cancelled() => false,
        () = errors.report(error) => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::error_channel;

    #[tokio::test]
    async fn relay_forwards_failures_only() {
        let (sink, receiver) = error_channel();
        let (tx, rx) = mpsc::channel(4);
        let cancel = CancellationToken::new();
        let relay = tokio::spawn(relay_delivery_reports(rx, sink, cancel));

        tx.send(DeliveryReport::Acknowledged { pkid: 1 }).await.unwrap();
        tx.send(DeliveryReport::Interrupted {
            pkids: vec![2, 3],
            error: "connection reset".to_string(),
        })
        .await
        .unwrap();

        match receiver.recv().await {
            Some(TransportError::Delivery(message)) => {
                assert!(message.contains("[2, 3]"));
                assert!(message.contains("connection reset"));
                assert!(message.contains("possibly delivered twice"));
            }
            other => panic!("unexpected {other:?}"),
        }

        drop(tx);
        relay.await.unwrap();
        assert!(receiver.try_recv().is_none());
    }

    #[test]
    fn interrupted_publishes_reported_once_until_acknowledged() {
        let mut in_flight = InFlight::default();
        in_flight.sent(1);
        in_flight.sent(2);

        assert_eq!(in_flight.interrupted(), vec![1, 2]);
        // Still pending across the reconnect, but not reported again.
        assert!(in_flight.interrupted().is_empty());

        in_flight.acknowledged(1);
        in_flight.sent(3);
        assert_eq!(in_flight.interrupted(), vec![3]);

        in_flight.acknowledged(2);
        in_flight.acknowledged(3);
        assert!(in_flight.pending.is_empty());
    }

    #[test]
    fn reused_packet_id_is_tracked_afresh() {
        let mut in_flight = InFlight::default();
        in_flight.sent(7);
        assert_eq!(in_flight.interrupted(), vec![7]);

        in_flight.acknowledged(7);
        in_flight.sent(7);
        assert_eq!(in_flight.interrupted(), vec![7]);
    }

    #[tokio::test]
    async fn relay_stops_on_cancel() {
        let (sink, _receiver) = error_channel();
        let (_tx, rx) = mpsc::channel::<DeliveryReport>(1);
        let cancel = CancellationToken::new();
        let relay = tokio::spawn(relay_delivery_reports(rx, sink, cancel.clone()));

        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(1), relay)
            .await
            .expect("relay did not stop")
            .unwrap();
    }
}
