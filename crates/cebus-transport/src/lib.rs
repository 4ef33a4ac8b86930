//! # cebus Transport
//!
//! Binds the cebus addressing scheme to an MQTT broker.
//!
//! ## Components
//!
//! - [`CloudEventsOptions`]: addressing, protocol construction and the
//!   error channel of one endpoint
//! - [`MqttProtocol`]: publishes events and receives subscribed ones
//! - [`ErrorSink`]: transport and delivery failures reported after
//!   construction
//!
//! ## Consumer Groups
//!
//! Subscriptions are MQTT shared subscriptions under `group.id`. Without an
//! explicit `group.id` every endpoint uses its own identity, so agents of
//! the same cluster each receive every event.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod client;
pub mod config;
pub mod error;
pub mod mqtt;
pub mod options;
pub mod protocol;
pub mod sink;

pub use client::CloudEventsClient;
pub use config::{ConfigMap, MqttSettings};
pub use error::TransportError;
pub use options::{AgentOptions, BusOptions, CloudEventsOptions, SourceOptions};
pub use protocol::{CloudEventsProtocol, DeliveryReport, InboundEvent, MqttProtocol};
pub use sink::{error_channel, ErrorReceiver, ErrorSink};
