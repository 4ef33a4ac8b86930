//! # cebus Protocol
//!
//! Addressing scheme for cloud events exchanged between agents and hubs.
//!
//! ## Topics
//!
//! Topic scheme: `{role}.{source}.{cluster}` for point-to-point events,
//! `{role}.{identity}` for broadcasts. See [`topics`].
//!
//! ## Message Keys
//!
//! - Point-to-point: `origin@target`
//! - Broadcast: the sending cluster (or source)
//!
//! ## Routing
//!
//! [`AgentAddressResolver`] and [`SourceAddressResolver`] decide per event
//! whether it is a broadcast and compute its topic and key.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod keys;
pub mod routing;
pub mod topics;

pub use keys::MessageKey;
pub use routing::{
    AddressResolver, AgentAddressResolver, RoutingContext, RoutingError, SourceAddressResolver,
    SubscriptionSet,
};
pub use topics::{SubscriptionPattern, Topic, TopicScheme, TopicTemplate};
