//! # cebus Core
//!
//! Event envelope model shared by agents and hubs on the cebus topic bus.
//!
//! This crate provides:
//! - Identities for agents, clusters and sources, including the reserved
//!   "all" identity used for broadcasts
//! - The structured event type (`<group>.<version>.<resource>.<subresource>.<action>`)
//! - A read-only cloud event context with string extensions

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod event;
pub mod event_type;
pub mod identity;

pub use event::{CloudEvent, EventContext, EXTENSION_CLUSTER_NAME, EXTENSION_ORIGINAL_SOURCE};
pub use event_type::{Action, EventDataType, EventType, EventTypeError, SubResource};
pub use identity::{Identity, IdentityError, CLUSTER_ALL, RESERVED_CHARACTERS, SOURCE_ALL};
