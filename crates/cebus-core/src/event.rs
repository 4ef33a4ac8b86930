//! Cloud event envelope.
//!
//! Serialized in the JSON structured mode: context attributes and
//! extensions are top-level members next to `data`.

use crate::event_type::{EventType, EventTypeError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Extension carrying the identity of the source an event belongs to.
pub const EXTENSION_ORIGINAL_SOURCE: &str = "originalsource";

/// Extension carrying the target cluster of a source event.
pub const EXTENSION_CLUSTER_NAME: &str = "clustername";

/// CloudEvents spec version written by this crate.
pub const SPEC_VERSION: &str = "1.0";

/// Context attributes of a cloud event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventContext {
    /// CloudEvents spec version
    #[serde(rename = "specversion")]
    pub spec_version: String,
    /// Event identifier
    pub id: String,
    /// Producer of the event
    pub source: String,
    /// Raw event type string
    #[serde(rename = "type")]
    pub event_type: String,
    /// Time the event was produced
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<DateTime<Utc>>,
    /// Media type of `data`
    #[serde(
        rename = "datacontenttype",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub data_content_type: Option<String>,
    /// Extension attributes
    #[serde(flatten)]
    pub extensions: BTreeMap<String, String>,
}

impl EventContext {
    /// Create a context with a fresh id and the current time.
    #[must_use]
    pub fn new(source: impl Into<String>, event_type: &EventType) -> Self {
        Self {
            spec_version: SPEC_VERSION.to_string(),
            id: Uuid::new_v4().to_string(),
            source: source.into(),
            event_type: event_type.to_string(),
            time: Some(Utc::now()),
            data_content_type: Some("application/json".to_string()),
            extensions: BTreeMap::new(),
        }
    }

    /// Set an extension attribute.
    #[must_use]
    pub fn with_extension(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.extensions.insert(name.into(), value.into());
        self
    }

    /// Look up an extension attribute.
    #[must_use]
    pub fn extension(&self, name: &str) -> Option<&str> {
        self.extensions.get(name).map(String::as_str)
    }

    /// Parse the raw type string.
    ///
    /// # Errors
    ///
    /// Returns error if the type string is malformed.
    pub fn parsed_type(&self) -> Result<EventType, EventTypeError> {
        EventType::parse(&self.event_type)
    }
}

/// A cloud event: context plus optional JSON data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CloudEvent {
    /// Context attributes and extensions
    #[serde(flatten)]
    pub context: EventContext,
    /// Event payload
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl CloudEvent {
    /// Create an event.
    #[must_use]
    pub fn new(context: EventContext, data: Option<serde_json::Value>) -> Self {
        Self { context, data }
    }

    /// Serialize to JSON bytes.
    ///
    /// # Errors
    ///
    /// Returns error if serialization fails.
    pub fn to_json(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    /// Deserialize from JSON bytes.
    ///
    /// # Errors
    ///
    /// Returns error if the bytes are not a structured-mode event.
    pub fn from_json(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event_type::{Action, EventDataType, SubResource};

    fn manifests(sub_resource: SubResource, action: Action) -> EventType {
        EventType::new(
            EventDataType {
                group: "io.cebus.works".to_string(),
                version: "v1".to_string(),
                resource: "manifests".to_string(),
            },
            sub_resource,
            action,
        )
    }

    #[test]
    fn extensions_are_top_level_members() {
        let context = EventContext::new("cluster7-agent", &manifests(SubResource::Status, Action::UpdateRequest))
            .with_extension(EXTENSION_ORIGINAL_SOURCE, "hub");
        let event = CloudEvent::new(context, Some(serde_json::json!({"ready": true})));

        let value: serde_json::Value = serde_json::from_slice(&event.to_json().unwrap()).unwrap();
        assert_eq!(value["originalsource"], "hub");
        assert_eq!(value["type"], "io.cebus.works.v1.manifests.status.update-request");
        assert_eq!(value["specversion"], "1.0");
        assert_eq!(value["data"]["ready"], true);
    }

    #[test]
    fn decode_structured_event() {
        let raw = br#"{
            "specversion": "1.0",
            "id": "1",
            "source": "hub",
            "type": "io.cebus.works.v1.manifests.spec.create-request",
            "clustername": "cluster7",
            "data": {"name": "nginx"}
        }"#;

        let event = CloudEvent::from_json(raw).unwrap();
        assert_eq!(event.context.extension(EXTENSION_CLUSTER_NAME), Some("cluster7"));
        assert_eq!(event.context.extension(EXTENSION_ORIGINAL_SOURCE), None);
        assert_eq!(
            event.context.parsed_type().unwrap().action,
            Action::CreateRequest
        );
        assert!(event.context.time.is_none());
    }
}
