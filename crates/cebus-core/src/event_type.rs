//! Structured cloud event types.
//!
//! Type format: `<group>.<version>.<resource>.<subresource>.<action>`
//!
//! The group may itself contain dots, e.g.
//! `io.cebus.works.v1.manifests.status.resync-request`.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Resource the event payload describes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EventDataType {
    /// API group, e.g. `io.cebus.works`
    pub group: String,
    /// API version, e.g. `v1`
    pub version: String,
    /// Resource name, e.g. `manifests`
    pub resource: String,
}

impl fmt::Display for EventDataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.group, self.version, self.resource)
    }
}

/// Which half of a resource the event carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubResource {
    /// Desired state, published by sources
    Spec,
    /// Observed state, published by agents
    Status,
}

impl SubResource {
    /// Wire name of the sub-resource.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Spec => "spec",
            Self::Status => "status",
        }
    }
}

impl FromStr for SubResource {
    type Err = EventTypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "spec" => Ok(Self::Spec),
            "status" => Ok(Self::Status),
            other => Err(EventTypeError::UnknownSubResource(other.to_string())),
        }
    }
}

/// Action requested by an event.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Action {
    /// Create a resource
    CreateRequest,
    /// Update a resource
    UpdateRequest,
    /// Delete a resource
    DeleteRequest,
    /// Ask the counterpart to resend its full state
    ResyncRequest,
    /// Answer to a resync request
    ResyncResponse,
    /// Any other action, kept verbatim
    Other(String),
}

impl Action {
    /// Wire name of the action.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::CreateRequest => "create-request",
            Self::UpdateRequest => "update-request",
            Self::DeleteRequest => "delete-request",
            Self::ResyncRequest => "resync-request",
            Self::ResyncResponse => "resync-response",
            Self::Other(action) => action,
        }
    }

    fn from_wire(s: &str) -> Self {
        match s {
            "create-request" => Self::CreateRequest,
            "update-request" => Self::UpdateRequest,
            "delete-request" => Self::DeleteRequest,
            "resync-request" => Self::ResyncRequest,
            "resync-response" => Self::ResyncResponse,
            other => Self::Other(other.to_string()),
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A parsed cloud event type.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EventType {
    /// Resource the event describes
    pub data_type: EventDataType,
    /// Spec or status
    pub sub_resource: SubResource,
    /// Requested action
    pub action: Action,
}

impl EventType {
    /// Create an event type.
    #[must_use]
    pub fn new(data_type: EventDataType, sub_resource: SubResource, action: Action) -> Self {
        Self {
            data_type,
            sub_resource,
            action,
        }
    }

    /// Parse an event type string.
    ///
    /// # Errors
    ///
    /// Returns error if the string has fewer than five dot-separated
    /// segments, contains an empty segment, or names an unknown sub-resource.
    pub fn parse(type_str: &str) -> Result<Self, EventTypeError> {
        let parts: Vec<&str> = type_str.split('.').collect();

        if parts.len() < 5 {
            return Err(EventTypeError::TooFewSegments(type_str.to_string()));
        }
        if parts.iter().any(|part| part.is_empty()) {
            return Err(EventTypeError::EmptySegment(type_str.to_string()));
        }

        let n = parts.len();
        let action = Action::from_wire(parts[n - 1]);
        let sub_resource = parts[n - 2].parse()?;
        let data_type = EventDataType {
            group: parts[..n - 4].join("."),
            version: parts[n - 4].to_string(),
            resource: parts[n - 3].to_string(),
        };

        Ok(Self {
            data_type,
            sub_resource,
            action,
        })
    }
}

impl FromStr for EventType {
    type Err = EventTypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{}.{}",
            self.data_type,
            self.sub_resource.as_str(),
            self.action
        )
    }
}

/// Errors for event type parsing.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EventTypeError {
    /// Not enough segments
    #[error("unsupported event type format: {0}")]
    TooFewSegments(String),
    /// A segment was empty
    #[error("event type has an empty segment: {0}")]
    EmptySegment(String),
    /// Sub-resource is neither spec nor status
    #[error("unsupported subresource: {0}")]
    UnknownSubResource(String),
}
