//! Transport error taxonomy.

use cebus_proto::RoutingError;

/// Errors raised by the transport binding.
///
/// `Config`, `Routing`, `InvalidTopic` and `Encode` are returned
/// synchronously and abort the operation. `Runtime` and `Delivery` only
/// ever arrive through the [`ErrorSink`](crate::ErrorSink).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// Invalid connection parameters
    #[error("transport config error: {0}")]
    Config(String),
    /// Event could not be addressed
    #[error(transparent)]
    Routing(#[from] RoutingError),
    /// Topic or pattern cannot be expressed on this transport
    #[error("invalid topic: {0}")]
    InvalidTopic(String),
    /// Event could not be serialized
    #[error("encode error: {0}")]
    Encode(String),
    /// Publish request was rejected by the client
    #[error("publish error: {0}")]
    Publish(String),
    /// Connection-level failure reported by the broker client
    #[error("transport runtime error: {0}")]
    Runtime(String),
    /// Publish was not acknowledged by the broker
    #[error("delivery error: {0}")]
    Delivery(String),
    /// Protocol has been shut down
    #[error("transport closed")]
    Closed,
}
