//! Cloud events client: addressing plus transport in one handle.

use crate::error::TransportError;
use crate::options::CloudEventsOptions;
use crate::protocol::{CloudEventsProtocol, InboundEvent};
use crate::sink::ErrorReceiver;
use cebus_core::CloudEvent;

/// Publishes events at their resolved address and receives subscribed ones.
pub struct CloudEventsClient<O: CloudEventsOptions> {
    options: O,
    protocol: O::Protocol,
}

impl<O: CloudEventsOptions> CloudEventsClient<O> {
    /// Build the protocol from `options`.
    ///
    /// # Errors
    ///
    /// Returns error if the protocol cannot be built.
    pub fn new(options: O) -> Result<Self, TransportError> {
        let protocol = options.protocol()?;
        Ok(Self { options, protocol })
    }

    /// Wrap an already built protocol.
    pub fn with_protocol(options: O, protocol: O::Protocol) -> Self {
        Self { options, protocol }
    }

    /// Resolve the event's address and publish it.
    ///
    /// Nothing is sent if the event cannot be addressed.
    ///
    /// # Errors
    ///
    /// Returns error if addressing or the publish request fails.
    pub async fn publish(&self, event: CloudEvent) -> Result<(), TransportError> {
        let routing = self.options.with_context(&event.context)?;
        self.protocol.send(Some(&routing), event).await
    }

    /// Wait for the next inbound event.
    pub async fn receive(&self) -> Option<InboundEvent> {
        self.protocol.receive().await
    }

    /// Receiver for asynchronous transport errors.
    pub fn errors(&self) -> ErrorReceiver {
        self.options.error_chan()
    }

    /// The options this client was built from.
    pub fn options(&self) -> &O {
        &self.options
    }

    /// Stop the transport.
    pub async fn close(&self) {
        self.protocol.close().await;
    }
}
