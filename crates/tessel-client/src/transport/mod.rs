//! Message transports.
//!
//! A transport moves opaque binary messages and must preserve message
//! boundaries: one `send` on one side is exactly one inbox delivery on the
//! other. Inbound traffic does not go through the trait; the connector hands
//! the transport an [`InboxSender`] and the transport pushes into it from its
//! own reader task.

use async_trait::async_trait;

use crate::error::TransportError;
use crate::inbox::InboxSender;

pub mod memory;
pub mod websocket;

pub use memory::{memory_pair, MemoryConnector, MemoryPeer, MemoryTransport};
pub use websocket::{WsConnector, WsTransport};

/// Outbound half of an established transport.
#[async_trait]
pub trait Transport: Send {
    /// Send one message. Resolves once the transport has accepted it.
    async fn send(&mut self, message: Vec<u8>) -> Result<(), TransportError>;

    /// Release the transport and stop its reader. Dropping the inbox sender
    /// is what signals the end of inbound traffic to the session.
    async fn close(&mut self) -> Result<(), TransportError>;
}

/// Opens transports.
#[async_trait]
pub trait Connector: Send + Sync {
    type Transport: Transport;

    /// Open the transport and start forwarding inbound messages into
    /// `inbox`. Resolves when the transport is ready to send.
    async fn connect(&self, inbox: InboxSender) -> Result<Self::Transport, TransportError>;
}
