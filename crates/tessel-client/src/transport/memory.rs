//! In-process duplex transport.
//!
//! [`memory_pair`] returns a connector for the session side and the
//! [`MemoryPeer`] that plays the server. Used by tests and by embedders that
//! run the responder in the same process.

use async_trait::async_trait;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::debug;

use super::{Connector, Transport};
use crate::error::TransportError;
use crate::inbox::InboxSender;

type Channel = (mpsc::Sender<Vec<u8>>, mpsc::Receiver<Vec<u8>>);

/// Create a connected pair; each direction buffers up to `capacity` messages.
pub fn memory_pair(capacity: usize) -> (MemoryConnector, MemoryPeer) {
    let capacity = capacity.max(1);
    let (to_peer, from_client) = mpsc::channel(capacity);
    let (to_client, from_peer) = mpsc::channel(capacity);
    (
        MemoryConnector {
            channel: Mutex::new(Some((to_peer, from_peer))),
        },
        MemoryPeer {
            to_client: Some(to_client),
            from_client,
        },
    )
}

/// Session side of a memory pair. Connects once.
#[derive(Debug)]
pub struct MemoryConnector {
    channel: Mutex<Option<Channel>>,
}

#[async_trait]
impl Connector for MemoryConnector {
    type Transport = MemoryTransport;

    async fn connect(&self, inbox: InboxSender) -> Result<MemoryTransport, TransportError> {
        let (to_peer, mut from_peer) = self
            .channel
            .lock()
            .await
            .take()
            .ok_or_else(|| TransportError::Connect("memory transport already used".into()))?;

        let reader = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = inbox.closed() => break,
                    message = from_peer.recv() => match message {
                        Some(message) => {
                            if !inbox.deliver(message).await {
                                break;
                            }
                        }
                        None => {
                            debug!("memory peer hung up");
                            break;
                        }
                    },
                }
            }
        });

        Ok(MemoryTransport {
            to_peer: Some(to_peer),
            reader,
        })
    }
}

/// Established session-side memory transport.
#[derive(Debug)]
pub struct MemoryTransport {
    to_peer: Option<mpsc::Sender<Vec<u8>>>,
    reader: JoinHandle<()>,
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn send(&mut self, message: Vec<u8>) -> Result<(), TransportError> {
        let to_peer = self.to_peer.as_ref().ok_or(TransportError::Closed)?;
        to_peer
            .send(message)
            .await
            .map_err(|_| TransportError::Send("memory peer is gone".into()))
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.to_peer = None;
        self.reader.abort();
        Ok(())
    }
}

impl Drop for MemoryTransport {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

/// The far end of a memory pair.
#[derive(Debug)]
pub struct MemoryPeer {
    to_client: Option<mpsc::Sender<Vec<u8>>>,
    from_client: mpsc::Receiver<Vec<u8>>,
}

impl MemoryPeer {
    /// Next message from the session, or `None` once it closed its side.
    pub async fn recv(&mut self) -> Option<Vec<u8>> {
        self.from_client.recv().await
    }

    pub async fn send(&mut self, message: Vec<u8>) -> Result<(), TransportError> {
        let to_client = self.to_client.as_ref().ok_or(TransportError::Closed)?;
        to_client
            .send(message)
            .await
            .map_err(|_| TransportError::Send("session side is gone".into()))
    }

    /// Hang up. The session sees the end of inbound traffic after draining
    /// what was already sent.
    pub fn close(&mut self) {
        self.to_client = None;
    }
}
