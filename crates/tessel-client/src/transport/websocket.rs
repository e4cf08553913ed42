//! WebSocket transport. One binary frame carries one Noise message.

use async_trait::async_trait;
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

use super::{Connector, Transport};
use crate::error::TransportError;
use crate::inbox::InboxSender;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Connects to a `ws://` or `wss://` endpoint.
#[derive(Debug, Clone)]
pub struct WsConnector {
    url: String,
    max_message_size: usize,
}

impl WsConnector {
    pub fn new(url: impl Into<String>, max_message_size: usize) -> Self {
        Self {
            url: url.into(),
            max_message_size,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl Connector for WsConnector {
    type Transport = WsTransport;

    async fn connect(&self, inbox: InboxSender) -> Result<WsTransport, TransportError> {
        let (ws, _response) = connect_async(self.url.as_str())
            .await
            .map_err(|e| TransportError::Connect(e.to_string()))?;
        info!(url = %self.url, "websocket connected");

        let (sink, mut stream) = ws.split();
        let max_message_size = self.max_message_size;

        let reader = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = inbox.closed() => break,
                    frame = stream.next() => match frame {
                        Some(Ok(Message::Binary(data))) => {
                            if data.len() > max_message_size {
                                warn!(size = data.len(), max = max_message_size, "oversized frame, dropping connection");
                                break;
                            }
                            if !inbox.deliver(data.to_vec()).await {
                                break;
                            }
                        }
                        Some(Ok(Message::Text(_))) => {
                            warn!("ignoring unexpected text frame");
                        }
                        Some(Ok(Message::Close(frame))) => {
                            debug!(?frame, "server closed websocket");
                            break;
                        }
                        Some(Ok(_)) => {}
                        Some(Err(e)) => {
                            warn!(error = %e, "websocket read failed");
                            break;
                        }
                        None => break,
                    },
                }
            }
        });

        Ok(WsTransport {
            sink,
            reader,
            closed: false,
        })
    }
}

/// Established WebSocket transport.
pub struct WsTransport {
    sink: SplitSink<WsStream, Message>,
    reader: JoinHandle<()>,
    closed: bool,
}

#[async_trait]
impl Transport for WsTransport {
    async fn send(&mut self, message: Vec<u8>) -> Result<(), TransportError> {
        if self.closed {
            return Err(TransportError::Closed);
        }
        self.sink
            .send(Message::binary(message))
            .await
            .map_err(|e| TransportError::Send(e.to_string()))
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.reader.abort();
        // Close sends the close frame and flushes.
        self.sink
            .close()
            .await
            .map_err(|e| TransportError::Send(e.to_string()))
    }
}

impl Drop for WsTransport {
    fn drop(&mut self) {
        self.reader.abort();
    }
}
