//! Encrypted session over a message transport.
//!
//! [`Session::connect`] opens the transport, runs the NK handshake through
//! the inbox and keeps the two transport ciphers. A `Session` value only
//! exists once the handshake has succeeded; after [`Session::close`] every
//! operation fails with [`SessionError::Closed`].
//!
//! A session carries one request at a time. Methods take `&mut self`, so a
//! second outstanding request on the same session does not type-check.

use std::fmt;
use std::time::Duration;

use futures::Stream;
use tessel_common::config::{ChannelConfig, DEFAULT_CONNECT_TIMEOUT_SECS, DEFAULT_INBOX_CAPACITY, MAX_NOISE_MESSAGE};
use tessel_noise::{CipherState, CryptoProvider, HandshakeResult, NkInitiator, StaticPublicKey};
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::error::{SessionError, TransportError};
use crate::inbox::{inbox, CloseHandle, Delivery, Inbox};
use crate::transport::{Connector, Transport};

/// Poly1305 tag appended to every transport message.
const TAG_LEN: usize = 16;

/// Session tuning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionOptions {
    /// Upper bound on the wait for the transport to become ready.
    pub connect_timeout: Duration,
    /// Inbound messages buffered ahead of the consumer.
    pub inbox_capacity: usize,
    /// Largest ciphertext this session will send.
    pub max_message_size: usize,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS),
            inbox_capacity: DEFAULT_INBOX_CAPACITY,
            max_message_size: MAX_NOISE_MESSAGE,
        }
    }
}

impl From<&ChannelConfig> for SessionOptions {
    fn from(config: &ChannelConfig) -> Self {
        Self {
            connect_timeout: config.connect_timeout(),
            inbox_capacity: config.inbox_capacity,
            max_message_size: config.max_message_size.min(MAX_NOISE_MESSAGE),
        }
    }
}

pub struct Session<T: Transport> {
    transport: Option<T>,
    inbox: Option<Inbox>,
    send: CipherState,
    recv: CipherState,
    handshake_hash: [u8; 32],
    close_handle: CloseHandle,
    max_message_size: usize,
    closed: bool,
    /// A response stream was dropped before its end; its unread chunks
    /// would otherwise be taken as the next response.
    stream_abandoned: bool,
}

impl<T: Transport> Session<T> {
    /// Connect and complete the handshake.
    ///
    /// Only the transport setup is bounded by `options.connect_timeout`. On
    /// any handshake failure the transport is closed before the error is
    /// returned. Dropping the returned future also releases the transport.
    pub async fn connect<C>(
        connector: &C,
        server_key: &StaticPublicKey,
        provider: &dyn CryptoProvider,
        options: SessionOptions,
    ) -> Result<Self, SessionError>
    where
        C: Connector<Transport = T>,
    {
        let (sender, mut inbox) = inbox(options.inbox_capacity);

        let mut transport = match timeout(options.connect_timeout, connector.connect(sender)).await {
            Ok(result) => result?,
            Err(_) => {
                warn!(timeout = ?options.connect_timeout, "transport not ready in time");
                return Err(TransportError::ConnectTimeout(options.connect_timeout).into());
            }
        };
        debug!("transport ready, starting handshake");

        let result = match handshake(&mut transport, &mut inbox, server_key, provider).await {
            Ok(result) => result,
            Err(err) => {
                warn!(error = %err, "handshake failed");
                if let Err(close_err) = transport.close().await {
                    warn!(error = %close_err, "failed to close transport after handshake failure");
                }
                return Err(err);
            }
        };

        let HandshakeResult {
            send,
            recv,
            handshake_hash,
            payload,
        } = result;
        info!(payload_len = payload.len(), "secure session established");

        Ok(Self {
            transport: Some(transport),
            close_handle: inbox.close_handle(),
            inbox: Some(inbox),
            send,
            recv,
            handshake_hash,
            max_message_size: options.max_message_size,
            closed: false,
            stream_abandoned: false,
        })
    }

    /// Send one request and wait for exactly one response.
    pub async fn send_and_receive(&mut self, plaintext: &[u8]) -> Result<Vec<u8>, SessionError> {
        self.send_request(plaintext).await?;

        match self.next_delivery().await? {
            Delivery::Message(ciphertext) => {
                let plaintext = self.recv.decrypt(&ciphertext).map_err(SessionError::from_decrypt)?;
                debug!(len = plaintext.len(), nonce = self.recv.nonce(), "received response");
                Ok(plaintext)
            }
            Delivery::TransportClosed => Err(TransportError::Closed.into()),
            Delivery::CloseRequested => {
                self.close().await;
                Err(SessionError::Closed)
            }
        }
    }

    /// Send one request and read a multi-part response.
    ///
    /// The stream ends on an empty message (a zero-length frame or an
    /// authenticated empty plaintext), which is not yielded, or when the
    /// transport closes. A chunk that fails authentication is yielded as an
    /// error and ends the stream.
    pub async fn send_and_stream(
        &mut self,
        plaintext: &[u8],
    ) -> Result<ResponseStream<'_, T>, SessionError> {
        self.send_request(plaintext).await?;
        Ok(ResponseStream {
            session: self,
            done: false,
        })
    }

    /// Close the session. Idempotent.
    ///
    /// Wipes both cipher keys, drops buffered inbound messages and closes the
    /// transport. Errors from the transport's close are logged and dropped.
    pub async fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.close_handle.close();
        self.send.erase();
        self.recv.erase();
        self.inbox = None;

        if let Some(mut transport) = self.transport.take() {
            if let Err(err) = transport.close().await {
                warn!(error = %err, "error closing transport");
            }
        }
        info!("session closed");
    }

    /// Handle that closes this session from another task. A pending receive
    /// wakes up with [`SessionError::Closed`].
    pub fn close_handle(&self) -> CloseHandle {
        self.close_handle.clone()
    }

    pub fn is_closed(&self) -> bool {
        self.closed || self.close_handle.is_closed()
    }

    /// Final handshake transcript hash, for channel binding.
    pub fn handshake_hash(&self) -> &[u8; 32] {
        &self.handshake_hash
    }

    /// Fail fast once closed, finishing a close requested through the handle.
    /// A session left out of step by an abandoned stream is closed here and
    /// reports that once.
    async fn ensure_open(&mut self) -> Result<(), SessionError> {
        if !self.closed && self.stream_abandoned {
            warn!("response stream dropped before its end, closing session");
            self.close().await;
            return Err(SessionError::StreamAbandoned);
        }
        if !self.closed && self.close_handle.is_closed() {
            self.close().await;
        }
        if self.closed {
            return Err(SessionError::Closed);
        }
        Ok(())
    }

    async fn send_request(&mut self, plaintext: &[u8]) -> Result<(), SessionError> {
        self.ensure_open().await?;

        let size = plaintext.len() + TAG_LEN;
        if size > self.max_message_size {
            return Err(SessionError::MessageTooLarge {
                size,
                max: self.max_message_size,
            });
        }

        let ciphertext = self.send.encrypt(plaintext).map_err(SessionError::from_cipher)?;
        debug!(len = ciphertext.len(), nonce = self.send.nonce(), "sending request");

        let transport = self.transport.as_mut().ok_or(SessionError::Closed)?;
        transport.send(ciphertext).await?;
        Ok(())
    }

    async fn next_delivery(&mut self) -> Result<Delivery, SessionError> {
        let inbox = self.inbox.as_mut().ok_or(SessionError::Closed)?;
        Ok(inbox.recv().await)
    }
}

impl<T: Transport> fmt::Debug for Session<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("send", &self.send)
            .field("recv", &self.recv)
            .field("closed", &self.closed)
            .finish_non_exhaustive()
    }
}

/// Drive the two handshake messages over the transport and inbox.
async fn handshake<T: Transport>(
    transport: &mut T,
    inbox: &mut Inbox,
    server_key: &StaticPublicKey,
    provider: &dyn CryptoProvider,
) -> Result<HandshakeResult, SessionError> {
    let initiator = NkInitiator::new(provider, server_key).map_err(SessionError::Handshake)?;
    let (awaiting, message_1) = initiator.write_message_1().map_err(SessionError::Handshake)?;
    transport.send(message_1).await?;

    let message_2 = match inbox.recv().await {
        Delivery::Message(message) => message,
        Delivery::TransportClosed => return Err(TransportError::ClosedDuringHandshake.into()),
        Delivery::CloseRequested => return Err(SessionError::Closed),
    };

    awaiting
        .read_message_2(&message_2)
        .map_err(SessionError::Handshake)
}

/// Lazy, finite, non-restartable sequence of response chunks.
///
/// Borrows the session mutably, so no other request can start until the
/// stream is dropped. Dropping it before the end leaves the session unusable:
/// the next operation closes it and fails with
/// [`SessionError::StreamAbandoned`].
pub struct ResponseStream<'a, T: Transport> {
    session: &'a mut Session<T>,
    done: bool,
}

impl<'a, T: Transport> ResponseStream<'a, T> {
    /// Next decrypted chunk, or `None` at end of stream.
    pub async fn next(&mut self) -> Option<Result<Vec<u8>, SessionError>> {
        if self.done {
            return None;
        }

        let delivery = match self.session.next_delivery().await {
            Ok(delivery) => delivery,
            Err(err) => return self.fail(err),
        };

        match delivery {
            Delivery::Message(ciphertext) if ciphertext.is_empty() => {
                debug!("end of stream");
                self.finish()
            }
            Delivery::Message(ciphertext) => match self.session.recv.decrypt(&ciphertext) {
                Ok(chunk) if chunk.is_empty() => {
                    debug!("end of stream");
                    self.finish()
                }
                Ok(chunk) => {
                    debug!(len = chunk.len(), nonce = self.session.recv.nonce(), "stream chunk");
                    Some(Ok(chunk))
                }
                Err(err) => self.fail(SessionError::from_decrypt(err)),
            },
            Delivery::TransportClosed => {
                debug!("transport closed mid-stream");
                self.finish()
            }
            Delivery::CloseRequested => {
                self.session.close().await;
                self.fail(SessionError::Closed)
            }
        }
    }

    /// Adapt into a [`futures::Stream`].
    pub fn into_stream(self) -> impl Stream<Item = Result<Vec<u8>, SessionError>> + 'a {
        futures::stream::unfold(self, |mut stream| async move {
            let item = stream.next().await?;
            Some((item, stream))
        })
    }

    /// Collect every remaining chunk, stopping at the first error.
    pub async fn collect(mut self) -> Result<Vec<Vec<u8>>, SessionError> {
        let mut chunks = Vec::new();
        while let Some(chunk) = self.next().await {
            chunks.push(chunk?);
        }
        Ok(chunks)
    }

    fn finish(&mut self) -> Option<Result<Vec<u8>, SessionError>> {
        self.done = true;
        None
    }

    fn fail(&mut self, err: SessionError) -> Option<Result<Vec<u8>, SessionError>> {
        self.done = true;
        Some(Err(err))
    }
}

impl<'a, T: Transport> Drop for ResponseStream<'a, T> {
    fn drop(&mut self) {
        if !self.done {
            self.session.stream_abandoned = true;
        }
    }
}
