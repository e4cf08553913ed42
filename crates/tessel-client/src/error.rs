//! Session and transport errors.

use std::time::Duration;

use tessel_noise::NoiseError;
use thiserror::Error;

/// Text shown to end users for any session failure.
pub const USER_MESSAGE: &str = "secure connection failed";

/// Failures of the underlying message transport.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("transport not ready after {0:?}")]
    ConnectTimeout(Duration),

    #[error("connect failed: {0}")]
    Connect(String),

    #[error("send failed: {0}")]
    Send(String),

    #[error("transport closed during handshake")]
    ClosedDuringHandshake,

    #[error("transport closed")]
    Closed,
}

/// Coarse classification of a [`SessionError`], stable across variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Connect timeout, send failure or unexpected close.
    Transport,
    /// Handshake could not complete; start over with a fresh session.
    Handshake,
    /// A transport message failed authentication. Close the session.
    Authentication,
    /// Programming error, such as using a closed session.
    Misuse,
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("handshake failed: {0}")]
    Handshake(#[source] NoiseError),

    #[error("authentication failed: {0}")]
    Authentication(#[source] NoiseError),

    #[error("session is closed")]
    Closed,

    #[error("previous response stream was dropped before its end; session closed")]
    StreamAbandoned,

    #[error("message too large: {size} bytes exceeds maximum of {max}")]
    MessageTooLarge { size: usize, max: usize },
}

impl SessionError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Transport(_) => ErrorKind::Transport,
            Self::Handshake(_) => ErrorKind::Handshake,
            Self::Authentication(_) => ErrorKind::Authentication,
            Self::Closed | Self::StreamAbandoned | Self::MessageTooLarge { .. } => {
                ErrorKind::Misuse
            }
        }
    }

    /// Generic text for end users. The variant itself goes to the logs.
    pub fn user_message(&self) -> &'static str {
        USER_MESSAGE
    }

    /// Map an encrypt failure. Size violations are the caller's fault;
    /// anything else is treated as an authentication failure.
    pub(crate) fn from_cipher(err: NoiseError) -> Self {
        match err {
            NoiseError::MessageTooLarge { size, max } => Self::MessageTooLarge { size, max },
            other => Self::Authentication(other),
        }
    }

    /// Map a decrypt failure. Whatever the peer sent, including an oversized
    /// message, is an authentication failure and never the caller's fault.
    pub(crate) fn from_decrypt(err: NoiseError) -> Self {
        Self::Authentication(err)
    }
}
