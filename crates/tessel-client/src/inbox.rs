//! Bounded single-producer single-consumer queue between a transport's reader
//! and the session.
//!
//! The reader task owns the [`InboxSender`] and pushes every inbound message
//! in arrival order. The session owns the [`Inbox`]. A message that arrives
//! before anyone is waiting is buffered; a full buffer makes the reader wait.
//!
//! Dropping the sender ends the inbox: the session sees
//! [`Delivery::TransportClosed`] once the buffer is drained. A
//! [`CloseHandle`] lets another task interrupt a pending receive.

use std::sync::Arc;

use tokio::sync::{mpsc, watch};

/// Outcome of waiting on the inbox.
#[derive(Debug, PartialEq, Eq)]
pub enum Delivery {
    /// Next message from the peer, in arrival order.
    Message(Vec<u8>),
    /// The transport is gone and every buffered message has been consumed.
    TransportClosed,
    /// A [`CloseHandle`] was triggered.
    CloseRequested,
}

/// Create an inbox holding at most `capacity` unread messages (minimum 1).
pub fn inbox(capacity: usize) -> (InboxSender, Inbox) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    let (close_tx, close_rx) = watch::channel(false);
    (
        InboxSender { tx },
        Inbox {
            rx,
            close_rx,
            close_tx: Arc::new(close_tx),
        },
    )
}

/// Producer half, held by the transport's reader.
#[derive(Debug)]
pub struct InboxSender {
    tx: mpsc::Sender<Vec<u8>>,
}

impl InboxSender {
    /// Queue a message, waiting for room if the buffer is full.
    ///
    /// Returns `false` once the consumer is gone; the reader should stop.
    pub async fn deliver(&self, message: Vec<u8>) -> bool {
        self.tx.send(message).await.is_ok()
    }

    /// Resolves when the consumer has been dropped.
    pub async fn closed(&self) {
        self.tx.closed().await
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Consumer half, held by the session.
#[derive(Debug)]
pub struct Inbox {
    rx: mpsc::Receiver<Vec<u8>>,
    close_rx: watch::Receiver<bool>,
    close_tx: Arc<watch::Sender<bool>>,
}

impl Inbox {
    /// Wait for the next message. A triggered [`CloseHandle`] takes priority
    /// over buffered messages.
    pub async fn recv(&mut self) -> Delivery {
        if *self.close_rx.borrow() {
            return Delivery::CloseRequested;
        }

        tokio::select! {
            biased;
            _ = self.close_rx.wait_for(|closed| *closed) => Delivery::CloseRequested,
            message = self.rx.recv() => match message {
                Some(message) => Delivery::Message(message),
                None => Delivery::TransportClosed,
            },
        }
    }

    pub fn close_handle(&self) -> CloseHandle {
        CloseHandle {
            tx: Arc::clone(&self.close_tx),
        }
    }
}

/// Cloneable trigger that interrupts whoever is waiting on the inbox.
///
/// Triggering is sticky: every later receive also reports
/// [`Delivery::CloseRequested`].
#[derive(Debug, Clone)]
pub struct CloseHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl CloseHandle {
    pub fn close(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_closed(&self) -> bool {
        *self.tx.borrow()
    }
}
