//! Tessel secure channel client.
//!
//! Opens a Noise NK session to a server whose static key is already known
//! (from attestation) and exchanges encrypted request/response or streamed
//! messages with it.
//!
//! ```text
//! Connector ──connect──> Transport ──send──> server
//!                            │
//!        reader task ──> InboxSender ──> Inbox ──> Session
//! ```

#![forbid(unsafe_code)]

pub mod error;
pub mod inbox;
pub mod session;
pub mod transport;

pub use error::{ErrorKind, SessionError, TransportError};
pub use inbox::{inbox, CloseHandle, Delivery, Inbox, InboxSender};
pub use session::{ResponseStream, Session, SessionOptions};
pub use transport::{memory_pair, Connector, MemoryConnector, MemoryPeer, Transport, WsConnector};
