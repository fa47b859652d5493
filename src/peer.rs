//! Peer wire protocol (BEP-3) and peer lifecycle management.
//!
//! Everything that happens on a TCP connection to a remote peer lives
//! here: the 68-byte handshake, the length-prefixed message framing, the
//! per-connection state machine with its sender and receiver loops, and
//! the manager that keeps hundreds of such connections alive, reconnects
//! the flaky ones and reaps the dead.

mod bitfield;
mod connection;
mod error;
mod manager;
mod message;
mod peer_id;
mod transport;

pub use bitfield::Bitfield;
pub use connection::{PeerConnection, PeerState};
pub use error::PeerError;
pub use manager::PeerManager;
pub use message::{Handshake, Message, MessageId};
pub use peer_id::PeerId;
pub use transport::{MessageReader, MessageWriter, PeerTransport};

#[cfg(test)]
mod tests;
