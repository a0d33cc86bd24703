//! Structured record of what an endpoint did.
//!
//! Every state transition and every packet sent or received is appended to
//! the endpoint's journal (and mirrored to the `log` facade).  Tests assert
//! on the journal instead of scraping log text.

use std::net::SocketAddr;

use crate::packet::{DecodeError, Flags, Packet};
use crate::state::ConnectionState;

/// Why an inbound datagram was ignored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Discard {
    /// Too short to decode.
    Malformed(DecodeError),
    /// Sent by someone other than the connected peer.
    ForeignPeer,
    /// Decoded fine but carried no payload.
    Empty,
}

/// One journal entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// The FSM moved between states.
    Transition {
        from: ConnectionState,
        to: ConnectionState,
    },
    /// A packet was handed to the socket.
    Sent {
        flags: Flags,
        seq: u32,
        ack: u32,
        len: usize,
        to: SocketAddr,
    },
    /// A packet was accepted from the socket.
    Received {
        flags: Flags,
        seq: u32,
        ack: u32,
        len: usize,
        from: SocketAddr,
    },
    /// An inbound datagram was dropped.
    Discarded { from: SocketAddr, reason: Discard },
    /// The socket was released.
    Closed,
}

impl Event {
    pub(crate) fn sent(packet: &Packet, to: SocketAddr) -> Self {
        Self::Sent {
            flags: packet.flags,
            seq: packet.seq,
            ack: packet.ack,
            len: packet.payload.len(),
            to,
        }
    }

    pub(crate) fn received(packet: &Packet, from: SocketAddr) -> Self {
        Self::Received {
            flags: packet.flags,
            seq: packet.seq,
            ack: packet.ack,
            len: packet.payload.len(),
            from,
        }
    }
}
