//! Wire-format definitions for protocol segments.
//!
//! Every datagram exchanged between endpoints is a [`Packet`].  This module
//! owns the on-wire layout and nothing else: no I/O happens here.
//!
//! # Wire format
//!
//! All multi-byte integers are **big-endian**.
//!
//! ```text
//!  0               1               2               3
//!  0 1 2 3 4 5 6 7 0 1 2 3 4 5 6 7 0 1 2 3 4 5 6 7 0 1 2 3 4 5 6 7
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                        Sequence Number                        |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                    Acknowledgment Number                      |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |     Flags     |            Payload ...                        |
//! +-+-+-+-+-+-+-+-+                                               +
//! ```
//!
//! Total header size: [`HEADER_LEN`] = 9 bytes.  There is no length field;
//! the payload runs to the end of the datagram.  There is no checksum either,
//! so a corrupted datagram decodes to whatever bytes arrived.

use thiserror::Error;

/// Byte length of the fixed-size header on the wire.
pub const HEADER_LEN: usize = 9;

// Byte offsets of each field within the serialised header.
const OFF_SEQ: usize = 0;
const OFF_ACK: usize = 4;
const OFF_FLAGS: usize = 8;

const SYN_BIT: u8 = 0b0000_0001;
const ACK_BIT: u8 = 0b0000_0010;

/// Control flags carried in the header's flag byte.
///
/// Only three combinations mean anything to the protocol.  Any other byte is
/// kept verbatim in [`Flags::Other`] so decoding never loses information; the
/// handshake treats it as unexpected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Flags {
    /// Synchronise sequence numbers (handshake initiation).
    Syn,
    /// Acknowledgement; also carried by every data packet.
    Ack,
    /// Responder's reply to a SYN.
    SynAck,
    /// A flag byte outside the known combinations (never `1`, `2` or `3`).
    Other(u8),
}

impl Flags {
    /// Interpret a raw flag byte.
    pub const fn from_byte(byte: u8) -> Self {
        match byte {
            SYN_BIT => Self::Syn,
            ACK_BIT => Self::Ack,
            b if b == SYN_BIT | ACK_BIT => Self::SynAck,
            other => Self::Other(other),
        }
    }

    /// The raw byte written on the wire.
    pub const fn to_byte(self) -> u8 {
        match self {
            Self::Syn => SYN_BIT,
            Self::Ack => ACK_BIT,
            Self::SynAck => SYN_BIT | ACK_BIT,
            Self::Other(b) => b,
        }
    }
}

impl std::fmt::Display for Flags {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Syn => f.write_str("SYN"),
            Self::Ack => f.write_str("ACK"),
            Self::SynAck => f.write_str("SYN-ACK"),
            Self::Other(b) => write!(f, "0x{b:02x}"),
        }
    }
}

/// A complete protocol datagram: header fields + payload bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    /// Sequence number chosen by the sender.
    pub seq: u32,
    /// Next sequence number the sender expects from its peer.
    pub ack: u32,
    /// Control flags.
    pub flags: Flags,
    /// Opaque payload; empty for handshake packets.
    pub payload: Vec<u8>,
}

impl Packet {
    /// Opening SYN.  The initiator knows nothing of its peer yet, so `ack` is 0.
    pub fn syn(seq: u32) -> Self {
        Self {
            seq,
            ack: 0,
            flags: Flags::Syn,
            payload: Vec::new(),
        }
    }

    /// Responder's SYN-ACK.
    pub fn syn_ack(seq: u32, ack: u32) -> Self {
        Self {
            seq,
            ack,
            flags: Flags::SynAck,
            payload: Vec::new(),
        }
    }

    /// Bare ACK closing the handshake.
    pub fn ack(seq: u32, ack: u32) -> Self {
        Self {
            seq,
            ack,
            flags: Flags::Ack,
            payload: Vec::new(),
        }
    }

    /// Data segment.  Data always travels with the ACK flag set.
    pub fn data(seq: u32, ack: u32, payload: Vec<u8>) -> Self {
        Self {
            seq,
            ack,
            flags: Flags::Ack,
            payload,
        }
    }

    /// Serialise this packet into a newly allocated byte vector.
    pub fn encode(&self) -> Vec<u8> {
        encode(self.seq, self.ack, self.flags, &self.payload)
    }

    /// Parse a [`Packet`] from one received datagram.
    ///
    /// Fails only when `buf` is too short to hold a header; everything past
    /// the header is payload, possibly none.
    pub fn decode(buf: &[u8]) -> Result<Self, DecodeError> {
        if buf.len() < HEADER_LEN {
            return Err(DecodeError::Truncated { len: buf.len() });
        }

        let seq = u32::from_be_bytes([
            buf[OFF_SEQ],
            buf[OFF_SEQ + 1],
            buf[OFF_SEQ + 2],
            buf[OFF_SEQ + 3],
        ]);
        let ack = u32::from_be_bytes([
            buf[OFF_ACK],
            buf[OFF_ACK + 1],
            buf[OFF_ACK + 2],
            buf[OFF_ACK + 3],
        ]);
        let flags = Flags::from_byte(buf[OFF_FLAGS]);

        Ok(Packet {
            seq,
            ack,
            flags,
            payload: buf[HEADER_LEN..].to_vec(),
        })
    }
}

/// Serialise header fields and payload as `seq || ack || flags || payload`.
pub fn encode(seq: u32, ack: u32, flags: Flags, payload: &[u8]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(HEADER_LEN + payload.len());
    buf.extend_from_slice(&seq.to_be_bytes());
    buf.extend_from_slice(&ack.to_be_bytes());
    buf.push(flags.to_byte());
    buf.extend_from_slice(payload);
    buf
}

/// Errors that can arise when parsing a raw datagram.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// Datagram shorter than the fixed header.
    #[error("datagram of {len} bytes is too short to contain a {HEADER_LEN}-byte header")]
    Truncated {
        /// Length of the datagram that was rejected.
        len: usize,
    },
}
