//! Connection finite-state machine (FSM) types.
//!
//! This module defines every state an [`crate::endpoint::Endpoint`] can
//! occupy and the role it plays.  Transitions live in [`crate::endpoint`].
//!
//! ```text
//!            send SYN                 SYN-ACK / send ACK
//!  CLOSED ─────────────▶ SYN_SENT ───────────────────────▶ ESTABLISHED
//!    │                      │                                   ▲
//!    │ SYN / send SYN-ACK   │ timeout, bad flags                │
//!    ▼                      ▼                                   │
//!  SYN_RECEIVED ─────────▶ FAILED                               │
//!    │      timeout, bad flags                                  │
//!    └──────────────────────────────── ACK ─────────────────────┘
//! ```
//!
//! `close()` drops back to `Closed` from anywhere and releases the socket.

/// All possible states of the connection FSM.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    /// No connection exists; initial and final state.
    #[default]
    Closed,
    /// SYN has been sent; waiting for SYN-ACK.
    SynSent,
    /// SYN received; SYN-ACK sent; waiting for ACK.
    SynReceived,
    /// Three-way handshake complete; data transfer allowed.
    Established,
    /// Handshake attempt failed.  Absorbing until `close()`.
    Failed,
}

impl ConnectionState {
    /// `true` while a handshake step is blocked on the network.
    pub fn is_handshaking(self) -> bool {
        matches!(self, Self::SynSent | Self::SynReceived)
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Closed => "CLOSED",
            Self::SynSent => "SYN_SENT",
            Self::SynReceived => "SYN_RECEIVED",
            Self::Established => "ESTABLISHED",
            Self::Failed => "FAILED",
        };
        f.write_str(name)
    }
}

/// Which side of the handshake an endpoint plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Active opener (client); calls `connect`.
    Initiator,
    /// Passive opener (server); calls `accept`.
    Responder,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Initiator => f.write_str("initiator"),
            Self::Responder => f.write_str("responder"),
        }
    }
}
