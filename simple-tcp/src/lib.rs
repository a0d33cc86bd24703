//! `simple-tcp` — a three-way handshake and sequenced datagram transfer over UDP.
//!
//! # Architecture
//!
//! ```text
//!  ┌──────────────┐   SYN / SYN-ACK / ACK    ┌──────────────┐
//!  │  Initiator   │◀────────────────────────▶│  Responder   │
//!  │  (Endpoint)  │   DATA (flags = ACK)      │  (Endpoint)  │
//!  └──────┬───────┘                          └──────┬───────┘
//!         │ owns state machine + socket             │
//!  ┌──────▼──────┐        raw UDP datagrams   ┌──────▼──────┐
//!  │   Socket    │◀──────────────────────────▶│   Socket    │
//!  └─────────────┘                            └─────────────┘
//! ```
//!
//! There is no retransmission, reordering, flow control or checksum: a lost
//! datagram fails the handshake step waiting for it, or is simply gone.
//!
//! Each module has a single responsibility:
//! - [`packet`]    — wire format (serialise / deserialise)
//! - [`state`]     — finite-state-machine and role types
//! - [`endpoint`]  — handshake, data transfer and teardown
//! - [`event`]     — structured journal of endpoint activity
//! - [`config`]    — timeouts and other tunables
//! - [`socket`]    — async UDP socket with a single bounded-wait primitive
//! - [`simulator`] — optional outbound fault injection for testing

pub mod config;
pub mod endpoint;
pub mod event;
pub mod packet;
pub mod simulator;
pub mod socket;
pub mod state;

pub use config::EndpointConfig;
pub use endpoint::{Endpoint, EndpointError, HandshakeFailure};
pub use event::{Discard, Event};
pub use packet::{DecodeError, Flags, Packet};
pub use state::{ConnectionState, Role};
