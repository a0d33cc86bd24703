//! Per-connection protocol engine.
//!
//! An [`Endpoint`] owns the complete state for one peer-to-peer session:
//! the socket, the local sequence counter, the last sequence number learned
//! from the peer, the peer's address and the FSM state.  It drives the
//! three-way handshake, moves single packets in either direction once
//! established, and releases the socket on [`Endpoint::close`].
//!
//! ```ignore
//! // responder
//! let mut server = Endpoint::responder("127.0.0.1:5000".parse()?).await?;
//! server.accept().await?;
//! let msg = server.receive(Duration::from_secs(3)).await?;
//!
//! // initiator
//! let mut client = Endpoint::initiator("127.0.0.1:5001".parse()?).await?;
//! client.connect("127.0.0.1:5000".parse()?).await?;
//! client.send(b"hello").await?;
//! ```
//!
//! Every operation performs at most one bounded wait.  Nothing is retried:
//! a lost datagram during the handshake fails the attempt, and a lost data
//! packet is simply gone.

use std::net::SocketAddr;
use std::ops::Range;
use std::time::Duration;

use rand::Rng;
use thiserror::Error;
use tokio::time::Instant;

use crate::config::{EndpointConfig, MAX_DATAGRAM};
use crate::event::{Discard, Event};
use crate::packet::{DecodeError, Flags, Packet, HEADER_LEN};
use crate::socket::{Received, Socket, SocketError};
use crate::state::{ConnectionState, Role};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Why a handshake attempt ended in [`ConnectionState::Failed`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HandshakeFailure {
    /// The peer did not answer within the configured wait.
    #[error("timed out waiting for {expected}")]
    Timeout {
        /// Flags of the packet we were waiting for.
        expected: Flags,
    },
    /// The peer answered with the wrong control flags.
    #[error("expected {expected}, got {got}")]
    UnexpectedFlags {
        /// Flags the current step requires.
        expected: Flags,
        /// Flags that actually arrived.
        got: Flags,
    },
    /// The peer's datagram could not be decoded.
    #[error("malformed handshake datagram: {0}")]
    Malformed(DecodeError),
}

/// Errors surfaced by [`Endpoint`] operations.
#[derive(Debug, Error)]
pub enum EndpointError {
    /// Data transfer attempted outside `Established`.
    #[error("endpoint is not connected (state {0})")]
    NotConnected(ConnectionState),
    /// The handshake attempt failed; the endpoint is now `Failed`.
    #[error("handshake failed: {0}")]
    HandshakeFailed(HandshakeFailure),
    /// A handshake was started from a state other than `Closed`.
    #[error("cannot {operation} from state {state}")]
    InvalidState {
        /// State at the time of the call.
        state: ConnectionState,
        /// The rejected operation.
        operation: &'static str,
    },
    /// `accept` on an initiator, or `connect` on a responder.
    #[error("{operation} is not available to the {role}")]
    WrongRole {
        /// This endpoint's role.
        role: Role,
        /// The rejected operation.
        operation: &'static str,
    },
    /// The message cannot fit in a single datagram.
    #[error("message of {len} bytes exceeds the {max}-byte payload limit")]
    MessageTooLarge {
        /// Length of the rejected message.
        len: usize,
        /// Largest payload allowed.
        max: usize,
    },
    /// The endpoint was closed and its socket released.
    #[error("endpoint socket has been released")]
    Released,
    /// Underlying socket failure.
    #[error(transparent)]
    Socket(#[from] SocketError),
}

impl EndpointError {
    /// `true` if this is a handshake that timed out, as opposed to one the
    /// peer answered incorrectly.
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            Self::HandshakeFailed(HandshakeFailure::Timeout { .. })
        )
    }
}

// ---------------------------------------------------------------------------
// Endpoint
// ---------------------------------------------------------------------------

/// One side of a connection.
#[derive(Debug)]
pub struct Endpoint {
    role: Role,
    state: ConnectionState,
    /// Next sequence number this side will send.
    local_seq: u32,
    /// Last sequence number learned from the peer; echoed in `ack`.
    peer_ack: u32,
    peer: Option<SocketAddr>,
    local_addr: SocketAddr,
    /// `None` once closed.
    socket: Option<Socket>,
    config: EndpointConfig,
    events: Vec<Event>,
}

impl Endpoint {
    // -----------------------------------------------------------------------
    // Constructors
    // -----------------------------------------------------------------------

    /// Bind a new endpoint to `local_addr`.
    pub async fn bind(
        local_addr: SocketAddr,
        role: Role,
        config: EndpointConfig,
    ) -> Result<Self, EndpointError> {
        let socket = Socket::bind(local_addr)
            .await?
            .with_max_datagram(config.max_datagram);
        Ok(Self::from_socket(socket, role, config))
    }

    /// Bind an initiator with the default configuration.
    pub async fn initiator(local_addr: SocketAddr) -> Result<Self, EndpointError> {
        Self::bind(local_addr, Role::Initiator, EndpointConfig::default()).await
    }

    /// Bind a responder with the default configuration.
    pub async fn responder(local_addr: SocketAddr) -> Result<Self, EndpointError> {
        Self::bind(local_addr, Role::Responder, EndpointConfig::default()).await
    }

    /// Wrap an already bound socket (e.g. one carrying a simulator).
    pub fn from_socket(socket: Socket, role: Role, config: EndpointConfig) -> Self {
        let local_seq = initial_sequence(&config.isn_range);
        Self {
            role,
            state: ConnectionState::Closed,
            local_seq,
            peer_ack: 0,
            peer: None,
            local_addr: socket.local_addr,
            socket: Some(socket),
            config,
            events: Vec::new(),
        }
    }

    // -----------------------------------------------------------------------
    // Handshake
    // -----------------------------------------------------------------------

    /// Passive open: wait for a SYN, answer SYN-ACK, wait for the final ACK.
    ///
    /// The SYN may come from anyone and fixes the peer; the final ACK must
    /// come from that same address.
    pub async fn accept(&mut self) -> Result<(), EndpointError> {
        self.begin_handshake(Role::Responder, "accept")?;
        let result = self.accept_steps().await;
        self.settle_handshake(result)
    }

    async fn accept_steps(&mut self) -> Result<(), EndpointError> {
        let (syn, from) = self.expect(self.config.accept_timeout, Flags::Syn).await?;
        self.peer = Some(from);
        self.peer_ack = syn.seq.wrapping_add(1);
        log::debug!("[{}] ← SYN seq={} from {from}", self.role, syn.seq);
        self.transition(ConnectionState::SynReceived);

        let syn_ack = Packet::syn_ack(self.local_seq, self.peer_ack);
        self.send_packet(&syn_ack, from).await?;
        log::debug!(
            "[{}] → SYN-ACK seq={} ack={}",
            self.role,
            syn_ack.seq,
            syn_ack.ack
        );

        let wait = Some(self.config.handshake_timeout);
        let (ack, _) = self.expect(wait, Flags::Ack).await?;
        log::debug!("[{}] ← ACK seq={} ack={}", self.role, ack.seq, ack.ack);
        self.local_seq = self.local_seq.wrapping_add(1);
        self.transition(ConnectionState::Established);
        log::info!("[{}] connection established with {from}", self.role);
        Ok(())
    }

    /// Active open towards `target`: send SYN, wait for SYN-ACK, send ACK.
    ///
    /// The initiator considers itself established as soon as its ACK is on
    /// the wire; it never learns whether that ACK arrived.  A SYN-ACK from
    /// any address other than `target` is ignored.
    pub async fn connect(&mut self, target: SocketAddr) -> Result<(), EndpointError> {
        self.begin_handshake(Role::Initiator, "connect")?;
        let result = self.connect_steps(target).await;
        self.settle_handshake(result)
    }

    async fn connect_steps(&mut self, target: SocketAddr) -> Result<(), EndpointError> {
        let syn = Packet::syn(self.local_seq);
        self.send_packet(&syn, target).await?;
        self.peer = Some(target);
        log::debug!("[{}] → SYN seq={} to {target}", self.role, syn.seq);
        self.transition(ConnectionState::SynSent);

        let wait = Some(self.config.handshake_timeout);
        let (syn_ack, _) = self.expect(wait, Flags::SynAck).await?;
        log::debug!(
            "[{}] ← SYN-ACK seq={} ack={}",
            self.role,
            syn_ack.seq,
            syn_ack.ack
        );
        self.peer_ack = syn_ack.seq.wrapping_add(1);
        self.local_seq = self.local_seq.wrapping_add(1);

        let ack = Packet::ack(self.local_seq, self.peer_ack);
        self.send_packet(&ack, target).await?;
        log::debug!("[{}] → ACK seq={} ack={}", self.role, ack.seq, ack.ack);
        self.transition(ConnectionState::Established);
        log::info!("[{}] connection established with {target}", self.role);
        Ok(())
    }

    fn begin_handshake(&self, role: Role, operation: &'static str) -> Result<(), EndpointError> {
        if self.socket.is_none() {
            return Err(EndpointError::Released);
        }
        if self.role != role {
            return Err(EndpointError::WrongRole {
                role: self.role,
                operation,
            });
        }
        if self.state != ConnectionState::Closed {
            return Err(EndpointError::InvalidState {
                state: self.state,
                operation,
            });
        }
        Ok(())
    }

    /// Make sure an error that escapes a handshake wait leaves us in `Failed`.
    fn settle_handshake(
        &mut self,
        result: Result<(), EndpointError>,
    ) -> Result<(), EndpointError> {
        if let Err(e) = &result {
            if self.state.is_handshaking() {
                log::warn!("[{}] handshake aborted: {e}", self.role);
                self.transition(ConnectionState::Failed);
            }
        }
        result
    }

    /// Receive one datagram and require it to carry `expected` flags.
    ///
    /// Once the peer is known, datagrams from any other address are dropped
    /// and the wait continues until `wait` runs out overall.
    async fn expect(
        &mut self,
        wait: Option<Duration>,
        expected: Flags,
    ) -> Result<(Packet, SocketAddr), EndpointError> {
        let deadline = wait.map(|w| Instant::now() + w);
        loop {
            let remaining = deadline.map(|d| d.saturating_duration_since(Instant::now()));
            let received = self.socket()?.recv_with_deadline(remaining).await?;
            match received {
                Received::Packet(packet, from) if self.peer.is_some_and(|p| p != from) => {
                    log::warn!(
                        "[{}] ignoring {} from stranger {from} during handshake",
                        self.role,
                        packet.flags
                    );
                    self.discard(from, Discard::ForeignPeer);
                }
                Received::Packet(packet, from) => {
                    self.events.push(Event::received(&packet, from));
                    if packet.flags == expected {
                        return Ok((packet, from));
                    }
                    return Err(self.fail(HandshakeFailure::UnexpectedFlags {
                        expected,
                        got: packet.flags,
                    }));
                }
                Received::Timeout => {
                    return Err(self.fail(HandshakeFailure::Timeout { expected }));
                }
                Received::Malformed(e, from) => {
                    self.discard(from, Discard::Malformed(e));
                    return Err(self.fail(HandshakeFailure::Malformed(e)));
                }
            }
        }
    }

    fn fail(&mut self, reason: HandshakeFailure) -> EndpointError {
        log::warn!("[{}] handshake failed in {}: {reason}", self.role, self.state);
        self.transition(ConnectionState::Failed);
        EndpointError::HandshakeFailed(reason)
    }

    // -----------------------------------------------------------------------
    // Data transfer
    // -----------------------------------------------------------------------

    /// Send `message` as one data packet, then advance `local_seq` by its length.
    ///
    /// Messages that would not fit the configured datagram size are rejected
    /// up front: the peer's socket would silently truncate them.
    pub async fn send(&mut self, message: &[u8]) -> Result<(), EndpointError> {
        let peer = self.established_peer()?;
        let max = self.max_payload();
        if message.len() > max {
            return Err(EndpointError::MessageTooLarge {
                len: message.len(),
                max,
            });
        }
        let packet = Packet::data(self.local_seq, self.peer_ack, message.to_vec());
        self.send_packet(&packet, peer).await?;
        log::debug!(
            "[{}] → DATA seq={} len={}",
            self.role,
            packet.seq,
            message.len()
        );
        // Cannot truncate: max_payload() is below MAX_DATAGRAM.
        self.local_seq = self.local_seq.wrapping_add(message.len() as u32);
        Ok(())
    }

    /// Send UTF-8 text.
    pub async fn send_str(&mut self, message: &str) -> Result<(), EndpointError> {
        self.send(message.as_bytes()).await
    }

    /// Wait up to `wait` for one data packet from the peer.
    ///
    /// `Ok(None)` means nothing usable arrived: the wait expired, or the
    /// datagram was malformed, came from a stranger, or had no payload.
    /// Callers poll in a loop.  Duplicates and reordering are not detected;
    /// the latest packet always overwrites `peer_ack`.
    pub async fn receive(&mut self, wait: Duration) -> Result<Option<Vec<u8>>, EndpointError> {
        let peer = self.established_peer()?;
        let received = self.socket()?.recv_with_deadline(Some(wait)).await?;

        let (packet, from) = match received {
            Received::Packet(packet, from) => (packet, from),
            Received::Timeout => return Ok(None),
            Received::Malformed(e, from) => {
                log::warn!("[{}] dropping malformed datagram from {from}: {e}", self.role);
                self.discard(from, Discard::Malformed(e));
                return Ok(None);
            }
        };

        if from != peer {
            log::warn!("[{}] ignoring {} from stranger {from}", self.role, packet.flags);
            self.discard(from, Discard::ForeignPeer);
            return Ok(None);
        }
        if packet.payload.is_empty() {
            log::debug!("[{}] ← {} without payload; ignored", self.role, packet.flags);
            self.discard(from, Discard::Empty);
            return Ok(None);
        }

        self.events.push(Event::received(&packet, from));
        // Cannot truncate: the receive buffer is at most MAX_DATAGRAM.
        self.peer_ack = packet.seq.wrapping_add(packet.payload.len() as u32);
        log::debug!(
            "[{}] ← DATA seq={} len={}",
            self.role,
            packet.seq,
            packet.payload.len()
        );
        Ok(Some(packet.payload))
    }

    /// [`Endpoint::receive`], decoding the payload as (lossy) UTF-8.
    pub async fn receive_string(&mut self, wait: Duration) -> Result<Option<String>, EndpointError> {
        Ok(self
            .receive(wait)
            .await?
            .map(|bytes| String::from_utf8_lossy(&bytes).into_owned()))
    }

    fn established_peer(&self) -> Result<SocketAddr, EndpointError> {
        match (self.state, self.peer, &self.socket) {
            (ConnectionState::Established, Some(peer), Some(_)) => Ok(peer),
            (state, _, _) => Err(EndpointError::NotConnected(state)),
        }
    }

    // -----------------------------------------------------------------------
    // Teardown
    // -----------------------------------------------------------------------

    /// Release the socket and return to `Closed`.
    ///
    /// Works from any state and is idempotent.  Nothing is sent to the peer.
    pub fn close(&mut self) {
        if self.socket.take().is_none() {
            return;
        }
        if self.state != ConnectionState::Closed {
            self.transition(ConnectionState::Closed);
        }
        self.events.push(Event::Closed);
        log::info!("[{}] closed {}", self.role, self.local_addr);
    }

    // -----------------------------------------------------------------------
    // Accessors
    // -----------------------------------------------------------------------

    /// Current FSM state.
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Which side of the handshake this endpoint plays.
    pub fn role(&self) -> Role {
        self.role
    }

    /// Next sequence number this endpoint will send.
    pub fn local_seq(&self) -> u32 {
        self.local_seq
    }

    /// Sequence number most recently learned from the peer.
    pub fn peer_ack(&self) -> u32 {
        self.peer_ack
    }

    /// Peer address, once known.
    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.peer
    }

    /// Address the socket is (or was) bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// `true` while data may be exchanged.
    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Established
    }

    /// Journal of everything this endpoint has done so far.
    pub fn events(&self) -> &[Event] {
        &self.events
    }

    /// Drain the journal.
    pub fn take_events(&mut self) -> Vec<Event> {
        std::mem::take(&mut self.events)
    }

    // -----------------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------------

    /// Largest payload one datagram can carry under this configuration.
    pub fn max_payload(&self) -> usize {
        self.config
            .max_datagram
            .min(MAX_DATAGRAM)
            .saturating_sub(HEADER_LEN)
    }

    fn socket(&self) -> Result<&Socket, EndpointError> {
        self.socket.as_ref().ok_or(EndpointError::Released)
    }

    async fn send_packet(&mut self, packet: &Packet, to: SocketAddr) -> Result<(), EndpointError> {
        self.socket()?.send_to(packet, to).await?;
        self.events.push(Event::sent(packet, to));
        Ok(())
    }

    fn transition(&mut self, to: ConnectionState) {
        let from = self.state;
        log::debug!("[{}] {from} → {to}", self.role);
        self.state = to;
        self.events.push(Event::Transition { from, to });
    }

    fn discard(&mut self, from: SocketAddr, reason: Discard) {
        self.events.push(Event::Discarded { from, reason });
    }
}

/// Draw an initial sequence number from `range` (or its start if empty).
fn initial_sequence(range: &Range<u32>) -> u32 {
    if range.is_empty() {
        range.start
    } else {
        rand::rng().random_range(range.clone())
    }
}
