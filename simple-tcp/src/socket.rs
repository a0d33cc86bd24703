//! Async UDP socket abstraction.
//!
//! [`Socket`] is a thin wrapper around `tokio::net::UdpSocket` that speaks
//! [`crate::packet::Packet`] instead of raw bytes.  All protocol logic lives
//! elsewhere; this module owns only byte I/O and the single bounded-wait
//! primitive, [`Socket::recv_with_deadline`], shared by the handshake and
//! data-transfer paths.

use std::net::SocketAddr;
use std::time::Duration;

use thiserror::Error;
use tokio::net::UdpSocket;
use tokio::time::timeout;

use crate::config::{DEFAULT_MAX_DATAGRAM, MAX_DATAGRAM};
use crate::packet::{DecodeError, Packet};
use crate::simulator::Simulator;

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Errors that can arise from socket operations.
#[derive(Debug, Error)]
pub enum SocketError {
    /// Underlying I/O error from the OS.
    #[error("socket I/O error: {0}")]
    Io(#[from] std::io::Error),
}

// ---------------------------------------------------------------------------
// Received
// ---------------------------------------------------------------------------

/// Outcome of one bounded wait for a datagram.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Received {
    /// A datagram arrived and decoded.
    Packet(Packet, SocketAddr),
    /// Nothing arrived before the deadline.
    Timeout,
    /// A datagram arrived but was too short to be a packet.
    Malformed(DecodeError, SocketAddr),
}

// ---------------------------------------------------------------------------
// Socket
// ---------------------------------------------------------------------------

/// An async, packet-oriented UDP socket.
#[derive(Debug)]
pub struct Socket {
    /// Address this socket is bound to (filled in after OS assigns ephemeral port).
    pub local_addr: SocketAddr,
    inner: UdpSocket,
    max_datagram: usize,
    simulator: Option<Simulator>,
}

impl Socket {
    /// Bind a new socket to `local_addr`.
    ///
    /// Passing port `0` lets the OS choose an ephemeral port.
    pub async fn bind(local_addr: SocketAddr) -> Result<Self, SocketError> {
        let inner = UdpSocket::bind(local_addr).await?;
        let local_addr = inner.local_addr()?;
        Ok(Self {
            local_addr,
            inner,
            max_datagram: DEFAULT_MAX_DATAGRAM,
            simulator: None,
        })
    }

    /// Set the receive buffer size used by [`Socket::recv_with_deadline`].
    ///
    /// Datagrams longer than this are truncated by the OS.
    pub fn with_max_datagram(mut self, len: usize) -> Self {
        self.max_datagram = len.clamp(1, MAX_DATAGRAM);
        self
    }

    /// Route every outbound datagram through `simulator` first.
    pub fn with_simulator(mut self, simulator: Simulator) -> Self {
        self.simulator = Some(simulator);
        self
    }

    /// Encode `packet` and send it as a single UDP datagram to `dest`.
    pub async fn send_to(&self, packet: &Packet, dest: SocketAddr) -> Result<(), SocketError> {
        let copies = self.simulator.as_ref().map_or(1, Simulator::copies);
        if copies == 0 {
            log::debug!("[socket] simulator dropped {} to {dest}", packet.flags);
            return Ok(());
        }

        let bytes = packet.encode();
        for _ in 0..copies {
            self.inner.send_to(&bytes, dest).await?;
        }
        Ok(())
    }

    /// Wait for the next datagram, for at most `wait` (`None` waits forever).
    ///
    /// A timeout and an undecodable datagram are ordinary outcomes, not
    /// errors; only OS-level failures come back as `Err`.
    pub async fn recv_with_deadline(
        &self,
        wait: Option<Duration>,
    ) -> Result<Received, SocketError> {
        let mut buf = vec![0u8; self.max_datagram];
        let (n, addr) = match wait {
            Some(limit) => match timeout(limit, self.inner.recv_from(&mut buf)).await {
                Ok(res) => res?,
                Err(_elapsed) => return Ok(Received::Timeout),
            },
            None => self.inner.recv_from(&mut buf).await?,
        };

        Ok(match Packet::decode(&buf[..n]) {
            Ok(packet) => Received::Packet(packet, addr),
            Err(e) => Received::Malformed(e, addr),
        })
    }

    /// Send raw bytes without encoding.  Lets tests inject malformed datagrams.
    pub async fn send_raw(&self, bytes: &[u8], dest: SocketAddr) -> Result<(), SocketError> {
        self.inner.send_to(bytes, dest).await?;
        Ok(())
    }
}
