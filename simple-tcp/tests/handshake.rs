//! Integration tests for the 3-way handshake.
//!
//! Each test binds real `tokio::net::UdpSocket`s on loopback, runs the
//! responder half in a background task, and checks where both sides end up.

use std::net::SocketAddr;
use std::time::Duration;

use simple_tcp::{
    packet::Packet,
    simulator::{Simulator, SimulatorConfig},
    socket::{Received, Socket},
    ConnectionState, Discard, Endpoint, EndpointConfig, EndpointError, Event, Flags,
    HandshakeFailure, Role,
};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn loopback() -> SocketAddr {
    "127.0.0.1:0".parse().unwrap()
}

fn fast_config() -> EndpointConfig {
    EndpointConfig::default()
        .with_handshake_timeout(Duration::from_millis(300))
        .with_accept_timeout(Duration::from_secs(5))
}

async fn bind(role: Role) -> Endpoint {
    Endpoint::bind(loopback(), role, fast_config())
        .await
        .expect("bind endpoint")
}

/// Run a clean handshake and return `(initiator, responder)`.
async fn handshake() -> (Endpoint, Endpoint) {
    let mut server = bind(Role::Responder).await;
    let server_addr = server.local_addr();

    let server_task = tokio::spawn(async move {
        let result = server.accept().await;
        result.map(|()| server)
    });

    let mut client = bind(Role::Initiator).await;
    tokio::time::timeout(Duration::from_secs(5), client.connect(server_addr))
        .await
        .expect("client connect timed out")
        .expect("client connect failed");

    let server = tokio::time::timeout(Duration::from_secs(5), server_task)
        .await
        .expect("server accept timed out")
        .expect("server task panicked")
        .expect("server accept failed");

    (client, server)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

/// Both sides should reach `Established` after a clean handshake on loopback.
#[tokio::test]
async fn handshake_both_sides_reach_established() {
    let (client, server) = handshake().await;

    assert_eq!(client.state(), ConnectionState::Established);
    assert_eq!(server.state(), ConnectionState::Established);
    assert_eq!(server.peer_addr(), Some(client.local_addr()));
    assert_eq!(client.peer_addr(), Some(server.local_addr()));
}

/// Each side's `peer_ack` must equal the other side's `local_seq` once the
/// SYN has consumed one sequence number on each side.
#[tokio::test]
async fn handshake_sequence_numbers_agree() {
    let (client, server) = handshake().await;

    assert_eq!(
        server.peer_ack(),
        client.local_seq(),
        "responder peer_ack should equal initiator local_seq at ACK time"
    );
    assert_eq!(
        client.peer_ack(),
        server.local_seq(),
        "initiator peer_ack should equal responder local_seq"
    );
}

/// The journal records the wire exchange in order.
#[tokio::test]
async fn handshake_journal_records_exchange() {
    let (client, server) = handshake().await;

    let client_flags: Vec<Flags> = client
        .events()
        .iter()
        .filter_map(|e| match e {
            Event::Sent { flags, .. } | Event::Received { flags, .. } => Some(*flags),
            _ => None,
        })
        .collect();
    assert_eq!(client_flags, [Flags::Syn, Flags::SynAck, Flags::Ack]);

    let server_states: Vec<ConnectionState> = server
        .events()
        .iter()
        .filter_map(|e| match e {
            Event::Transition { to, .. } => Some(*to),
            _ => None,
        })
        .collect();
    assert_eq!(
        server_states,
        [ConnectionState::SynReceived, ConnectionState::Established]
    );
}

/// Connecting to an address where nobody answers fails within roughly the
/// configured timeout rather than hanging.
#[tokio::test]
async fn connect_to_silent_peer_times_out() {
    // Bound but never read: the SYN is queued and ignored.
    let silent = Socket::bind(loopback()).await.unwrap();
    let mut client = bind(Role::Initiator).await;

    let started = tokio::time::Instant::now();
    let result = client.connect(silent.local_addr).await;
    let elapsed = started.elapsed();

    assert!(
        matches!(
            result,
            Err(EndpointError::HandshakeFailed(HandshakeFailure::Timeout {
                expected: Flags::SynAck
            }))
        ),
        "expected timeout, got: {result:?}"
    );
    assert_eq!(client.state(), ConnectionState::Failed);
    assert!(elapsed >= Duration::from_millis(300));
    assert!(elapsed < Duration::from_secs(3), "took {elapsed:?}");
}

/// Dropping the responder's SYN-ACK fails both sides: the initiator never
/// hears back, and the responder never receives the final ACK.
#[tokio::test]
async fn dropped_syn_ack_fails_both_sides() {
    let lossy = Socket::bind(loopback())
        .await
        .unwrap()
        .with_simulator(Simulator::new(SimulatorConfig::drop_nth(0)));
    let mut server = Endpoint::from_socket(lossy, Role::Responder, fast_config());
    let server_addr = server.local_addr();

    let server_task = tokio::spawn(async move {
        let result = server.accept().await;
        (server, result)
    });

    let mut client = bind(Role::Initiator).await;
    let client_result = client.connect(server_addr).await;
    assert!(client_result.as_ref().is_err_and(EndpointError::is_timeout));
    assert_eq!(client.state(), ConnectionState::Failed);

    let (server, server_result) = server_task.await.unwrap();
    assert!(matches!(
        server_result,
        Err(EndpointError::HandshakeFailed(HandshakeFailure::Timeout {
            expected: Flags::Ack
        }))
    ));
    assert_eq!(server.state(), ConnectionState::Failed);
}

/// An opening datagram without the SYN flag is fatal to the attempt.
#[tokio::test]
async fn responder_rejects_non_syn_opening() {
    let mut server = bind(Role::Responder).await;
    let server_addr = server.local_addr();

    let rogue = Socket::bind(loopback()).await.unwrap();
    rogue
        .send_to(&Packet::data(1, 0, b"hi".to_vec()), server_addr)
        .await
        .unwrap();

    let err = server.accept().await.unwrap_err();
    assert!(matches!(
        err,
        EndpointError::HandshakeFailed(HandshakeFailure::UnexpectedFlags {
            expected: Flags::Syn,
            got: Flags::Ack
        })
    ));
    assert!(!err.is_timeout());
    assert_eq!(server.state(), ConnectionState::Failed);
}

/// A truncated opening datagram is reported as malformed.
#[tokio::test]
async fn responder_rejects_truncated_opening() {
    let mut server = bind(Role::Responder).await;
    let rogue = Socket::bind(loopback()).await.unwrap();
    rogue.send_raw(&[0, 0, 0], server.local_addr()).await.unwrap();

    let err = server.accept().await.unwrap_err();
    assert!(matches!(
        err,
        EndpointError::HandshakeFailed(HandshakeFailure::Malformed(_))
    ));
    assert_eq!(server.state(), ConnectionState::Failed);
}

/// The initiator fails when the reply carries the wrong flags.
#[tokio::test]
async fn initiator_rejects_plain_ack_reply() {
    let fake_server = Socket::bind(loopback()).await.unwrap();
    let fake_addr = fake_server.local_addr;

    let responder = tokio::spawn(async move {
        if let Ok(Received::Packet(syn, from)) = fake_server
            .recv_with_deadline(Some(Duration::from_secs(5)))
            .await
        {
            // Answer a SYN with a bare ACK instead of SYN-ACK.
            let reply = Packet::ack(500, syn.seq + 1);
            fake_server.send_to(&reply, from).await.unwrap();
        }
    });

    let mut client = bind(Role::Initiator).await;
    let err = client.connect(fake_addr).await.unwrap_err();
    responder.await.unwrap();

    assert!(matches!(
        err,
        EndpointError::HandshakeFailed(HandshakeFailure::UnexpectedFlags {
            expected: Flags::SynAck,
            got: Flags::Ack
        })
    ));
    assert_eq!(client.state(), ConnectionState::Failed);
}

/// The SYN carries the initiator's ISN and ack = 0.
#[tokio::test]
async fn syn_carries_isn_and_zero_ack() {
    let observer = Socket::bind(loopback()).await.unwrap();
    let mut client = Endpoint::bind(
        loopback(),
        Role::Initiator,
        fast_config().with_isn_range(4242..4242),
    )
    .await
    .unwrap();

    let observed = observer.local_addr;
    let connect = tokio::spawn(async move {
        let _ = client.connect(observed).await;
    });

    match observer
        .recv_with_deadline(Some(Duration::from_secs(5)))
        .await
        .unwrap()
    {
        Received::Packet(pkt, _) => {
            assert_eq!(pkt.flags, Flags::Syn);
            assert_eq!(pkt.seq, 4242);
            assert_eq!(pkt.ack, 0);
            assert!(pkt.payload.is_empty());
        }
        other => panic!("expected SYN, got {other:?}"),
    }
    connect.await.unwrap();
}

/// Once the SYN fixes the peer, an ACK from any other address does not
/// complete the responder's handshake.
#[tokio::test]
async fn responder_ignores_stranger_ack() {
    let mut server = bind(Role::Responder).await;
    let server_addr = server.local_addr();

    let initiator = Socket::bind(loopback()).await.unwrap();
    let stranger = Socket::bind(loopback()).await.unwrap();
    initiator.send_to(&Packet::syn(100), server_addr).await.unwrap();
    stranger.send_to(&Packet::ack(7, 7), server_addr).await.unwrap();

    let server_task = tokio::spawn(async move {
        let result = server.accept().await;
        (server, result)
    });

    // Complete the handshake from the address that sent the SYN.
    match initiator
        .recv_with_deadline(Some(Duration::from_secs(5)))
        .await
        .unwrap()
    {
        Received::Packet(syn_ack, _) => {
            assert_eq!(syn_ack.flags, Flags::SynAck);
            assert_eq!(syn_ack.ack, 101);
            initiator
                .send_to(&Packet::ack(101, syn_ack.seq + 1), server_addr)
                .await
                .unwrap();
        }
        other => panic!("expected SYN-ACK, got {other:?}"),
    }

    let (server, result) = server_task.await.unwrap();
    result.expect("accept");
    assert_eq!(server.state(), ConnectionState::Established);
    assert_eq!(server.peer_addr(), Some(initiator.local_addr));
    assert!(server.events().iter().any(|e| matches!(
        e,
        Event::Discarded { from, reason: Discard::ForeignPeer } if *from == stranger.local_addr
    )));
}

/// A stranger's ACK alone never establishes the responder; it times out.
#[tokio::test]
async fn stranger_ack_alone_times_out() {
    let mut server = bind(Role::Responder).await;
    let server_addr = server.local_addr();

    let initiator = Socket::bind(loopback()).await.unwrap();
    let stranger = Socket::bind(loopback()).await.unwrap();
    initiator.send_to(&Packet::syn(100), server_addr).await.unwrap();
    stranger.send_to(&Packet::ack(7, 7), server_addr).await.unwrap();

    let err = server.accept().await.unwrap_err();
    assert!(err.is_timeout(), "got {err:?}");
    assert_eq!(server.state(), ConnectionState::Failed);
}
