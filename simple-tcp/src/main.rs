//! Entry point for `simple-tcp`.
//!
//! Parses CLI arguments and runs a responder, an initiator, or both at once
//! in the same process.  All protocol work is delegated to the library;
//! `main.rs` owns only process setup (logging, argument parsing) and the
//! scripted conversation.

use std::net::SocketAddr;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use env_logger::Env;
use simple_tcp::{Endpoint, EndpointConfig, Role};

/// TCP-like three-way handshake and data transfer over UDP.
#[derive(Parser)]
#[command(author, version, about)]
struct Cli {
    #[command(flatten)]
    tuning: Tuning,

    #[command(subcommand)]
    mode: Mode,
}

#[derive(Args, Clone)]
struct Tuning {
    /// Handshake wait in milliseconds.
    #[arg(long, global = true, default_value_t = 2000)]
    handshake_timeout_ms: u64,

    /// Receive wait per message in milliseconds.
    #[arg(long, global = true, default_value_t = 3000)]
    recv_timeout_ms: u64,
}

impl Tuning {
    fn config(&self) -> EndpointConfig {
        EndpointConfig::default()
            .with_handshake_timeout(Duration::from_millis(self.handshake_timeout_ms))
    }

    fn recv_timeout(&self) -> Duration {
        Duration::from_millis(self.recv_timeout_ms)
    }
}

#[derive(Subcommand)]
enum Mode {
    /// Accept one connection, print what arrives, then send a reply.
    Responder {
        /// Local address to bind.
        #[arg(short, long, default_value = "127.0.0.1:5000")]
        bind: SocketAddr,
        /// Stop after this many messages.
        #[arg(short = 'n', long, default_value_t = 5)]
        max_messages: usize,
        /// Reply sent once the initiator falls silent.
        #[arg(short, long, default_value = "Hello from server!")]
        reply: String,
    },
    /// Connect to a responder, send numbered messages, await the reply.
    Initiator {
        /// Local address to bind.
        #[arg(short, long, default_value = "127.0.0.1:5001")]
        bind: SocketAddr,
        /// Responder address.
        #[arg(short, long, default_value = "127.0.0.1:5000")]
        peer: SocketAddr,
        /// Number of messages to send.
        #[arg(short = 'n', long, default_value_t = 5)]
        count: usize,
        /// Pause between messages in milliseconds.
        #[arg(short, long, default_value_t = 300)]
        interval_ms: u64,
    },
    /// Run a responder on 127.0.0.1:5000 and an initiator on 127.0.0.1:5001.
    Demo,
}

#[tokio::main]
async fn main() -> Result<()> {
    // RUST_LOG overrides the default `info` level.
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let tuning = cli.tuning;

    match cli.mode {
        Mode::Responder {
            bind,
            max_messages,
            reply,
        } => run_responder(bind, max_messages, &reply, &tuning).await,
        Mode::Initiator {
            bind,
            peer,
            count,
            interval_ms,
        } => {
            run_initiator(bind, peer, count, Duration::from_millis(interval_ms), &tuning).await
        }
        Mode::Demo => run_demo(tuning).await,
    }
}

async fn run_responder(
    bind: SocketAddr,
    max_messages: usize,
    reply: &str,
    tuning: &Tuning,
) -> Result<()> {
    let mut server = Endpoint::bind(bind, Role::Responder, tuning.config())
        .await
        .with_context(|| format!("binding responder on {bind}"))?;
    log::info!("[responder] waiting for connection on {bind}");

    if let Err(e) = server.accept().await {
        log::error!("[responder] {e}");
        server.close();
        return Ok(());
    }

    for _ in 0..max_messages {
        match server.receive_string(tuning.recv_timeout()).await? {
            Some(msg) => {
                log::info!("[responder] received: {msg:?}");
                tokio::time::sleep(Duration::from_millis(100)).await;
            }
            None => break,
        }
    }

    tokio::time::sleep(Duration::from_millis(500)).await;
    server.send_str(reply).await?;
    log::info!("[responder] sent: {reply:?}");

    tokio::time::sleep(Duration::from_secs(1)).await;
    server.close();
    Ok(())
}

async fn run_initiator(
    bind: SocketAddr,
    peer: SocketAddr,
    count: usize,
    interval: Duration,
    tuning: &Tuning,
) -> Result<()> {
    let mut client = Endpoint::bind(bind, Role::Initiator, tuning.config())
        .await
        .with_context(|| format!("binding initiator on {bind}"))?;
    log::info!("[initiator] connecting to {peer}");

    if let Err(e) = client.connect(peer).await {
        log::error!("[initiator] {e}");
        client.close();
        return Ok(());
    }

    for i in 1..=count {
        let msg = format!("Message {i} from client");
        client.send_str(&msg).await?;
        log::info!("[initiator] sent: {msg:?}");
        tokio::time::sleep(interval).await;
    }

    tokio::time::sleep(Duration::from_millis(500)).await;
    match client.receive_string(tuning.recv_timeout()).await? {
        Some(reply) => log::info!("[initiator] received: {reply:?}"),
        None => log::warn!("[initiator] no reply"),
    }

    client.close();
    Ok(())
}

async fn run_demo(tuning: Tuning) -> Result<()> {
    let responder_addr: SocketAddr = "127.0.0.1:5000".parse()?;
    let initiator_addr: SocketAddr = "127.0.0.1:5001".parse()?;

    let server_tuning = tuning.clone();
    let server = tokio::spawn(async move {
        run_responder(responder_addr, 5, "Hello from server!", &server_tuning).await
    });

    // Give the responder time to bind before the SYN goes out.
    tokio::time::sleep(Duration::from_millis(500)).await;
    run_initiator(
        initiator_addr,
        responder_addr,
        5,
        Duration::from_millis(300),
        &tuning,
    )
    .await?;

    server.await.context("responder task panicked")??;
    log::info!("demo complete");
    Ok(())
}
