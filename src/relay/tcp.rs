//! TCP relay server
//!
//! Accepts stream connections, captures the first bytes under a read
//! deadline, classifies them against the configured descriptor chain,
//! dials the matched backend, replays the captured handshake, then pipes
//! bytes both ways until either side closes. Every failure is terminal
//! for that one connection; the listener itself never retries or stops.

use crate::net::SocketOpts;
use crate::protocol::{identify, Protocol};
use crate::relay::{IDENTIFY_BUFFER_SIZE, IDENTIFY_TIMEOUT, RELAY_BUFFER_SIZE};
use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

/// The TCP side of the multiplexer.
pub struct TcpRelayServer {
    /// Descriptor chain in matching priority order
    protocols: Arc<Vec<Arc<Protocol>>>,
    /// Socket options applied to both relay legs
    socket_opts: SocketOpts,
}

impl TcpRelayServer {
    /// Create a server for the given descriptor chain. Chain order is
    /// matching priority order.
    pub fn new(protocols: Vec<Arc<Protocol>>) -> Self {
        TcpRelayServer {
            protocols: Arc::new(protocols),
            socket_opts: SocketOpts::default(),
        }
    }

    /// Set the socket options applied to accepted and dialed connections.
    pub fn with_socket_opts(mut self, opts: SocketOpts) -> Self {
        self.socket_opts = opts;
        self
    }

    /// Bind `addr` and serve until shutdown. A bind failure is fatal and
    /// propagates to the caller.
    pub async fn run(&self, addr: SocketAddr, shutdown: broadcast::Receiver<bool>) -> Result<()> {
        let listener = TcpListener::bind(addr)
            .await
            .with_context(|| format!("Failed to bind TCP listener on {}", addr))?;
        self.serve(listener, shutdown).await
    }

    /// Serve an already-bound listener until shutdown.
    pub async fn serve(
        &self,
        listener: TcpListener,
        mut shutdown: broadcast::Receiver<bool>,
    ) -> Result<()> {
        self.log_chain();
        info!(bind = %listener.local_addr()?, "TCP listener started");

        loop {
            tokio::select! {
                _ = shutdown.recv() => {
                    info!("TCP listener shutting down");
                    return Ok(());
                }
                accepted = listener.accept() => {
                    match accepted {
                        Ok((stream, peer)) => {
                            let protocols = self.protocols.clone();
                            let opts = self.socket_opts.clone();
                            tokio::spawn(async move {
                                handle_connection(stream, peer, protocols, opts).await;
                            });
                        }
                        Err(e) => debug!("Accept error: {}", e),
                    }
                }
            }
        }
    }

    fn log_chain(&self) {
        if self.protocols.is_empty() {
            warn!("No TCP protocols configured");
            return;
        }
        info!("TCP protocol chain:");
        for protocol in self.protocols.iter() {
            info!("- {} @ {}", protocol.name(), protocol.target());
        }
    }
}

/// Drive one accepted connection through identify, dial, replay and relay.
async fn handle_connection(
    mut client: TcpStream,
    peer: SocketAddr,
    protocols: Arc<Vec<Arc<Protocol>>>,
    opts: SocketOpts,
) {
    if let Err(e) = opts.apply(&client) {
        debug!(%peer, "Failed to apply socket options: {}", e);
    }

    // Capture the handshake under a deadline. A slow or silent client is
    // dropped without ever contacting a backend.
    let mut identify_buf = vec![0u8; IDENTIFY_BUFFER_SIZE];
    let captured = match tokio::time::timeout(IDENTIFY_TIMEOUT, client.read(&mut identify_buf)).await
    {
        Ok(Ok(0)) => {
            debug!(%peer, "Connection closed before identification");
            return;
        }
        Ok(Ok(n)) => n,
        Ok(Err(e)) => {
            debug!(%peer, "Identify read error: {}", e);
            return;
        }
        Err(_) => {
            debug!(%peer, "Identify timeout, closing connection");
            return;
        }
    };

    let Some(protocol) = identify(&identify_buf[..captured], &protocols) else {
        debug!(%peer, "Protocol unrecognized, closing connection");
        return;
    };
    debug!(%peer, protocol = protocol.name(), target = protocol.target(), "Protocol recognized");

    let mut backend = match TcpStream::connect(protocol.target()).await {
        Ok(stream) => stream,
        Err(e) => {
            debug!(%peer, target = protocol.target(), "Backend dial failed: {}", e);
            return;
        }
    };
    if let Err(e) = opts.apply(&backend) {
        debug!(%peer, "Failed to apply socket options to backend: {}", e);
    }

    // Replay the captured handshake before any relayed bytes, so the
    // backend sees exactly what the client sent.
    if let Err(e) = backend.write_all(&identify_buf[..captured]).await {
        debug!(%peer, "Handshake replay failed: {}", e);
        return;
    }

    relay(client, backend, peer).await;
}

/// Pipe both directions until either one finishes, then drop both
/// sockets. The `select!` race is the first-of-two completion signal:
/// whichever copy loop ends first wins, the other future is dropped, and
/// returning closes both streams exactly once on every exit path.
async fn relay(client: TcpStream, backend: TcpStream, peer: SocketAddr) {
    let (client_read, client_write) = client.into_split();
    let (backend_read, backend_write) = backend.into_split();

    tokio::select! {
        result = pipe(client_read, backend_write) => match result {
            Ok(bytes) => debug!(%peer, bytes, "client->backend finished"),
            Err(e) => debug!(%peer, "client->backend error: {}", e),
        },
        result = pipe(backend_read, client_write) => match result {
            Ok(bytes) => debug!(%peer, bytes, "backend->client finished"),
            Err(e) => debug!(%peer, "backend->client error: {}", e),
        },
    }

    debug!(%peer, "Connection closed");
}

/// Copy bytes one way with a fixed-size buffer until EOF or error.
async fn pipe<R, W>(mut from: R, mut to: W) -> std::io::Result<u64>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut buf = [0u8; RELAY_BUFFER_SIZE];
    let mut total = 0u64;

    loop {
        let n = from.read(&mut buf).await?;
        if n == 0 {
            return Ok(total);
        }
        to.write_all(&buf[..n]).await?;
        total += n as u64;
    }
}
