//! UDP relay server
//!
//! UDP has no connection concept, so the server synthesizes one per peer
//! address. The first datagram from an unknown peer is classified against
//! the descriptor chain; a match opens a dedicated backend socket, stores
//! a session and starts a backend-reader task for the reply direction.
//! Subsequent datagrams from that peer reuse the session without
//! re-classification until the TTL sweep evicts it.
//!
//! Replies must appear to originate from the server's one public address,
//! so every session's reader writes back through the shared listening
//! socket while reading from its own private backend socket.

use crate::protocol::{identify, Protocol};
use crate::relay::session::{Session, SessionEntry, SessionTable};
use crate::relay::MAX_DATAGRAM_SIZE;
use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::UdpSocket;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// The UDP side of the multiplexer.
pub struct UdpRelayServer {
    /// Descriptor chain in matching priority order
    protocols: Arc<Vec<Arc<Protocol>>>,
    /// Session store shared with the TTL sweep
    sessions: Arc<SessionTable>,
}

impl UdpRelayServer {
    /// Create a server for the given descriptor chain and session table.
    /// The caller owns the table's sweep lifecycle (see
    /// [`SessionTable::spawn_sweep`]).
    pub fn new(protocols: Vec<Arc<Protocol>>, sessions: Arc<SessionTable>) -> Self {
        UdpRelayServer {
            protocols: Arc::new(protocols),
            sessions,
        }
    }

    /// The session table backing this server.
    pub fn sessions(&self) -> &Arc<SessionTable> {
        &self.sessions
    }

    /// Bind `addr` and serve until shutdown. A bind failure is fatal and
    /// propagates to the caller.
    pub async fn run(&self, addr: SocketAddr, shutdown: broadcast::Receiver<bool>) -> Result<()> {
        let socket = UdpSocket::bind(addr)
            .await
            .with_context(|| format!("Failed to bind UDP listener on {}", addr))?;
        self.serve(socket, shutdown).await
    }

    /// Serve an already-bound listening socket until shutdown.
    pub async fn serve(
        &self,
        listener: UdpSocket,
        mut shutdown: broadcast::Receiver<bool>,
    ) -> Result<()> {
        self.log_chain();
        info!(bind = %listener.local_addr()?, "UDP listener started");

        let listener = Arc::new(listener);
        let mut buf = vec![0u8; MAX_DATAGRAM_SIZE];

        loop {
            tokio::select! {
                _ = shutdown.recv() => {
                    info!("UDP listener shutting down");
                    return Ok(());
                }
                received = listener.recv_from(&mut buf) => {
                    match received {
                        Ok((len, peer)) => {
                            self.handle_datagram(&listener, &buf[..len], peer).await;
                        }
                        Err(e) => debug!("Receive error: {}", e),
                    }
                }
            }
        }
    }

    /// Forward one datagram: reuse the peer's session, or classify and
    /// establish a new one. Unrecognized datagrams are dropped without
    /// creating state.
    async fn handle_datagram(&self, listener: &Arc<UdpSocket>, datagram: &[u8], peer: SocketAddr) {
        let key = peer.to_string();

        // Active session: forward without re-classification.
        if let Some(session) = self.sessions.get(&key).await {
            if let Err(e) = session.backend.send(datagram).await {
                debug!(addr = %key, "Backend send failed: {}", e);
            }
            return;
        }

        let Some(protocol) = identify(datagram, &self.protocols) else {
            debug!(addr = %key, len = datagram.len(), "Datagram unrecognized, dropping");
            return;
        };
        debug!(addr = %key, protocol = protocol.name(), target = protocol.target(), "New session");

        let backend = match UdpSocket::bind("0.0.0.0:0").await {
            Ok(socket) => socket,
            Err(e) => {
                debug!(addr = %key, "Failed to bind backend socket: {}", e);
                return;
            }
        };
        if let Err(e) = backend.connect(protocol.target()).await {
            debug!(addr = %key, target = protocol.target(), "Backend connect failed: {}", e);
            return;
        }
        let backend = Arc::new(backend);

        let reader = spawn_backend_reader(backend.clone(), listener.clone(), peer);
        let session = Session {
            protocol,
            backend,
        };
        let entry = SessionEntry::new(session.clone(), reader);

        if self.sessions.put(&key, entry).await {
            // Forward the datagram that established the session.
            if let Err(e) = session.backend.send(datagram).await {
                debug!(addr = %key, "Backend send failed: {}", e);
            }
        } else if let Some(existing) = self.sessions.get(&key).await {
            // Lost a first-datagram race; the rejected entry's socket is
            // already closed, forward through the winner instead.
            if let Err(e) = existing.backend.send(datagram).await {
                debug!(addr = %key, "Backend send failed: {}", e);
            }
        }
    }

    fn log_chain(&self) {
        if self.protocols.is_empty() {
            warn!("No UDP protocols configured");
            return;
        }
        info!("UDP protocol chain:");
        for protocol in self.protocols.iter() {
            info!("- {} @ {}", protocol.name(), protocol.target());
        }
    }
}

/// Read replies from the session's backend socket and write each one to
/// the original peer through the shared listening socket. Ends on the
/// first backend read error, or when eviction aborts the task mid-read.
fn spawn_backend_reader(
    backend: Arc<UdpSocket>,
    listener: Arc<UdpSocket>,
    peer: SocketAddr,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut buf = vec![0u8; MAX_DATAGRAM_SIZE];
        loop {
            let len = match backend.recv(&mut buf).await {
                Ok(len) => len,
                Err(e) => {
                    debug!(%peer, "Backend read ended: {}", e);
                    return;
                }
            };
            if let Err(e) = listener.send_to(&buf[..len], peer).await {
                debug!(%peer, "Reply send failed: {}", e);
                return;
            }
        }
    })
}
