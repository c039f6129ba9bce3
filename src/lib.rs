//! # Protomux - Transparent Protocol Multiplexer
//!
//! Protomux listens on a single TCP and a single UDP socket, inspects the
//! first bytes sent by each new connection or datagram peer, classifies the
//! application protocol being spoken, and transparently relays the traffic
//! to the backend configured for that protocol. Neither endpoint is aware
//! a proxy sits in between: backends receive exactly the bytes the client
//! sent, starting with the captured handshake.
//!
//! ## Features
//!
//! - **First-Match Classification**: ordered byte-contains, byte-prefix and
//!   regex signatures; the first matching protocol wins
//! - **Handshake Replay**: the bytes captured for identification are written
//!   to the backend before any relayed data
//! - **UDP Pseudo-Sessions**: per-peer backend sockets with TTL-based expiry
//!   emulate connections over a connectionless transport
//! - **Built-in Signatures**: TLS, SSH, SOCKS5, SOCKS4, OpenVPN, HTTP and
//!   Wireguard ship out of the box
//!
//! ## Usage
//!
//! ```rust,ignore
//! use protomux::{Protocol, TcpRelayServer};
//! use std::sync::Arc;
//! use tokio::sync::broadcast;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let chain = vec![Arc::new(Protocol::ssh("127.0.0.1:22"))];
//!     let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
//!
//!     TcpRelayServer::new(chain)
//!         .run("0.0.0.0:8443".parse()?, shutdown_rx)
//!         .await
//! }
//! ```
//!
//! ## Architecture
//!
//! The relay servers own the descriptor chain and (for UDP) the session
//! table; classification itself is a pure function over the chain.
//!
//! ```text
//! Client -> Protomux (identify -> dial -> replay -> relay) -> Backend
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod config;
pub mod error;
pub mod net;
pub mod protocol;
pub mod relay;

// Re-export commonly used items
pub use config::{load_config, Config};
pub use error::ProtomuxError;
pub use protocol::{identify, Protocol};
pub use relay::{SessionTable, TcpRelayServer, UdpRelayServer};

/// Version of the Protomux library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Name of the application
pub const NAME: &str = env!("CARGO_PKG_NAME");
