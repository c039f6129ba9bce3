//! Relay servers
//!
//! This module provides the two transport servers and the UDP session
//! table. The TCP server identifies each accepted connection, dials the
//! matched backend, replays the captured handshake and pipes bytes both
//! ways. The UDP server synthesizes per-peer sessions over the
//! connectionless transport, with TTL-based expiry handled by the
//! session table's sweep.

mod session;
mod tcp;
mod udp;

pub use session::{Session, SessionEntry, SessionTable};
pub use tcp::TcpRelayServer;
pub use udp::UdpRelayServer;

use std::time::Duration;

/// Size of the buffer used to capture a connection's first bytes
pub const IDENTIFY_BUFFER_SIZE: usize = 1024;

/// Read deadline while waiting for the identifying bytes
pub const IDENTIFY_TIMEOUT: Duration = Duration::from_secs(15);

/// Per-direction copy buffer for the TCP relay
pub const RELAY_BUFFER_SIZE: usize = 4096;

/// Maximum UDP datagram size
pub const MAX_DATAGRAM_SIZE: usize = 65535;

/// Interval between session-table sweep ticks
pub const SWEEP_INTERVAL: Duration = Duration::from_secs(1);

/// Default idle lifetime of a UDP session
pub const DEFAULT_SESSION_TTL: Duration = Duration::from_secs(20 * 60);
