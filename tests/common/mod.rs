//! Test utilities for Protomux integration tests
//!
//! This module provides common helpers used across integration tests.

use std::net::SocketAddr;
use tokio::net::{TcpListener, UdpSocket};

/// Create a TCP backend listener on an available port
pub async fn tcp_backend() -> (TcpListener, SocketAddr) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    (listener, addr)
}

/// Create a UDP socket on an available port
pub async fn udp_socket() -> (UdpSocket, SocketAddr) {
    let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let addr = socket.local_addr().unwrap();
    (socket, addr)
}

/// A plausible Wireguard handshake-initiation datagram: the message-type
/// marker followed by padding up to the initiation message size.
pub fn wireguard_initiation() -> Vec<u8> {
    let mut datagram = vec![0x01, 0x00, 0x00, 0x00];
    datagram.extend_from_slice(&[0x42; 144]);
    datagram
}
