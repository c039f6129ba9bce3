//! Built-in protocol descriptor set
//!
//! Constructors for the signatures Protomux ships with. Each takes only
//! the backend target; the matching rules are fixed.

use super::Protocol;
use lazy_static::lazy_static;
use regex::bytes::Regex;

lazy_static! {
    /// HTTP request-line methods.
    static ref HTTP_METHODS: Regex =
        Regex::new(r"^(GET|HEAD|POST|PUT|DELETE|CONNECT|OPTIONS|TRACE|PATCH) ")
            .expect("invalid HTTP signature regex");

    /// OpenVPN over TCP: a 2-byte big-endian packet length of at least 13
    /// precedes the control-channel handshake.
    static ref OPENVPN_HANDSHAKE: Regex =
        Regex::new(r"(?s-u)^\x00[\x0D-\xFF]$").expect("invalid OpenVPN signature regex");
}

impl Protocol {
    /// TLS/HTTPS, recognized by the handshake-record start bytes.
    pub fn tls(target: impl Into<String>) -> Self {
        Protocol::new("TLS", target)
            .with_prefix(&[0x16, 0x03, 0x00][..])
            .with_prefix(&[0x16, 0x03, 0x01][..])
            .with_prefix(&[0x16, 0x03, 0x02][..])
            .with_prefix(&[0x16, 0x03, 0x03][..])
    }

    /// SSH, recognized by the version-exchange prefix.
    pub fn ssh(target: impl Into<String>) -> Self {
        Protocol::new("SSH", target).with_prefix(&b"SSH-"[..])
    }

    /// SOCKS5, recognized by the version marker.
    pub fn socks5(target: impl Into<String>) -> Self {
        Protocol::new("SOCKS5", target).with_prefix(&[0x05][..])
    }

    /// SOCKS4, recognized by the version marker.
    pub fn socks4(target: impl Into<String>) -> Self {
        Protocol::new("SOCKS4", target).with_prefix(&[0x04][..])
    }

    /// OpenVPN over TCP, recognized by the length-prefixed handshake.
    /// Only evaluated for 2-3 byte captures.
    pub fn openvpn(target: impl Into<String>) -> Self {
        Protocol::new("OpenVPN", target)
            .with_regex(OPENVPN_HANDSHAKE.clone())
            .with_length_bounds(2, 3)
    }

    /// Plain HTTP, recognized by the request-line method.
    pub fn http(target: impl Into<String>) -> Self {
        Protocol::new("HTTP", target).with_regex(HTTP_METHODS.clone())
    }

    /// Wireguard (UDP only), recognized by the handshake-initiation
    /// message type.
    pub fn wireguard(target: impl Into<String>) -> Self {
        Protocol::new("Wireguard", target).with_prefix(&[0x01, 0x00, 0x00, 0x00][..])
    }
}
