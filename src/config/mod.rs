//! Configuration module for Protomux
//!
//! Provides the TOML configuration types and the construction of the
//! descriptor chains in matching priority order. The CLI in `main.rs`
//! builds the same [`Config`] from flags when no file is given.

use crate::error::ProtomuxError;
use crate::protocol::Protocol;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// Default bind address for both listeners
fn default_bind() -> String {
    "0.0.0.0:8443".to_string()
}

/// Default idle lifetime of a UDP session in seconds
fn default_session_ttl() -> u64 {
    crate::relay::DEFAULT_SESSION_TTL.as_secs()
}

/// Default TCP_NODELAY setting
fn default_nodelay() -> bool {
    true
}

/// Default TCP keepalive timeout in seconds
fn default_keepalive_secs() -> u64 {
    20
}

/// Default TCP keepalive interval in seconds
fn default_keepalive_interval() -> u64 {
    8
}

/// Root configuration structure
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct Config {
    /// Listener bind addresses
    #[serde(default)]
    pub listen: ListenConfig,

    /// Backend target per recognized protocol
    #[serde(default)]
    pub protocols: ProtocolTargets,

    /// TCP socket tuning applied to both relay legs
    #[serde(default)]
    pub socket: SocketConfig,

    /// UDP session lifetime settings
    #[serde(default)]
    pub session: SessionConfig,
}

/// Listener bind addresses. TCP and UDP may share the same host:port;
/// they are separate sockets.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ListenConfig {
    /// TCP bind address
    #[serde(default = "default_bind")]
    pub tcp: String,

    /// UDP bind address
    #[serde(default = "default_bind")]
    pub udp: String,
}

impl Default for ListenConfig {
    fn default() -> Self {
        ListenConfig {
            tcp: default_bind(),
            udp: default_bind(),
        }
    }
}

/// Backend target addresses per protocol. Unset protocols are left out
/// of the chain and never matched.
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct ProtocolTargets {
    /// TLS/HTTPS backend
    #[serde(default)]
    pub tls: Option<String>,

    /// SSH backend
    #[serde(default)]
    pub ssh: Option<String>,

    /// SOCKS5 backend
    #[serde(default)]
    pub socks5: Option<String>,

    /// SOCKS4 backend
    #[serde(default)]
    pub socks4: Option<String>,

    /// OpenVPN backend
    #[serde(default)]
    pub openvpn: Option<String>,

    /// HTTP backend
    #[serde(default)]
    pub http: Option<String>,

    /// Wireguard backend (UDP)
    #[serde(default)]
    pub wireguard: Option<String>,
}

/// TCP socket tuning
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct SocketConfig {
    /// Enable TCP_NODELAY
    #[serde(default = "default_nodelay")]
    pub nodelay: bool,

    /// TCP keepalive timeout in seconds
    #[serde(default = "default_keepalive_secs")]
    pub keepalive_secs: u64,

    /// TCP keepalive interval in seconds
    #[serde(default = "default_keepalive_interval")]
    pub keepalive_interval: u64,
}

impl Default for SocketConfig {
    fn default() -> Self {
        SocketConfig {
            nodelay: default_nodelay(),
            keepalive_secs: default_keepalive_secs(),
            keepalive_interval: default_keepalive_interval(),
        }
    }
}

/// UDP session lifetime settings
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct SessionConfig {
    /// Idle lifetime of a UDP session in seconds
    #[serde(default = "default_session_ttl")]
    pub ttl_secs: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        SessionConfig {
            ttl_secs: default_session_ttl(),
        }
    }
}

impl Config {
    /// Parsed TCP bind address.
    pub fn tcp_bind(&self) -> Result<SocketAddr, ProtomuxError> {
        parse_addr(&self.listen.tcp)
    }

    /// Parsed UDP bind address.
    pub fn udp_bind(&self) -> Result<SocketAddr, ProtomuxError> {
        parse_addr(&self.listen.udp)
    }

    /// Build the TCP descriptor chain in matching priority order:
    /// contains-matched protocols would come first (none of the built-ins
    /// carry contains rules), then the cheap prefix signatures, then the
    /// regex protocols, which are the most expensive to evaluate.
    pub fn tcp_chain(&self) -> Vec<Arc<Protocol>> {
        let mut chain = Vec::new();
        if let Some(target) = &self.protocols.tls {
            chain.push(Arc::new(Protocol::tls(target)));
        }
        if let Some(target) = &self.protocols.ssh {
            chain.push(Arc::new(Protocol::ssh(target)));
        }
        if let Some(target) = &self.protocols.socks5 {
            chain.push(Arc::new(Protocol::socks5(target)));
        }
        if let Some(target) = &self.protocols.socks4 {
            chain.push(Arc::new(Protocol::socks4(target)));
        }
        if let Some(target) = &self.protocols.openvpn {
            chain.push(Arc::new(Protocol::openvpn(target)));
        }
        if let Some(target) = &self.protocols.http {
            chain.push(Arc::new(Protocol::http(target)));
        }
        chain
    }

    /// Build the UDP descriptor chain.
    pub fn udp_chain(&self) -> Vec<Arc<Protocol>> {
        let mut chain = Vec::new();
        if let Some(target) = &self.protocols.wireguard {
            chain.push(Arc::new(Protocol::wireguard(target)));
        }
        chain
    }

    /// Idle lifetime of a UDP session.
    pub fn session_ttl(&self) -> Duration {
        Duration::from_secs(self.session.ttl_secs)
    }
}

/// Parse a host:port string into a socket address.
fn parse_addr(addr: &str) -> Result<SocketAddr, ProtomuxError> {
    addr.parse()
        .map_err(|_| ProtomuxError::Address(addr.to_string()))
}

/// Load configuration from a TOML file
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config> {
    let content = std::fs::read_to_string(path.as_ref())
        .with_context(|| format!("Failed to read config file: {:?}", path.as_ref()))?;

    parse_config(&content)
}

/// Parse configuration from a TOML string
pub fn parse_config(content: &str) -> Result<Config> {
    toml::from_str(content).with_context(|| "Failed to parse configuration")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_parse_empty_config_uses_defaults() {
        let config = parse_config("").unwrap();
        assert_eq!(config.listen.tcp, "0.0.0.0:8443");
        assert_eq!(config.listen.udp, "0.0.0.0:8443");
        assert_eq!(config.session.ttl_secs, 20 * 60);
        assert!(config.socket.nodelay);
        assert!(config.tcp_chain().is_empty());
        assert!(config.udp_chain().is_empty());
    }

    #[test]
    fn test_parse_full_config() {
        let config_str = r#"
[listen]
tcp = "0.0.0.0:443"
udp = "0.0.0.0:51820"

[protocols]
tls = "127.0.0.1:8443"
ssh = "127.0.0.1:22"
openvpn = "127.0.0.1:1194"
wireguard = "127.0.0.1:51821"

[socket]
nodelay = false
keepalive_secs = 30
keepalive_interval = 10

[session]
ttl_secs = 60
"#;

        let config = parse_config(config_str).unwrap();
        assert_eq!(config.listen.tcp, "0.0.0.0:443");
        assert_eq!(config.listen.udp, "0.0.0.0:51820");
        assert!(!config.socket.nodelay);
        assert_eq!(config.socket.keepalive_secs, 30);
        assert_eq!(config.session_ttl(), Duration::from_secs(60));
    }

    #[test]
    fn test_tcp_chain_priority_order() {
        let config_str = r#"
[protocols]
http = "127.0.0.1:80"
tls = "127.0.0.1:443"
ssh = "127.0.0.1:22"
socks5 = "127.0.0.1:1080"
socks4 = "127.0.0.1:1081"
openvpn = "127.0.0.1:1194"
"#;

        let config = parse_config(config_str).unwrap();
        let names: Vec<_> = config
            .tcp_chain()
            .iter()
            .map(|p| p.name().to_string())
            .collect();
        // prefix signatures before regex signatures, regardless of file order
        assert_eq!(
            names,
            vec!["TLS", "SSH", "SOCKS5", "SOCKS4", "OpenVPN", "HTTP"]
        );
    }

    #[test]
    fn test_socks4_wires_exactly_one_descriptor() {
        let config_str = r#"
[protocols]
socks4 = "127.0.0.1:1081"
"#;

        let config = parse_config(config_str).unwrap();
        let chain = config.tcp_chain();
        assert_eq!(chain.len(), 1);
        assert_eq!(chain[0].name(), "SOCKS4");
    }

    #[test]
    fn test_udp_chain() {
        let config_str = r#"
[protocols]
wireguard = "127.0.0.1:51820"
tls = "127.0.0.1:443"
"#;

        let config = parse_config(config_str).unwrap();
        let chain = config.udp_chain();
        assert_eq!(chain.len(), 1);
        assert_eq!(chain[0].name(), "Wireguard");
        assert_eq!(chain[0].target(), "127.0.0.1:51820");
    }

    #[test]
    fn test_bind_address_parsing() {
        let config = parse_config("").unwrap();
        assert!(config.tcp_bind().is_ok());
        assert!(config.udp_bind().is_ok());

        let config_str = r#"
[listen]
tcp = "not-an-address"
"#;
        let config = parse_config(config_str).unwrap();
        let err = config.tcp_bind().unwrap_err();
        assert!(matches!(err, ProtomuxError::Address(_)));
        // the UDP listener is unaffected
        assert!(config.udp_bind().is_ok());
    }

    #[test]
    fn test_load_config_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[protocols]\nssh = \"127.0.0.1:22\"").unwrap();

        let config = load_config(file.path()).unwrap();
        assert_eq!(config.protocols.ssh.as_deref(), Some("127.0.0.1:22"));
    }

    #[test]
    fn test_load_config_missing_file() {
        assert!(load_config("/nonexistent/protomux.toml").is_err());
    }

    #[test]
    fn test_parse_invalid_toml() {
        assert!(parse_config("[listen\ntcp = ").is_err());
    }
}
