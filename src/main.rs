//! Protomux - Transparent Protocol Multiplexer
//!
//! This is the main entry point for the Protomux application.

use anyhow::Result;
use clap::Parser;
use protomux::config::{load_config, Config, ListenConfig, ProtocolTargets};
use protomux::net::SocketOpts;
use protomux::relay::SWEEP_INTERVAL;
use protomux::{SessionTable, TcpRelayServer, UdpRelayServer};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

/// Protomux - transparent protocol multiplexer for TCP and UDP
#[derive(Parser, Debug)]
#[command(name = "protomux")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file (protocol/bind flags are ignored when set)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// TCP bind address
    #[arg(long, default_value = "0.0.0.0:8443")]
    bind_tcp: String,

    /// UDP bind address
    #[arg(long, default_value = "0.0.0.0:8443")]
    bind_udp: String,

    /// TLS/HTTPS backend address
    #[arg(long)]
    tls: Option<String>,

    /// SSH backend address
    #[arg(long)]
    ssh: Option<String>,

    /// SOCKS5 backend address
    #[arg(long)]
    socks5: Option<String>,

    /// SOCKS4 backend address
    #[arg(long)]
    socks4: Option<String>,

    /// OpenVPN backend address
    #[arg(long = "ovpn")]
    openvpn: Option<String>,

    /// HTTP backend address
    #[arg(long)]
    http: Option<String>,

    /// Wireguard backend address (UDP)
    #[arg(long)]
    wireguard: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Enable JSON logging format
    #[arg(long)]
    json_log: bool,
}

impl Args {
    /// Build the equivalent configuration from the individual flags.
    fn to_config(&self) -> Config {
        Config {
            listen: ListenConfig {
                tcp: self.bind_tcp.clone(),
                udp: self.bind_udp.clone(),
            },
            protocols: ProtocolTargets {
                tls: self.tls.clone(),
                ssh: self.ssh.clone(),
                socks5: self.socks5.clone(),
                socks4: self.socks4.clone(),
                openvpn: self.openvpn.clone(),
                http: self.http.clone(),
                wireguard: self.wireguard.clone(),
            },
            ..Default::default()
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Setup logging
    setup_logging(&args.log_level, args.json_log)?;

    // Load configuration
    let config = match &args.config {
        Some(path) => {
            let config = load_config(path)?;
            info!("Configuration loaded from: {:?}", path);
            config
        }
        None => args.to_config(),
    };

    info!("Protomux v{}", protomux::VERSION);

    // Setup shutdown signal
    let (shutdown_tx, _) = broadcast::channel(1);

    // Handle Ctrl+C and termination signals (cross-platform)
    let shutdown_tx_clone = shutdown_tx.clone();
    tokio::spawn(async move {
        #[cfg(unix)]
        {
            use tokio::signal::unix::{signal, SignalKind};
            let mut sigterm =
                signal(SignalKind::terminate()).expect("Failed to setup SIGTERM handler");

            tokio::select! {
                _ = tokio::signal::ctrl_c() => {
                    info!("Received Ctrl+C, shutting down...");
                }
                _ = sigterm.recv() => {
                    info!("Received SIGTERM, shutting down...");
                }
            }
        }

        #[cfg(not(unix))]
        {
            // On Windows, only handle Ctrl+C
            let _ = tokio::signal::ctrl_c().await;
            info!("Received Ctrl+C, shutting down...");
        }

        let _ = shutdown_tx_clone.send(true);
    });

    run_servers(config, shutdown_tx).await
}

/// Start both relay servers and the session sweep, and wait for them.
///
/// A malformed bind address disables only the affected server; a bind
/// failure is fatal and exits the process with an error.
async fn run_servers(config: Config, shutdown_tx: broadcast::Sender<bool>) -> Result<()> {
    let socket_opts = SocketOpts::from_socket_config(&config.socket);

    let sessions = Arc::new(SessionTable::new(config.session_ttl()));
    let sweep = sessions
        .clone()
        .spawn_sweep(SWEEP_INTERVAL, shutdown_tx.subscribe());

    let tcp = match config.tcp_bind() {
        Ok(addr) => Some((
            TcpRelayServer::new(config.tcp_chain()).with_socket_opts(socket_opts),
            addr,
        )),
        Err(e) => {
            error!("TCP listener disabled: {}", e);
            None
        }
    };
    let udp = match config.udp_bind() {
        Ok(addr) => Some((
            UdpRelayServer::new(config.udp_chain(), sessions.clone()),
            addr,
        )),
        Err(e) => {
            error!("UDP listener disabled: {}", e);
            None
        }
    };

    if tcp.is_none() && udp.is_none() {
        anyhow::bail!("No listener could be configured");
    }

    let tcp_shutdown = shutdown_tx.subscribe();
    let udp_shutdown = shutdown_tx.subscribe();

    let tcp_fut = async {
        match tcp {
            Some((server, addr)) => server.run(addr, tcp_shutdown).await,
            None => Ok(()),
        }
    };
    let udp_fut = async {
        match udp {
            Some((server, addr)) => server.run(addr, udp_shutdown).await,
            None => Ok(()),
        }
    };

    tokio::try_join!(tcp_fut, udp_fut)?;

    let _ = sweep.await;
    Ok(())
}

/// Setup logging based on configuration
fn setup_logging(level: &str, json: bool) -> Result<()> {
    let level = match level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" | "warning" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    if json {
        let subscriber = FmtSubscriber::builder()
            .with_max_level(level)
            .json()
            .finish();
        tracing::subscriber::set_global_default(subscriber)?;
    } else {
        let subscriber = FmtSubscriber::builder()
            .with_max_level(level)
            .with_target(true)
            .with_thread_ids(false)
            .with_thread_names(false)
            .finish();
        tracing::subscriber::set_global_default(subscriber)?;
    }

    Ok(())
}
