//! Error types for Protomux
//!
//! This module defines the custom error types used throughout the
//! application. Per-connection and per-datagram failures never surface as
//! errors; only configuration and listener construction problems do.

use std::io;
use thiserror::Error;

/// Main error type for Protomux operations
#[derive(Error, Debug)]
pub enum ProtomuxError {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Malformed bind or target address
    #[error("Invalid address: {0}")]
    Address(String),

    /// Protocol descriptor construction error
    #[error("Protocol error: {0}")]
    Protocol(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ProtomuxError::Config("missing backend".to_string());
        assert_eq!(format!("{}", err), "Configuration error: missing backend");

        let err = ProtomuxError::Address("not-an-address".to_string());
        assert_eq!(format!("{}", err), "Invalid address: not-an-address");

        let err = ProtomuxError::Protocol("bad signature".to_string());
        assert_eq!(format!("{}", err), "Protocol error: bad signature");
    }

    #[test]
    fn test_error_from_io() {
        let io_err = io::Error::new(io::ErrorKind::AddrInUse, "in use");
        let err: ProtomuxError = io_err.into();
        assert!(matches!(err, ProtomuxError::Io(_)));
    }
}
