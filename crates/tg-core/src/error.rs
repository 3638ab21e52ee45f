//! Core error types for termgate

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

use crate::types::{BridgeState, SessionKey, TargetId};

/// Top-level error type for the gateway
#[derive(Error, Debug)]
pub enum GatewayError {
    /// Failure while opening a remote shell
    #[error("Connect error: {0}")]
    Connect(#[from] ConnectError),

    /// Failure on an established bridge
    #[error("Bridge error: {0}")]
    Bridge(#[from] BridgeError),

    /// Session registry error
    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Category of a transport-level failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkKind {
    /// Remote actively refused the TCP connection
    Refused,
    /// Connect or handshake exceeded its deadline
    Timeout,
    /// No route to host / network down / name not resolvable
    Unreachable,
    /// Anything else the transport reported
    Other,
}

impl fmt::Display for NetworkKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NetworkKind::Refused => write!(f, "refused"),
            NetworkKind::Timeout => write!(f, "timeout"),
            NetworkKind::Unreachable => write!(f, "unreachable"),
            NetworkKind::Other => write!(f, "other"),
        }
    }
}

/// Errors raised while resolving a target and opening its shell.
///
/// All of these are fatal at session-open time and are never retried.
#[derive(Error, Debug)]
pub enum ConnectError {
    /// Target has no stored profile
    #[error("Unknown target: {0}")]
    Resolution(TargetId),

    /// The inventory itself could not be queried
    #[error("Target directory unavailable: {0}")]
    Directory(#[from] DirectoryError),

    /// Remote rejected the stored credentials
    #[error("Authentication failed for {username}@{address}")]
    Auth { username: String, address: String },

    /// Transport could not be established
    #[error("Network error ({kind}) reaching {address}: {message}")]
    Network {
        kind: NetworkKind,
        address: String,
        message: String,
    },

    /// Host identity could not be verified under the configured policy
    #[error("Host key verification failed for {address}: {message}")]
    HostKey { address: String, message: String },

    /// Transport is up but the shell channel could not be negotiated
    #[error("Shell channel error on {address}: {message}")]
    Channel { address: String, message: String },
}

impl ConnectError {
    /// Build a network error from a raw I/O failure
    pub fn from_io(address: impl Into<String>, err: &std::io::Error) -> Self {
        use std::io::ErrorKind;

        let kind = match err.kind() {
            ErrorKind::ConnectionRefused => NetworkKind::Refused,
            ErrorKind::TimedOut | ErrorKind::WouldBlock => NetworkKind::Timeout,
            ErrorKind::NotFound | ErrorKind::AddrNotAvailable => NetworkKind::Unreachable,
            _ => {
                // Kinds such as HostUnreachable are not stable on our MSRV
                let text = err.to_string().to_lowercase();
                if text.contains("unreachable") || text.contains("no route") {
                    NetworkKind::Unreachable
                } else {
                    NetworkKind::Other
                }
            }
        };

        ConnectError::Network {
            kind,
            address: address.into(),
            message: err.to_string(),
        }
    }

    /// Address the failure relates to, when one was resolved
    pub fn address(&self) -> Option<&str> {
        match self {
            ConnectError::Resolution(_) | ConnectError::Directory(_) => None,
            ConnectError::Auth { address, .. }
            | ConnectError::Network { address, .. }
            | ConnectError::HostKey { address, .. }
            | ConnectError::Channel { address, .. } => Some(address),
        }
    }
}

/// Failure reported by a target directory implementation
#[derive(Error, Debug)]
#[error("{0}")]
pub struct DirectoryError(pub String);

/// Errors on an established bridge
#[derive(Error, Debug)]
pub enum BridgeError {
    /// I/O failure on the remote shell streams mid-session
    #[error("Stream error: {0}")]
    Stream(#[from] std::io::Error),

    /// Inbound message received outside the ACTIVE state
    #[error("Message received while bridge is {state}")]
    Protocol { state: BridgeState },
}

/// Session registry errors
#[derive(Error, Debug, PartialEq, Eq)]
pub enum RegistryError {
    /// An entry for this session is already present
    #[error("Session already registered: {0}")]
    DuplicateSession(SessionKey),
}

/// Configuration-related errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Config file not found
    #[error("Config file not found: {0}")]
    NotFound(PathBuf),

    /// Invalid configuration
    #[error("Invalid config: {0}")]
    Invalid(String),

    /// TOML parse error
    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),

    /// TOML serialize error
    #[error("TOML serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),
}
