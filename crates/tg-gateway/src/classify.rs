//! Failure classification
//!
//! Maps raw transport failures onto [`ConnectError`], and connect errors onto
//! the small closed set of close reasons a browser client is shown.

use std::fmt;

use tg_core::error::{ConnectError, NetworkKind};

/// WebSocket close code sent with a classified reason (1003, "cannot accept")
pub const CLOSE_CANNOT_ACCEPT: u16 = 1003;

/// Close reasons are limited to 123 bytes by RFC 6455
const MAX_CLOSE_REASON_BYTES: usize = 123;

/// Categorized, human-readable reason for closing a terminal channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseReason {
    /// Target has no stored profile
    UnknownTarget,
    /// Remote rejected the stored credentials
    AuthFailed,
    /// Remote refused the TCP connection
    ConnectionRefused,
    /// Anything else, carrying the raw message
    Other(String),
}

impl CloseReason {
    /// Classify a session-open failure
    pub fn classify(err: &ConnectError) -> Self {
        match err {
            ConnectError::Resolution(_) => CloseReason::UnknownTarget,
            ConnectError::Auth { .. } => CloseReason::AuthFailed,
            ConnectError::Network {
                kind: NetworkKind::Refused,
                ..
            } => CloseReason::ConnectionRefused,
            other => CloseReason::Other(other.to_string()),
        }
    }

    /// Short category label, used in logs
    pub fn label(&self) -> &'static str {
        match self {
            CloseReason::UnknownTarget => "unknown target",
            CloseReason::AuthFailed => "auth failed",
            CloseReason::ConnectionRefused => "connection refused",
            CloseReason::Other(_) => "other",
        }
    }

    /// Text shown to the user
    pub fn message(&self) -> String {
        match self {
            CloseReason::UnknownTarget => "Unable to identify this host".to_string(),
            CloseReason::AuthFailed => "SSH login failed: wrong username or password".to_string(),
            CloseReason::ConnectionRefused => {
                "Connection refused: the SSH service may not be running or the port is not open"
                    .to_string()
            }
            CloseReason::Other(message) => message.clone(),
        }
    }

    /// Message cut down to fit a close frame, on a char boundary
    pub fn frame_text(&self) -> String {
        let message = self.message();
        if message.len() <= MAX_CLOSE_REASON_BYTES {
            return message;
        }

        let mut end = MAX_CLOSE_REASON_BYTES;
        while !message.is_char_boundary(end) {
            end -= 1;
        }
        message[..end].to_string()
    }
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CloseReason::Other(message) => write!(f, "other: {}", message),
            reason => write!(f, "{}", reason.label()),
        }
    }
}

/// Map a failure reported by the SSH transport to a connect error.
///
/// `host_key_rejection` carries the verifier's explanation when the
/// handshake was aborted because the server key was not trusted.
pub fn from_ssh_error(
    address: &str,
    err: russh::Error,
    host_key_rejection: Option<String>,
) -> ConnectError {
    if let Some(message) = host_key_rejection {
        return ConnectError::HostKey {
            address: address.to_string(),
            message,
        };
    }

    match err {
        russh::Error::IO(ref io) => ConnectError::from_io(address, io),
        russh::Error::UnknownKey => ConnectError::HostKey {
            address: address.to_string(),
            message: "server key rejected".to_string(),
        },
        russh::Error::Disconnect => ConnectError::Network {
            kind: NetworkKind::Other,
            address: address.to_string(),
            message: "remote closed the connection during handshake".to_string(),
        },
        other => ConnectError::Network {
            kind: NetworkKind::Other,
            address: address.to_string(),
            message: other.to_string(),
        },
    }
}

/// Connect error for a deadline that elapsed
pub fn timed_out(address: &str, what: &str, after: std::time::Duration) -> ConnectError {
    ConnectError::Network {
        kind: NetworkKind::Timeout,
        address: address.to_string(),
        message: format!("{} timed out after {:?}", what, after),
    }
}
