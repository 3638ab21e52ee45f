//! Core domain types

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Identifier of a registered remote host, as it appears in `/terminal/{id}`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TargetId(pub u32);

impl TargetId {
    /// Create a new target ID
    pub fn new(id: u32) -> Self {
        Self(id)
    }
}

impl fmt::Display for TargetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for TargetId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse::<u32>().map(Self)
    }
}

impl From<u32> for TargetId {
    fn from(id: u32) -> Self {
        Self(id)
    }
}

/// Opaque identifier for one browser-facing terminal channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionKey(Uuid);

impl SessionKey {
    /// Allocate a fresh session key
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionKey {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Short form is enough to correlate log lines
        let simple = self.0.simple().to_string();
        write!(f, "ws-{}", &simple[..12])
    }
}

/// Role of an authenticated caller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// May open a terminal on every target
    Admin,
    /// May open terminals only on explicitly granted targets
    User,
}

/// Identity of the party requesting a terminal, as established upstream
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caller {
    pub user_id: u32,
    pub role: Role,
    /// Targets this caller was granted (ignored for admins)
    pub targets: Vec<TargetId>,
}

impl Caller {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

/// Connection profile for a target, as stored by the device inventory
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetProfile {
    /// Host address (IP or DNS name)
    pub host: String,

    /// SSH port
    #[serde(default = "default_ssh_port")]
    pub port: u16,

    /// Login user
    pub username: String,

    /// Login password
    pub password: String,

    /// Pinned host key fingerprint (`SHA256:...`)
    #[serde(default)]
    pub host_key: Option<String>,
}

fn default_ssh_port() -> u16 {
    22
}

impl TargetProfile {
    /// Create a profile with the default SSH port and no pinned key
    pub fn new(
        host: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            host: host.into(),
            port: default_ssh_port(),
            username: username.into(),
            password: password.into(),
            host_key: None,
        }
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// `host:port`, as used for dialing and in log lines
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl fmt::Debug for TargetProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TargetProfile")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("host_key", &self.host_key)
            .finish()
    }
}

/// Lifecycle state of a shell bridge
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum BridgeState {
    /// Remote shell established, not yet registered
    Connecting = 0,
    /// Registered, output worker running
    Active = 1,
    /// Teardown in progress
    Closing = 2,
    /// Terminal state
    Closed = 3,
}

impl BridgeState {
    /// Decode from the atomic representation
    pub fn from_u8(value: u8) -> Self {
        match value {
            0 => BridgeState::Connecting,
            1 => BridgeState::Active,
            2 => BridgeState::Closing,
            _ => BridgeState::Closed,
        }
    }
}

impl fmt::Display for BridgeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BridgeState::Connecting => write!(f, "connecting"),
            BridgeState::Active => write!(f, "active"),
            BridgeState::Closing => write!(f, "closing"),
            BridgeState::Closed => write!(f, "closed"),
        }
    }
}
