//! Gateway configuration

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::PathBuf;

use super::SshConfig;
use crate::types::{Role, TargetProfile};

/// Configuration for the gateway daemon
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Address the HTTP/WebSocket listener binds to
    pub bind_address: String,

    /// Inventory file holding target profiles.
    ///
    /// Re-read on every session open, so credential changes apply to the
    /// next terminal without a restart. When unset, `targets` is used.
    pub inventory_path: Option<PathBuf>,

    /// Inline target profiles keyed by target id
    pub targets: HashMap<String, TargetProfile>,

    /// Outbound SSH settings
    pub ssh: SshConfig,

    /// Who may open which terminal
    pub access: AccessConfig,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            inventory_path: None,
            targets: HashMap::new(),
            ssh: SshConfig::default(),
            access: AccessConfig::default(),
        }
    }
}

/// Caller table used by the token access policy
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AccessConfig {
    pub callers: Vec<CallerEntry>,
}

/// One caller credential
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallerEntry {
    /// SHA-256 of the bearer token, hex-encoded
    pub token_sha256: String,

    pub user_id: u32,

    pub role: Role,

    /// Targets a non-admin caller may open
    #[serde(default)]
    pub targets: Vec<u32>,
}

impl CallerEntry {
    /// Hash a plaintext token the way it is stored in `token_sha256`
    pub fn hash_token(token: &str) -> String {
        hex::encode(Sha256::digest(token.as_bytes()))
    }

    /// Check a presented token against the stored digest
    pub fn matches(&self, token: &str) -> bool {
        Self::hash_token(token).eq_ignore_ascii_case(&self.token_sha256)
    }
}
