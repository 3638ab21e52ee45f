//! Outbound SSH configuration

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use super::serde_utils::{duration_millis, duration_secs};

/// How the gateway decides whether to trust a remote host key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum HostKeyPolicy {
    /// Only accept keys pinned in the target profile or already recorded
    /// in the known-hosts file
    Strict,
    /// Trust on first use: record unknown keys, reject changed ones
    #[default]
    AcceptNew,
    /// Accept any key without verification.
    ///
    /// Leaves sessions open to man-in-the-middle interception; only meant for
    /// isolated lab networks.
    InsecureAcceptAny,
}

/// Settings for the SSH connections the gateway opens to targets
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SshConfig {
    /// TCP connect + handshake deadline
    #[serde(with = "duration_secs")]
    pub connect_timeout: Duration,

    /// Deadline for the password exchange, counted after the handshake
    #[serde(with = "duration_secs")]
    pub auth_timeout: Duration,

    /// Deadline for opening the shell channel (session, pty, shell)
    #[serde(with = "duration_millis")]
    pub channel_open_timeout: Duration,

    /// Terminal type advertised in the pty request
    pub term: String,

    /// Initial pty width in columns
    pub cols: u32,

    /// Initial pty height in rows
    pub rows: u32,

    /// Size of the buffer each output worker reads into
    pub read_buffer_size: usize,

    /// Host key verification policy
    pub host_key_policy: HostKeyPolicy,

    /// Where trust-on-first-use fingerprints are persisted
    pub known_hosts_path: PathBuf,
}

impl Default for SshConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(3),
            auth_timeout: Duration::from_secs(30),
            channel_open_timeout: Duration::from_millis(1000),
            term: "xterm".to_string(),
            cols: 80,
            rows: 24,
            read_buffer_size: 1024 * 1024,
            host_key_policy: HostKeyPolicy::default(),
            known_hosts_path: super::default_config_dir().join("known_hosts"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_reference_values() {
        let config = SshConfig::default();
        assert_eq!(config.connect_timeout, Duration::from_secs(3));
        assert_eq!(config.auth_timeout, Duration::from_secs(30));
        assert_eq!(config.channel_open_timeout, Duration::from_millis(1000));
        assert_eq!(config.read_buffer_size, 1024 * 1024);
        assert_eq!(config.term, "xterm");
        assert_eq!(config.host_key_policy, HostKeyPolicy::AcceptNew);
    }

    #[test]
    fn test_policy_names() {
        let config: SshConfig =
            toml::from_str(r#"host_key_policy = "insecure-accept-any""#).unwrap();
        assert_eq!(config.host_key_policy, HostKeyPolicy::InsecureAcceptAny);

        let config: SshConfig = toml::from_str(r#"host_key_policy = "strict""#).unwrap();
        assert_eq!(config.host_key_policy, HostKeyPolicy::Strict);
    }

    #[test]
    fn test_partial_section_keeps_defaults() {
        let config: SshConfig = toml::from_str("connect_timeout = 10").unwrap();
        assert_eq!(config.connect_timeout, Duration::from_secs(10));
        assert_eq!(config.cols, 80);
    }
}
