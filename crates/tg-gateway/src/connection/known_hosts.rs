//! Host key trust store
//!
//! A flat file of `address fingerprint` lines. Unknown hosts are appended
//! under the accept-new policy; a recorded host presenting a different key
//! is always rejected.

use std::collections::HashMap;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use tg_core::config::HostKeyPolicy;

/// Outcome of checking a server key
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostKeyVerdict {
    Trusted,
    Rejected(String),
}

/// Fingerprints of hosts the gateway has seen before
#[derive(Debug)]
pub struct KnownHosts {
    entries: RwLock<HashMap<String, String>>,
    path: PathBuf,
}

impl KnownHosts {
    /// Load the store from `path`; a missing file is an empty store
    pub fn load(path: impl Into<PathBuf>) -> io::Result<Self> {
        let path = path.into();
        let entries = match fs::read_to_string(&path) {
            Ok(content) => parse(&content),
            Err(e) if e.kind() == io::ErrorKind::NotFound => HashMap::new(),
            Err(e) => return Err(e),
        };

        tracing::debug!(
            "Loaded {} known host(s) from {}",
            entries.len(),
            path.display()
        );
        Ok(Self {
            entries: RwLock::new(entries),
            path,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Recorded fingerprint for `address`, if any
    pub fn fingerprint(&self, address: &str) -> Option<String> {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        entries.get(address).cloned()
    }

    /// Decide whether `fingerprint` is acceptable for `address`.
    ///
    /// A fingerprint pinned in the target profile takes precedence over the
    /// store.
    pub fn check(
        &self,
        policy: HostKeyPolicy,
        address: &str,
        pinned: Option<&str>,
        fingerprint: &str,
    ) -> HostKeyVerdict {
        if policy == HostKeyPolicy::InsecureAcceptAny {
            tracing::warn!(
                "Accepting host key {} for {} without verification",
                fingerprint,
                address
            );
            return HostKeyVerdict::Trusted;
        }

        if let Some(pinned) = pinned {
            return if same_fingerprint(pinned, fingerprint) {
                HostKeyVerdict::Trusted
            } else {
                HostKeyVerdict::Rejected(format!(
                    "host key for {} does not match the pinned fingerprint (got {})",
                    address, fingerprint
                ))
            };
        }

        // One guard covers the lookup and the first-use insert
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        if let Some(known) = entries.get(address) {
            return if same_fingerprint(known, fingerprint) {
                HostKeyVerdict::Trusted
            } else {
                tracing::warn!(
                    "HOST KEY CHANGED for {}: expected {}, got {}",
                    address,
                    known,
                    fingerprint
                );
                HostKeyVerdict::Rejected(format!("host key for {} has changed", address))
            };
        }

        match policy {
            HostKeyPolicy::Strict => {
                HostKeyVerdict::Rejected(format!("host {} is not in known hosts", address))
            }
            _ => {
                entries.insert(address.to_string(), fingerprint.to_string());
                if let Err(e) = self.append(address, fingerprint) {
                    // Trust still applies for this process
                    tracing::warn!("Failed to persist host key for {}: {}", address, e);
                }
                tracing::info!("Trusting new host {} ({})", address, fingerprint);
                HostKeyVerdict::Trusted
            }
        }
    }

    fn append(&self, address: &str, fingerprint: &str) -> io::Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        writeln!(file, "{} {}", address, fingerprint)
    }
}

fn parse(content: &str) -> HashMap<String, String> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(|line| {
            let mut parts = line.split_whitespace();
            match (parts.next(), parts.next()) {
                (Some(address), Some(fingerprint)) => {
                    Some((address.to_string(), fingerprint.to_string()))
                }
                _ => None,
            }
        })
        .collect()
}

/// Compare fingerprints, tolerating an optional `SHA256:` prefix
fn same_fingerprint(a: &str, b: &str) -> bool {
    let strip = |s: &str| s.trim().trim_start_matches("SHA256:").to_string();
    strip(a) == strip(b)
}
