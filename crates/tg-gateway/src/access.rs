//! Bearer-token access policy

use tg_core::config::{AccessConfig, CallerEntry};
use tg_core::traits::AccessPolicy;
use tg_core::types::{Caller, TargetId};

/// Length of generated tokens in bytes (before hex encoding)
const TOKEN_BYTES: usize = 32;

/// Generate a new random caller token
///
/// Returns a 64-character hex string (32 random bytes)
pub fn generate_token() -> String {
    use rand::Rng;
    let mut bytes = [0u8; TOKEN_BYTES];
    rand::thread_rng().fill(&mut bytes);
    hex::encode(bytes)
}

/// Access policy driven by the `[access]` section of the config.
///
/// Tokens are stored as SHA-256 digests. Admins may open any target;
/// other callers only the targets listed for them.
#[derive(Debug, Clone, Default)]
pub struct TokenAccessPolicy {
    callers: Vec<CallerEntry>,
}

impl TokenAccessPolicy {
    pub fn new(config: &AccessConfig) -> Self {
        if config.callers.is_empty() {
            tracing::warn!("No callers configured; every terminal request will be denied");
        }
        Self {
            callers: config.callers.clone(),
        }
    }
}

impl AccessPolicy for TokenAccessPolicy {
    fn identify(&self, token: &str) -> Option<Caller> {
        if token.is_empty() {
            return None;
        }
        self.callers
            .iter()
            .find(|entry| entry.matches(token))
            .map(|entry| Caller {
                user_id: entry.user_id,
                role: entry.role,
                targets: entry.targets.iter().copied().map(TargetId::new).collect(),
            })
    }

    fn may_open_terminal(&self, caller: &Caller, target: TargetId) -> bool {
        caller.is_admin() || caller.targets.contains(&target)
    }
}
