//! Access-control trait

use crate::types::{Caller, TargetId};

/// Authorization decisions for terminal access.
///
/// Evaluated once, before any connection attempt is made for a session.
pub trait AccessPolicy: Send + Sync {
    /// Map a presented bearer token to a caller identity
    fn identify(&self, token: &str) -> Option<Caller>;

    /// Whether `caller` may open a terminal on `target`
    fn may_open_terminal(&self, caller: &Caller, target: TargetId) -> bool;
}
