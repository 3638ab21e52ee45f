//! Device inventory trait

use async_trait::async_trait;

use crate::error::DirectoryError;
use crate::types::{TargetId, TargetProfile};

/// Source of target connection profiles.
///
/// Profiles are fetched once per session open and never cached by the
/// gateway, so implementations should return current credentials.
#[async_trait]
pub trait TargetDirectory: Send + Sync {
    /// Fetch the profile for a target.
    ///
    /// Returns `Ok(None)` when the target has no stored profile.
    async fn resolve(&self, target: TargetId) -> Result<Option<TargetProfile>, DirectoryError>;
}
