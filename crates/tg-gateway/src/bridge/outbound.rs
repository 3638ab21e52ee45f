//! Client-facing side of a bridge

use async_trait::async_trait;
use thiserror::Error;

use crate::classify::CloseReason;

/// The browser channel went away while output was being delivered
#[derive(Debug, Error)]
#[error("client channel closed")]
pub struct ClientGone;

/// Outbound half of a terminal session's duplex channel
#[async_trait]
pub trait Outbound: Send + Sync {
    /// Deliver one chunk of shell output as a single text frame
    async fn send_text(&self, text: String) -> Result<(), ClientGone>;

    /// Close the channel, reporting `reason` when the session failed to open
    async fn close(&self, reason: Option<&CloseReason>);
}
