//! Target resolution and shell establishment

use std::sync::Arc;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite};

use tg_core::error::ConnectError;
use tg_core::traits::TargetDirectory;
use tg_core::types::{TargetId, TargetProfile};

/// Output stream of a remote shell
pub type ShellReader = Box<dyn AsyncRead + Send + Unpin>;

/// Input stream of a remote shell
pub type ShellWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Releases the shell channel and the transport it runs on
#[async_trait]
pub trait ShellLink: Send + Sync {
    /// Signal EOF on the shell channel, then disconnect the transport
    /// connection
    async fn disconnect(&self);
}

/// An established interactive shell: byte streams plus the connection
/// that carries them. Owned by exactly one bridge.
pub struct RemoteShell {
    /// `host:port` of the remote end
    pub address: String,
    pub reader: ShellReader,
    pub writer: ShellWriter,
    pub link: Box<dyn ShellLink>,
}

impl std::fmt::Debug for RemoteShell {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteShell")
            .field("address", &self.address)
            .finish_non_exhaustive()
    }
}

/// Opens a pty-backed interactive shell for a resolved profile
#[async_trait]
pub trait ShellConnector: Send + Sync {
    async fn open_shell(&self, profile: &TargetProfile) -> Result<RemoteShell, ConnectError>;
}

/// Resolves a target id to a live remote shell
pub struct ConnectionFactory {
    directory: Arc<dyn TargetDirectory>,
    connector: Arc<dyn ShellConnector>,
}

impl ConnectionFactory {
    pub fn new(directory: Arc<dyn TargetDirectory>, connector: Arc<dyn ShellConnector>) -> Self {
        Self {
            directory,
            connector,
        }
    }

    /// Fetch the target's current profile and open a shell on it.
    ///
    /// The profile is fetched on every call; nothing is cached here.
    pub async fn open(&self, target: TargetId) -> Result<RemoteShell, ConnectError> {
        let profile = self
            .directory
            .resolve(target)
            .await?
            .ok_or(ConnectError::Resolution(target))?;

        tracing::debug!(
            "Opening shell on target {} as {}@{}",
            target,
            profile.username,
            profile.address()
        );

        self.connector.open_shell(&profile).await
    }
}
