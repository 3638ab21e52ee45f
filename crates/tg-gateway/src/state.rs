//! Global gateway state
//!
//! [`Gateway`] ties the connection factory, the session registry and the
//! access policy together. Route handlers hold it behind an `Arc`.
//!
//! # Session lifecycle
//!
//! 1. [`Gateway::open_session`] resolves the target and opens a shell
//! 2. A [`ShellBridge`] wraps the shell and registers on activation
//! 3. The bridge closes itself on remote exit, client hang-up or stream error
//! 4. [`Gateway::shutdown`] closes whatever is still registered

use std::sync::Arc;

use tg_core::config::GatewayConfig;
use tg_core::error::GatewayError;
use tg_core::traits::{AccessPolicy, TargetDirectory};
use tg_core::types::{SessionKey, TargetId};

use crate::access::TokenAccessPolicy;
use crate::bridge::{Outbound, ShellBridge};
use crate::classify::CloseReason;
use crate::connection::{ConnectionFactory, ShellConnector, SshConnector};
use crate::directory::{InventoryFile, MemoryDirectory};
use crate::session::SessionRegistry;

/// Shared state for the gateway daemon
pub struct Gateway {
    config: GatewayConfig,
    registry: Arc<SessionRegistry>,
    factory: ConnectionFactory,
    access: Arc<dyn AccessPolicy>,
}

impl Gateway {
    /// Assemble a gateway from explicit collaborators
    pub fn new(
        config: GatewayConfig,
        directory: Arc<dyn TargetDirectory>,
        connector: Arc<dyn ShellConnector>,
        access: Arc<dyn AccessPolicy>,
    ) -> Self {
        Self {
            config,
            registry: Arc::new(SessionRegistry::new()),
            factory: ConnectionFactory::new(directory, connector),
            access,
        }
    }

    /// Build the production stack described by `config`
    pub fn from_config(config: GatewayConfig) -> Result<Self, GatewayError> {
        let directory: Arc<dyn TargetDirectory> = match &config.inventory_path {
            Some(path) => {
                tracing::info!("Resolving targets from inventory {}", path.display());
                Arc::new(InventoryFile::new(path))
            }
            None => {
                let directory = MemoryDirectory::from_config(&config.targets);
                tracing::info!("Loaded {} inline target(s)", directory.len());
                Arc::new(directory)
            }
        };
        let connector = Arc::new(SshConnector::new(config.ssh.clone())?);
        let access = Arc::new(TokenAccessPolicy::new(&config.access));

        Ok(Self::new(config, directory, connector, access))
    }

    /// Live session registry
    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    pub fn access(&self) -> &dyn AccessPolicy {
        self.access.as_ref()
    }

    /// Open a terminal on `target` for `session`, delivering output to
    /// `outbound`.
    ///
    /// On failure the client channel is closed with a classified reason
    /// before the error is returned; no bridge is registered.
    ///
    /// # Arguments
    ///
    /// * `session` - Key for the new session, unique per client channel
    /// * `target` - Target id taken from the request path
    /// * `outbound` - Client channel for shell output and the close frame
    ///
    /// # Errors
    ///
    /// [`GatewayError::Connect`] when the target cannot be resolved or the
    /// shell cannot be opened, [`GatewayError::Registry`] when the session
    /// key is already live.
    pub async fn open_session(
        &self,
        session: SessionKey,
        target: TargetId,
        outbound: Arc<dyn Outbound>,
    ) -> Result<Arc<ShellBridge>, GatewayError> {
        let shell = match self.factory.open(target).await {
            Ok(shell) => shell,
            Err(e) => {
                let reason = CloseReason::classify(&e);
                tracing::warn!(
                    "Session {}: terminal on target {} ({}) failed [{}]: {}",
                    session,
                    target,
                    e.address().unwrap_or("unresolved"),
                    reason.label(),
                    e
                );
                outbound.close(Some(&reason)).await;
                return Err(e.into());
            }
        };

        let bridge = ShellBridge::new(
            session,
            target,
            shell,
            outbound,
            Arc::clone(&self.registry),
            self.config.ssh.read_buffer_size,
        );

        if let Err(e) = bridge.activate() {
            tracing::error!("Session {}: {}", session, e);
            bridge
                .close_with(Some(&CloseReason::Other(e.to_string())))
                .await;
            return Err(e.into());
        }

        Ok(bridge)
    }

    /// Close every live session
    pub async fn shutdown(&self) {
        let bridges = self.registry.bridges();
        if bridges.is_empty() {
            return;
        }

        tracing::info!("Closing {} live session(s)", bridges.len());
        tracing::debug!("Live sessions: {:?}", self.registry.sessions());
        futures::future::join_all(bridges.iter().map(|bridge| bridge.close())).await;
    }
}
