//! Gateway listener
//!
//! Binds the HTTP listener, serves the router until cancelled, then closes
//! every live session.

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use super::routes::router;
use crate::state::Gateway;

/// HTTP server hosting the terminal endpoint
pub struct GatewayServer {
    gateway: Arc<Gateway>,
    cancel: CancellationToken,
}

impl GatewayServer {
    pub fn new(gateway: Arc<Gateway>, cancel: CancellationToken) -> Self {
        Self { gateway, cancel }
    }

    /// Bind `bind_addr` and serve until cancelled
    pub async fn run(&self, bind_addr: &str) -> Result<()> {
        let listener = TcpListener::bind(bind_addr)
            .await
            .with_context(|| format!("Failed to bind to {}", bind_addr))?;
        self.serve(listener).await
    }

    /// Serve on an already bound listener until cancelled
    pub async fn serve(&self, listener: TcpListener) -> Result<()> {
        let local_addr = listener.local_addr()?;
        tracing::info!("Terminal gateway listening on {}", local_addr);

        let cancel = self.cancel.clone();
        let gateway = Arc::clone(&self.gateway);
        let shutdown = async move {
            cancel.cancelled().await;
            tracing::info!("Terminal gateway shutting down");
            // Upgraded sockets are not part of the graceful drain
            gateway.shutdown().await;
        };

        axum::serve(listener, router(Arc::clone(&self.gateway)))
            .with_graceful_shutdown(shutdown)
            .await
            .context("HTTP server failed")?;

        self.gateway.shutdown().await;
        Ok(())
    }
}
