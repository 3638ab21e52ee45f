//! Shell bridge lifecycle
//!
//! A bridge moves through `Connecting -> Active -> Closing -> Closed`. The
//! transition into `Closing` is a single compare-and-swap, so whichever of
//! the client loop, the output worker, or shutdown gets there first performs
//! teardown and every other caller returns immediately.
//!
//! # Output worker
//!
//! Activation spawns one task per bridge that reads the remote shell into a
//! fixed buffer and forwards each chunk as text. It ends on:
//! - EOF from the shell (the remote side exited)
//! - a read error
//! - the client channel refusing a frame
//! - cancellation when another caller starts teardown
//!
//! Every exit path runs [`ShellBridge::close`].
//!
//! # Teardown
//!
//! The winning caller removes the registry entry (only if it still points at
//! this bridge), cancels the worker, shuts the shell input, disconnects the
//! link, and closes the client channel with the given reason.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex};

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use tg_core::error::{BridgeError, RegistryError};
use tg_core::types::{BridgeState, SessionKey, TargetId};

use super::decoder::Utf8Decoder;
use super::outbound::Outbound;
use crate::classify::CloseReason;
use crate::connection::{RemoteShell, ShellLink, ShellReader, ShellWriter};
use crate::session::SessionRegistry;

/// Pairs one client channel with one remote shell
pub struct ShellBridge {
    session: SessionKey,
    target: TargetId,
    address: String,
    state: AtomicU8,
    input: tokio::sync::Mutex<Option<ShellWriter>>,
    /// Held until the output worker takes it
    output: Mutex<Option<ShellReader>>,
    link: Box<dyn ShellLink>,
    outbound: Arc<dyn Outbound>,
    registry: Arc<SessionRegistry>,
    cancel: CancellationToken,
    buffer_size: usize,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl ShellBridge {
    /// Wrap an established shell; the bridge starts in `Connecting`.
    ///
    /// # Arguments
    ///
    /// * `session` - Key the bridge registers under
    /// * `target` - Target the shell was opened on
    /// * `shell` - Streams and link of the remote shell, owned from here on
    /// * `outbound` - Client channel that receives output and the close frame
    /// * `registry` - Registry the bridge joins on activation
    /// * `buffer_size` - Size of the output worker's read buffer
    pub fn new(
        session: SessionKey,
        target: TargetId,
        shell: RemoteShell,
        outbound: Arc<dyn Outbound>,
        registry: Arc<SessionRegistry>,
        buffer_size: usize,
    ) -> Arc<Self> {
        Arc::new(Self {
            session,
            target,
            address: shell.address,
            state: AtomicU8::new(BridgeState::Connecting as u8),
            input: tokio::sync::Mutex::new(Some(shell.writer)),
            output: Mutex::new(Some(shell.reader)),
            link: shell.link,
            outbound,
            registry,
            cancel: CancellationToken::new(),
            buffer_size: buffer_size.max(1),
            worker: Mutex::new(None),
        })
    }

    /// Register the bridge and start forwarding shell output.
    ///
    /// A bridge closed before activation stays closed and unregistered.
    ///
    /// # Errors
    ///
    /// [`RegistryError::DuplicateSession`] if the session key is already
    /// taken. Nothing is registered; the caller still owns the shell and
    /// should [`close`](Self::close) it.
    pub fn activate(self: &Arc<Self>) -> Result<(), RegistryError> {
        self.registry.register(Arc::clone(self))?;

        if self
            .state
            .compare_exchange(
                BridgeState::Connecting as u8,
                BridgeState::Active as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_err()
        {
            // Closed while registering
            self.registry.remove_if_same(self);
            return Ok(());
        }

        let reader = self.output.lock().unwrap_or_else(|e| e.into_inner()).take();
        if let Some(reader) = reader {
            let handle = tokio::spawn(Arc::clone(self).pump_output(reader));
            *self.worker.lock().unwrap_or_else(|e| e.into_inner()) = Some(handle);
        }

        tracing::info!(
            "Session {} active on target {} ({})",
            self.session,
            self.target,
            self.address
        );
        Ok(())
    }

    /// Write client input to the shell, in full, in call order
    pub async fn write_input(&self, data: &[u8]) -> Result<(), BridgeError> {
        let state = self.state();
        if state != BridgeState::Active {
            return Err(BridgeError::Protocol { state });
        }

        let mut input = self.input.lock().await;
        let writer = input.as_mut().ok_or(BridgeError::Protocol {
            state: self.state(),
        })?;
        writer.write_all(data).await?;
        writer.flush().await?;
        Ok(())
    }

    /// Tear the session down. Safe to call any number of times from any task.
    pub async fn close(&self) {
        self.close_with(None).await;
    }

    /// Tear the session down, reporting `reason` to the client
    pub async fn close_with(&self, reason: Option<&CloseReason>) {
        if !self.begin_close() {
            return;
        }

        self.registry.remove_if_same(self);
        self.cancel.cancel();

        // A write in flight keeps the lock; disconnecting below unblocks it
        if let Ok(mut input) = self.input.try_lock() {
            if let Some(mut writer) = input.take() {
                let _ = writer.shutdown().await;
            }
        }
        drop(self.output.lock().unwrap_or_else(|e| e.into_inner()).take());

        self.link.disconnect().await;
        self.outbound.close(reason).await;

        self.state
            .store(BridgeState::Closed as u8, Ordering::Release);
        tracing::info!(
            "Session {} closed (target {}, {})",
            self.session,
            self.target,
            self.address
        );
    }

    /// Claim teardown; only the first caller wins
    fn begin_close(&self) -> bool {
        [BridgeState::Connecting, BridgeState::Active]
            .into_iter()
            .any(|from| {
                self.state
                    .compare_exchange(
                        from as u8,
                        BridgeState::Closing as u8,
                        Ordering::AcqRel,
                        Ordering::Acquire,
                    )
                    .is_ok()
            })
    }

    async fn pump_output(self: Arc<Self>, mut reader: ShellReader) {
        let mut buf = vec![0u8; self.buffer_size];
        let mut decoder = Utf8Decoder::new();

        loop {
            let text = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                read = reader.read(&mut buf) => match read {
                    Ok(0) => {
                        tracing::debug!("Session {}: remote shell closed", self.session);
                        let tail = decoder.finish();
                        if !tail.is_empty() {
                            let _ = self.outbound.send_text(tail).await;
                        }
                        break;
                    }
                    Ok(n) => {
                        tracing::trace!("Session {}: {} byte(s) from shell", self.session, n);
                        decoder.decode(&buf[..n])
                    }
                    Err(e) => {
                        tracing::warn!(
                            "Session {}: shell read failed on target {} ({}): {}",
                            self.session,
                            self.target,
                            self.address,
                            e
                        );
                        break;
                    }
                },
            };

            if text.is_empty() {
                continue;
            }

            let sent = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                sent = self.outbound.send_text(text) => sent,
            };
            if let Err(e) = sent {
                tracing::debug!("Session {}: {}", self.session, e);
                break;
            }
        }

        drop(reader);
        self.close().await;
    }

    /// Resolves once teardown has started
    pub async fn closed(&self) {
        self.cancel.cancelled().await
    }

    /// Wait for the output worker to exit
    pub async fn wait_worker(&self) {
        let handle = self.worker.lock().unwrap_or_else(|e| e.into_inner()).take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
    }

    pub fn session(&self) -> SessionKey {
        self.session
    }

    pub fn target(&self) -> TargetId {
        self.target
    }

    /// `host:port` of the remote shell
    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn state(&self) -> BridgeState {
        BridgeState::from_u8(self.state.load(Ordering::Acquire))
    }
}

impl std::fmt::Debug for ShellBridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShellBridge")
            .field("session", &self.session)
            .field("target", &self.target)
            .field("address", &self.address)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}
