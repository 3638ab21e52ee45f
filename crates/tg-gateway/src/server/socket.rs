//! Per-connection WebSocket loop
//!
//! While the shell is being opened, client frames are read and dropped so
//! that a client hanging up abandons the attempt. Once the bridge is active,
//! every text or binary frame is written to the shell as-is.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::extract::ws::{close_code, CloseFrame, Message, WebSocket};
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use tokio::sync::Mutex;

use tg_core::error::BridgeError;
use tg_core::types::{BridgeState, SessionKey, TargetId};

use crate::bridge::{ClientGone, Outbound};
use crate::classify::{CloseReason, CLOSE_CANNOT_ACCEPT};
use crate::state::Gateway;

/// Upper bound on delivering a close frame to an unresponsive client
const CLOSE_SEND_TIMEOUT: Duration = Duration::from_secs(2);

/// Outbound half of an upgraded WebSocket
pub struct WsOutbound {
    sink: Mutex<SplitSink<WebSocket, Message>>,
    closed: AtomicBool,
}

impl WsOutbound {
    pub fn new(sink: SplitSink<WebSocket, Message>) -> Self {
        Self {
            sink: Mutex::new(sink),
            closed: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl Outbound for WsOutbound {
    async fn send_text(&self, text: String) -> Result<(), ClientGone> {
        if self.closed.load(Ordering::Acquire) {
            return Err(ClientGone);
        }
        self.sink
            .lock()
            .await
            .send(Message::Text(text))
            .await
            .map_err(|_| ClientGone)
    }

    async fn close(&self, reason: Option<&CloseReason>) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }

        let frame = match reason {
            Some(reason) => CloseFrame {
                code: CLOSE_CANNOT_ACCEPT,
                reason: reason.frame_text().into(),
            },
            None => CloseFrame {
                code: close_code::NORMAL,
                reason: "".into(),
            },
        };

        let mut sink = self.sink.lock().await;
        let sent = tokio::time::timeout(CLOSE_SEND_TIMEOUT, async {
            sink.send(Message::Close(Some(frame))).await?;
            sink.close().await
        })
        .await;
        if !matches!(sent, Ok(Ok(()))) {
            tracing::debug!("Client did not take the close frame");
        }
    }
}

/// Drive one terminal connection from upgrade to teardown
pub async fn serve_terminal(
    gateway: Arc<Gateway>,
    socket: WebSocket,
    session: SessionKey,
    target: TargetId,
) {
    let (sink, mut stream) = socket.split();
    let outbound = Arc::new(WsOutbound::new(sink));

    let open = gateway.open_session(session, target, Arc::clone(&outbound) as Arc<dyn Outbound>);
    tokio::pin!(open);

    let bridge = loop {
        tokio::select! {
            result = &mut open => match result {
                Ok(bridge) => break bridge,
                // Logged and reported to the client by open_session
                Err(_) => return,
            },
            frame = stream.next() => match frame {
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => {
                    tracing::info!(
                        "Session {}: client left while connecting to target {}",
                        session,
                        target
                    );
                    return;
                }
                Some(Ok(_)) => {
                    tracing::debug!("Session {}: dropping frame received while connecting", session);
                }
            },
        }
    };

    loop {
        let frame = tokio::select! {
            _ = bridge.closed() => break,
            frame = stream.next() => frame,
        };

        let data = match frame {
            Some(Ok(Message::Text(text))) => text.into_bytes(),
            Some(Ok(Message::Binary(bytes))) => bytes,
            Some(Ok(Message::Close(_))) | None => {
                tracing::debug!("Session {}: client closed the channel", session);
                break;
            }
            Some(Ok(_)) => continue,
            Some(Err(e)) => {
                tracing::debug!("Session {}: client channel error: {}", session, e);
                break;
            }
        };

        tracing::trace!("Session {}: {} byte(s) from client", session, data.len());
        match bridge.write_input(&data).await {
            Ok(()) => {}
            Err(BridgeError::Protocol { state }) => {
                tracing::debug!("Session {}: input dropped while {}", session, state);
                if matches!(state, BridgeState::Closing | BridgeState::Closed) {
                    break;
                }
            }
            Err(e) => {
                tracing::warn!(
                    "Session {}: shell write failed on target {} ({}): {}",
                    session,
                    bridge.target(),
                    bridge.address(),
                    e
                );
                break;
            }
        }
    }

    bridge.close().await;
}
