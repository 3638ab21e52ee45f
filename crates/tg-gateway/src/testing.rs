//! In-memory doubles for unit tests

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};
use tokio::sync::mpsc;

use tg_core::error::{ConnectError, NetworkKind};
use tg_core::types::TargetProfile;

use crate::bridge::{ClientGone, Outbound};
use crate::classify::CloseReason;
use crate::connection::{RemoteShell, ShellConnector, ShellLink};

const PIPE_CAPACITY: usize = 64 * 1024;
const WAIT: Duration = Duration::from_secs(5);

/// Hosts that make [`ScriptedConnector`] fail in a particular way
pub struct ShellScript;

impl ShellScript {
    pub const AUTH_FAIL: &'static str = "auth-fail.test";
    pub const REFUSED: &'static str = "refused.test";
}

/// The far end of a fake shell, as seen by the "remote host"
pub struct FakeRemote {
    pub address: String,
    pub stream: DuplexStream,
    pub disconnects: Arc<AtomicUsize>,
}

impl FakeRemote {
    /// Read exactly `len` bytes the gateway wrote to the shell
    pub async fn read_input(&mut self, len: usize) -> String {
        let mut buf = vec![0u8; len];
        tokio::time::timeout(WAIT, self.stream.read_exact(&mut buf))
            .await
            .expect("timed out reading shell input")
            .expect("shell input stream failed");
        String::from_utf8(buf).unwrap()
    }

    /// Emit output as the remote shell
    pub async fn write_output(&mut self, data: &[u8]) {
        self.stream.write_all(data).await.unwrap();
        self.stream.flush().await.unwrap();
    }

    pub fn disconnect_count(&self) -> usize {
        self.disconnects.load(Ordering::SeqCst)
    }
}

struct CountingLink {
    disconnects: Arc<AtomicUsize>,
}

#[async_trait]
impl ShellLink for CountingLink {
    async fn disconnect(&self) {
        self.disconnects.fetch_add(1, Ordering::SeqCst);
    }
}

/// Build a connected pair of (gateway side, remote side)
pub fn fake_shell(address: &str) -> (RemoteShell, FakeRemote) {
    let (local, remote) = tokio::io::duplex(PIPE_CAPACITY);
    let (reader, writer) = tokio::io::split(local);
    let disconnects = Arc::new(AtomicUsize::new(0));

    let shell = RemoteShell {
        address: address.to_string(),
        reader: Box::new(reader),
        writer: Box::new(writer),
        link: Box::new(CountingLink {
            disconnects: Arc::clone(&disconnects),
        }),
    };
    let remote = FakeRemote {
        address: address.to_string(),
        stream: remote,
        disconnects,
    };
    (shell, remote)
}

/// Connector that fails for the [`ShellScript`] hosts and otherwise hands
/// out in-memory shells, publishing each remote end on a channel
pub struct ScriptedConnector {
    remotes: mpsc::UnboundedSender<FakeRemote>,
}

impl ScriptedConnector {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<FakeRemote>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { remotes: tx }, rx)
    }
}

#[async_trait]
impl ShellConnector for ScriptedConnector {
    async fn open_shell(&self, profile: &TargetProfile) -> Result<RemoteShell, ConnectError> {
        let address = profile.address();
        match profile.host.as_str() {
            ShellScript::AUTH_FAIL => Err(ConnectError::Auth {
                username: profile.username.clone(),
                address,
            }),
            ShellScript::REFUSED => Err(ConnectError::Network {
                kind: NetworkKind::Refused,
                address,
                message: "Connection refused (os error 111)".to_string(),
            }),
            _ => {
                let (shell, remote) = fake_shell(&address);
                let _ = self.remotes.send(remote);
                Ok(shell)
            }
        }
    }
}

/// What a [`RecordingOutbound`] observed
#[derive(Debug, Clone, PartialEq)]
pub enum OutboundEvent {
    Text(String),
    Closed(Option<CloseReason>),
}

/// Outbound channel that reports every frame to the test
pub struct RecordingOutbound {
    events: mpsc::UnboundedSender<OutboundEvent>,
}

impl RecordingOutbound {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<OutboundEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Arc::new(Self { events: tx }), rx)
    }
}

#[async_trait]
impl Outbound for RecordingOutbound {
    async fn send_text(&self, text: String) -> Result<(), ClientGone> {
        self.events
            .send(OutboundEvent::Text(text))
            .map_err(|_| ClientGone)
    }

    async fn close(&self, reason: Option<&CloseReason>) {
        let _ = self.events.send(OutboundEvent::Closed(reason.cloned()));
    }
}

/// Wait for the next outbound event
pub async fn next_event(rx: &mut mpsc::UnboundedReceiver<OutboundEvent>) -> OutboundEvent {
    tokio::time::timeout(WAIT, rx.recv())
        .await
        .expect("timed out waiting for outbound event")
        .expect("outbound recorder dropped")
}

/// Poll `condition` until it holds or the wait budget runs out
pub async fn eventually(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + WAIT;
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    condition()
}
