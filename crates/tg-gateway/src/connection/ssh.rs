//! SSH shell connector
//!
//! Opens a password-authenticated SSH session to a target, requests a pty and
//! an interactive shell, and exposes the channel as a byte stream.

use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use russh::client::{self, Config, Handle, Msg};
use russh::{Channel, Disconnect};
use russh_keys::key::PublicKey;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::time::timeout;

use tg_core::config::{HostKeyPolicy, SshConfig};
use tg_core::error::ConnectError;
use tg_core::types::TargetProfile;

use super::factory::{RemoteShell, ShellConnector, ShellLink};
use super::known_hosts::{HostKeyVerdict, KnownHosts};
use crate::classify::{from_ssh_error, timed_out};

type Rejection = Arc<Mutex<Option<String>>>;

type ChannelSignal = Pin<Box<dyn AsyncWrite + Send>>;

/// Upper bound on signalling EOF before the transport is dropped
const EOF_TIMEOUT: Duration = Duration::from_millis(500);

/// Connects to targets over SSH using the stored password
pub struct SshConnector {
    config: SshConfig,
    known_hosts: Arc<KnownHosts>,
}

impl SshConnector {
    pub fn new(config: SshConfig) -> std::io::Result<Self> {
        let known_hosts = KnownHosts::load(config.known_hosts_path.clone())?;
        Ok(Self::with_known_hosts(config, Arc::new(known_hosts)))
    }

    pub fn with_known_hosts(config: SshConfig, known_hosts: Arc<KnownHosts>) -> Self {
        if config.host_key_policy == HostKeyPolicy::InsecureAcceptAny {
            tracing::warn!("Host key verification is disabled for all targets");
        }
        Self {
            config,
            known_hosts,
        }
    }

    /// Establish the transport and log in with the profile's password.
    ///
    /// Only the TCP connect and SSH handshake count against
    /// `connect_timeout`; the password exchange has its own `auth_timeout`,
    /// so a server that is slow to reject still yields [`ConnectError::Auth`].
    async fn authenticate(
        &self,
        profile: &TargetProfile,
        address: &str,
    ) -> Result<Handle<HostKeyChecker>, ConnectError> {
        let rejection: Rejection = Arc::new(Mutex::new(None));
        let checker = HostKeyChecker {
            policy: self.config.host_key_policy,
            address: address.to_string(),
            pinned: profile.host_key.clone(),
            known_hosts: Arc::clone(&self.known_hosts),
            rejection: Arc::clone(&rejection),
        };

        let ssh_config = Arc::new(Config::default());
        let mut handle = timeout(
            self.config.connect_timeout,
            client::connect(ssh_config, (profile.host.as_str(), profile.port), checker),
        )
        .await
        .map_err(|_| timed_out(address, "SSH connect", self.config.connect_timeout))?
        .map_err(|e| from_ssh_error(address, e, take_rejection(&rejection)))?;

        tracing::debug!("Authenticating to {} as '{}'", address, profile.username);
        let authenticated = timeout(
            self.config.auth_timeout,
            handle.authenticate_password(&profile.username, &profile.password),
        )
        .await
        .map_err(|_| timed_out(address, "SSH authentication", self.config.auth_timeout))?
        .map_err(|e| from_ssh_error(address, e, None))?;

        if !authenticated {
            disconnect(&handle, "authentication failed").await;
            return Err(ConnectError::Auth {
                username: profile.username.clone(),
                address: address.to_string(),
            });
        }

        Ok(handle)
    }

    async fn open_channel(&self, handle: &Handle<HostKeyChecker>) -> Result<Channel<Msg>, russh::Error> {
        let channel = handle.channel_open_session().await?;
        channel
            .request_pty(
                false,
                &self.config.term,
                self.config.cols,
                self.config.rows,
                0,
                0,
                &[],
            )
            .await?;
        channel.request_shell(false).await?;
        Ok(channel)
    }
}

#[async_trait]
impl ShellConnector for SshConnector {
    async fn open_shell(&self, profile: &TargetProfile) -> Result<RemoteShell, ConnectError> {
        let address = profile.address();
        let handle = self.authenticate(profile, &address).await?;

        let channel = match timeout(self.config.channel_open_timeout, self.open_channel(&handle)).await
        {
            Ok(Ok(channel)) => channel,
            Ok(Err(e)) => {
                disconnect(&handle, "shell request failed").await;
                return Err(ConnectError::Channel {
                    address,
                    message: e.to_string(),
                });
            }
            Err(_) => {
                disconnect(&handle, "shell request timed out").await;
                return Err(ConnectError::Channel {
                    address,
                    message: format!(
                        "opening shell timed out after {:?}",
                        self.config.channel_open_timeout
                    ),
                });
            }
        };

        tracing::debug!("Shell channel {} open on {}", channel.id(), address);
        let eof: ChannelSignal = Box::pin(channel.make_writer());
        let (reader, writer) = tokio::io::split(channel.into_stream());

        Ok(RemoteShell {
            address,
            reader: Box::new(reader),
            writer: Box::new(writer),
            link: Box::new(SshLink {
                handle,
                eof: tokio::sync::Mutex::new(eof),
            }),
        })
    }
}

/// Owns the SSH session behind an open shell
struct SshLink {
    handle: Handle<HostKeyChecker>,
    /// Second sender on the shell channel, usable while the bridge's writer
    /// is locked
    eof: tokio::sync::Mutex<ChannelSignal>,
}

#[async_trait]
impl ShellLink for SshLink {
    async fn disconnect(&self) {
        let mut eof = self.eof.lock().await;
        match timeout(EOF_TIMEOUT, eof.shutdown()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::debug!("Shell channel EOF: {}", e),
            Err(_) => tracing::debug!("Shell channel EOF not sent within {:?}", EOF_TIMEOUT),
        }
        disconnect(&self.handle, "terminal closed").await;
    }
}

async fn disconnect(handle: &Handle<HostKeyChecker>, description: &str) {
    if let Err(e) = handle
        .disconnect(Disconnect::ByApplication, description, "en")
        .await
    {
        tracing::debug!("SSH disconnect: {}", e);
    }
}

fn take_rejection(rejection: &Rejection) -> Option<String> {
    rejection.lock().unwrap_or_else(|e| e.into_inner()).take()
}

/// Client handler that applies the host key policy
struct HostKeyChecker {
    policy: HostKeyPolicy,
    address: String,
    pinned: Option<String>,
    known_hosts: Arc<KnownHosts>,
    rejection: Rejection,
}

#[async_trait]
impl client::Handler for HostKeyChecker {
    type Error = russh::Error;

    async fn check_server_key(
        &mut self,
        server_public_key: &PublicKey,
    ) -> Result<bool, Self::Error> {
        let fingerprint = server_public_key.fingerprint();
        tracing::debug!("Server host key for {}: {}", self.address, fingerprint);

        match self.known_hosts.check(
            self.policy,
            &self.address,
            self.pinned.as_deref(),
            &fingerprint,
        ) {
            HostKeyVerdict::Trusted => Ok(true),
            HostKeyVerdict::Rejected(reason) => {
                tracing::warn!("Rejecting host key for {}: {}", self.address, reason);
                *self.rejection.lock().unwrap_or_else(|e| e.into_inner()) = Some(reason);
                Ok(false)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use russh::server::{self as ssh_server, Auth, Msg as ServerMsg, Session};
    use russh::ChannelId;
    use russh_keys::key::KeyPair;
    use tempfile::TempDir;
    use tg_core::error::NetworkKind;
    use tokio::sync::mpsc;

    const WAIT: Duration = Duration::from_secs(5);

    /// What the in-process SSH server saw
    #[derive(Debug, PartialEq)]
    enum ServerEvent {
        Shell,
        Eof,
    }

    /// Accepts the password "pw" and opens shells that never print anything
    struct TestTarget {
        events: mpsc::UnboundedSender<ServerEvent>,
        channels: Vec<russh::Channel<ServerMsg>>,
    }

    #[async_trait]
    impl ssh_server::Handler for TestTarget {
        type Error = russh::Error;

        async fn auth_password(&mut self, _user: &str, password: &str) -> Result<Auth, Self::Error> {
            if password == "pw" {
                Ok(Auth::Accept)
            } else {
                Ok(Auth::Reject {
                    proceed_with_methods: None,
                })
            }
        }

        async fn channel_open_session(
            &mut self,
            channel: russh::Channel<ServerMsg>,
            _session: &mut Session,
        ) -> Result<bool, Self::Error> {
            self.channels.push(channel);
            Ok(true)
        }

        async fn shell_request(
            &mut self,
            _channel: ChannelId,
            _session: &mut Session,
        ) -> Result<(), Self::Error> {
            let _ = self.events.send(ServerEvent::Shell);
            Ok(())
        }

        async fn channel_eof(
            &mut self,
            _channel: ChannelId,
            _session: &mut Session,
        ) -> Result<(), Self::Error> {
            let _ = self.events.send(ServerEvent::Eof);
            Ok(())
        }
    }

    /// Serve one SSH connection on a loopback port.
    ///
    /// Password rejections are delayed by `reject_delay`. The returned task
    /// finishes when the client's connection ends.
    async fn spawn_target(
        reject_delay: Duration,
    ) -> (u16, mpsc::UnboundedReceiver<ServerEvent>, tokio::task::JoinHandle<()>) {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let mut config = ssh_server::Config::default();
        config.keys.push(KeyPair::generate_ed25519().unwrap());
        config.auth_rejection_time = reject_delay;
        config.auth_rejection_time_initial = Some(Duration::ZERO);
        let config = Arc::new(config);

        let (events, rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            let handler = TestTarget {
                events,
                channels: Vec::new(),
            };
            if let Ok(session) = ssh_server::run_stream(config, socket, handler).await {
                let _ = session.await;
            }
        });
        (port, rx, task)
    }

    fn connector(dir: &TempDir) -> SshConnector {
        let config = SshConfig {
            connect_timeout: Duration::from_secs(2),
            known_hosts_path: dir.path().join("known_hosts"),
            ..SshConfig::default()
        };
        SshConnector::new(config).unwrap()
    }

    #[tokio::test]
    async fn test_refused_port_is_classified() {
        let dir = TempDir::new().unwrap();
        // Bind then drop to get a port with nothing listening
        let port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };

        let profile = TargetProfile::new("127.0.0.1", "root", "pw").with_port(port);
        let err = connector(&dir).open_shell(&profile).await.unwrap_err();
        match err {
            ConnectError::Network { kind, address, .. } => {
                assert_eq!(kind, NetworkKind::Refused);
                assert_eq!(address, format!("127.0.0.1:{}", port));
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_silent_server_times_out() {
        let dir = TempDir::new().unwrap();
        // Accepts TCP but never speaks SSH
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let _accept = tokio::spawn(async move {
            let (_socket, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(30)).await;
        });

        let mut connector = connector(&dir);
        connector.config.connect_timeout = Duration::from_millis(200);

        let profile = TargetProfile::new("127.0.0.1", "root", "pw").with_port(port);
        let err = connector.open_shell(&profile).await.unwrap_err();
        match err {
            ConnectError::Network { kind, .. } => assert_eq!(kind, NetworkKind::Timeout),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_slow_password_rejection_is_auth_failure() {
        let dir = TempDir::new().unwrap();
        let (port, _events, _server) = spawn_target(Duration::from_millis(2500)).await;

        // The rejection arrives after the connect deadline has passed
        let profile = TargetProfile::new("127.0.0.1", "root", "wrong").with_port(port);
        let err = connector(&dir).open_shell(&profile).await.unwrap_err();
        match err {
            ConnectError::Auth { username, address } => {
                assert_eq!(username, "root");
                assert_eq!(address, format!("127.0.0.1:{}", port));
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_auth_timeout_is_network_timeout() {
        let dir = TempDir::new().unwrap();
        let (port, _events, _server) = spawn_target(Duration::from_secs(10)).await;

        let mut connector = connector(&dir);
        connector.config.auth_timeout = Duration::from_millis(300);

        let profile = TargetProfile::new("127.0.0.1", "root", "wrong").with_port(port);
        match connector.open_shell(&profile).await.unwrap_err() {
            ConnectError::Network { kind, message, .. } => {
                assert_eq!(kind, NetworkKind::Timeout);
                assert!(message.contains("authentication"));
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_disconnect_sends_eof_then_drops_transport() {
        let dir = TempDir::new().unwrap();
        let (port, mut events, server) = spawn_target(Duration::from_millis(100)).await;

        let profile = TargetProfile::new("127.0.0.1", "root", "pw").with_port(port);
        let shell = connector(&dir).open_shell(&profile).await.unwrap();
        assert_eq!(
            timeout(WAIT, events.recv()).await.unwrap(),
            Some(ServerEvent::Shell)
        );

        shell.link.disconnect().await;
        assert_eq!(
            timeout(WAIT, events.recv()).await.unwrap(),
            Some(ServerEvent::Eof)
        );
        timeout(WAIT, server)
            .await
            .expect("server still connected")
            .unwrap();
    }
}
