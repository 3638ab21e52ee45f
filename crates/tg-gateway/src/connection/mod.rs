//! Remote shell connections

mod factory;
mod known_hosts;
mod ssh;

pub use factory::{ConnectionFactory, RemoteShell, ShellConnector, ShellLink, ShellReader, ShellWriter};
pub use known_hosts::{HostKeyVerdict, KnownHosts};
pub use ssh::SshConnector;
