//! tg-gateway: browser terminals onto remote SSH shells
//!
//! Each WebSocket on `/terminal/{target_id}` is authorized, resolved to the
//! target's stored profile, and paired with a pty-backed SSH shell. Shell
//! output flows back as text frames; client frames flow in as keystrokes.
//! Either side closing tears the whole session down exactly once.

pub mod access;
pub mod bridge;
pub mod classify;
pub mod connection;
pub mod directory;
pub mod server;
pub mod session;
pub mod state;

#[cfg(test)]
mod testing;

pub use server::GatewayServer;
pub use state::Gateway;
