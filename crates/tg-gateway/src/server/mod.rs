//! HTTP/WebSocket front end

mod listener;
mod routes;
mod socket;

pub use listener::GatewayServer;
pub use routes::{router, TerminalGrant};
pub use socket::{serve_terminal, WsOutbound};
