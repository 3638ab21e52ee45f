//! Shell bridges: one browser channel paired with one remote shell

mod decoder;
mod outbound;
mod shell;

pub use decoder::Utf8Decoder;
pub use outbound::{ClientGone, Outbound};
pub use shell::ShellBridge;
