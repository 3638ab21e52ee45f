//! tg-core: Core abstractions and configuration for termgate
//!
//! This crate provides the shared types, error taxonomy, collaborator traits
//! and configuration structures used by the terminal gateway.

pub mod config;
pub mod error;
pub mod traits;
pub mod types;

pub use error::GatewayError;
pub use types::{BridgeState, Caller, Role, SessionKey, TargetId, TargetProfile};
