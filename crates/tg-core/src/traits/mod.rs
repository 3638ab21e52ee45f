//! Traits for the collaborators the gateway consumes but does not own

mod access;
mod directory;

pub use access::AccessPolicy;
pub use directory::TargetDirectory;
