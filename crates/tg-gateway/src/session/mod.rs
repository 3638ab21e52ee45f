//! Live session tracking

mod registry;

pub use registry::SessionRegistry;
