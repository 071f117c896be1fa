//! Domain model for livestacks
//!
//! Core identifiers and the structured errors surfaced at startup.

pub mod errors;
pub mod types;

pub use types::{Pid, StackId};

pub use errors::{ConfigError, SessionError};
