//! Shared types for the sams acquisition service.
//!
//! Everything that crosses a crate boundary lives here: the per-session
//! configuration, the session model mutated by the acquisition engine, the
//! vendor error taxonomy and the messages published through the status hub.

pub mod config;
pub mod errors;
pub mod events;
pub mod session;

pub use config::*;
pub use errors::*;
pub use events::*;
pub use session::*;
