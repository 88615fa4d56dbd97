//! Service crate of the delivery-slot acquisition tool.
//!
//! Hosts the HTTP/WebSocket API in front of the acquisition
//! [`Controller`](sams_core::Controller); the binary in `main.rs` wires it to
//! the configuration file and the command line.

pub mod api;
