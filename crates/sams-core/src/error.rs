// sams-core/src/error.rs

use sams_types::VendorError;
use thiserror::Error;

/// Errors surfaced by the control surface.
///
/// Vendor failures inside a run never end up here; the engine handles them
/// through its transition tables. Only configuration and start/stop misuse
/// reach the caller.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
	#[error("already running")]
	AlreadyRunning,

	#[error("not configured")]
	NotConfigured,

	#[error("Invalid configuration: {0}")]
	InvalidConfig(String),

	#[error("Vendor error: {0}")]
	Vendor(#[from] VendorError),
}
