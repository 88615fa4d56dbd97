//! Configuration types for the service.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Complete service configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ServiceConfig {
	/// HTTP listener
	#[serde(default)]
	pub service: ServiceSettings,
	/// Acquisition engine timing
	#[serde(default)]
	pub engine: EngineConfig,
	/// Status hub sizing
	#[serde(default)]
	pub hub: HubConfig,
	/// Vendor backend selection
	#[serde(default)]
	pub vendor: VendorConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServiceSettings {
	#[serde(default = "default_host")]
	pub host: String,
	#[serde(default = "default_http_port")]
	pub http_port: u16,
}

impl Default for ServiceSettings {
	fn default() -> Self {
		Self {
			host: default_host(),
			http_port: default_http_port(),
		}
	}
}

/// Timing knobs of the acquisition engine.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EngineConfig {
	/// Pause before retrying a stage, in milliseconds.
	#[serde(default = "default_backoff_ms")]
	pub backoff_ms: u64,
	/// Pause between push-notification attempts after a successful order.
	#[serde(default = "default_backoff_ms")]
	pub push_backoff_ms: u64,
}

impl EngineConfig {
	pub fn backoff(&self) -> Duration {
		Duration::from_millis(self.backoff_ms)
	}

	pub fn push_backoff(&self) -> Duration {
		Duration::from_millis(self.push_backoff_ms)
	}
}

impl Default for EngineConfig {
	fn default() -> Self {
		Self {
			backoff_ms: default_backoff_ms(),
			push_backoff_ms: default_backoff_ms(),
		}
	}
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HubConfig {
	/// Per-observer window of the live broadcast channel.
	#[serde(default = "default_channel_capacity")]
	pub channel_capacity: usize,
	/// Recent log entries kept for history readers.
	#[serde(default = "default_log_history")]
	pub log_history: usize,
	/// Recent status snapshots kept for history readers.
	#[serde(default = "default_status_history")]
	pub status_history: usize,
	/// Quiet period after which an observer gets a heartbeat.
	#[serde(default = "default_heartbeat_secs")]
	pub heartbeat_secs: u64,
}

impl HubConfig {
	pub fn heartbeat(&self) -> Duration {
		Duration::from_secs(self.heartbeat_secs)
	}
}

impl Default for HubConfig {
	fn default() -> Self {
		Self {
			channel_capacity: default_channel_capacity(),
			log_history: default_log_history(),
			status_history: default_status_history(),
			heartbeat_secs: default_heartbeat_secs(),
		}
	}
}

/// Which vendor implementation backs new sessions.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct VendorConfig {
	#[serde(default = "default_vendor_backend")]
	pub backend: String,
	/// Backend-specific table handed to the vendor factory.
	#[serde(default = "default_vendor_table")]
	pub config: toml::Value,
}

impl Default for VendorConfig {
	fn default() -> Self {
		Self {
			backend: default_vendor_backend(),
			config: default_vendor_table(),
		}
	}
}

fn default_host() -> String {
	"0.0.0.0".to_string()
}

fn default_http_port() -> u16 {
	8080
}

fn default_backoff_ms() -> u64 {
	1000
}

fn default_channel_capacity() -> usize {
	256
}

fn default_log_history() -> usize {
	100
}

fn default_status_history() -> usize {
	10
}

fn default_heartbeat_secs() -> u64 {
	30
}

fn default_vendor_backend() -> String {
	"sandbox".to_string()
}

fn default_vendor_table() -> toml::Value {
	toml::Value::Table(toml::map::Map::new())
}
