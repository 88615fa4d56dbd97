// sams-config/src/lib.rs

use regex::Regex;
use std::env;
use std::path::Path;
use thiserror::Error;
use tracing::debug;

pub mod types;

pub use types::*;

#[derive(Error, Debug)]
pub enum ConfigError {
	#[error("File not found: {0}")]
	FileNotFound(String),

	#[error("Parse error: {0}")]
	ParseError(String),

	#[error("Validation error: {0}")]
	ValidationError(String),

	#[error("Environment variable not found: {0}")]
	EnvVarNotFound(String),

	#[error("IO error: {0}")]
	IoError(#[from] std::io::Error),
}

/// Configuration loader with environment variable substitution
pub struct ConfigLoader {
	file_path: Option<String>,
	env_prefix: String,
}

impl Default for ConfigLoader {
	fn default() -> Self {
		Self::new()
	}
}

impl ConfigLoader {
	pub fn new() -> Self {
		Self {
			file_path: None,
			env_prefix: "SAMS_".to_string(),
		}
	}

	pub fn with_file<P: AsRef<Path>>(mut self, path: P) -> Self {
		self.file_path = Some(path.as_ref().to_string_lossy().to_string());
		self
	}

	pub fn with_env_prefix(mut self, prefix: impl Into<String>) -> Self {
		self.env_prefix = prefix.into();
		self
	}

	pub async fn load(&self) -> Result<ServiceConfig, ConfigError> {
		let mut config = if let Some(file_path) = &self.file_path {
			self.load_from_file(file_path).await?
		} else {
			return Err(ConfigError::FileNotFound(
				"No configuration file specified".to_string(),
			));
		};

		self.apply_env_overrides(&mut config)?;
		self.validate_config(&config)?;

		Ok(config)
	}

	/// Parses a TOML document after `${VAR}` substitution.
	pub fn parse(&self, content: &str) -> Result<ServiceConfig, ConfigError> {
		let substituted = self.substitute_env_vars(content)?;
		toml::from_str(&substituted).map_err(|e| ConfigError::ParseError(e.to_string()))
	}

	async fn load_from_file(&self, file_path: &str) -> Result<ServiceConfig, ConfigError> {
		let content = match tokio::fs::read_to_string(file_path).await {
			Ok(content) => content,
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
				return Err(ConfigError::FileNotFound(file_path.to_string()));
			}
			Err(e) => return Err(e.into()),
		};

		self.parse(&content)
	}

	fn substitute_env_vars(&self, content: &str) -> Result<String, ConfigError> {
		let mut result = content.to_string();

		let re = Regex::new(r"\$\{([^}]+)\}").map_err(|e| ConfigError::ParseError(e.to_string()))?;

		for cap in re.captures_iter(content) {
			let full_match = &cap[0];
			let var_name = &cap[1];

			let env_value = env::var(var_name)
				.map_err(|_| ConfigError::EnvVarNotFound(var_name.to_string()))?;

			result = result.replace(full_match, &env_value);
		}

		Ok(result)
	}

	fn apply_env_overrides(&self, config: &mut ServiceConfig) -> Result<(), ConfigError> {
		if let Ok(http_port) = env::var(format!("{}HTTP_PORT", self.env_prefix)) {
			debug!("Overriding HTTP port from environment");
			config.service.http_port = http_port
				.parse()
				.map_err(|e| ConfigError::ValidationError(format!("Invalid HTTP port: {}", e)))?;
		}

		Ok(())
	}

	fn validate_config(&self, config: &ServiceConfig) -> Result<(), ConfigError> {
		if config.vendor.backend.trim().is_empty() {
			return Err(ConfigError::ValidationError(
				"A vendor backend must be configured".to_string(),
			));
		}

		if config.hub.channel_capacity == 0 {
			return Err(ConfigError::ValidationError(
				"hub.channel_capacity must be greater than zero".to_string(),
			));
		}

		if config.hub.heartbeat_secs == 0 {
			return Err(ConfigError::ValidationError(
				"hub.heartbeat_secs must be greater than zero".to_string(),
			));
		}

		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::io::Write;

	const SAMPLE: &str = r#"
[service]
http_port = 9090

[engine]
backoff_ms = 250

[hub]
heartbeat_secs = 15

[vendor]
backend = "sandbox"

[vendor.config]
fixture = "${SAMS_TEST_FIXTURE_PATH}"
"#;

	#[test]
	fn test_defaults_fill_missing_sections() {
		let config = ConfigLoader::new().parse("").unwrap();
		assert_eq!(config.service.http_port, 8080);
		assert_eq!(config.engine.backoff_ms, 1000);
		assert_eq!(config.hub.log_history, 100);
		assert_eq!(config.hub.status_history, 10);
		assert_eq!(config.hub.heartbeat_secs, 30);
		assert_eq!(config.vendor.backend, "sandbox");
	}

	#[test]
	fn test_missing_env_var_is_reported() {
		let err = ConfigLoader::new()
			.parse("[service]\nhost = \"${SAMS_TEST_SURELY_UNSET_VAR}\"\n")
			.unwrap_err();
		assert!(matches!(err, ConfigError::EnvVarNotFound(name) if name == "SAMS_TEST_SURELY_UNSET_VAR"));
	}

	#[tokio::test]
	async fn test_load_from_file_with_substitution() {
		env::set_var("SAMS_TEST_FIXTURE_PATH", "fixtures/sandbox.json");

		let mut file = tempfile::NamedTempFile::new().unwrap();
		file.write_all(SAMPLE.as_bytes()).unwrap();

		let config = ConfigLoader::new()
			.with_env_prefix("SAMS_TEST_UNUSED_")
			.with_file(file.path())
			.load()
			.await
			.unwrap();

		assert_eq!(config.service.http_port, 9090);
		assert_eq!(config.engine.backoff().as_millis(), 250);
		assert_eq!(config.hub.heartbeat().as_secs(), 15);
		assert_eq!(
			config.vendor.config.get("fixture").and_then(|v| v.as_str()),
			Some("fixtures/sandbox.json")
		);
	}

	#[tokio::test]
	async fn test_env_override_port() {
		env::set_var("SAMS_OVR_HTTP_PORT", "7070");

		let file = tempfile::NamedTempFile::new().unwrap();
		let config = ConfigLoader::new()
			.with_env_prefix("SAMS_OVR_")
			.with_file(file.path())
			.load()
			.await
			.unwrap();

		assert_eq!(config.service.http_port, 7070);
	}

	#[tokio::test]
	async fn test_validation_and_missing_file() {
		let mut file = tempfile::NamedTempFile::new().unwrap();
		file.write_all(b"[hub]\nheartbeat_secs = 0\n").unwrap();

		let err = ConfigLoader::new()
			.with_env_prefix("SAMS_TEST_UNUSED_")
			.with_file(file.path())
			.load()
			.await
			.unwrap_err();
		assert!(matches!(err, ConfigError::ValidationError(_)));

		let err = ConfigLoader::new()
			.with_file("/definitely/not/here.toml")
			.load()
			.await
			.unwrap_err();
		assert!(matches!(err, ConfigError::FileNotFound(_)));

		let err = ConfigLoader::new().load().await.unwrap_err();
		assert!(matches!(err, ConfigError::FileNotFound(_)));
	}
}
