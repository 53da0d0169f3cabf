// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Centralized configuration management for the infra registry server.
//!
//! - Layered configuration from multiple sources (defaults, TOML file,
//!   environment)
//! - Type-safe sections with validation
//! - Consistent environment variable naming (`INFRA_SERVER_*`)
//!
//! ```ignore
//! let config = infra_server_config::load_config()?;
//! println!("listening on {}", config.socket_addr());
//! ```

pub mod error;
pub mod sections;
pub mod sources;

pub use error::ConfigError;
pub use sections::*;
pub use sources::{ConfigSource, DefaultsSource, EnvSource, Precedence, TomlSource};

use infra_server_secrets::{KeyProviderConfig, SecretProviderConfig};
use serde::Deserialize;
use tracing::debug;

/// Fully resolved server configuration.
#[derive(Debug, Clone, Default)]
pub struct ServerConfig {
	pub http: HttpConfig,
	pub database: DatabaseConfig,
	pub logging: LoggingConfig,
	pub auth: AuthConfig,
	pub bootstrap: BootstrapConfig,
	pub secrets: Vec<SecretProviderConfig>,
	pub keys: Vec<KeyProviderConfig>,
}

impl ServerConfig {
	/// The socket address string for binding.
	pub fn socket_addr(&self) -> String {
		format!("{}:{}", self.http.host, self.http.port)
	}
}

/// Partial configuration produced by one source.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ServerConfigLayer {
	#[serde(default)]
	pub http: Option<HttpConfigLayer>,
	#[serde(default)]
	pub database: Option<DatabaseConfigLayer>,
	#[serde(default)]
	pub logging: Option<LoggingConfigLayer>,
	#[serde(default)]
	pub auth: Option<AuthConfigLayer>,
	#[serde(default)]
	pub bootstrap: Option<BootstrapConfigLayer>,
	#[serde(default)]
	pub secrets: Option<Vec<SecretProviderConfig>>,
	#[serde(default)]
	pub keys: Option<Vec<KeyProviderConfig>>,
}

impl ServerConfigLayer {
	pub fn merge(&mut self, other: ServerConfigLayer) {
		merge_section(&mut self.http, other.http, HttpConfigLayer::merge);
		merge_section(&mut self.database, other.database, DatabaseConfigLayer::merge);
		merge_section(&mut self.logging, other.logging, LoggingConfigLayer::merge);
		merge_section(&mut self.auth, other.auth, AuthConfigLayer::merge);
		merge_section(&mut self.bootstrap, other.bootstrap, BootstrapConfigLayer::merge);
		if other.secrets.is_some() {
			self.secrets = other.secrets;
		}
		if other.keys.is_some() {
			self.keys = other.keys;
		}
	}
}

fn merge_section<T>(base: &mut Option<T>, other: Option<T>, merge: impl FnOnce(&mut T, T)) {
	match (base.as_mut(), other) {
		(Some(base), Some(other)) => merge(base, other),
		(None, Some(other)) => *base = Some(other),
		_ => {}
	}
}

/// Load configuration from all sources with standard precedence.
///
/// Precedence (highest to lowest):
/// 1. Environment variables (`INFRA_SERVER_*`)
/// 2. Config file (`/etc/infra/server.toml`)
/// 3. Built-in defaults
pub fn load_config() -> Result<ServerConfig, ConfigError> {
	load_from_sources(vec![
		Box::new(DefaultsSource),
		Box::new(TomlSource::system()),
		Box::new(EnvSource),
	])
}

/// Load configuration with a custom config file path.
pub fn load_config_with_file(
	config_path: impl Into<std::path::PathBuf>,
) -> Result<ServerConfig, ConfigError> {
	load_from_sources(vec![
		Box::new(DefaultsSource),
		Box::new(TomlSource::new(config_path)),
		Box::new(EnvSource),
	])
}

/// Load configuration from environment only (tests, simple deployments).
pub fn load_config_from_env() -> Result<ServerConfig, ConfigError> {
	load_from_sources(vec![Box::new(DefaultsSource), Box::new(EnvSource)])
}

fn load_from_sources(mut sources: Vec<Box<dyn ConfigSource>>) -> Result<ServerConfig, ConfigError> {
	sources.sort_by_key(|s| s.precedence());

	let mut merged = ServerConfigLayer::default();
	for source in sources {
		debug!(source = source.name(), "loading configuration source");
		merged.merge(source.load()?);
	}

	finalize(merged)
}

fn finalize(layer: ServerConfigLayer) -> Result<ServerConfig, ConfigError> {
	let bootstrap = layer.bootstrap.unwrap_or_default().finalize();
	bootstrap.validate()?;

	Ok(ServerConfig {
		http: layer.http.unwrap_or_default().finalize(),
		database: layer.database.unwrap_or_default().finalize(),
		logging: layer.logging.unwrap_or_default().finalize(),
		auth: layer.auth.unwrap_or_default().finalize(),
		bootstrap,
		secrets: layer.secrets.unwrap_or_default(),
		keys: layer.keys.unwrap_or_default(),
	})
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn socket_addr_joins_host_and_port() {
		let config = ServerConfig {
			http: HttpConfig {
				host: "127.0.0.1".to_string(),
				port: 9000,
				base_domain: None,
			},
			..Default::default()
		};
		assert_eq!(config.socket_addr(), "127.0.0.1:9000");
	}

	#[test]
	fn file_layer_overrides_defaults() {
		let mut merged = ServerConfigLayer::default();
		merged.merge(ServerConfigLayer {
			http: Some(HttpConfigLayer {
				port: Some(9443),
				..Default::default()
			}),
			..Default::default()
		});
		let config = finalize(merged).unwrap();
		assert_eq!(config.http.port, 9443);
		assert_eq!(config.http.host, "0.0.0.0");
	}

	#[test]
	fn invalid_bootstrap_user_fails_finalize() {
		let layer = ServerConfigLayer {
			bootstrap: Some(BootstrapConfigLayer {
				users: Some(vec![UserConfig::default()]),
				..Default::default()
			}),
			..Default::default()
		};
		assert!(matches!(
			finalize(layer).unwrap_err(),
			ConfigError::Validation(_)
		));
	}

	#[test]
	fn secrets_section_parses_tagged_kinds() {
		let layer: ServerConfigLayer = toml::from_str(
			r#"
			[[secrets]]
			kind = "file"
			name = "shared"
			path = "/var/lib/infra/secrets"

			[[keys]]
			kind = "native"
			secret_storage = "shared"
			"#,
		)
		.unwrap();
		let config = finalize(layer).unwrap();
		assert_eq!(config.secrets.len(), 1);
		assert_eq!(config.keys.len(), 1);
	}
}
