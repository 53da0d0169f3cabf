// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Configuration sources.
//!
//! Each source produces a partial [`ServerConfigLayer`]; sources are merged
//! in precedence order (defaults, then the TOML file, then environment
//! variables).

use std::path::PathBuf;

use crate::error::ConfigError;
use crate::sections::{AuthConfigLayer, DatabaseConfigLayer, HttpConfigLayer, LoggingConfigLayer};
use crate::ServerConfigLayer;

/// Default location of the server configuration file.
pub const SYSTEM_CONFIG_PATH: &str = "/etc/infra/server.toml";

/// Merge precedence; higher values win.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Precedence {
	Defaults = 0,
	File = 1,
	Environment = 2,
}

/// A source of partial configuration.
pub trait ConfigSource {
	fn name(&self) -> &'static str;
	fn precedence(&self) -> Precedence;
	fn load(&self) -> Result<ServerConfigLayer, ConfigError>;
}

/// Built-in defaults. An empty layer; defaults are applied by `finalize`.
pub struct DefaultsSource;

impl ConfigSource for DefaultsSource {
	fn name(&self) -> &'static str {
		"defaults"
	}

	fn precedence(&self) -> Precedence {
		Precedence::Defaults
	}

	fn load(&self) -> Result<ServerConfigLayer, ConfigError> {
		Ok(ServerConfigLayer::default())
	}
}

/// TOML file source. A missing file yields an empty layer; a malformed file
/// is an error.
pub struct TomlSource {
	path: PathBuf,
}

impl TomlSource {
	pub fn new(path: impl Into<PathBuf>) -> Self {
		Self { path: path.into() }
	}

	pub fn system() -> Self {
		Self::new(SYSTEM_CONFIG_PATH)
	}
}

impl ConfigSource for TomlSource {
	fn name(&self) -> &'static str {
		"toml"
	}

	fn precedence(&self) -> Precedence {
		Precedence::File
	}

	fn load(&self) -> Result<ServerConfigLayer, ConfigError> {
		let raw = match std::fs::read_to_string(&self.path) {
			Ok(raw) => raw,
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
				return Ok(ServerConfigLayer::default());
			}
			Err(source) => {
				return Err(ConfigError::Read {
					path: self.path.display().to_string(),
					source,
				});
			}
		};

		toml::from_str(&raw).map_err(|source| ConfigError::Parse {
			path: self.path.display().to_string(),
			source,
		})
	}
}

/// Environment variable source (`INFRA_SERVER_*`).
pub struct EnvSource;

fn env_var(key: &str) -> Option<String> {
	std::env::var(key).ok().filter(|v| !v.is_empty())
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Result<Option<T>, ConfigError>
where
	T::Err: std::fmt::Display,
{
	env_var(key)
		.map(|raw| {
			raw.parse().map_err(|e: T::Err| ConfigError::Env {
				key: key.to_string(),
				message: e.to_string(),
			})
		})
		.transpose()
}

impl ConfigSource for EnvSource {
	fn name(&self) -> &'static str {
		"environment"
	}

	fn precedence(&self) -> Precedence {
		Precedence::Environment
	}

	fn load(&self) -> Result<ServerConfigLayer, ConfigError> {
		let mut layer = ServerConfigLayer::default();

		let http = HttpConfigLayer {
			host: env_var("INFRA_SERVER_HOST"),
			port: env_parse("INFRA_SERVER_PORT")?,
			base_domain: env_var("INFRA_SERVER_BASE_DOMAIN"),
		};
		if http.host.is_some() || http.port.is_some() || http.base_domain.is_some() {
			layer.http = Some(http);
		}

		let database = DatabaseConfigLayer {
			url: env_var("INFRA_SERVER_DATABASE_URL"),
			max_connections: env_parse("INFRA_SERVER_DATABASE_MAX_CONNECTIONS")?,
			encryption_key_provider: None,
		};
		if database.url.is_some() || database.max_connections.is_some() {
			layer.database = Some(database);
		}

		if let Some(level) = env_var("INFRA_SERVER_LOG_LEVEL") {
			layer.logging = Some(LoggingConfigLayer { level: Some(level) });
		}

		if let Some(signups) = env_parse::<bool>("INFRA_SERVER_SIGNUPS_ENABLED")? {
			layer.auth = Some(AuthConfigLayer {
				signups_enabled: Some(signups),
				..Default::default()
			});
		}

		Ok(layer)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn missing_file_yields_empty_layer() {
		let source = TomlSource::new("/definitely/not/a/real/path.toml");
		let layer = source.load().unwrap();
		assert!(layer.http.is_none());
		assert!(layer.database.is_none());
	}

	#[test]
	fn malformed_file_is_an_error() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("server.toml");
		std::fs::write(&path, "this is { not toml").unwrap();
		assert!(matches!(
			TomlSource::new(&path).load().unwrap_err(),
			ConfigError::Parse { .. }
		));
	}

	#[test]
	fn file_parses_sections() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("server.toml");
		std::fs::write(
			&path,
			r#"
			[http]
			port = 9090

			[database]
			url = "postgres://db.internal/infra"

			[[bootstrap.users]]
			name = "admin@example.com"
			infra_role = "admin"
			"#,
		)
		.unwrap();

		let layer = TomlSource::new(&path).load().unwrap();
		assert_eq!(layer.http.unwrap().port, Some(9090));
		assert_eq!(
			layer.database.unwrap().url.as_deref(),
			Some("postgres://db.internal/infra")
		);
		let bootstrap = layer.bootstrap.unwrap();
		assert_eq!(bootstrap.users.as_ref().unwrap().len(), 1);
		assert_eq!(bootstrap.users.unwrap()[0].name, "admin@example.com");
	}

	#[test]
	fn precedence_ordering() {
		assert!(Precedence::Environment > Precedence::File);
		assert!(Precedence::File > Precedence::Defaults);
	}
}
