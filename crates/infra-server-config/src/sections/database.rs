// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Database configuration.

use serde::Deserialize;

/// Database configuration (runtime, fully resolved).
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
	pub url: String,
	pub max_connections: u32,
	/// Name of the symmetric key provider used for at-rest encryption of
	/// provider client secrets.
	pub encryption_key_provider: String,
}

impl Default for DatabaseConfig {
	fn default() -> Self {
		Self {
			url: "postgres://localhost/infra".to_string(),
			max_connections: 10,
			encryption_key_provider: "native".to_string(),
		}
	}
}

/// Database configuration layer (partial, for merging).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DatabaseConfigLayer {
	#[serde(default)]
	pub url: Option<String>,
	#[serde(default)]
	pub max_connections: Option<u32>,
	#[serde(default)]
	pub encryption_key_provider: Option<String>,
}

impl DatabaseConfigLayer {
	pub fn merge(&mut self, other: DatabaseConfigLayer) {
		if other.url.is_some() {
			self.url = other.url;
		}
		if other.max_connections.is_some() {
			self.max_connections = other.max_connections;
		}
		if other.encryption_key_provider.is_some() {
			self.encryption_key_provider = other.encryption_key_provider;
		}
	}

	pub fn finalize(self) -> DatabaseConfig {
		let defaults = DatabaseConfig::default();
		DatabaseConfig {
			url: self.url.unwrap_or(defaults.url),
			max_connections: self.max_connections.unwrap_or(defaults.max_connections),
			encryption_key_provider: self
				.encryption_key_provider
				.unwrap_or(defaults.encryption_key_provider),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn default_url_is_local_postgres() {
		let config = DatabaseConfigLayer::default().finalize();
		assert_eq!(config.url, "postgres://localhost/infra");
		assert_eq!(config.max_connections, 10);
	}

	#[test]
	fn custom_url_wins() {
		let layer = DatabaseConfigLayer {
			url: Some("postgres://db.internal/infra".to_string()),
			max_connections: None,
			encryption_key_provider: None,
		};
		assert_eq!(layer.finalize().url, "postgres://db.internal/infra");
	}
}
