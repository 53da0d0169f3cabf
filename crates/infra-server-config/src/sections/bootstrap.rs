// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Bootstrap configuration: the declarative state the loader reconciles into
//! the database at startup.

use serde::Deserialize;

use crate::error::ConfigError;

/// A configured user. `access_key` and `password` are secret references
/// resolved through the provider registry.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UserConfig {
	pub name: String,
	#[serde(default)]
	pub access_key: String,
	#[serde(default)]
	pub password: String,
	#[serde(default)]
	pub infra_role: String,
}

/// A configured external identity provider.
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderConfig {
	pub kind: String,
	pub domain: String,
	pub client_id: String,
	/// Secret reference; encrypted at rest after resolution.
	pub client_secret: String,
}

/// Bootstrap configuration (runtime; no env layer, lists come from the file).
#[derive(Debug, Clone, Default)]
pub struct BootstrapConfig {
	pub default_organization_domain: Option<String>,
	pub root_access_key: String,
	pub engine_access_key: String,
	pub users: Vec<UserConfig>,
	pub providers: Vec<ProviderConfig>,
}

impl BootstrapConfig {
	/// Validate the parts of the configuration that are fatal at startup.
	pub fn validate(&self) -> Result<(), ConfigError> {
		for user in &self.users {
			if user.name.is_empty() {
				return Err(ConfigError::Validation(
					"bootstrap users must have a name".to_string(),
				));
			}
		}
		for provider in &self.providers {
			if provider.kind == "infra" {
				return Err(ConfigError::Validation(
					"the infra provider is built in and cannot be configured".to_string(),
				));
			}
			if provider.domain.is_empty() {
				return Err(ConfigError::Validation(format!(
					"provider {:?} must have a domain",
					provider.kind
				)));
			}
		}
		Ok(())
	}
}

/// Bootstrap configuration layer (partial, for merging).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BootstrapConfigLayer {
	#[serde(default)]
	pub default_organization_domain: Option<String>,
	#[serde(default)]
	pub root_access_key: Option<String>,
	#[serde(default)]
	pub engine_access_key: Option<String>,
	#[serde(default)]
	pub users: Option<Vec<UserConfig>>,
	#[serde(default)]
	pub providers: Option<Vec<ProviderConfig>>,
}

impl BootstrapConfigLayer {
	pub fn merge(&mut self, other: BootstrapConfigLayer) {
		if other.default_organization_domain.is_some() {
			self.default_organization_domain = other.default_organization_domain;
		}
		if other.root_access_key.is_some() {
			self.root_access_key = other.root_access_key;
		}
		if other.engine_access_key.is_some() {
			self.engine_access_key = other.engine_access_key;
		}
		if other.users.is_some() {
			self.users = other.users;
		}
		if other.providers.is_some() {
			self.providers = other.providers;
		}
	}

	pub fn finalize(self) -> BootstrapConfig {
		BootstrapConfig {
			default_organization_domain: self.default_organization_domain,
			root_access_key: self
				.root_access_key
				.unwrap_or_else(|| "file:root-access-key".to_string()),
			engine_access_key: self
				.engine_access_key
				.unwrap_or_else(|| "file:engine-access-key".to_string()),
			users: self.users.unwrap_or_default(),
			providers: self.providers.unwrap_or_default(),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn users_require_a_name() {
		let config = BootstrapConfig {
			users: vec![UserConfig::default()],
			..Default::default()
		};
		assert!(config.validate().is_err());
	}

	#[test]
	fn infra_provider_cannot_be_configured() {
		let config = BootstrapConfig {
			providers: vec![ProviderConfig {
				kind: "infra".to_string(),
				domain: "infra.example.com".to_string(),
				client_id: "id".to_string(),
				client_secret: "secret".to_string(),
			}],
			..Default::default()
		};
		assert!(config.validate().is_err());
	}

	#[test]
	fn legacy_token_references_default_to_file_storage() {
		let config = BootstrapConfigLayer::default().finalize();
		assert_eq!(config.root_access_key, "file:root-access-key");
		assert_eq!(config.engine_access_key, "file:engine-access-key");
	}
}
