// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Base secret storage providers: env, file, and plaintext.

use std::path::PathBuf;

use async_trait::async_trait;
use base64::Engine;

use crate::error::{SecretsError, SecretsResult};
use crate::registry::GenericConfig;
use crate::SecretStorage;

fn decode(config: &GenericConfig, raw: &str) -> SecretsResult<String> {
	let bytes = if config.base64 {
		base64::engine::general_purpose::STANDARD.decode(raw.trim())?
	} else if config.base64_url {
		base64::engine::general_purpose::URL_SAFE.decode(raw.trim())?
	} else if config.base64_raw {
		base64::engine::general_purpose::STANDARD_NO_PAD.decode(raw.trim())?
	} else {
		return Ok(raw.to_string());
	};
	String::from_utf8(bytes).map_err(|e| SecretsError::Internal(format!("secret is not utf-8: {e}")))
}

/// Resolves secrets from process environment variables.
pub struct EnvSecretProvider {
	config: GenericConfig,
}

impl EnvSecretProvider {
	pub fn new(config: GenericConfig) -> Self {
		Self { config }
	}
}

#[async_trait]
impl SecretStorage for EnvSecretProvider {
	async fn get(&self, name: &str) -> SecretsResult<String> {
		let raw = std::env::var(name).map_err(|_| SecretsError::NotFound(name.to_string()))?;
		decode(&self.config, &raw)
	}

	async fn set(&self, _name: &str, _value: &str) -> SecretsResult<()> {
		Err(SecretsError::Unsupported("env"))
	}
}

/// Resolves secrets from files under a base directory.
pub struct FileSecretProvider {
	config: GenericConfig,
	base: PathBuf,
}

impl FileSecretProvider {
	pub fn new(config: GenericConfig, path: Option<PathBuf>) -> Self {
		Self {
			config,
			base: path.unwrap_or_default(),
		}
	}

	fn resolve(&self, name: &str) -> PathBuf {
		self.base.join(name)
	}
}

#[async_trait]
impl SecretStorage for FileSecretProvider {
	async fn get(&self, name: &str) -> SecretsResult<String> {
		let path = self.resolve(name);
		let raw = match tokio::fs::read_to_string(&path).await {
			Ok(raw) => raw,
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
				return Err(SecretsError::NotFound(name.to_string()));
			}
			Err(e) => return Err(e.into()),
		};
		decode(&self.config, &raw)
	}

	async fn set(&self, name: &str, value: &str) -> SecretsResult<()> {
		let path = self.resolve(name);
		if let Some(parent) = path.parent() {
			if !parent.as_os_str().is_empty() {
				tokio::fs::create_dir_all(parent).await?;
			}
		}
		tokio::fs::write(&path, value).await?;
		Ok(())
	}
}

/// Treats the secret name as the secret value itself.
pub struct PlainSecretProvider {
	config: GenericConfig,
}

impl PlainSecretProvider {
	pub fn new(config: GenericConfig) -> Self {
		Self { config }
	}
}

#[async_trait]
impl SecretStorage for PlainSecretProvider {
	async fn get(&self, name: &str) -> SecretsResult<String> {
		decode(&self.config, name)
	}

	async fn set(&self, _name: &str, _value: &str) -> SecretsResult<()> {
		Err(SecretsError::Unsupported("plaintext"))
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test]
	async fn env_provider_reads_variables() {
		std::env::set_var("INFRA_SECRETS_TEST_VALUE", "hunter2");
		let provider = EnvSecretProvider::new(GenericConfig::default());
		assert_eq!(provider.get("INFRA_SECRETS_TEST_VALUE").await.unwrap(), "hunter2");
		std::env::remove_var("INFRA_SECRETS_TEST_VALUE");
	}

	#[tokio::test]
	async fn env_provider_missing_variable_is_not_found() {
		let provider = EnvSecretProvider::new(GenericConfig::default());
		let err = provider.get("INFRA_SECRETS_TEST_MISSING").await.unwrap_err();
		assert!(matches!(err, SecretsError::NotFound(_)));
	}

	#[tokio::test]
	async fn env_provider_decodes_base64() {
		std::env::set_var("INFRA_SECRETS_TEST_B64", "aHVudGVyMg==");
		let provider = EnvSecretProvider::new(GenericConfig {
			base64: true,
			..Default::default()
		});
		assert_eq!(provider.get("INFRA_SECRETS_TEST_B64").await.unwrap(), "hunter2");
		std::env::remove_var("INFRA_SECRETS_TEST_B64");
	}

	#[tokio::test]
	async fn file_provider_roundtrips() {
		let dir = tempfile::tempdir().unwrap();
		let provider =
			FileSecretProvider::new(GenericConfig::default(), Some(dir.path().to_path_buf()));

		provider.set("api-token", "s3cret").await.unwrap();
		assert_eq!(provider.get("api-token").await.unwrap(), "s3cret");
	}

	#[tokio::test]
	async fn file_provider_missing_file_is_not_found() {
		let dir = tempfile::tempdir().unwrap();
		let provider =
			FileSecretProvider::new(GenericConfig::default(), Some(dir.path().to_path_buf()));
		let err = provider.get("missing").await.unwrap_err();
		assert!(matches!(err, SecretsError::NotFound(_)));
	}

	#[tokio::test]
	async fn plaintext_provider_returns_name() {
		let provider = PlainSecretProvider::new(GenericConfig::default());
		assert_eq!(provider.get("the-secret-itself").await.unwrap(), "the-secret-itself");
	}

	#[tokio::test]
	async fn plaintext_provider_rejects_set() {
		let provider = PlainSecretProvider::new(GenericConfig::default());
		assert!(matches!(
			provider.set("a", "b").await.unwrap_err(),
			SecretsError::Unsupported("plaintext")
		));
	}
}
