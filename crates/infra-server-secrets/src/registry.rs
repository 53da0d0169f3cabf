// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! The provider registry and its two-pass configuration loader.
//!
//! Storage providers and key providers are each registered under their
//! configured `name` (defaulting to the kind). Loading happens in two passes
//! because non-base kinds (vault, aws) may resolve their own credentials
//! through a base provider by `name:path` reference:
//!
//! 1. instantiate base kinds (env, file, plaintext, kubernetes)
//! 2. install defaults for any base kind not configured (kubernetes only
//!    inside a cluster)
//! 3. instantiate the remaining kinds, resolving credential references
//!    against the registry built so far
//!
//! Duplicate names, unknown kinds, and dangling references are fatal.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::OnceLock;

use serde::Deserialize;

use crate::aws::{AwsKmsKeyProvider, AwsSecretsManagerProvider, AwsSsmSecretProvider};
use crate::encryption::NativeKeyProvider;
use crate::error::{SecretsError, SecretsResult};
use crate::kubernetes::KubernetesSecretProvider;
use crate::storage::{EnvSecretProvider, FileSecretProvider, PlainSecretProvider};
use crate::vault::{VaultKeyProvider, VaultSecretProvider, VaultSettings};
use crate::{SecretStorage, SymmetricKeyProvider};

/// Decode options shared by the env/file/plaintext providers.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GenericConfig {
	#[serde(default)]
	pub base64: bool,
	#[serde(default, rename = "base64url")]
	pub base64_url: bool,
	#[serde(default, rename = "base64raw")]
	pub base64_raw: bool,
}

/// Endpoint and credentials for the AWS providers. The credential fields may
/// be `name:path` references into the base storage providers.
#[derive(Debug, Clone, Deserialize)]
pub struct AwsConfig {
	pub endpoint: String,
	pub region: String,
	#[serde(rename = "access_key_id")]
	pub access_key_id: String,
	#[serde(rename = "secret_access_key")]
	pub secret_access_key: String,
}

impl AwsConfig {
	fn validate(&self) -> SecretsResult<()> {
		for (field, value) in [
			("endpoint", &self.endpoint),
			("region", &self.region),
			("access_key_id", &self.access_key_id),
			("secret_access_key", &self.secret_access_key),
		] {
			if value.is_empty() {
				return Err(SecretsError::Validation(format!(
					"aws provider requires {field}"
				)));
			}
		}
		Ok(())
	}
}

/// Vault connection configuration. `token` may be a `name:path` reference.
#[derive(Debug, Clone, Deserialize)]
pub struct VaultProviderConfig {
	pub token: String,
	pub address: String,
	#[serde(default)]
	pub namespace: Option<String>,
	#[serde(default = "default_secret_mount")]
	pub secret_mount: String,
	#[serde(default = "default_transit_mount")]
	pub transit_mount: String,
}

fn default_secret_mount() -> String {
	"secret".to_string()
}

fn default_transit_mount() -> String {
	"transit".to_string()
}

impl VaultProviderConfig {
	fn validate(&self) -> SecretsResult<()> {
		if self.token.is_empty() {
			return Err(SecretsError::Validation("vault provider requires token".to_string()));
		}
		if self.address.is_empty() {
			return Err(SecretsError::Validation("vault provider requires address".to_string()));
		}
		Ok(())
	}

	fn settings(&self, token: String) -> VaultSettings {
		VaultSettings {
			token,
			address: self.address.clone(),
			namespace: self.namespace.clone(),
			secret_mount: self.secret_mount.clone(),
			transit_mount: self.transit_mount.clone(),
		}
	}
}

/// One configured secret storage provider.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum SecretProviderConfig {
	Env {
		#[serde(default)]
		name: Option<String>,
		#[serde(flatten)]
		generic: GenericConfig,
	},
	File {
		#[serde(default)]
		name: Option<String>,
		#[serde(default)]
		path: Option<PathBuf>,
		#[serde(flatten)]
		generic: GenericConfig,
	},
	Plaintext {
		#[serde(default)]
		name: Option<String>,
		#[serde(flatten)]
		generic: GenericConfig,
	},
	Kubernetes {
		#[serde(default)]
		name: Option<String>,
		#[serde(default)]
		namespace: Option<String>,
	},
	Vault {
		#[serde(default)]
		name: Option<String>,
		#[serde(flatten)]
		vault: VaultProviderConfig,
	},
	#[serde(rename = "awsssm")]
	AwsSsm {
		#[serde(default)]
		name: Option<String>,
		#[serde(default)]
		key_id: Option<String>,
		#[serde(flatten)]
		aws: AwsConfig,
	},
	#[serde(rename = "awssecretsmanager")]
	AwsSecretsManager {
		#[serde(default)]
		name: Option<String>,
		#[serde(flatten)]
		aws: AwsConfig,
	},
}

impl SecretProviderConfig {
	fn kind(&self) -> &'static str {
		match self {
			SecretProviderConfig::Env { .. } => "env",
			SecretProviderConfig::File { .. } => "file",
			SecretProviderConfig::Plaintext { .. } => "plaintext",
			SecretProviderConfig::Kubernetes { .. } => "kubernetes",
			SecretProviderConfig::Vault { .. } => "vault",
			SecretProviderConfig::AwsSsm { .. } => "awsssm",
			SecretProviderConfig::AwsSecretsManager { .. } => "awssecretsmanager",
		}
	}

	fn name(&self) -> String {
		let configured = match self {
			SecretProviderConfig::Env { name, .. }
			| SecretProviderConfig::File { name, .. }
			| SecretProviderConfig::Plaintext { name, .. }
			| SecretProviderConfig::Kubernetes { name, .. }
			| SecretProviderConfig::Vault { name, .. }
			| SecretProviderConfig::AwsSsm { name, .. }
			| SecretProviderConfig::AwsSecretsManager { name, .. } => name,
		};
		configured.clone().unwrap_or_else(|| self.kind().to_string())
	}

	fn is_base_kind(&self) -> bool {
		matches!(
			self,
			SecretProviderConfig::Env { .. }
				| SecretProviderConfig::File { .. }
				| SecretProviderConfig::Plaintext { .. }
				| SecretProviderConfig::Kubernetes { .. }
		)
	}
}

/// One configured symmetric key provider.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum KeyProviderConfig {
	Native {
		#[serde(default = "default_native_storage")]
		secret_storage: String,
	},
	Vault {
		#[serde(flatten)]
		vault: VaultProviderConfig,
	},
	#[serde(rename = "awskms")]
	AwsKms {
		key_id: String,
		#[serde(flatten)]
		aws: AwsConfig,
	},
}

fn default_native_storage() -> String {
	"file".to_string()
}

impl KeyProviderConfig {
	fn kind(&self) -> &'static str {
		match self {
			KeyProviderConfig::Native { .. } => "native",
			KeyProviderConfig::Vault { .. } => "vault",
			KeyProviderConfig::AwsKms { .. } => "awskms",
		}
	}
}

/// The resolved provider registry. Built once at startup and read-only
/// afterwards.
#[derive(Debug)]
pub struct SecretsRegistry {
	storage: HashMap<String, Arc<dyn SecretStorage>>,
	keys: HashMap<String, Arc<dyn SymmetricKeyProvider>>,
}

impl SecretsRegistry {
	/// Load the registry from configuration. See the module docs for the
	/// two-pass protocol.
	pub async fn load(
		secrets: &[SecretProviderConfig],
		keys: &[KeyProviderConfig],
	) -> SecretsResult<Self> {
		let mut registry = Self {
			storage: HashMap::new(),
			keys: HashMap::new(),
		};

		// pass 1: base kinds
		for config in secrets.iter().filter(|c| c.is_base_kind()) {
			registry.install_storage(config).await?;
		}

		registry.install_default_storage().await?;

		// pass 2: kinds that may reference base providers by name
		for config in secrets.iter().filter(|c| !c.is_base_kind()) {
			registry.install_storage(config).await?;
		}

		registry.install_keys(keys).await?;

		Ok(registry)
	}

	/// Look up a storage provider by name.
	pub fn storage(&self, name: &str) -> SecretsResult<Arc<dyn SecretStorage>> {
		self.storage
			.get(name)
			.cloned()
			.ok_or_else(|| SecretsError::UnknownProvider(name.to_string()))
	}

	/// Look up a key provider by name.
	pub fn key_provider(&self, name: &str) -> SecretsResult<Arc<dyn SymmetricKeyProvider>> {
		self.keys
			.get(name)
			.cloned()
			.ok_or_else(|| SecretsError::UnknownProvider(name.to_string()))
	}

	/// Resolve a secret reference.
	///
	/// `""` resolves to `""`. `name:path` resolves `path` against the storage
	/// provider `name`; an unknown name is an error. Anything else is a
	/// plaintext literal.
	pub async fn get_secret(&self, reference: &str) -> SecretsResult<String> {
		if reference.is_empty() {
			return Ok(String::new());
		}
		match reference.split_once(':') {
			Some((name, path)) => {
				warn_deprecated_prefix(name);
				self.storage(name)?.get(path).await
			}
			None => Ok(reference.to_string()),
		}
	}

	/// Store a value through a `name:path` secret reference.
	pub async fn set_secret(&self, reference: &str, value: &str) -> SecretsResult<()> {
		let (name, path) = reference.split_once(':').ok_or_else(|| {
			SecretsError::Validation(format!(
				"secret reference {reference:?} must have the form <provider>:<path>"
			))
		})?;
		self.storage(name)?.set(path, value).await
	}

	async fn install_storage(&mut self, config: &SecretProviderConfig) -> SecretsResult<()> {
		let name = config.name();
		if self.storage.contains_key(&name) {
			return Err(SecretsError::DuplicateName(name));
		}

		let provider: Arc<dyn SecretStorage> = match config {
			SecretProviderConfig::Env { generic, .. } => {
				Arc::new(EnvSecretProvider::new(generic.clone()))
			}
			SecretProviderConfig::File { generic, path, .. } => {
				Arc::new(FileSecretProvider::new(generic.clone(), path.clone()))
			}
			SecretProviderConfig::Plaintext { generic, .. } => {
				Arc::new(PlainSecretProvider::new(generic.clone()))
			}
			SecretProviderConfig::Kubernetes { namespace, .. } => {
				Arc::new(KubernetesSecretProvider::from_cluster(namespace.clone()).await?)
			}
			SecretProviderConfig::Vault { vault, .. } => {
				vault.validate()?;
				let token = self.get_secret(&vault.token).await?;
				Arc::new(VaultSecretProvider::new(vault.settings(token)))
			}
			SecretProviderConfig::AwsSsm { key_id, aws, .. } => {
				let aws = self.resolve_aws(aws).await?;
				Arc::new(AwsSsmSecretProvider::new(&aws, key_id.clone()))
			}
			SecretProviderConfig::AwsSecretsManager { aws, .. } => {
				let aws = self.resolve_aws(aws).await?;
				Arc::new(AwsSecretsManagerProvider::new(&aws))
			}
		};

		tracing::debug!(name = %name, kind = config.kind(), "registered secret storage provider");
		self.storage.insert(name, provider);
		Ok(())
	}

	async fn install_default_storage(&mut self) -> SecretsResult<()> {
		if !self.storage.contains_key("env") {
			self.storage.insert(
				"env".to_string(),
				Arc::new(EnvSecretProvider::new(GenericConfig::default())),
			);
		}
		if !self.storage.contains_key("file") {
			self.storage.insert(
				"file".to_string(),
				Arc::new(FileSecretProvider::new(GenericConfig::default(), None)),
			);
		}
		if !self.storage.contains_key("plaintext") {
			self.storage.insert(
				"plaintext".to_string(),
				Arc::new(PlainSecretProvider::new(GenericConfig::default())),
			);
		}
		// only install kubernetes automatically when running in a cluster
		if !self.storage.contains_key("kubernetes")
			&& std::env::var_os("KUBERNETES_SERVICE_HOST").is_some()
		{
			self.storage.insert(
				"kubernetes".to_string(),
				Arc::new(KubernetesSecretProvider::from_cluster(None).await?),
			);
		}
		Ok(())
	}

	async fn install_keys(&mut self, keys: &[KeyProviderConfig]) -> SecretsResult<()> {
		// default native provider over file storage, replaced if configured
		let file_storage = self.storage("file")?;
		self.keys.insert(
			"native".to_string(),
			Arc::new(NativeKeyProvider::new(file_storage)),
		);

		for config in keys {
			let provider: Arc<dyn SymmetricKeyProvider> = match config {
				KeyProviderConfig::Native { secret_storage } => {
					let storage = self.storage(secret_storage)?;
					Arc::new(NativeKeyProvider::new(storage))
				}
				KeyProviderConfig::Vault { vault } => {
					vault.validate()?;
					let token = self.get_secret(&vault.token).await?;
					Arc::new(VaultKeyProvider::new(vault.settings(token)))
				}
				KeyProviderConfig::AwsKms { key_id, aws } => {
					let aws = self.resolve_aws(aws).await?;
					Arc::new(AwsKmsKeyProvider::new(&aws, key_id.clone()))
				}
			};

			tracing::debug!(kind = config.kind(), "registered symmetric key provider");
			self.keys.insert(config.kind().to_string(), provider);
		}

		Ok(())
	}

	async fn resolve_aws(&self, config: &AwsConfig) -> SecretsResult<AwsConfig> {
		config.validate()?;
		Ok(AwsConfig {
			endpoint: config.endpoint.clone(),
			region: config.region.clone(),
			access_key_id: self.get_secret(&config.access_key_id).await?,
			secret_access_key: self.get_secret(&config.secret_access_key).await?,
		})
	}
}

/// The bare `env:`/`file:`/`plaintext:` reference prefixes predate named
/// providers and are kept for one release.
fn warn_deprecated_prefix(name: &str) {
	static WARNED: OnceLock<()> = OnceLock::new();
	if matches!(name, "env" | "file" | "plaintext") {
		WARNED.get_or_init(|| {
			tracing::warn!(
				prefix = name,
				"bare secret reference prefixes are deprecated; name the provider in the secrets configuration instead"
			);
		});
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn toml_secret(config: &str) -> SecretProviderConfig {
		toml::from_str(config).unwrap()
	}

	#[tokio::test]
	async fn load_installs_defaults() {
		let registry = SecretsRegistry::load(&[], &[]).await.unwrap();
		assert!(registry.storage("env").is_ok());
		assert!(registry.storage("file").is_ok());
		assert!(registry.storage("plaintext").is_ok());
		assert!(registry.key_provider("native").is_ok());
	}

	#[tokio::test]
	async fn unknown_storage_name_errors() {
		let registry = SecretsRegistry::load(&[], &[]).await.unwrap();
		assert!(matches!(
			registry.storage("vault").unwrap_err(),
			SecretsError::UnknownProvider(_)
		));
	}

	#[tokio::test]
	async fn duplicate_name_is_fatal() {
		let configs = vec![
			toml_secret(r#"kind = "plaintext""#),
			toml_secret(r#"kind = "plaintext""#),
		];
		assert!(matches!(
			SecretsRegistry::load(&configs, &[]).await.unwrap_err(),
			SecretsError::DuplicateName(name) if name == "plaintext"
		));
	}

	#[tokio::test]
	async fn named_provider_does_not_collide_with_default() {
		let configs = vec![toml_secret(
			r#"
			kind = "env"
			name = "env-base64"
			base64 = true
			"#,
		)];
		let registry = SecretsRegistry::load(&configs, &[]).await.unwrap();
		assert!(registry.storage("env-base64").is_ok());
		// the default, non-decoding env provider is still installed
		assert!(registry.storage("env").is_ok());
	}

	#[tokio::test]
	async fn vault_requires_token_and_address() {
		let configs = vec![toml_secret(
			r#"
			kind = "vault"
			token = ""
			address = "https://vault.example.com"
			"#,
		)];
		assert!(matches!(
			SecretsRegistry::load(&configs, &[]).await.unwrap_err(),
			SecretsError::Validation(_)
		));
	}

	#[tokio::test]
	async fn aws_requires_all_fields() {
		let configs = vec![toml_secret(
			r#"
			kind = "awsssm"
			endpoint = "https://ssm.us-east-1.amazonaws.com"
			region = ""
			access_key_id = "AKIA123"
			secret_access_key = "abc"
			"#,
		)];
		assert!(matches!(
			SecretsRegistry::load(&configs, &[]).await.unwrap_err(),
			SecretsError::Validation(_)
		));
	}

	#[tokio::test]
	async fn dangling_reference_is_fatal() {
		let configs = vec![toml_secret(
			r#"
			kind = "vault"
			token = "missing-provider:token"
			address = "https://vault.example.com"
			"#,
		)];
		assert!(matches!(
			SecretsRegistry::load(&configs, &[]).await.unwrap_err(),
			SecretsError::UnknownProvider(name) if name == "missing-provider"
		));
	}

	#[tokio::test]
	async fn get_secret_resolves_references() {
		let registry = SecretsRegistry::load(&[], &[]).await.unwrap();

		assert_eq!(registry.get_secret("").await.unwrap(), "");
		assert_eq!(
			registry.get_secret("a-literal-password").await.unwrap(),
			"a-literal-password"
		);
		assert_eq!(
			registry.get_secret("plaintext:hunter2").await.unwrap(),
			"hunter2"
		);

		std::env::set_var("INFRA_REGISTRY_TEST_SECRET", "from-env");
		assert_eq!(
			registry.get_secret("env:INFRA_REGISTRY_TEST_SECRET").await.unwrap(),
			"from-env"
		);
		std::env::remove_var("INFRA_REGISTRY_TEST_SECRET");
	}

	#[tokio::test]
	async fn set_secret_requires_provider_reference() {
		let registry = SecretsRegistry::load(&[], &[]).await.unwrap();
		assert!(matches!(
			registry.set_secret("no-provider-here", "value").await.unwrap_err(),
			SecretsError::Validation(_)
		));
	}

	#[tokio::test]
	async fn file_provider_reference_roundtrip() {
		let dir = tempfile::tempdir().unwrap();
		let config = format!(
			r#"
			kind = "file"
			path = "{}"
			"#,
			dir.path().display()
		);
		let configs = vec![toml_secret(&config)];
		let registry = SecretsRegistry::load(&configs, &[]).await.unwrap();

		registry.set_secret("file:root-access-key", "s3cret").await.unwrap();
		assert_eq!(
			registry.get_secret("file:root-access-key").await.unwrap(),
			"s3cret"
		);
	}
}
