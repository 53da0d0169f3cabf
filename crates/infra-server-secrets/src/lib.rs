// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Secret storage and symmetric key providers for the infra registry.
//!
//! Two provider families, each a closed set of kinds resolved by name at
//! startup:
//!
//! - **[`SecretStorage`]**: flat `get(name)`/`set(name, value)` stores
//!   (env, file, plaintext, kubernetes, vault, awsssm, awssecretsmanager)
//! - **[`SymmetricKeyProvider`]**: opaque encrypt/decrypt
//!   (native, vault transit, awskms)
//!
//! The [`SecretsRegistry`] loads both families from configuration in two
//! passes so that non-base providers (vault, aws) can resolve their own
//! credentials through base providers by `name:path` reference.

pub mod aws;
pub mod encryption;
pub mod error;
pub mod kubernetes;
pub mod registry;
pub mod storage;
pub mod vault;

use async_trait::async_trait;

pub use error::{SecretsError, SecretsResult};
pub use registry::{
	AwsConfig, GenericConfig, KeyProviderConfig, SecretProviderConfig, SecretsRegistry,
};

/// A flat secret store resolving names to string values.
#[async_trait]
pub trait SecretStorage: Send + Sync {
	/// Fetch a secret by name. Returns [`SecretsError::NotFound`] when the
	/// name does not resolve.
	async fn get(&self, name: &str) -> SecretsResult<String>;

	/// Store a secret under a name, overwriting any existing value.
	async fn set(&self, name: &str, value: &str) -> SecretsResult<()>;
}

impl std::fmt::Debug for dyn SecretStorage {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "dyn SecretStorage")
	}
}

/// A symmetric encryption backend.
#[async_trait]
pub trait SymmetricKeyProvider: Send + Sync {
	async fn encrypt(&self, plaintext: &[u8]) -> SecretsResult<Vec<u8>>;
	async fn decrypt(&self, ciphertext: &[u8]) -> SecretsResult<Vec<u8>>;
}

impl std::fmt::Debug for dyn SymmetricKeyProvider {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "dyn SymmetricKeyProvider")
	}
}
