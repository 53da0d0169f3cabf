// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! HashiCorp Vault backends: KV v2 for secret storage and the transit engine
//! for symmetric encryption.

use async_trait::async_trait;
use base64::Engine;
use serde::Deserialize;
use serde_json::json;

use crate::error::{SecretsError, SecretsResult};
use crate::{SecretStorage, SymmetricKeyProvider};

/// Name of the transit key used for encrypt/decrypt.
const TRANSIT_KEY_NAME: &str = "infra";

/// Connection settings shared by both Vault backends.
#[derive(Debug, Clone)]
pub struct VaultSettings {
	pub token: String,
	pub address: String,
	pub namespace: Option<String>,
	pub secret_mount: String,
	pub transit_mount: String,
}

impl VaultSettings {
	fn request(&self, client: &reqwest::Client, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
		let url = format!("{}/v1/{}", self.address.trim_end_matches('/'), path);
		let mut builder = client.request(method, url).header("X-Vault-Token", &self.token);
		if let Some(namespace) = &self.namespace {
			builder = builder.header("X-Vault-Namespace", namespace);
		}
		builder
	}
}

/// Secret storage over the Vault KV v2 engine.
pub struct VaultSecretProvider {
	client: reqwest::Client,
	settings: VaultSettings,
}

impl VaultSecretProvider {
	pub fn new(settings: VaultSettings) -> Self {
		Self {
			client: reqwest::Client::new(),
			settings,
		}
	}
}

#[derive(Deserialize)]
struct KvReadResponse {
	data: KvReadData,
}

#[derive(Deserialize)]
struct KvReadData {
	data: std::collections::HashMap<String, String>,
}

#[async_trait]
impl SecretStorage for VaultSecretProvider {
	async fn get(&self, name: &str) -> SecretsResult<String> {
		let path = format!("{}/data/{}", self.settings.secret_mount, name);
		let response = self
			.settings
			.request(&self.client, reqwest::Method::GET, &path)
			.send()
			.await?;

		if response.status() == reqwest::StatusCode::NOT_FOUND {
			return Err(SecretsError::NotFound(name.to_string()));
		}
		let body: KvReadResponse = response.error_for_status()?.json().await?;
		body.data
			.data
			.get("value")
			.cloned()
			.ok_or_else(|| SecretsError::NotFound(name.to_string()))
	}

	async fn set(&self, name: &str, value: &str) -> SecretsResult<()> {
		let path = format!("{}/data/{}", self.settings.secret_mount, name);
		self.settings
			.request(&self.client, reqwest::Method::POST, &path)
			.json(&json!({ "data": { "value": value } }))
			.send()
			.await?
			.error_for_status()?;
		Ok(())
	}
}

/// Symmetric key provider over the Vault transit engine.
pub struct VaultKeyProvider {
	client: reqwest::Client,
	settings: VaultSettings,
}

impl VaultKeyProvider {
	pub fn new(settings: VaultSettings) -> Self {
		Self {
			client: reqwest::Client::new(),
			settings,
		}
	}
}

#[derive(Deserialize)]
struct TransitResponse {
	data: TransitData,
}

#[derive(Deserialize)]
struct TransitData {
	#[serde(default)]
	ciphertext: Option<String>,
	#[serde(default)]
	plaintext: Option<String>,
}

#[async_trait]
impl SymmetricKeyProvider for VaultKeyProvider {
	async fn encrypt(&self, plaintext: &[u8]) -> SecretsResult<Vec<u8>> {
		let path = format!("{}/encrypt/{}", self.settings.transit_mount, TRANSIT_KEY_NAME);
		let encoded = base64::engine::general_purpose::STANDARD.encode(plaintext);
		let body: TransitResponse = self
			.settings
			.request(&self.client, reqwest::Method::POST, &path)
			.json(&json!({ "plaintext": encoded }))
			.send()
			.await?
			.error_for_status()?
			.json()
			.await?;

		let ciphertext = body
			.data
			.ciphertext
			.ok_or_else(|| SecretsError::Encryption("transit response missing ciphertext".to_string()))?;
		Ok(ciphertext.into_bytes())
	}

	async fn decrypt(&self, ciphertext: &[u8]) -> SecretsResult<Vec<u8>> {
		let path = format!("{}/decrypt/{}", self.settings.transit_mount, TRANSIT_KEY_NAME);
		let ciphertext = std::str::from_utf8(ciphertext)
			.map_err(|e| SecretsError::Decryption(format!("transit ciphertext is not utf-8: {e}")))?;
		let body: TransitResponse = self
			.settings
			.request(&self.client, reqwest::Method::POST, &path)
			.json(&json!({ "ciphertext": ciphertext }))
			.send()
			.await?
			.error_for_status()?
			.json()
			.await?;

		let plaintext = body
			.data
			.plaintext
			.ok_or_else(|| SecretsError::Decryption("transit response missing plaintext".to_string()))?;
		Ok(base64::engine::general_purpose::STANDARD.decode(plaintext)?)
	}
}
