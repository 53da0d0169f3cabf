// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! In-cluster Kubernetes secret storage.
//!
//! Talks to the API server from inside a pod using the mounted service
//! account. Secret names have the form `<secret>/<key>`, resolving to one key
//! of a `v1.Secret`.

use std::path::Path;

use async_trait::async_trait;
use base64::Engine;
use serde::Deserialize;
use serde_json::json;

use crate::error::{SecretsError, SecretsResult};
use crate::SecretStorage;

const SERVICE_ACCOUNT_DIR: &str = "/var/run/secrets/kubernetes.io/serviceaccount";

/// Secret storage over the in-cluster Kubernetes API.
pub struct KubernetesSecretProvider {
	client: reqwest::Client,
	base_url: String,
	namespace: String,
	token: String,
}

impl KubernetesSecretProvider {
	/// Build a provider from the pod's service account mount and the
	/// `KUBERNETES_SERVICE_HOST`/`KUBERNETES_SERVICE_PORT` environment.
	pub async fn from_cluster(namespace: Option<String>) -> SecretsResult<Self> {
		let host = std::env::var("KUBERNETES_SERVICE_HOST")
			.map_err(|_| SecretsError::Validation("KUBERNETES_SERVICE_HOST is not set".to_string()))?;
		let port = std::env::var("KUBERNETES_SERVICE_PORT").unwrap_or_else(|_| "443".to_string());

		let dir = Path::new(SERVICE_ACCOUNT_DIR);
		let token = tokio::fs::read_to_string(dir.join("token")).await?;
		let namespace = match namespace {
			Some(namespace) => namespace,
			None => tokio::fs::read_to_string(dir.join("namespace"))
				.await
				.map(|s| s.trim().to_string())
				.unwrap_or_else(|_| "default".to_string()),
		};

		let ca = tokio::fs::read(dir.join("ca.crt")).await?;
		let certificate = reqwest::Certificate::from_pem(&ca)?;
		let client = reqwest::Client::builder()
			.add_root_certificate(certificate)
			.build()?;

		Ok(Self {
			client,
			base_url: format!("https://{host}:{port}"),
			namespace,
			token: token.trim().to_string(),
		})
	}

	fn split_name(name: &str) -> SecretsResult<(&str, &str)> {
		name.split_once('/').ok_or_else(|| {
			SecretsError::Validation(format!(
				"kubernetes secret name {name:?} must have the form <secret>/<key>"
			))
		})
	}

	fn secret_url(&self, secret: &str) -> String {
		format!(
			"{}/api/v1/namespaces/{}/secrets/{}",
			self.base_url, self.namespace, secret
		)
	}
}

#[derive(Deserialize)]
struct SecretObject {
	#[serde(default)]
	data: std::collections::HashMap<String, String>,
}

#[async_trait]
impl SecretStorage for KubernetesSecretProvider {
	async fn get(&self, name: &str) -> SecretsResult<String> {
		let (secret, key) = Self::split_name(name)?;
		let response = self
			.client
			.get(self.secret_url(secret))
			.bearer_auth(&self.token)
			.send()
			.await?;

		if response.status() == reqwest::StatusCode::NOT_FOUND {
			return Err(SecretsError::NotFound(name.to_string()));
		}
		let object: SecretObject = response.error_for_status()?.json().await?;
		let encoded = object
			.data
			.get(key)
			.ok_or_else(|| SecretsError::NotFound(name.to_string()))?;
		let bytes = base64::engine::general_purpose::STANDARD.decode(encoded)?;
		String::from_utf8(bytes).map_err(|e| SecretsError::Internal(format!("secret is not utf-8: {e}")))
	}

	async fn set(&self, name: &str, value: &str) -> SecretsResult<()> {
		let (secret, key) = Self::split_name(name)?;
		let encoded = base64::engine::general_purpose::STANDARD.encode(value);

		// strategic merge patch creates the key if the secret exists
		let patch = self
			.client
			.patch(self.secret_url(secret))
			.bearer_auth(&self.token)
			.header("Content-Type", "application/strategic-merge-patch+json")
			.json(&json!({ "data": { key: encoded } }))
			.send()
			.await?;

		if patch.status() != reqwest::StatusCode::NOT_FOUND {
			patch.error_for_status()?;
			return Ok(());
		}

		self.client
			.post(format!(
				"{}/api/v1/namespaces/{}/secrets",
				self.base_url, self.namespace
			))
			.bearer_auth(&self.token)
			.json(&json!({
				"apiVersion": "v1",
				"kind": "Secret",
				"metadata": { "name": secret },
				"data": { key: encoded },
			}))
			.send()
			.await?
			.error_for_status()?;
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn name_must_contain_slash() {
		assert!(KubernetesSecretProvider::split_name("secret/key").is_ok());
		assert!(matches!(
			KubernetesSecretProvider::split_name("no-slash"),
			Err(SecretsError::Validation(_))
		));
	}
}
