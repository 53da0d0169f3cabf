// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! AWS secret backends: SSM Parameter Store, Secrets Manager, and KMS.
//!
//! All three take explicit endpoint/region/credentials from configuration
//! (resolved through the base storage providers before construction) rather
//! than the ambient AWS credential chain.

use async_trait::async_trait;
use aws_config::{BehaviorVersion, Region};
use aws_sdk_kms::primitives::Blob;

use crate::error::{SecretsError, SecretsResult};
use crate::registry::AwsConfig;
use crate::{SecretStorage, SymmetricKeyProvider};

fn credentials(config: &AwsConfig) -> aws_sdk_ssm::config::Credentials {
	aws_sdk_ssm::config::Credentials::new(
		config.access_key_id.clone(),
		config.secret_access_key.clone(),
		None,
		None,
		"infra-config",
	)
}

/// Secret storage over SSM Parameter Store (SecureString parameters).
pub struct AwsSsmSecretProvider {
	client: aws_sdk_ssm::Client,
	key_id: Option<String>,
}

impl AwsSsmSecretProvider {
	pub fn new(config: &AwsConfig, key_id: Option<String>) -> Self {
		let sdk_config = aws_sdk_ssm::Config::builder()
			.behavior_version(BehaviorVersion::latest())
			.region(Region::new(config.region.clone()))
			.endpoint_url(config.endpoint.clone())
			.credentials_provider(credentials(config))
			.build();
		Self {
			client: aws_sdk_ssm::Client::from_conf(sdk_config),
			key_id,
		}
	}
}

#[async_trait]
impl SecretStorage for AwsSsmSecretProvider {
	async fn get(&self, name: &str) -> SecretsResult<String> {
		let output = self
			.client
			.get_parameter()
			.name(name)
			.with_decryption(true)
			.send()
			.await
			.map_err(|e| match e.into_service_error() {
				aws_sdk_ssm::operation::get_parameter::GetParameterError::ParameterNotFound(_) => {
					SecretsError::NotFound(name.to_string())
				}
				other => SecretsError::Internal(format!("ssm get_parameter: {other}")),
			})?;

		output
			.parameter()
			.and_then(|p| p.value())
			.map(|v| v.to_string())
			.ok_or_else(|| SecretsError::NotFound(name.to_string()))
	}

	async fn set(&self, name: &str, value: &str) -> SecretsResult<()> {
		let mut request = self
			.client
			.put_parameter()
			.name(name)
			.value(value)
			.r#type(aws_sdk_ssm::types::ParameterType::SecureString)
			.overwrite(true);
		if let Some(key_id) = &self.key_id {
			request = request.key_id(key_id);
		}
		request
			.send()
			.await
			.map_err(|e| SecretsError::Internal(format!("ssm put_parameter: {e}")))?;
		Ok(())
	}
}

/// Secret storage over AWS Secrets Manager.
pub struct AwsSecretsManagerProvider {
	client: aws_sdk_secretsmanager::Client,
}

impl AwsSecretsManagerProvider {
	pub fn new(config: &AwsConfig) -> Self {
		let credentials = aws_sdk_secretsmanager::config::Credentials::new(
			config.access_key_id.clone(),
			config.secret_access_key.clone(),
			None,
			None,
			"infra-config",
		);
		let sdk_config = aws_sdk_secretsmanager::Config::builder()
			.behavior_version(BehaviorVersion::latest())
			.region(Region::new(config.region.clone()))
			.endpoint_url(config.endpoint.clone())
			.credentials_provider(credentials)
			.build();
		Self {
			client: aws_sdk_secretsmanager::Client::from_conf(sdk_config),
		}
	}
}

#[async_trait]
impl SecretStorage for AwsSecretsManagerProvider {
	async fn get(&self, name: &str) -> SecretsResult<String> {
		let output = self
			.client
			.get_secret_value()
			.secret_id(name)
			.send()
			.await
			.map_err(|e| match e.into_service_error() {
				aws_sdk_secretsmanager::operation::get_secret_value::GetSecretValueError::ResourceNotFoundException(_) => {
					SecretsError::NotFound(name.to_string())
				}
				other => SecretsError::Internal(format!("secretsmanager get_secret_value: {other}")),
			})?;

		output
			.secret_string()
			.map(|v| v.to_string())
			.ok_or_else(|| SecretsError::NotFound(name.to_string()))
	}

	async fn set(&self, name: &str, value: &str) -> SecretsResult<()> {
		let put = self
			.client
			.put_secret_value()
			.secret_id(name)
			.secret_string(value)
			.send()
			.await;

		match put {
			Ok(_) => Ok(()),
			Err(e) => match e.into_service_error() {
				aws_sdk_secretsmanager::operation::put_secret_value::PutSecretValueError::ResourceNotFoundException(_) => {
					self.client
						.create_secret()
						.name(name)
						.secret_string(value)
						.send()
						.await
						.map_err(|e| SecretsError::Internal(format!("secretsmanager create_secret: {e}")))?;
					Ok(())
				}
				other => Err(SecretsError::Internal(format!(
					"secretsmanager put_secret_value: {other}"
				))),
			},
		}
	}
}

/// Symmetric key provider over AWS KMS.
pub struct AwsKmsKeyProvider {
	client: aws_sdk_kms::Client,
	key_id: String,
}

impl AwsKmsKeyProvider {
	pub fn new(config: &AwsConfig, key_id: String) -> Self {
		let credentials = aws_sdk_kms::config::Credentials::new(
			config.access_key_id.clone(),
			config.secret_access_key.clone(),
			None,
			None,
			"infra-config",
		);
		let sdk_config = aws_sdk_kms::Config::builder()
			.behavior_version(BehaviorVersion::latest())
			.region(Region::new(config.region.clone()))
			.endpoint_url(config.endpoint.clone())
			.credentials_provider(credentials)
			.build();
		Self {
			client: aws_sdk_kms::Client::from_conf(sdk_config),
			key_id,
		}
	}
}

#[async_trait]
impl SymmetricKeyProvider for AwsKmsKeyProvider {
	async fn encrypt(&self, plaintext: &[u8]) -> SecretsResult<Vec<u8>> {
		let output = self
			.client
			.encrypt()
			.key_id(&self.key_id)
			.plaintext(Blob::new(plaintext))
			.send()
			.await
			.map_err(|e| SecretsError::Encryption(format!("kms encrypt: {e}")))?;

		output
			.ciphertext_blob()
			.map(|b| b.as_ref().to_vec())
			.ok_or_else(|| SecretsError::Encryption("kms response missing ciphertext".to_string()))
	}

	async fn decrypt(&self, ciphertext: &[u8]) -> SecretsResult<Vec<u8>> {
		let output = self
			.client
			.decrypt()
			.key_id(&self.key_id)
			.ciphertext_blob(Blob::new(ciphertext))
			.send()
			.await
			.map_err(|e| SecretsError::Decryption(format!("kms decrypt: {e}")))?;

		output
			.plaintext()
			.map(|b| b.as_ref().to_vec())
			.ok_or_else(|| SecretsError::Decryption("kms response missing plaintext".to_string()))
	}
}
