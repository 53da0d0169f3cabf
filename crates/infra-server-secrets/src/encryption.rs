// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! The native symmetric key provider.
//!
//! AES-256-GCM with a root key held in a [`SecretStorage`] backend. The key
//! is created on first use and cached for the life of the process;
//! ciphertexts are `nonce || aead ciphertext`, base64 handled by callers.

use std::sync::Arc;

use aes_gcm::aead::{Aead, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use async_trait::async_trait;
use base64::Engine;
use rand::RngCore;
use tokio::sync::OnceCell;
use zeroize::Zeroizing;

use crate::error::{SecretsError, SecretsResult};
use crate::{SecretStorage, SymmetricKeyProvider};

/// Size of the root key in bytes (256 bits for AES-256).
pub const KEY_SIZE: usize = 32;

/// Size of the AES-GCM nonce in bytes.
pub const NONCE_SIZE: usize = 12;

/// Storage name the root key is kept under.
const ROOT_KEY_NAME: &str = "root-key";

/// Generate a random root key.
pub fn generate_key() -> Zeroizing<[u8; KEY_SIZE]> {
	let mut key = Zeroizing::new([0u8; KEY_SIZE]);
	OsRng.fill_bytes(key.as_mut());
	key
}

fn generate_nonce() -> [u8; NONCE_SIZE] {
	// 96-bit random nonces; the same (key, nonce) pair must never be reused.
	let mut nonce = [0u8; NONCE_SIZE];
	OsRng.fill_bytes(&mut nonce);
	nonce
}

/// Symmetric key provider backed by a locally held AES-256-GCM key.
pub struct NativeKeyProvider {
	storage: Option<Arc<dyn SecretStorage>>,
	key: OnceCell<Zeroizing<[u8; KEY_SIZE]>>,
}

impl NativeKeyProvider {
	/// Build a provider over a storage backend. The root key is loaded from
	/// `storage` on first use, generated and persisted when absent.
	pub fn new(storage: Arc<dyn SecretStorage>) -> Self {
		Self {
			storage: Some(storage),
			key: OnceCell::new(),
		}
	}

	/// Build a provider directly from key material (tests, key rotation).
	pub fn from_key(key: Zeroizing<[u8; KEY_SIZE]>) -> Self {
		Self {
			storage: None,
			key: OnceCell::new_with(Some(key)),
		}
	}

	async fn root_key(&self) -> SecretsResult<&Zeroizing<[u8; KEY_SIZE]>> {
		self.key
			.get_or_try_init(|| async {
				let storage = self
					.storage
					.as_ref()
					.ok_or_else(|| SecretsError::Internal("key provider has no storage".to_string()))?;
				load_or_create_root_key(storage.as_ref()).await
			})
			.await
	}
}

async fn load_or_create_root_key(
	storage: &dyn SecretStorage,
) -> SecretsResult<Zeroizing<[u8; KEY_SIZE]>> {
	match storage.get(ROOT_KEY_NAME).await {
		Ok(encoded) => {
			let bytes = base64::engine::general_purpose::STANDARD.decode(encoded.trim())?;
			if bytes.len() != KEY_SIZE {
				return Err(SecretsError::InvalidKeySize {
					expected: KEY_SIZE,
					actual: bytes.len(),
				});
			}
			let mut key = Zeroizing::new([0u8; KEY_SIZE]);
			key.copy_from_slice(&bytes);
			Ok(key)
		}
		Err(SecretsError::NotFound(_)) => {
			let key = generate_key();
			let encoded = base64::engine::general_purpose::STANDARD.encode(key.as_ref());
			storage.set(ROOT_KEY_NAME, &encoded).await?;
			tracing::info!("generated new root encryption key");
			Ok(key)
		}
		Err(e) => Err(e),
	}
}

#[async_trait]
impl SymmetricKeyProvider for NativeKeyProvider {
	async fn encrypt(&self, plaintext: &[u8]) -> SecretsResult<Vec<u8>> {
		let root = self.root_key().await?;
		let key = Key::<Aes256Gcm>::from_slice(root.as_ref());
		let cipher = Aes256Gcm::new(key);

		let nonce_bytes = generate_nonce();
		let nonce = Nonce::from_slice(&nonce_bytes);

		let ciphertext = cipher
			.encrypt(nonce, plaintext)
			.map_err(|e| SecretsError::Encryption(format!("aes-gcm encrypt: {e}")))?;

		let mut out = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
		out.extend_from_slice(&nonce_bytes);
		out.extend_from_slice(&ciphertext);
		Ok(out)
	}

	async fn decrypt(&self, ciphertext: &[u8]) -> SecretsResult<Vec<u8>> {
		if ciphertext.len() < NONCE_SIZE {
			return Err(SecretsError::Decryption(
				"ciphertext shorter than nonce".to_string(),
			));
		}
		let (nonce_bytes, payload) = ciphertext.split_at(NONCE_SIZE);

		let root = self.root_key().await?;
		let key = Key::<Aes256Gcm>::from_slice(root.as_ref());
		let cipher = Aes256Gcm::new(key);
		let nonce = Nonce::from_slice(nonce_bytes);

		cipher
			.decrypt(nonce, payload)
			.map_err(|e| SecretsError::Decryption(format!("aes-gcm decrypt: {e}")))
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::registry::GenericConfig;
	use crate::storage::FileSecretProvider;
	use proptest::prelude::*;

	#[test]
	fn key_generation_produces_unique_keys() {
		let key1 = generate_key();
		let key2 = generate_key();
		assert_ne!(key1.as_slice(), key2.as_slice());
	}

	#[tokio::test]
	async fn encrypt_decrypt_roundtrip() {
		let provider = NativeKeyProvider::from_key(generate_key());
		let ciphertext = provider.encrypt(b"client secret").await.unwrap();
		assert_ne!(&ciphertext[NONCE_SIZE..], b"client secret");
		let plaintext = provider.decrypt(&ciphertext).await.unwrap();
		assert_eq!(plaintext, b"client secret");
	}

	#[tokio::test]
	async fn encrypting_twice_yields_distinct_ciphertexts() {
		let provider = NativeKeyProvider::from_key(generate_key());
		let first = provider.encrypt(b"client secret").await.unwrap();
		let second = provider.encrypt(b"client secret").await.unwrap();
		assert_ne!(first, second);
	}

	#[tokio::test]
	async fn decrypt_with_wrong_key_fails() {
		let ciphertext = NativeKeyProvider::from_key(generate_key())
			.encrypt(b"client secret")
			.await
			.unwrap();
		let other = NativeKeyProvider::from_key(generate_key());
		assert!(matches!(
			other.decrypt(&ciphertext).await.unwrap_err(),
			SecretsError::Decryption(_)
		));
	}

	#[tokio::test]
	async fn decrypt_rejects_truncated_ciphertext() {
		let provider = NativeKeyProvider::from_key(generate_key());
		assert!(matches!(
			provider.decrypt(&[0u8; 4]).await.unwrap_err(),
			SecretsError::Decryption(_)
		));
	}

	#[tokio::test]
	async fn root_key_is_created_once_and_reused() {
		let dir = tempfile::tempdir().unwrap();
		let storage: Arc<dyn crate::SecretStorage> = Arc::new(FileSecretProvider::new(
			GenericConfig::default(),
			Some(dir.path().to_path_buf()),
		));

		let first = NativeKeyProvider::new(storage.clone());
		let ciphertext = first.encrypt(b"payload").await.unwrap();

		// a second provider over the same storage reads the persisted key
		let second = NativeKeyProvider::new(storage);
		assert_eq!(second.decrypt(&ciphertext).await.unwrap(), b"payload");
	}

	proptest! {
		#[test]
		fn roundtrip_any_payload(payload in proptest::collection::vec(any::<u8>(), 0..256)) {
			let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
			rt.block_on(async {
				let provider = NativeKeyProvider::from_key(generate_key());
				let ciphertext = provider.encrypt(&payload).await.unwrap();
				prop_assert_eq!(provider.decrypt(&ciphertext).await.unwrap(), payload);
				Ok(())
			})?;
		}
	}
}
