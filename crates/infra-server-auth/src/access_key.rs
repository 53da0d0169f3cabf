// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! The access-key credential: format, generation, and hashing.
//!
//! A presented access key has the shape `KEYID.SECRET`: a 10-character public
//! key id followed by a 24-character secret, both alphanumeric. Only the
//! bcrypt hash of the secret is stored; the full string is returned to the
//! caller exactly once, at creation.

use chrono::{DateTime, Duration, Utc};
use rand::distributions::Alphanumeric;
use rand::rngs::OsRng;
use rand::Rng;

use crate::types::{AccessKeyId, AccessKeyScope, IdentityId, OrganizationId, ProviderId};

/// Length of the public key id portion.
pub const KEY_ID_LENGTH: usize = 10;

/// Length of the secret portion.
pub const SECRET_LENGTH: usize = 24;

/// Total length of a legacy root/engine token.
pub const LEGACY_TOKEN_LENGTH: usize = 36;

/// Key-id length of a legacy root/engine token; the remaining 24 characters
/// are the secret.
pub const LEGACY_KEY_ID_LENGTH: usize = 12;

/// An access key record.
///
/// `issued_for` is the identity the key authenticates. `provider_id` names
/// the provider that authenticated that identity, except for provider-scoped
/// keys (SCIM) where `provider_id == issued_for`.
#[derive(Debug, Clone, PartialEq)]
pub struct AccessKey {
	pub id: AccessKeyId,
	pub organization_id: OrganizationId,
	pub name: Option<String>,
	pub issued_for: IdentityId,
	pub provider_id: ProviderId,
	pub key_id: String,
	pub secret_hash: String,
	pub expires_at: DateTime<Utc>,
	pub inactivity_timeout: Option<DateTime<Utc>>,
	pub inactivity_extension: Option<Duration>,
	pub scopes: Vec<AccessKeyScope>,
	pub created_at: DateTime<Utc>,
	pub updated_at: DateTime<Utc>,
	pub deleted_at: Option<DateTime<Utc>>,
}

impl AccessKey {
	/// Returns true when the key carries the given scope.
	pub fn has_scope(&self, scope: AccessKeyScope) -> bool {
		self.scopes.contains(&scope)
	}

	/// Returns true for keys issued directly to a provider (SCIM keys).
	pub fn issued_for_provider(&self) -> bool {
		self.provider_id.as_i64() == self.issued_for.as_i64()
	}
}

/// Error returned when a presented bearer string is not a well-formed
/// access key.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid access key format")]
pub struct AccessKeyParseError;

/// Generate a random alphanumeric string from the OS RNG.
pub fn random_alphanumeric(len: usize) -> String {
	OsRng
		.sample_iter(&Alphanumeric)
		.take(len)
		.map(char::from)
		.collect()
}

/// Generate a new public key id.
pub fn generate_key_id() -> String {
	random_alphanumeric(KEY_ID_LENGTH)
}

/// Generate a new secret.
pub fn generate_secret() -> String {
	random_alphanumeric(SECRET_LENGTH)
}

/// Split a presented bearer string into `(key_id, secret)` at the first `.`.
pub fn parse_token(bearer: &str) -> Result<(&str, &str), AccessKeyParseError> {
	match bearer.split_once('.') {
		Some((key_id, secret)) if !key_id.is_empty() && !secret.is_empty() => Ok((key_id, secret)),
		_ => Err(AccessKeyParseError),
	}
}

/// Returns true when the string matches the canonical access-key shape:
/// `^[A-Za-z0-9]{10}\.[A-Za-z0-9]{24}$`.
pub fn matches_token_format(s: &str) -> bool {
	match s.split_once('.') {
		Some((key_id, secret)) => {
			key_id.len() == KEY_ID_LENGTH
				&& secret.len() == SECRET_LENGTH
				&& key_id.chars().all(|c| c.is_ascii_alphanumeric())
				&& secret.chars().all(|c| c.is_ascii_alphanumeric())
		}
		None => false,
	}
}

/// bcrypt cost for stored secrets.
pub const BCRYPT_COST: u32 = 10;

/// Hash a secret for storage.
pub fn hash_secret(secret: &str) -> Result<String, bcrypt::BcryptError> {
	bcrypt::hash(secret, BCRYPT_COST)
}

/// Compare a presented secret against a stored hash.
///
/// bcrypt comparison is constant-time in the secret.
pub fn verify_secret(secret: &str, hash: &str) -> Result<bool, bcrypt::BcryptError> {
	bcrypt::verify(secret, hash)
}

#[cfg(test)]
mod tests {
	use super::*;
	use proptest::prelude::*;

	#[test]
	fn generated_parts_have_expected_shape() {
		let key_id = generate_key_id();
		let secret = generate_secret();
		assert_eq!(key_id.len(), KEY_ID_LENGTH);
		assert_eq!(secret.len(), SECRET_LENGTH);
		assert!(matches_token_format(&format!("{key_id}.{secret}")));
	}

	#[test]
	fn parse_splits_at_first_dot() {
		let (key_id, secret) = parse_token("abc.def.ghi").unwrap();
		assert_eq!(key_id, "abc");
		assert_eq!(secret, "def.ghi");
	}

	#[test]
	fn parse_rejects_missing_dot() {
		assert_eq!(parse_token("nodothere"), Err(AccessKeyParseError));
		assert_eq!(parse_token(""), Err(AccessKeyParseError));
		assert_eq!(parse_token(".secret"), Err(AccessKeyParseError));
		assert_eq!(parse_token("keyid."), Err(AccessKeyParseError));
	}

	#[test]
	fn parse_error_message_is_stable() {
		assert_eq!(AccessKeyParseError.to_string(), "invalid access key format");
	}

	#[test]
	fn token_format_rejects_wrong_lengths() {
		assert!(!matches_token_format("short.secret"));
		assert!(!matches_token_format(&format!(
			"{}.{}",
			random_alphanumeric(KEY_ID_LENGTH),
			random_alphanumeric(SECRET_LENGTH - 1)
		)));
		assert!(!matches_token_format(&format!(
			"{}!{}",
			random_alphanumeric(KEY_ID_LENGTH - 1),
			random_alphanumeric(SECRET_LENGTH)
		)));
	}

	#[test]
	fn hash_and_verify_roundtrip() {
		let secret = generate_secret();
		let hash = hash_secret(&secret).unwrap();
		assert!(verify_secret(&secret, &hash).unwrap());
		assert!(!verify_secret("wrong-secret", &hash).unwrap());
	}

	proptest! {
		#[test]
		fn generated_tokens_always_parse(_i in 0..20u8) {
			let token = format!("{}.{}", generate_key_id(), generate_secret());
			let (key_id, secret) = parse_token(&token).unwrap();
			prop_assert_eq!(key_id.len(), KEY_ID_LENGTH);
			prop_assert_eq!(secret.len(), SECRET_LENGTH);
		}

		#[test]
		fn random_alphanumeric_is_alphanumeric(len in 1usize..64) {
			let s = random_alphanumeric(len);
			prop_assert_eq!(s.len(), len);
			prop_assert!(s.chars().all(|c| c.is_ascii_alphanumeric()));
		}
	}
}
