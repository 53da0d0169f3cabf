// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! The access-key lifetime engine: issuance, validation, and inactivity
//! extension.
//!
//! Validation is read-mostly; the only write on the hot path is the
//! throttled `last_seen_at`/`inactivity_timeout` touch, coalesced so that
//! concurrent requests with the same key produce at most one write per
//! window.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Mutex;

use chrono::{DateTime, Duration, Utc};
use infra_server_auth::access_key::{
	generate_key_id, generate_secret, hash_secret, parse_token, verify_secret,
};
use infra_server_auth::{AccessKey, AccessKeyId, Identity};
use infra_server_db::OrgTxn;

use crate::error::{Result, ServerError};

/// Window within which repeated activity on the same key is not re-recorded.
/// Must stay at or below 5 seconds of granularity.
pub fn activity_throttle_window() -> Duration {
	Duration::seconds(2)
}

/// Issue a new access key.
///
/// `key.key_id` and `key.secret_hash` may be empty; they are generated here.
/// Returns the stored key and the full `KEYID.SECRET` string, which is never
/// recoverable afterwards.
#[tracing::instrument(skip(txn, key), fields(issued_for = %key.issued_for))]
pub async fn create_access_key(
	txn: &mut OrgTxn,
	mut key: AccessKey,
) -> Result<(AccessKey, String)> {
	let now = Utc::now();
	if key.expires_at <= now {
		return Err(ServerError::BadRequest(
			"access key expiry must be in the future".to_string(),
		));
	}
	if let Some(deadline) = key.inactivity_timeout {
		if deadline > key.expires_at {
			return Err(ServerError::BadRequest(
				"inactivity timeout must not exceed the key expiry".to_string(),
			));
		}
	}

	if key.key_id.is_empty() {
		key.key_id = generate_key_id();
	}
	let secret = generate_secret();
	key.secret_hash = hash_secret(&secret)?;
	if key.inactivity_timeout.is_none() {
		if let Some(extension) = key.inactivity_extension {
			key.inactivity_timeout = Some((now + extension).min(key.expires_at));
		}
	}

	txn.create_access_key(&key).await?;
	let token = format!("{}.{}", key.key_id, secret);
	Ok((key, token))
}

/// Validate a presented bearer string.
///
/// Returns the access key and the identity it was issued for; the identity
/// is `None` for provider-scoped (SCIM) keys. Error messages are part of the
/// API contract.
#[tracing::instrument(skip(txn, bearer))]
pub async fn validate_access_key(
	txn: &mut OrgTxn,
	bearer: &str,
) -> Result<(AccessKey, Option<Identity>)> {
	let (key_id, secret) = parse_token(bearer)
		.map_err(|e| ServerError::NotAuthenticated(e.to_string()))?;

	let key = txn
		.get_access_key_by_key_id(key_id)
		.await?
		.ok_or_else(|| ServerError::NotAuthenticated("access key invalid secret".to_string()))?;

	// bcrypt is CPU-bound; keep it off the request workers
	let presented = secret.to_string();
	let secret_hash = key.secret_hash.clone();
	let valid = tokio::task::spawn_blocking(move || verify_secret(&presented, &secret_hash))
		.await
		.map_err(|e| ServerError::Internal(format!("bcrypt verify task: {e}")))??;
	if !valid {
		return Err(ServerError::NotAuthenticated(
			"access key invalid secret".to_string(),
		));
	}

	let now = Utc::now();
	if now >= key.expires_at {
		return Err(ServerError::NotAuthenticated(
			"access key has expired".to_string(),
		));
	}
	if let Some(deadline) = key.inactivity_timeout {
		if now >= deadline {
			return Err(ServerError::NotAuthenticated(
				"access key has expired".to_string(),
			));
		}
	}

	// keys issued directly to a provider authenticate the provider itself
	if key.issued_for_provider() {
		return Ok((key, None));
	}

	let identity = txn
		.get_identity_by_id(key.issued_for)
		.await?
		.ok_or_else(|| {
			ServerError::NotAuthenticated("identity for access key: record not found".to_string())
		})?;

	// the identity must be linked to the provider that authenticated it
	if txn.get_provider_user(key.provider_id, identity.id).await?.is_none() {
		return Err(ServerError::NotAuthenticated(
			"identity for access key: record not found".to_string(),
		));
	}

	Ok((key, Some(identity)))
}

/// Record activity on a key: advance the identity's `last_seen_at` and slide
/// the key's inactivity deadline. Throttled per key.
#[tracing::instrument(skip(txn, throttle, key, identity), fields(access_key_id = %key.id))]
pub async fn touch_activity(
	txn: &mut OrgTxn,
	throttle: &ActivityThrottle<AccessKeyId>,
	key: &AccessKey,
	identity: &Identity,
) -> Result<()> {
	let now = Utc::now();
	if !throttle.should_record(key.id, now) {
		return Ok(());
	}

	txn.touch_identity_last_seen(identity.id, now).await?;

	if let Some(extension) = key.inactivity_extension {
		let deadline = (now + extension).min(key.expires_at);
		txn.update_access_key_inactivity(key.id, deadline).await?;
	}
	Ok(())
}

/// Persist scope changes on a key.
pub async fn update_access_key_scopes(txn: &mut OrgTxn, key: &AccessKey) -> Result<()> {
	txn.update_access_key_scopes(key).await?;
	Ok(())
}

/// Per-key write coalescing: at most one recorded activity per window under
/// concurrent load. Compare-and-swap under one short-lived lock; no await
/// points while held.
pub struct ActivityThrottle<K: Eq + Hash> {
	window: Duration,
	last: Mutex<HashMap<K, DateTime<Utc>>>,
}

impl<K: Eq + Hash> ActivityThrottle<K> {
	pub fn new(window: Duration) -> Self {
		Self {
			window,
			last: Mutex::new(HashMap::new()),
		}
	}

	/// True when the caller should write; records `now` as the last write.
	pub fn should_record(&self, key: K, now: DateTime<Utc>) -> bool {
		let mut last = self.last.lock().unwrap_or_else(|e| e.into_inner());
		match last.get(&key) {
			Some(previous) if now - *previous < self.window => false,
			_ => {
				last.insert(key, now);
				true
			}
		}
	}
}

impl<K: Eq + Hash> Default for ActivityThrottle<K> {
	fn default() -> Self {
		Self::new(activity_throttle_window())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn throttle_allows_first_write() {
		let throttle = ActivityThrottle::new(Duration::seconds(2));
		assert!(throttle.should_record(AccessKeyId::new(1), Utc::now()));
	}

	#[test]
	fn throttle_blocks_within_window() {
		let throttle = ActivityThrottle::new(Duration::seconds(2));
		let now = Utc::now();
		assert!(throttle.should_record(AccessKeyId::new(1), now));
		assert!(!throttle.should_record(AccessKeyId::new(1), now + Duration::milliseconds(500)));
		assert!(!throttle.should_record(AccessKeyId::new(1), now + Duration::milliseconds(1999)));
	}

	#[test]
	fn throttle_allows_after_window() {
		let throttle = ActivityThrottle::new(Duration::seconds(2));
		let now = Utc::now();
		assert!(throttle.should_record(AccessKeyId::new(1), now));
		assert!(throttle.should_record(AccessKeyId::new(1), now + Duration::seconds(3)));
	}

	#[test]
	fn throttle_tracks_keys_independently() {
		let throttle = ActivityThrottle::new(Duration::seconds(2));
		let now = Utc::now();
		assert!(throttle.should_record(AccessKeyId::new(1), now));
		assert!(throttle.should_record(AccessKeyId::new(2), now));
	}

	#[test]
	fn throttle_coalesces_concurrent_writers() {
		use std::sync::Arc;

		let throttle = Arc::new(ActivityThrottle::new(Duration::seconds(2)));
		let now = Utc::now();
		let handles: Vec<_> = (0..32)
			.map(|_| {
				let throttle = Arc::clone(&throttle);
				std::thread::spawn(move || throttle.should_record(AccessKeyId::new(7), now))
			})
			.collect();

		let recorded = handles
			.into_iter()
			.map(|h| h.join().unwrap())
			.filter(|r| *r)
			.count();
		assert_eq!(recorded, 1, "exactly one concurrent writer should win");
	}
}
