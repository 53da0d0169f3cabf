// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! The identity record: a user, service account, or the in-cluster connector.

use chrono::{DateTime, Utc};

use crate::access_key::random_alphanumeric;
use crate::types::{IdentityId, OrganizationId};

/// Reserved name of the in-cluster connector identity.
pub const INTERNAL_CONNECTOR_IDENTITY_NAME: &str = "connector";

/// Length of the emailed verification token.
const VERIFICATION_TOKEN_LENGTH: usize = 10;

/// An identity record. `name` is an email address for humans and a reserved
/// name for the connector; unique per organization.
#[derive(Debug, Clone, PartialEq)]
pub struct Identity {
	pub id: IdentityId,
	pub organization_id: OrganizationId,
	pub name: String,
	pub created_by: i64,
	pub verification_token: String,
	pub last_seen_at: Option<DateTime<Utc>>,
	pub created_at: DateTime<Utc>,
	pub updated_at: DateTime<Utc>,
	pub deleted_at: Option<DateTime<Utc>>,
}

impl Identity {
	/// Returns true when this is the reserved connector identity.
	pub fn is_connector(&self) -> bool {
		self.name == INTERNAL_CONNECTOR_IDENTITY_NAME
	}

	/// The login name used on ssh destinations: the local part of the email,
	/// lowercased.
	pub fn ssh_login_name(&self) -> String {
		self.name
			.split('@')
			.next()
			.unwrap_or(&self.name)
			.to_ascii_lowercase()
	}
}

/// Generate a fresh verification token for a new identity.
pub fn generate_verification_token() -> String {
	random_alphanumeric(VERIFICATION_TOKEN_LENGTH)
}

#[cfg(test)]
mod tests {
	use super::*;

	fn identity(name: &str) -> Identity {
		Identity {
			id: IdentityId::generate(),
			organization_id: OrganizationId::generate(),
			name: name.to_string(),
			created_by: 0,
			verification_token: generate_verification_token(),
			last_seen_at: None,
			created_at: Utc::now(),
			updated_at: Utc::now(),
			deleted_at: None,
		}
	}

	#[test]
	fn ssh_login_name_is_local_part_lowercased() {
		assert_eq!(identity("Alice@example.com").ssh_login_name(), "alice");
		assert_eq!(identity("bob@example.com").ssh_login_name(), "bob");
	}

	#[test]
	fn ssh_login_name_without_at_sign_is_whole_name() {
		assert_eq!(identity("connector").ssh_login_name(), "connector");
	}

	#[test]
	fn connector_identity_is_detected_by_name() {
		assert!(identity(INTERNAL_CONNECTOR_IDENTITY_NAME).is_connector());
		assert!(!identity("alice@example.com").is_connector());
	}

	#[test]
	fn verification_tokens_are_unique() {
		assert_ne!(generate_verification_token(), generate_verification_token());
	}
}
