// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Core type definitions for authentication and authorization.
//!
//! - **ID newtypes**: type-safe wrappers around snowflake ids for each entity
//!   kind ([`IdentityId`], [`OrganizationId`], etc.), preventing accidental
//!   mixing. Serialized as decimal strings: snowflake values exceed the 2^53
//!   exact-integer range of IEEE-754 doubles, so a JSON number would be
//!   silently rounded by standard clients.
//! - **[`Role`]**: the privilege set evaluated against the `infra` resource.
//! - **[`AccessKeyScope`]**: capability restrictions carried by access keys.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::snowflake;

/// The grant resource that scopes privileges to the registry itself.
pub const INFRA_RESOURCE: &str = "infra";

/// Sentinel `created_by` value for rows written by the bootstrap loader.
pub const CREATED_BY_SYSTEM: i64 = 1;

// =============================================================================
// ID Newtypes
// =============================================================================

macro_rules! define_id_type {
	($name:ident, $doc:expr) => {
		#[doc = $doc]
		#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
		pub struct $name(i64);

		impl $name {
			/// Create an ID from a raw snowflake value.
			pub fn new(id: i64) -> Self {
				Self(id)
			}

			/// Generate a new snowflake ID.
			pub fn generate() -> Self {
				Self(snowflake::generate())
			}

			/// Get the raw snowflake value.
			pub fn as_i64(self) -> i64 {
				self.0
			}
		}

		impl fmt::Display for $name {
			fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
				write!(f, "{}", self.0)
			}
		}

		impl From<i64> for $name {
			fn from(id: i64) -> Self {
				Self(id)
			}
		}

		impl From<$name> for i64 {
			fn from(id: $name) -> Self {
				id.0
			}
		}

		impl FromStr for $name {
			type Err = std::num::ParseIntError;

			fn from_str(s: &str) -> Result<Self, Self::Err> {
				s.parse::<i64>().map(Self)
			}
		}

		// ids travel as decimal strings: the raw snowflake value does not
		// survive a round-trip through an IEEE-754 double
		impl Serialize for $name {
			fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
			where
				S: serde::Serializer,
			{
				serializer.collect_str(&self.0)
			}
		}

		impl<'de> Deserialize<'de> for $name {
			fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
			where
				D: serde::Deserializer<'de>,
			{
				let raw = String::deserialize(deserializer)?;
				raw.parse().map_err(serde::de::Error::custom)
			}
		}
	};
}

define_id_type!(OrganizationId, "Unique identifier for an organization.");
define_id_type!(IdentityId, "Unique identifier for an identity (user, connector, or service).");
define_id_type!(ProviderId, "Unique identifier for an authentication provider.");
define_id_type!(AccessKeyId, "Unique identifier for an access key.");
define_id_type!(GrantId, "Unique identifier for a grant.");
define_id_type!(DestinationId, "Unique identifier for a destination.");
define_id_type!(GroupId, "Unique identifier for a group.");
define_id_type!(CredentialId, "Unique identifier for a credential.");

// =============================================================================
// Roles
// =============================================================================

/// Privileges evaluated against the `infra` resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
	/// Full control over the registry.
	Admin,
	/// Read-only access to registry state.
	View,
	/// The in-cluster connector: read grants, manage its own destination.
	Connector,
}

impl Role {
	/// Returns all roles.
	pub fn all() -> &'static [Role] {
		&[Role::Admin, Role::View, Role::Connector]
	}

	/// The stored privilege string for this role.
	pub fn as_str(self) -> &'static str {
		match self {
			Role::Admin => "admin",
			Role::View => "view",
			Role::Connector => "connector",
		}
	}
}

impl fmt::Display for Role {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

impl FromStr for Role {
	type Err = UnknownRole;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s {
			"admin" => Ok(Role::Admin),
			"view" => Ok(Role::View),
			"connector" => Ok(Role::Connector),
			_ => Err(UnknownRole(s.to_string())),
		}
	}
}

/// Error returned when parsing an unrecognized role name.
#[derive(Debug, Clone, thiserror::Error)]
#[error("unknown role {0:?}")]
pub struct UnknownRole(pub String);

// =============================================================================
// Access-Key Scopes
// =============================================================================

/// Capability restrictions carried by an access key.
///
/// A key with no scopes is unrestricted (subject to grants). Scoped keys may
/// only perform the operations their scopes allow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AccessKeyScope {
	/// The key may be used to mint further access keys.
	#[serde(rename = "allow-create-access-key")]
	AllowCreateAccessKey,
	/// The key may only be used to set a new password.
	#[serde(rename = "password-reset")]
	PasswordReset,
}

impl AccessKeyScope {
	/// Returns all scopes.
	pub fn all() -> &'static [AccessKeyScope] {
		&[
			AccessKeyScope::AllowCreateAccessKey,
			AccessKeyScope::PasswordReset,
		]
	}

	/// The stored name of this scope.
	pub fn as_str(self) -> &'static str {
		match self {
			AccessKeyScope::AllowCreateAccessKey => "allow-create-access-key",
			AccessKeyScope::PasswordReset => "password-reset",
		}
	}

	/// Render a scope set in its stored, comma-separated form.
	pub fn join(scopes: &[AccessKeyScope]) -> String {
		scopes
			.iter()
			.map(|s| s.as_str())
			.collect::<Vec<_>>()
			.join(",")
	}

	/// Parse a comma-separated scope set, ignoring empty segments.
	pub fn split(raw: &str) -> Result<Vec<AccessKeyScope>, UnknownScope> {
		raw.split(',')
			.filter(|s| !s.is_empty())
			.map(|s| s.parse())
			.collect()
	}
}

impl fmt::Display for AccessKeyScope {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

impl FromStr for AccessKeyScope {
	type Err = UnknownScope;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s {
			"allow-create-access-key" => Ok(AccessKeyScope::AllowCreateAccessKey),
			"password-reset" => Ok(AccessKeyScope::PasswordReset),
			_ => Err(UnknownScope(s.to_string())),
		}
	}
}

/// Error returned when parsing an unrecognized scope name.
#[derive(Debug, Clone, thiserror::Error)]
#[error("unknown access key scope {0:?}")]
pub struct UnknownScope(pub String);

#[cfg(test)]
mod tests {
	use super::*;
	use proptest::prelude::*;

	mod id_types {
		use super::*;

		#[test]
		fn identity_id_roundtrips() {
			let id = IdentityId::new(12345);
			assert_eq!(id.as_i64(), 12345);
			assert_eq!(i64::from(id), 12345);
		}

		#[test]
		fn identity_id_generates_unique() {
			let id1 = IdentityId::generate();
			let id2 = IdentityId::generate();
			assert_ne!(id1, id2);
		}

		#[test]
		fn identity_id_serializes_as_string() {
			let id = IdentityId::new(42);
			assert_eq!(serde_json::to_string(&id).unwrap(), "\"42\"");
		}

		#[test]
		fn identity_id_deserializes_from_string() {
			let id: IdentityId = serde_json::from_str("\"9007199254740993\"").unwrap();
			// a value above 2^53, exact only because it never became a double
			assert_eq!(id.as_i64(), 9_007_199_254_740_993);
			assert!(serde_json::from_str::<IdentityId>("42").is_err());
		}

		#[test]
		fn identity_id_parses_from_string() {
			let id: IdentityId = "9007".parse().unwrap();
			assert_eq!(id.as_i64(), 9007);
			assert!("not-a-number".parse::<IdentityId>().is_err());
		}

		proptest! {
			#[test]
			fn id_roundtrip_any_value(raw: i64) {
				let id = GrantId::new(raw);
				prop_assert_eq!(id.as_i64(), raw);
				prop_assert_eq!(id.to_string(), raw.to_string());
			}

			#[test]
			fn id_serde_roundtrip(raw: i64) {
				let id = DestinationId::new(raw);
				let json = serde_json::to_string(&id).unwrap();
				let back: DestinationId = serde_json::from_str(&json).unwrap();
				prop_assert_eq!(id, back);
			}
		}
	}

	mod roles {
		use super::*;

		#[test]
		fn role_roundtrips_through_str() {
			for role in Role::all() {
				assert_eq!(role.as_str().parse::<Role>().unwrap(), *role);
			}
		}

		#[test]
		fn unknown_role_is_rejected() {
			assert!("superuser".parse::<Role>().is_err());
		}
	}

	mod scopes {
		use super::*;

		#[test]
		fn scope_join_and_split_roundtrip() {
			let scopes = vec![
				AccessKeyScope::AllowCreateAccessKey,
				AccessKeyScope::PasswordReset,
			];
			let joined = AccessKeyScope::join(&scopes);
			assert_eq!(joined, "allow-create-access-key,password-reset");
			assert_eq!(AccessKeyScope::split(&joined).unwrap(), scopes);
		}

		#[test]
		fn split_ignores_empty_segments() {
			assert_eq!(AccessKeyScope::split("").unwrap(), vec![]);
			assert_eq!(
				AccessKeyScope::split("password-reset,").unwrap(),
				vec![AccessKeyScope::PasswordReset]
			);
		}

		#[test]
		fn split_rejects_unknown_scope() {
			assert!(AccessKeyScope::split("password-reset,launch-missiles").is_err());
		}
	}
}
