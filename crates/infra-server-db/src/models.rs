// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Entity records persisted by the store.
//!
//! `AccessKey` and `Identity` live in `infra-server-auth`; this module holds
//! the rest of the registry's data model.

use chrono::{DateTime, Utc};
use infra_server_auth::{
	DestinationId, GrantId, GroupId, IdentityId, OrganizationId, ProviderId,
};

/// Name of the built-in provider for local credentials.
pub const INFRA_PROVIDER_NAME: &str = "infra";

/// An organization: the tenant boundary scoping every other entity.
#[derive(Debug, Clone, PartialEq)]
pub struct Organization {
	pub id: OrganizationId,
	pub name: String,
	pub domain: String,
	pub created_at: DateTime<Utc>,
	pub updated_at: DateTime<Utc>,
	pub deleted_at: Option<DateTime<Utc>>,
}

/// An authentication provider. The `infra` provider always exists and backs
/// local credentials; the rest are external federations.
#[derive(Debug, Clone, PartialEq)]
pub struct Provider {
	pub id: ProviderId,
	pub organization_id: OrganizationId,
	pub name: String,
	pub kind: String,
	pub domain: String,
	pub client_id: String,
	/// Encrypted at rest; base64 of the key provider's ciphertext.
	pub client_secret: String,
	pub created_by: i64,
	pub created_at: DateTime<Utc>,
	pub updated_at: DateTime<Utc>,
	pub deleted_at: Option<DateTime<Utc>>,
}

impl Provider {
	pub fn is_infra(&self) -> bool {
		self.name == INFRA_PROVIDER_NAME
	}
}

/// The link between an identity and a provider that authenticates it.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderUser {
	pub id: i64,
	pub organization_id: OrganizationId,
	pub provider_id: ProviderId,
	pub identity_id: IdentityId,
	pub email: String,
	pub given_name: String,
	pub family_name: String,
	pub active: bool,
	pub created_at: DateTime<Utc>,
	pub updated_at: DateTime<Utc>,
}

/// A stored password. At most one per identity.
#[derive(Debug, Clone, PartialEq)]
pub struct Credential {
	pub id: infra_server_auth::CredentialId,
	pub organization_id: OrganizationId,
	pub identity_id: IdentityId,
	pub password_hash: String,
	pub one_time_password: bool,
	pub created_at: DateTime<Utc>,
	pub updated_at: DateTime<Utc>,
	pub deleted_at: Option<DateTime<Utc>>,
}

/// The subject of a grant: an identity or a group, expanded to identities at
/// read time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GrantSubject {
	Identity(IdentityId),
	Group(GroupId),
}

impl GrantSubject {
	pub fn kind(&self) -> &'static str {
		match self {
			GrantSubject::Identity(_) => "identity",
			GrantSubject::Group(_) => "group",
		}
	}

	pub fn id(&self) -> i64 {
		match self {
			GrantSubject::Identity(id) => id.as_i64(),
			GrantSubject::Group(id) => id.as_i64(),
		}
	}

	pub fn from_parts(kind: &str, id: i64) -> Option<Self> {
		match kind {
			"identity" => Some(GrantSubject::Identity(IdentityId::new(id))),
			"group" => Some(GrantSubject::Group(GroupId::new(id))),
			_ => None,
		}
	}
}

impl std::fmt::Display for GrantSubject {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "{}:{}", self.kind(), self.id())
	}
}

impl std::str::FromStr for GrantSubject {
	type Err = InvalidGrantSubject;

	fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
		let (kind, id) = s.split_once(':').ok_or_else(|| InvalidGrantSubject(s.to_string()))?;
		let id: i64 = id.parse().map_err(|_| InvalidGrantSubject(s.to_string()))?;
		GrantSubject::from_parts(kind, id).ok_or_else(|| InvalidGrantSubject(s.to_string()))
	}
}

/// Error returned when parsing a malformed grant subject.
#[derive(Debug, Clone, thiserror::Error)]
#[error("invalid grant subject {0:?}, expected identity:<id> or group:<id>")]
pub struct InvalidGrantSubject(pub String);

/// A binding of subject, privilege, and resource.
#[derive(Debug, Clone, PartialEq)]
pub struct Grant {
	pub id: GrantId,
	pub organization_id: OrganizationId,
	pub subject: GrantSubject,
	pub privilege: String,
	pub resource: String,
	pub created_by: i64,
	/// Monotonic change index, assigned by the database on every write.
	pub update_index: i64,
	pub created_at: DateTime<Utc>,
	pub updated_at: DateTime<Utc>,
	pub deleted_at: Option<DateTime<Utc>>,
}

impl Grant {
	/// The destination name a resource refers to, when it is not the
	/// registry-scoped `infra` resource.
	pub fn destination_name(resource: &str) -> Option<&str> {
		if resource == infra_server_auth::INFRA_RESOURCE {
			return None;
		}
		Some(resource.split('.').next().unwrap_or(resource))
	}
}

/// A managed target that a connector enforces access on.
#[derive(Debug, Clone, PartialEq)]
pub struct Destination {
	pub id: DestinationId,
	pub organization_id: OrganizationId,
	pub name: String,
	pub unique_id: String,
	pub kind: String,
	pub connection_url: String,
	pub connection_ca: String,
	pub resources: Vec<String>,
	pub roles: Vec<String>,
	pub version: String,
	pub last_seen_at: Option<DateTime<Utc>>,
	pub created_at: DateTime<Utc>,
	pub updated_at: DateTime<Utc>,
	pub deleted_at: Option<DateTime<Utc>>,
}

/// A named set of identities.
#[derive(Debug, Clone, PartialEq)]
pub struct Group {
	pub id: GroupId,
	pub organization_id: OrganizationId,
	pub name: String,
	pub created_by: i64,
	pub created_at: DateTime<Utc>,
	pub updated_at: DateTime<Utc>,
	pub deleted_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn grant_subject_parses_tagged_form() {
		let subject: GrantSubject = "identity:123".parse().unwrap();
		assert_eq!(subject, GrantSubject::Identity(IdentityId::new(123)));
		assert_eq!(subject.to_string(), "identity:123");

		let subject: GrantSubject = "group:9".parse().unwrap();
		assert_eq!(subject, GrantSubject::Group(GroupId::new(9)));

		assert!("machine:1".parse::<GrantSubject>().is_err());
		assert!("identity:abc".parse::<GrantSubject>().is_err());
		assert!("identity".parse::<GrantSubject>().is_err());
	}

	#[test]
	fn grant_subject_roundtrips_through_parts() {
		let subject = GrantSubject::Identity(IdentityId::new(7));
		assert_eq!(
			GrantSubject::from_parts(subject.kind(), subject.id()),
			Some(subject)
		);

		let subject = GrantSubject::Group(GroupId::new(9));
		assert_eq!(
			GrantSubject::from_parts(subject.kind(), subject.id()),
			Some(subject)
		);

		assert_eq!(GrantSubject::from_parts("machine", 1), None);
	}

	#[test]
	fn destination_name_strips_subresource() {
		assert_eq!(Grant::destination_name("cluster"), Some("cluster"));
		assert_eq!(Grant::destination_name("cluster.ns"), Some("cluster"));
		assert_eq!(Grant::destination_name("infra"), None);
	}
}
