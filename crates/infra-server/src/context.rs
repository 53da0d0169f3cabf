// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! The per-request context attached by the authentication middleware.

use infra_server_auth::{AccessKey, Identity};
use infra_server_db::Organization;

/// The authenticated caller. `identity` is `None` for keys issued directly
/// to a provider (SCIM keys).
#[derive(Debug, Clone)]
pub struct Authenticated {
	pub access_key: AccessKey,
	pub identity: Option<Identity>,
	pub organization: Organization,
}

/// Request context available to every authenticated handler. Handlers open
/// their transactions from the store, scoped to `organization().id`.
#[derive(Debug, Clone)]
pub struct RequestContext {
	pub authenticated: Authenticated,
}

impl RequestContext {
	pub fn organization(&self) -> &Organization {
		&self.authenticated.organization
	}

	/// The authenticated identity, or `not-authorized` when the key is
	/// provider-scoped and has no user behind it.
	pub fn require_identity(&self) -> crate::error::Result<&Identity> {
		self.authenticated.identity.as_ref().ok_or_else(|| {
			crate::error::ServerError::NotAuthorized {
				subject: format!("access key {}", self.authenticated.access_key.key_id),
				action: "act as a user".to_string(),
				required: vec![],
			}
		})
	}
}
