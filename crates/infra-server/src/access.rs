// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Authorization and grant mutation.
//!
//! A subject is authorized when it holds, directly or through a group, a
//! grant whose privilege is in the required set and whose resource is
//! `infra`.

use chrono::Utc;
use infra_server_auth::{GrantId, Role, CREATED_BY_SYSTEM};
use infra_server_db::{Grant, GrantSubject, OrgTxn};

use crate::context::RequestContext;
use crate::error::{Result, ServerError};

/// Check that the authenticated identity holds one of `required` on the
/// `infra` resource.
#[tracing::instrument(skip(txn, ctx, required), fields(action = action))]
pub async fn is_authorized(
	txn: &mut OrgTxn,
	ctx: &RequestContext,
	action: &str,
	required: &[Role],
) -> Result<()> {
	let identity = ctx.require_identity()?;
	let group_ids = txn.list_group_ids_for_identity(identity.id).await?;
	let privileges: Vec<&str> = required.iter().map(|r| r.as_str()).collect();

	let authorized = txn
		.identity_has_infra_privilege(identity.id, &group_ids, &privileges)
		.await?;
	if authorized {
		return Ok(());
	}

	tracing::debug!(subject = %identity.name, "authorization denied");
	Err(ServerError::NotAuthorized {
		subject: identity.name.clone(),
		action: action.to_string(),
		required: privileges.iter().map(|p| p.to_string()).collect(),
	})
}

/// The common single-role case.
pub async fn require_infra_role(
	txn: &mut OrgTxn,
	ctx: &RequestContext,
	action: &str,
	role: Role,
) -> Result<()> {
	is_authorized(txn, ctx, action, &[role]).await
}

/// Create a grant. Requires the admin role. The write bumps the grant
/// update index and notifies the affected destination channel.
#[tracing::instrument(skip(txn, ctx), fields(resource = %resource, privilege = %privilege))]
pub async fn create_grant(
	txn: &mut OrgTxn,
	ctx: &RequestContext,
	subject: GrantSubject,
	privilege: &str,
	resource: &str,
) -> Result<Grant> {
	require_infra_role(txn, ctx, "create grants", Role::Admin).await?;

	if txn.get_grant(subject, privilege, resource).await?.is_some() {
		return Err(ServerError::Conflict(format!(
			"grant of {privilege} on {resource} already exists for {subject}"
		)));
	}

	let created_by = ctx
		.authenticated
		.identity
		.as_ref()
		.map(|i| i.id.as_i64())
		.unwrap_or(CREATED_BY_SYSTEM);

	let now = Utc::now();
	let grant = Grant {
		id: GrantId::generate(),
		organization_id: txn.organization_id(),
		subject,
		privilege: privilege.to_string(),
		resource: resource.to_string(),
		created_by,
		update_index: 0,
		created_at: now,
		updated_at: now,
		deleted_at: None,
	};
	txn.create_grant(&grant).await?;
	Ok(grant)
}

/// Change a grant's privilege. Requires the admin role.
#[tracing::instrument(skip(txn, ctx))]
pub async fn update_grant(
	txn: &mut OrgTxn,
	ctx: &RequestContext,
	id: GrantId,
	privilege: &str,
) -> Result<Grant> {
	require_infra_role(txn, ctx, "update grants", Role::Admin).await?;
	if privilege.is_empty() {
		return Err(ServerError::BadRequest("privilege is required".to_string()));
	}
	Ok(txn.update_grant_privilege(id, privilege).await?)
}

/// Delete a grant. Requires the admin role.
#[tracing::instrument(skip(txn, ctx))]
pub async fn delete_grant(txn: &mut OrgTxn, ctx: &RequestContext, id: GrantId) -> Result<()> {
	require_infra_role(txn, ctx, "delete grants", Role::Admin).await?;
	txn.delete_grant(id).await?;
	Ok(())
}

/// Validate a grant resource: `infra`, a destination name, or a destination
/// name followed by a dotted sub-resource.
pub fn validate_grant_resource(resource: &str) -> Result<()> {
	if resource == infra_server_auth::INFRA_RESOURCE {
		return Ok(());
	}
	let mut parts = resource.splitn(2, '.');
	let destination = parts.next().unwrap_or_default();
	validate_destination_name(destination)?;
	if let Some(sub) = parts.next() {
		if sub.is_empty() {
			return Err(ServerError::BadRequest(format!(
				"invalid grant resource {resource:?}"
			)));
		}
	}
	Ok(())
}

/// Destination names may not contain dots (they would make grant resources
/// ambiguous) and may not shadow the `infra` resource.
pub fn validate_destination_name(name: &str) -> Result<()> {
	if name.is_empty() {
		return Err(ServerError::BadRequest(
			"destination name is required".to_string(),
		));
	}
	if name == infra_server_auth::INFRA_RESOURCE {
		return Err(ServerError::BadRequest(
			"destination name \"infra\" is reserved".to_string(),
		));
	}
	if !name
		.chars()
		.all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
	{
		return Err(ServerError::BadRequest(format!(
			"invalid destination name {name:?}: only letters, digits, dash, and underscore are allowed"
		)));
	}
	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn destination_names_reject_dots() {
		assert!(validate_destination_name("production-cluster").is_ok());
		assert!(validate_destination_name("cluster_01").is_ok());
		assert!(validate_destination_name("cluster.ns").is_err());
		assert!(validate_destination_name("").is_err());
		assert!(validate_destination_name("infra").is_err());
		assert!(validate_destination_name("cluster!").is_err());
	}

	#[test]
	fn grant_resources_allow_infra_and_dotted_destinations() {
		assert!(validate_grant_resource("infra").is_ok());
		assert!(validate_grant_resource("cluster").is_ok());
		assert!(validate_grant_resource("cluster.namespace").is_ok());
		assert!(validate_grant_resource("cluster.").is_err());
		assert!(validate_grant_resource(".namespace").is_err());
	}
}
