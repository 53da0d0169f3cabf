// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! User endpoints: listing, lookup, and credential changes.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::{Extension, Json};
use chrono::{DateTime, Utc};
use infra_server_auth::{
	check_password_requirements, hash_secret, AccessKeyScope, CredentialId, Identity, IdentityId,
	Role,
};
use infra_server_db::{Credential, OrgTxn};
use serde::{Deserialize, Serialize};

use crate::access::is_authorized;
use crate::access_keys::update_access_key_scopes;
use crate::api::AppState;
use crate::context::RequestContext;
use crate::error::{Result, ServerError};
use crate::pagination::Pagination;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
	pub id: IdentityId,
	pub name: String,
	pub last_seen_at: Option<DateTime<Utc>>,
	pub created: DateTime<Utc>,
	pub updated: DateTime<Utc>,
}

impl From<Identity> for User {
	fn from(identity: Identity) -> Self {
		Self {
			id: identity.id,
			name: identity.name,
			last_seen_at: identity.last_seen_at,
			created: identity.created_at,
			updated: identity.updated_at,
		}
	}
}

#[derive(Debug, Serialize)]
pub struct ListResponse<T> {
	pub items: Vec<T>,
	pub count: usize,
}

/// GET /api/users - list identities. Requires a registry role.
pub async fn list_users(
	State(state): State<AppState>,
	Extension(ctx): Extension<RequestContext>,
	Query(pagination): Query<Pagination>,
) -> Result<Json<ListResponse<User>>> {
	let mut txn = state.store.begin(ctx.organization().id).await?;
	is_authorized(&mut txn, &ctx, "list users", &[Role::Admin, Role::View]).await?;

	let identities = txn
		.list_identities(pagination.limit(), pagination.offset())
		.await?;
	txn.rollback().await?;

	let items: Vec<User> = identities.into_iter().map(User::from).collect();
	let count = items.len();
	Ok(Json(ListResponse { items, count }))
}

/// GET /api/users/{id} - fetch one identity. Users may always read
/// themselves; anyone else requires a registry role.
pub async fn get_user(
	State(state): State<AppState>,
	Extension(ctx): Extension<RequestContext>,
	Path(id): Path<i64>,
) -> Result<Json<User>> {
	let id = IdentityId::new(id);
	let mut txn = state.store.begin(ctx.organization().id).await?;

	let is_self = ctx
		.authenticated
		.identity
		.as_ref()
		.is_some_and(|identity| identity.id == id);
	if !is_self {
		is_authorized(&mut txn, &ctx, "get user", &[Role::Admin, Role::View]).await?;
	}

	let identity = txn
		.get_identity_by_id(id)
		.await?
		.ok_or_else(|| ServerError::NotFound(format!("user {id}")))?;
	txn.rollback().await?;

	Ok(Json(User::from(identity)))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateCredentialsRequest {
	#[serde(default)]
	pub old_password: String,
	pub password: String,
}

/// PUT /api/users/{id}/credentials - change a password.
///
/// Users change their own password by presenting the old one; admins may set
/// anyone's, which marks it as a one-time password. A self-service change
/// drops the `password-reset` scope from the presenting key.
pub async fn update_credentials(
	State(state): State<AppState>,
	Extension(ctx): Extension<RequestContext>,
	Path(id): Path<i64>,
	Json(request): Json<UpdateCredentialsRequest>,
) -> Result<StatusCode> {
	let id = IdentityId::new(id);
	let mut txn = state.store.begin(ctx.organization().id).await?;

	let is_self = ctx
		.authenticated
		.identity
		.as_ref()
		.is_some_and(|identity| identity.id == id);
	if !is_self {
		is_authorized(&mut txn, &ctx, "update credentials", &[Role::Admin]).await?;
	}

	let identity = txn
		.get_identity_by_id(id)
		.await?
		.ok_or_else(|| ServerError::NotFound(format!("user {id}")))?;

	if is_self {
		if request.old_password.is_empty() {
			return Err(ServerError::Validation(
				infra_server_auth::ValidationError::single("oldPassword", "is required"),
			));
		}
		let credential = txn
			.get_credential_by_identity_id(identity.id)
			.await?
			.ok_or_else(|| ServerError::NotFound("credential".to_string()))?;
		if !bcrypt::verify(&request.old_password, &credential.password_hash)? {
			return Err(ServerError::Validation(
				infra_server_auth::ValidationError::single("oldPassword", "invalid oldPassword"),
			));
		}
	}

	check_password_requirements(&identity.name, &request.password)?;
	set_credential(&mut txn, &identity, &request.password, !is_self).await?;

	if is_self {
		// the password is no longer temporary; the session key loses its
		// reset-only restriction
		let mut key = ctx.authenticated.access_key.clone();
		if key.scopes.contains(&AccessKeyScope::PasswordReset) {
			key.scopes.retain(|s| *s != AccessKeyScope::PasswordReset);
			update_access_key_scopes(&mut txn, &key).await?;
		}
	}

	txn.commit().await?;
	tracing::info!(user_id = %identity.id, self_service = is_self, "credential updated");
	Ok(StatusCode::OK)
}

/// Hash and store a password, creating or updating the identity's
/// credential and its infra provider link.
pub(crate) async fn set_credential(
	txn: &mut OrgTxn,
	identity: &Identity,
	password: &str,
	one_time_password: bool,
) -> Result<()> {
	let hash = hash_secret(password)?;
	let now = Utc::now();

	match txn.get_credential_by_identity_id(identity.id).await? {
		Some(mut credential) => {
			credential.password_hash = hash;
			credential.one_time_password = one_time_password;
			txn.update_credential(&credential).await?;
		}
		None => {
			txn.create_credential(&Credential {
				id: CredentialId::generate(),
				organization_id: txn.organization_id(),
				identity_id: identity.id,
				password_hash: hash,
				one_time_password,
				created_at: now,
				updated_at: now,
				deleted_at: None,
			})
			.await?;
		}
	}

	let infra = txn.infra_provider().await?;
	txn.create_provider_user(&infra_server_db::ProviderUser {
		id: infra_server_auth::snowflake::generate(),
		organization_id: txn.organization_id(),
		provider_id: infra.id,
		identity_id: identity.id,
		email: identity.name.clone(),
		given_name: String::new(),
		family_name: String::new(),
		active: true,
		created_at: now,
		updated_at: now,
	})
	.await?;
	Ok(())
}
