// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! SCIM v2 user endpoints.
//!
//! These routes only accept access keys issued directly to a provider: the
//! identity provider authenticates with its own key and manages the users it
//! federates. The `Infra-Version` header is optional here because SCIM
//! clients are not infra clients.

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::{Extension, Json};
use chrono::Utc;
use infra_server_auth::identity::generate_verification_token;
use infra_server_auth::{Identity, IdentityId, ProviderId, CREATED_BY_SYSTEM};
use infra_server_db::ProviderUser;
use serde::{Deserialize, Serialize};

use crate::api::AppState;
use crate::context::RequestContext;
use crate::error::{Result, ServerError};

const LIST_RESPONSE_SCHEMA: &str = "urn:ietf:params:scim:api:messages:2.0:ListResponse";
const USER_SCHEMA: &str = "urn:ietf:params:scim:schemas:core:2.0:User";

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScimUser {
	pub schemas: Vec<&'static str>,
	pub id: String,
	pub user_name: String,
	pub name: ScimName,
	pub emails: Vec<ScimEmail>,
	pub active: bool,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScimName {
	#[serde(default)]
	pub given_name: String,
	#[serde(default)]
	pub family_name: String,
}

#[derive(Debug, Serialize)]
pub struct ScimEmail {
	pub primary: bool,
	pub value: String,
}

fn to_scim_user(user: ProviderUser) -> ScimUser {
	ScimUser {
		schemas: vec![USER_SCHEMA],
		id: user.identity_id.to_string(),
		user_name: user.email.clone(),
		name: ScimName {
			given_name: user.given_name,
			family_name: user.family_name,
		},
		emails: vec![ScimEmail {
			primary: true,
			value: user.email,
		}],
		active: user.active,
	}
}

/// The provider this SCIM key acts for. Only provider-scoped keys pass.
fn provider_for(ctx: &RequestContext) -> Result<ProviderId> {
	let key = &ctx.authenticated.access_key;
	if !key.issued_for_provider() {
		return Err(ServerError::NotAuthorized {
			subject: format!("access key {}", key.key_id),
			action: "manage provider users".to_string(),
			required: vec![],
		});
	}
	Ok(key.provider_id)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScimListQuery {
	/// 1-based start index, per the SCIM pagination protocol.
	#[serde(default)]
	pub start_index: i64,
	#[serde(default)]
	pub count: i64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ListProviderUsersResponse {
	pub schemas: Vec<&'static str>,
	pub total_results: i64,
	pub start_index: i64,
	pub items_per_page: i64,
	#[serde(rename = "Resources")]
	pub resources: Vec<ScimUser>,
}

/// GET /api/scim/v2/Users - list the users this provider federates.
pub async fn list_provider_users(
	State(state): State<AppState>,
	Extension(ctx): Extension<RequestContext>,
	Query(query): Query<ScimListQuery>,
) -> Result<Json<ListProviderUsersResponse>> {
	let provider_id = provider_for(&ctx)?;

	let start_index = query.start_index.max(1);
	let count = match query.count {
		n if n <= 0 => 100,
		n => n.min(1000),
	};

	let mut txn = state.store.begin(ctx.organization().id).await?;
	let (users, total) = txn
		.list_provider_users(provider_id, count, start_index - 1)
		.await?;
	txn.rollback().await?;

	let resources: Vec<ScimUser> = users.into_iter().map(to_scim_user).collect();
	Ok(Json(ListProviderUsersResponse {
		schemas: vec![LIST_RESPONSE_SCHEMA],
		total_results: total,
		start_index,
		items_per_page: resources.len() as i64,
		resources,
	}))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProvisionUserRequest {
	pub user_name: String,
	#[serde(default)]
	pub name: ScimName,
	#[serde(default = "default_active")]
	pub active: bool,
}

fn default_active() -> bool {
	true
}

/// POST /api/scim/v2/Users - provision a user from the identity provider,
/// creating the identity when it does not exist yet.
pub async fn provision_provider_user(
	State(state): State<AppState>,
	Extension(ctx): Extension<RequestContext>,
	Json(request): Json<ProvisionUserRequest>,
) -> Result<(StatusCode, Json<ScimUser>)> {
	let provider_id = provider_for(&ctx)?;
	if request.user_name.is_empty() {
		return Err(ServerError::BadRequest("userName is required".to_string()));
	}

	let mut txn = state.store.begin(ctx.organization().id).await?;

	let identity = match txn.get_identity_by_name(&request.user_name).await? {
		Some(identity) => identity,
		None => {
			let now = Utc::now();
			let identity = Identity {
				id: IdentityId::generate(),
				organization_id: ctx.organization().id,
				name: request.user_name.clone(),
				created_by: CREATED_BY_SYSTEM,
				verification_token: generate_verification_token(),
				last_seen_at: None,
				created_at: now,
				updated_at: now,
				deleted_at: None,
			};
			txn.create_identity(&identity).await?;
			identity
		}
	};

	let now = Utc::now();
	let user = ProviderUser {
		id: infra_server_auth::snowflake::generate(),
		organization_id: ctx.organization().id,
		provider_id,
		identity_id: identity.id,
		email: request.user_name,
		given_name: request.name.given_name,
		family_name: request.name.family_name,
		active: request.active,
		created_at: now,
		updated_at: now,
	};
	txn.create_provider_user(&user).await?;
	txn.commit().await?;

	tracing::info!(user_id = %identity.id, provider_id = %provider_id, "provider user provisioned");
	Ok((StatusCode::CREATED, Json(to_scim_user(user))))
}
