// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Group endpoints. Membership changes bump the group's update index and
//! wake long-polls watching destinations whose grants name the group.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::{Extension, Json};
use chrono::{DateTime, Utc};
use infra_server_auth::{GroupId, IdentityId, Role};
use infra_server_db::Group;
use serde::{Deserialize, Serialize};

use crate::access::is_authorized;
use crate::api::AppState;
use crate::context::RequestContext;
use crate::error::{Result, ServerError};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupResponse {
	pub id: GroupId,
	pub name: String,
	pub created: DateTime<Utc>,
	pub updated: DateTime<Utc>,
}

impl From<Group> for GroupResponse {
	fn from(group: Group) -> Self {
		Self {
			id: group.id,
			name: group.name,
			created: group.created_at,
			updated: group.updated_at,
		}
	}
}

#[derive(Debug, Serialize)]
pub struct ListResponse<T> {
	pub items: Vec<T>,
	pub count: usize,
}

#[derive(Debug, Deserialize)]
pub struct ListGroupsQuery {
	#[serde(default)]
	pub name: Option<String>,
}

/// GET /api/groups - list groups.
pub async fn list_groups(
	State(state): State<AppState>,
	Extension(ctx): Extension<RequestContext>,
	Query(query): Query<ListGroupsQuery>,
) -> Result<Json<ListResponse<GroupResponse>>> {
	let mut txn = state.store.begin(ctx.organization().id).await?;
	is_authorized(&mut txn, &ctx, "list groups", &[Role::Admin, Role::View]).await?;
	let groups = txn.list_groups(query.name.as_deref()).await?;
	txn.rollback().await?;

	let items: Vec<GroupResponse> = groups.into_iter().map(GroupResponse::from).collect();
	let count = items.len();
	Ok(Json(ListResponse { items, count }))
}

#[derive(Debug, Deserialize)]
pub struct CreateGroupRequest {
	pub name: String,
}

/// POST /api/groups - create a group. Admin only.
pub async fn create_group(
	State(state): State<AppState>,
	Extension(ctx): Extension<RequestContext>,
	Json(request): Json<CreateGroupRequest>,
) -> Result<(StatusCode, Json<GroupResponse>)> {
	if request.name.is_empty() {
		return Err(ServerError::BadRequest("group name is required".to_string()));
	}

	let mut txn = state.store.begin(ctx.organization().id).await?;
	is_authorized(&mut txn, &ctx, "create groups", &[Role::Admin]).await?;

	if txn.get_group_by_name(&request.name).await?.is_some() {
		return Err(ServerError::Conflict(format!(
			"group {:?} already exists",
			request.name
		)));
	}

	let created_by = ctx
		.authenticated
		.identity
		.as_ref()
		.map(|i| i.id.as_i64())
		.unwrap_or(infra_server_auth::CREATED_BY_SYSTEM);

	let now = Utc::now();
	let group = Group {
		id: GroupId::generate(),
		organization_id: ctx.organization().id,
		name: request.name,
		created_by,
		created_at: now,
		updated_at: now,
		deleted_at: None,
	};
	txn.create_group(&group).await?;
	txn.commit().await?;

	tracing::info!(group = %group.name, "group created");
	Ok((StatusCode::CREATED, Json(GroupResponse::from(group))))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateMembersRequest {
	#[serde(default)]
	pub users_to_add: Vec<IdentityId>,
	#[serde(default)]
	pub users_to_remove: Vec<IdentityId>,
}

/// PATCH /api/groups/{id}/users - add and remove members. Admin only.
pub async fn update_group_members(
	State(state): State<AppState>,
	Extension(ctx): Extension<RequestContext>,
	Path(id): Path<i64>,
	Json(request): Json<UpdateMembersRequest>,
) -> Result<StatusCode> {
	let id = GroupId::new(id);
	let mut txn = state.store.begin(ctx.organization().id).await?;
	is_authorized(&mut txn, &ctx, "update group members", &[Role::Admin]).await?;

	txn.get_group_by_id(id)
		.await?
		.ok_or_else(|| ServerError::NotFound(format!("group {id}")))?;

	for identity_id in &request.users_to_add {
		txn.get_identity_by_id(*identity_id)
			.await?
			.ok_or_else(|| ServerError::NotFound(format!("user {identity_id}")))?;
		txn.add_group_member(id, *identity_id).await?;
	}
	for identity_id in &request.users_to_remove {
		txn.remove_group_member(id, *identity_id).await?;
	}
	txn.commit().await?;

	tracing::info!(
		group_id = %id,
		added = request.users_to_add.len(),
		removed = request.users_to_remove.len(),
		"group membership updated"
	);
	Ok(StatusCode::OK)
}

/// GET /api/groups/{id}/users - list member ids.
pub async fn list_group_members(
	State(state): State<AppState>,
	Extension(ctx): Extension<RequestContext>,
	Path(id): Path<i64>,
) -> Result<Json<ListResponse<IdentityId>>> {
	let id = GroupId::new(id);
	let mut txn = state.store.begin(ctx.organization().id).await?;
	is_authorized(&mut txn, &ctx, "list group members", &[Role::Admin, Role::View]).await?;

	txn.get_group_by_id(id)
		.await?
		.ok_or_else(|| ServerError::NotFound(format!("group {id}")))?;
	let items = txn.list_group_members(id).await?;
	txn.rollback().await?;

	let count = items.len();
	Ok(Json(ListResponse { items, count }))
}
