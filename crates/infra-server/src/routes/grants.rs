// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Grant endpoints, including the blocking list that connectors use to
//! follow grant changes for one destination.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::{Extension, Json};
use chrono::{DateTime, Utc};
use infra_server_auth::GrantId;
use infra_server_db::{Grant, GrantSubject, ListGrantsOptions, OrgTxn};
use serde::{Deserialize, Serialize};

use crate::access;
use crate::api::AppState;
use crate::blocking::{bounded_wait, list_with_long_poll, WATCH_ROLES};
use crate::context::RequestContext;
use crate::error::{Result, ServerError};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GrantResponse {
	pub id: GrantId,
	/// Tagged subject: `identity:<id>` or `group:<id>`.
	pub subject: String,
	pub privilege: String,
	pub resource: String,
	pub created_by: i64,
	pub created: DateTime<Utc>,
	pub updated: DateTime<Utc>,
}

impl From<Grant> for GrantResponse {
	fn from(grant: Grant) -> Self {
		Self {
			id: grant.id,
			subject: grant.subject.to_string(),
			privilege: grant.privilege,
			resource: grant.resource,
			created_by: grant.created_by,
			created: grant.created_at,
			updated: grant.updated_at,
		}
	}
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ListGrantsResponse {
	pub items: Vec<GrantResponse>,
	pub count: usize,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub last_update_index: Option<i64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListGrantsQuery {
	#[serde(default)]
	pub destination: Option<String>,
	#[serde(default)]
	pub resource: Option<String>,
	#[serde(default)]
	pub privilege: Option<String>,
	#[serde(default)]
	pub last_update_index: i64,
	#[serde(default)]
	pub timeout_seconds: Option<u64>,
}

/// GET /api/grants - list grants.
///
/// With `destination=<name>&lastUpdateIndex=N` this is a blocking request:
/// it returns once the destination's visible update index exceeds N, or 304
/// on deadline.
pub async fn list_grants(
	State(state): State<AppState>,
	Extension(ctx): Extension<RequestContext>,
	Query(query): Query<ListGrantsQuery>,
) -> Result<Json<ListGrantsResponse>> {
	if query.last_update_index > 0 {
		let destination = query.destination.clone().ok_or_else(|| {
			ServerError::BadRequest(
				"lastUpdateIndex requires a destination filter".to_string(),
			)
		})?;

		let (items, last_update_index) = list_with_long_poll(
			&state,
			&ctx,
			&destination,
			query.last_update_index,
			bounded_wait(query.timeout_seconds),
			grants_snapshot_boxed,
		)
		.await?;

		let count = items.len();
		return Ok(Json(ListGrantsResponse {
			items,
			count,
			last_update_index: Some(last_update_index),
		}));
	}

	let mut txn = state.store.begin(ctx.organization().id).await?;
	access::is_authorized(&mut txn, &ctx, "list grants", WATCH_ROLES).await?;
	let grants = txn
		.list_grants(ListGrantsOptions {
			by_destination: query.destination,
			by_resource: query.resource,
			by_privilege: query.privilege,
			..Default::default()
		})
		.await?;
	txn.rollback().await?;

	let items: Vec<GrantResponse> = grants.into_iter().map(GrantResponse::from).collect();
	let count = items.len();
	Ok(Json(ListGrantsResponse {
		items,
		count,
		last_update_index: None,
	}))
}

fn grants_snapshot_boxed<'a>(
	txn: &'a mut OrgTxn,
	name: &'a str,
) -> std::pin::Pin<
	Box<dyn std::future::Future<Output = Result<(Vec<GrantResponse>, i64)>> + Send + 'a>,
> {
	Box::pin(grants_snapshot(txn, name))
}

async fn grants_snapshot(txn: &mut OrgTxn, name: &str) -> Result<(Vec<GrantResponse>, i64)> {
	let grants = txn
		.list_grants(ListGrantsOptions {
			by_destination: Some(name.to_string()),
			..Default::default()
		})
		.await?;
	let max_index = txn.destination_access_max_update_index(name).await?;
	let items = grants.into_iter().map(GrantResponse::from).collect();
	Ok((items, max_index))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateGrantRequest {
	/// Tagged subject: `identity:<id>` or `group:<id>`.
	pub subject: String,
	pub privilege: String,
	pub resource: String,
}

/// POST /api/grants - create a grant. Admin only.
pub async fn create_grant(
	State(state): State<AppState>,
	Extension(ctx): Extension<RequestContext>,
	Json(request): Json<CreateGrantRequest>,
) -> Result<(StatusCode, Json<GrantResponse>)> {
	let subject: GrantSubject = request
		.subject
		.parse()
		.map_err(|e: infra_server_db::models::InvalidGrantSubject| {
			ServerError::BadRequest(e.to_string())
		})?;
	access::validate_grant_resource(&request.resource)?;
	if request.privilege.is_empty() {
		return Err(ServerError::BadRequest("privilege is required".to_string()));
	}

	let mut txn = state.store.begin(ctx.organization().id).await?;
	let grant =
		access::create_grant(&mut txn, &ctx, subject, &request.privilege, &request.resource)
			.await?;
	txn.commit().await?;

	tracing::info!(grant_id = %grant.id, resource = %grant.resource, privilege = %grant.privilege, "grant created");
	Ok((StatusCode::CREATED, Json(GrantResponse::from(grant))))
}

#[derive(Debug, Deserialize)]
pub struct UpdateGrantRequest {
	pub privilege: String,
}

/// PUT /api/grants/{id} - change a grant's privilege. Admin only.
pub async fn update_grant(
	State(state): State<AppState>,
	Extension(ctx): Extension<RequestContext>,
	Path(id): Path<i64>,
	Json(request): Json<UpdateGrantRequest>,
) -> Result<Json<GrantResponse>> {
	let mut txn = state.store.begin(ctx.organization().id).await?;
	let grant = access::update_grant(&mut txn, &ctx, GrantId::new(id), &request.privilege).await?;
	txn.commit().await?;
	Ok(Json(GrantResponse::from(grant)))
}

/// DELETE /api/grants/{id} - delete a grant. Admin only.
pub async fn delete_grant(
	State(state): State<AppState>,
	Extension(ctx): Extension<RequestContext>,
	Path(id): Path<i64>,
) -> Result<StatusCode> {
	let mut txn = state.store.begin(ctx.organization().id).await?;
	access::delete_grant(&mut txn, &ctx, GrantId::new(id)).await?;
	txn.commit().await?;
	Ok(StatusCode::NO_CONTENT)
}
