// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Destination endpoints, including the destination-access long-poll that
//! connectors hold open to observe grant changes.

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::{Extension, Json};
use chrono::{DateTime, Duration, Utc};
use infra_server_auth::{DestinationId, IdentityId, Role};
use infra_server_db::{Destination, ListDestinationsOptions, OrgTxn};
use serde::{Deserialize, Serialize};

use crate::access::{is_authorized, validate_destination_name};
use crate::api::AppState;
use crate::blocking::{bounded_wait, list_with_long_poll, WATCH_ROLES};
use crate::context::RequestContext;
use crate::error::{Result, ServerError};
use crate::middleware::{HEADER_INFRA_DESTINATION_NAME, HEADER_INFRA_DESTINATION_UNIQUE_ID};
use crate::pagination::Pagination;

/// A destination is shown as connected when its connector reported in
/// recently.
fn connected(last_seen_at: Option<DateTime<Utc>>) -> bool {
	last_seen_at.is_some_and(|seen| Utc::now() - seen < Duration::minutes(5))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DestinationResponse {
	pub id: DestinationId,
	pub name: String,
	#[serde(rename = "uniqueID")]
	pub unique_id: String,
	pub kind: String,
	pub connection: ConnectionResponse,
	pub resources: Vec<String>,
	pub roles: Vec<String>,
	pub version: String,
	pub last_seen: Option<DateTime<Utc>>,
	pub connected: bool,
	pub created: DateTime<Utc>,
	pub updated: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, Default)]
pub struct ConnectionResponse {
	pub url: String,
	pub ca: String,
}

impl From<Destination> for DestinationResponse {
	fn from(destination: Destination) -> Self {
		Self {
			id: destination.id,
			name: destination.name,
			unique_id: destination.unique_id,
			kind: destination.kind,
			connection: ConnectionResponse {
				url: destination.connection_url,
				ca: destination.connection_ca,
			},
			resources: destination.resources,
			roles: destination.roles,
			version: destination.version,
			connected: connected(destination.last_seen_at),
			last_seen: destination.last_seen_at,
			created: destination.created_at,
			updated: destination.updated_at,
		}
	}
}

#[derive(Debug, Serialize)]
pub struct ListResponse<T> {
	pub items: Vec<T>,
	pub count: usize,
}

#[derive(Debug, Deserialize)]
pub struct ListDestinationsQuery {
	#[serde(default)]
	pub name: Option<String>,
	#[serde(default)]
	pub kind: Option<String>,
	#[serde(default)]
	pub unique_id: Option<String>,
	#[serde(default)]
	pub page: i64,
	#[serde(default)]
	pub limit: i64,
}

/// GET /api/destinations - list destinations with optional filters.
pub async fn list_destinations(
	State(state): State<AppState>,
	Extension(ctx): Extension<RequestContext>,
	Query(query): Query<ListDestinationsQuery>,
) -> Result<Json<ListResponse<DestinationResponse>>> {
	let pagination = Pagination {
		page: query.page,
		limit: query.limit,
	};
	let mut txn = state.store.begin(ctx.organization().id).await?;
	let destinations = txn
		.list_destinations(ListDestinationsOptions {
			by_name: query.name,
			by_kind: query.kind,
			by_unique_id: query.unique_id,
			limit: pagination.limit(),
			offset: pagination.offset(),
		})
		.await?;
	txn.rollback().await?;

	let items: Vec<DestinationResponse> = destinations
		.into_iter()
		.map(DestinationResponse::from)
		.collect();
	let count = items.len();
	Ok(Json(ListResponse { items, count }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateDestinationRequest {
	pub name: String,
	#[serde(default, rename = "uniqueID")]
	pub unique_id: String,
	#[serde(default)]
	pub kind: String,
	#[serde(default)]
	pub version: String,
	#[serde(default)]
	pub connection: ConnectionResponse,
	#[serde(default)]
	pub resources: Vec<String>,
	#[serde(default)]
	pub roles: Vec<String>,
}

/// POST /api/destinations - register a destination.
pub async fn create_destination(
	State(state): State<AppState>,
	Extension(ctx): Extension<RequestContext>,
	headers: HeaderMap,
	Json(request): Json<CreateDestinationRequest>,
) -> Result<(StatusCode, Json<DestinationResponse>)> {
	validate_destination_name(&request.name)?;

	let mut txn = state.store.begin(ctx.organization().id).await?;
	is_authorized(
		&mut txn,
		&ctx,
		"create destinations",
		&[Role::Admin, Role::Connector],
	)
	.await?;

	let now = Utc::now();
	// the middleware could not mark a destination that did not exist yet, so
	// a connector registering itself counts as seen now
	let from_connector = header_value(&headers, HEADER_INFRA_DESTINATION_NAME) == Some(request.name.as_str())
		|| header_value(&headers, HEADER_INFRA_DESTINATION_UNIQUE_ID)
			== Some(request.unique_id.as_str());

	let destination = Destination {
		id: DestinationId::generate(),
		organization_id: ctx.organization().id,
		name: request.name,
		unique_id: request.unique_id,
		kind: if request.kind.is_empty() {
			"kubernetes".to_string()
		} else {
			request.kind
		},
		connection_url: request.connection.url,
		connection_ca: request.connection.ca,
		resources: request.resources,
		roles: request.roles,
		version: request.version,
		last_seen_at: from_connector.then_some(now),
		created_at: now,
		updated_at: now,
		deleted_at: None,
	};
	txn.create_destination(&destination).await?;
	txn.commit().await?;

	tracing::info!(destination = %destination.name, kind = %destination.kind, "destination created");
	Ok((StatusCode::CREATED, Json(DestinationResponse::from(destination))))
}

fn header_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
	headers.get(name).and_then(|v| v.to_str().ok())
}

/// GET /api/destinations/{id} - fetch one destination. No role required.
pub async fn get_destination(
	State(state): State<AppState>,
	Extension(ctx): Extension<RequestContext>,
	Path(id): Path<i64>,
) -> Result<Json<DestinationResponse>> {
	let mut txn = state.store.begin(ctx.organization().id).await?;
	let destination = txn
		.get_destination_by_id(DestinationId::new(id))
		.await?
		.ok_or_else(|| ServerError::NotFound(format!("destination {id}")))?;
	txn.rollback().await?;
	Ok(Json(DestinationResponse::from(destination)))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateDestinationRequest {
	pub name: String,
	#[serde(default, rename = "uniqueID")]
	pub unique_id: String,
	#[serde(default)]
	pub version: String,
	#[serde(default)]
	pub connection: ConnectionResponse,
	#[serde(default)]
	pub resources: Vec<String>,
	#[serde(default)]
	pub roles: Vec<String>,
}

/// PUT /api/destinations/{id} - update a destination, starting from the
/// stored record so omitted fields are not zeroed.
pub async fn update_destination(
	State(state): State<AppState>,
	Extension(ctx): Extension<RequestContext>,
	Path(id): Path<i64>,
	Json(request): Json<UpdateDestinationRequest>,
) -> Result<Json<DestinationResponse>> {
	validate_destination_name(&request.name)?;

	let mut txn = state.store.begin(ctx.organization().id).await?;
	is_authorized(
		&mut txn,
		&ctx,
		"update destinations",
		&[Role::Admin, Role::Connector],
	)
	.await?;

	let mut destination = txn
		.get_destination_by_id(DestinationId::new(id))
		.await?
		.ok_or_else(|| ServerError::NotFound(format!("destination {id}")))?;

	destination.name = request.name;
	destination.unique_id = request.unique_id;
	destination.connection_url = request.connection.url;
	destination.connection_ca = request.connection.ca;
	destination.resources = request.resources;
	destination.roles = request.roles;
	destination.version = request.version;

	txn.update_destination(&destination).await?;
	txn.commit().await?;
	Ok(Json(DestinationResponse::from(destination)))
}

/// DELETE /api/destinations/{id} - remove a destination.
pub async fn delete_destination(
	State(state): State<AppState>,
	Extension(ctx): Extension<RequestContext>,
	Path(id): Path<i64>,
) -> Result<StatusCode> {
	let mut txn = state.store.begin(ctx.organization().id).await?;
	is_authorized(&mut txn, &ctx, "delete destinations", &[Role::Admin]).await?;
	txn.delete_destination(DestinationId::new(id)).await?;
	txn.commit().await?;
	Ok(StatusCode::NO_CONTENT)
}

// =============================================================================
// Destination access long-poll
// =============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockingQuery {
	#[serde(default)]
	pub last_update_index: i64,
	/// Client deadline hint in seconds; clamped to the server ceiling.
	#[serde(default)]
	pub timeout_seconds: Option<u64>,
}

#[derive(Debug, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DestinationAccessItem {
	#[serde(rename = "userID")]
	pub user_id: IdentityId,
	#[serde(rename = "userSSHLoginName")]
	pub user_ssh_login_name: String,
	pub privilege: String,
	pub resource: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ListDestinationAccessResponse {
	pub items: Vec<DestinationAccessItem>,
	pub last_update_index: i64,
}

/// GET /api/destinations/{name}/access - the full current access list for a
/// destination, expanded to member identities.
///
/// With `lastUpdateIndex=0` the current snapshot is returned immediately.
/// Otherwise the request parks on the destination's notification channels
/// until the visible max update index exceeds the client's, or the deadline
/// passes (304).
pub async fn list_destination_access(
	State(state): State<AppState>,
	Extension(ctx): Extension<RequestContext>,
	Path(name): Path<String>,
	Query(query): Query<BlockingQuery>,
) -> Result<Json<ListDestinationAccessResponse>> {
	if query.last_update_index == 0 {
		let mut txn = state.store.begin(ctx.organization().id).await?;
		is_authorized(&mut txn, &ctx, "list destination access", WATCH_ROLES).await?;
		let (items, last_update_index) = access_snapshot(&mut txn, &name).await?;
		txn.rollback().await?;
		return Ok(Json(ListDestinationAccessResponse {
			items,
			last_update_index,
		}));
	}

	let (items, last_update_index) = list_with_long_poll(
		&state,
		&ctx,
		&name,
		query.last_update_index,
		bounded_wait(query.timeout_seconds),
		access_snapshot_boxed,
	)
	.await?;

	Ok(Json(ListDestinationAccessResponse {
		items,
		last_update_index,
	}))
}

fn access_snapshot_boxed<'a>(
	txn: &'a mut OrgTxn,
	name: &'a str,
) -> std::pin::Pin<
	Box<dyn std::future::Future<Output = Result<(Vec<DestinationAccessItem>, i64)>> + Send + 'a>,
> {
	Box::pin(access_snapshot(txn, name))
}

async fn access_snapshot(
	txn: &mut OrgTxn,
	name: &str,
) -> Result<(Vec<DestinationAccessItem>, i64)> {
	let access = txn.list_destination_access(name).await?;
	let max_index = txn.destination_access_max_update_index(name).await?;

	let items = access
		.into_iter()
		.map(|entry| DestinationAccessItem {
			user_id: entry.user_id,
			user_ssh_login_name: entry.user_ssh_login_name,
			privilege: entry.privilege,
			resource: entry.resource,
		})
		.collect();
	Ok((items, max_index))
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn connected_requires_recent_last_seen() {
		assert!(!connected(None));
		assert!(connected(Some(Utc::now() - Duration::seconds(30))));
		assert!(!connected(Some(Utc::now() - Duration::minutes(10))));
	}

	#[test]
	fn destination_access_item_serializes_wire_names() {
		let item = DestinationAccessItem {
			user_id: IdentityId::new(42),
			user_ssh_login_name: "alice".to_string(),
			privilege: "view".to_string(),
			resource: "cluster".to_string(),
		};
		let json = serde_json::to_value(&item).unwrap();
		assert_eq!(json["userID"], "42");
		assert_eq!(json["userSSHLoginName"], "alice");
		assert_eq!(json["privilege"], "view");
		assert_eq!(json["resource"], "cluster");
	}
}
