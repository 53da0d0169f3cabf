// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Self-service password reset.
//!
//! Requesting a reset always answers 204, whether or not the address is
//! known, so the endpoint is not an account-enumeration oracle. Delivery of
//! the token is the mail system's concern; this module only mints and
//! consumes it.

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::Response;
use axum::Json;
use chrono::Duration;
use infra_server_auth::check_password_requirements;
use serde::Deserialize;

use crate::api::AppState;
use crate::error::{Result, ServerError};
use crate::middleware::resolve_organization;
use crate::routes::login::issue_session;
use crate::routes::users::set_credential;

/// How long a reset token stays valid.
const RESET_TOKEN_TTL_MINUTES: i64 = 15;

#[derive(Debug, Deserialize)]
pub struct PasswordResetRequest {
	pub email: String,
}

/// POST /api/password-reset - request a reset token.
pub async fn request_password_reset(
	State(state): State<AppState>,
	headers: HeaderMap,
	Json(request): Json<PasswordResetRequest>,
) -> Result<StatusCode> {
	let organization = resolve_organization(&state, &headers).await?;
	let mut txn = state.store.begin(organization.id).await?;

	let identity = txn.get_identity_by_name(&request.email).await?;
	let Some(identity) = identity else {
		// unknown address: succeed silently
		return Ok(StatusCode::NO_CONTENT);
	};

	if txn.get_credential_by_identity_id(identity.id).await?.is_none() {
		// federated users have no local password to reset
		return Ok(StatusCode::NO_CONTENT);
	}

	let _token = txn
		.create_password_reset_token(identity.id, Duration::minutes(RESET_TOKEN_TTL_MINUTES))
		.await?;
	txn.commit().await?;

	tracing::info!(user_id = %identity.id, "password reset token issued");
	Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifiedResetRequest {
	pub token: String,
	pub password: String,
}

/// POST /api/password-reset/verify - consume a token and set a new password,
/// then log the user in.
pub async fn verify_password_reset(
	State(state): State<AppState>,
	headers: HeaderMap,
	Json(request): Json<VerifiedResetRequest>,
) -> Result<Response> {
	let organization = resolve_organization(&state, &headers).await?;
	let mut txn = state.store.begin(organization.id).await?;

	let identity_id = txn
		.claim_password_reset_token(&request.token)
		.await?
		.ok_or_else(|| {
			ServerError::NotAuthenticated("invalid or expired password reset token".to_string())
		})?;

	let identity = txn
		.get_identity_by_id(identity_id)
		.await?
		.ok_or_else(|| ServerError::NotFound("user".to_string()))?;

	check_password_requirements(&identity.name, &request.password)?;
	set_credential(&mut txn, &identity, &request.password, false).await?;

	let response = issue_session(&state, &mut txn, &identity, false).await?;
	txn.commit().await?;

	tracing::info!(user_id = %identity.id, "password reset completed");
	Ok(response)
}
