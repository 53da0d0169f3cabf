// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Password login and logout.

use axum::extract::State;
use axum::http::header::SET_COOKIE;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::{Extension, Json};
use chrono::{DateTime, Duration, Utc};
use infra_server_auth::{
	AccessKey, AccessKeyId, AccessKeyScope, Identity, IdentityId, COOKIE_AUTH,
};
use infra_server_db::OrgTxn;
use serde::{Deserialize, Serialize};

use crate::access_keys::create_access_key;
use crate::api::AppState;
use crate::context::RequestContext;
use crate::error::{Result, ServerError};
use crate::middleware::resolve_organization;

/// Lifetime of a one-time-password session: just long enough to set a new
/// password.
const ONE_TIME_PASSWORD_SESSION: i64 = 10 * 60;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest {
	pub name: String,
	pub password: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
	pub user_id: IdentityId,
	pub name: String,
	pub access_key: String,
	pub password_update_required: bool,
	pub expires_at: DateTime<Utc>,
}

/// POST /api/login - authenticate with a local credential.
pub async fn login(
	State(state): State<AppState>,
	headers: HeaderMap,
	Json(request): Json<LoginRequest>,
) -> Result<Response> {
	let organization = resolve_organization(&state, &headers).await?;
	let mut txn = state.store.begin(organization.id).await?;

	let failed = || ServerError::NotAuthenticated("invalid username or password".to_string());

	let identity = txn
		.get_identity_by_name(&request.name)
		.await?
		.ok_or_else(failed)?;
	let credential = txn
		.get_credential_by_identity_id(identity.id)
		.await?
		.ok_or_else(failed)?;

	if !bcrypt::verify(&request.password, &credential.password_hash)? {
		tracing::debug!(name = %request.name, "password login failed");
		return Err(failed());
	}

	let response = issue_session(
		&state,
		&mut txn,
		&identity,
		credential.one_time_password,
	)
	.await?;
	txn.touch_identity_last_seen(identity.id, Utc::now()).await?;
	txn.commit().await?;

	tracing::info!(user_id = %identity.id, "login");
	Ok(response)
}

/// Issue a session access key and build the login response with its cookie.
/// One-time passwords get a short-lived key restricted to password reset.
pub(crate) async fn issue_session(
	state: &AppState,
	txn: &mut OrgTxn,
	identity: &Identity,
	password_update_required: bool,
) -> Result<Response> {
	let infra = txn.infra_provider().await?;
	let now = Utc::now();

	let (expires_at, inactivity_extension, scopes) = if password_update_required {
		(
			now + Duration::seconds(ONE_TIME_PASSWORD_SESSION),
			None,
			vec![AccessKeyScope::PasswordReset],
		)
	} else {
		let auth = &state.config.auth;
		let extension = match auth.session_inactivity_extension_secs {
			0 => None,
			secs => Some(Duration::seconds(secs as i64)),
		};
		(
			now + Duration::seconds(auth.session_duration_secs as i64),
			extension,
			vec![],
		)
	};

	let key = AccessKey {
		id: AccessKeyId::generate(),
		organization_id: txn.organization_id(),
		name: None,
		issued_for: identity.id,
		provider_id: infra.id,
		key_id: String::new(),
		secret_hash: String::new(),
		expires_at,
		inactivity_timeout: None,
		inactivity_extension,
		scopes,
		created_at: now,
		updated_at: now,
		deleted_at: None,
	};
	let (key, token) = create_access_key(txn, key).await?;

	let body = LoginResponse {
		user_id: identity.id,
		name: identity.name.clone(),
		access_key: token.clone(),
		password_update_required,
		expires_at: key.expires_at,
	};

	let max_age = (key.expires_at - now).num_seconds().max(0);
	let cookie = session_cookie(&token, max_age);
	let mut response = (StatusCode::CREATED, Json(body)).into_response();
	response.headers_mut().insert(
		SET_COOKIE,
		cookie
			.parse()
			.map_err(|e| ServerError::Internal(format!("building session cookie: {e}")))?,
	);
	Ok(response)
}

fn session_cookie(token: &str, max_age_secs: i64) -> String {
	format!("{COOKIE_AUTH}={token}; Max-Age={max_age_secs}; Path=/; SameSite=Strict; Secure; HttpOnly")
}

/// POST /api/logout - revoke the presented access key and clear the cookie.
pub async fn logout(
	State(state): State<AppState>,
	Extension(ctx): Extension<RequestContext>,
) -> Result<Response> {
	let mut txn = state.store.begin(ctx.organization().id).await?;
	txn.delete_access_key(ctx.authenticated.access_key.id).await?;
	txn.commit().await?;

	let mut response = StatusCode::OK.into_response();
	response.headers_mut().insert(
		SET_COOKIE,
		session_cookie("", 0)
			.parse()
			.map_err(|e| ServerError::Internal(format!("building session cookie: {e}")))?,
	);
	Ok(response)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn session_cookie_carries_security_attributes() {
		let cookie = session_cookie("abc.def", 3600);
		assert!(cookie.starts_with("auth=abc.def;"));
		assert!(cookie.contains("SameSite=Strict"));
		assert!(cookie.contains("Secure"));
		assert!(cookie.contains("HttpOnly"));
		assert!(cookie.contains("Path=/"));
	}
}
