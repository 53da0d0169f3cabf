// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! The authentication middleware.
//!
//! For every authenticated route:
//!
//! 1. collect the bearer candidate (signup cookie, auth cookie, then the
//!    Authorization header; the first present source wins)
//! 2. resolve the target organization from the request host, falling back to
//!    the default organization in single-tenant mode
//! 3. validate the key, record activity (throttled), and honor the connector
//!    identification headers
//! 4. attach the [`RequestContext`] for handlers

use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::Response;
use chrono::Utc;
use http::header::HOST;
use http::HeaderMap;
use infra_server_auth::extract::bearer_candidate;
use infra_server_db::Organization;

use crate::access_keys::{touch_activity, validate_access_key};
use crate::api::AppState;
use crate::context::{Authenticated, RequestContext};
use crate::error::{Result, ServerError};

/// Header identifying the client version.
pub const HEADER_INFRA_VERSION: &str = "Infra-Version";

/// Connector identification headers; either updates the matching
/// destination's `last_seen_at`.
pub const HEADER_INFRA_DESTINATION_NAME: &str = "Infra-Destination-Name";
pub const HEADER_INFRA_DESTINATION_UNIQUE_ID: &str = "Infra-Destination-Unique-ID";

/// Require a plausible semver `Infra-Version` header. Applied to the main
/// API; SCIM and the public routes skip it.
pub async fn require_infra_version(request: Request, next: Next) -> Result<Response> {
	let version = request
		.headers()
		.get(HEADER_INFRA_VERSION)
		.and_then(|v| v.to_str().ok())
		.unwrap_or_default();

	if version.is_empty() {
		return Err(ServerError::BadRequest(format!(
			"{HEADER_INFRA_VERSION} header is required"
		)));
	}
	if !version_is_well_formed(version) {
		return Err(ServerError::BadRequest(format!(
			"invalid {HEADER_INFRA_VERSION} header {version:?}"
		)));
	}
	Ok(next.run(request).await)
}

fn version_is_well_formed(version: &str) -> bool {
	let numbers = version.split('.');
	let mut parts = 0;
	for number in numbers {
		// allow a pre-release suffix on the last component
		let number = number.split_once('-').map(|(n, _)| n).unwrap_or(number);
		if number.is_empty() || !number.chars().all(|c| c.is_ascii_digit()) {
			return false;
		}
		parts += 1;
	}
	(1..=3).contains(&parts)
}

/// Authenticate the request and attach its [`RequestContext`].
pub async fn authenticate(
	State(state): State<AppState>,
	mut request: Request,
	next: Next,
) -> Result<Response> {
	let bearer = bearer_candidate(request.headers())
		.filter(|b| !b.is_empty())
		.ok_or_else(|| ServerError::NotAuthenticated("authentication is required".to_string()))?;

	let organization = resolve_organization(&state, request.headers()).await?;

	let mut txn = state.store.begin(organization.id).await?;
	let (access_key, identity) = match validate_access_key(&mut txn, &bearer).await {
		Ok(validated) => validated,
		Err(err) => {
			txn.rollback().await?;
			return Err(reject_cross_organization(&state, &organization, &bearer, err).await);
		}
	};

	if let Some(identity) = &identity {
		touch_activity(&mut txn, &state.key_activity, &access_key, identity).await?;
	}
	touch_connector_destination(&state, &mut txn, request.headers()).await?;
	txn.commit().await?;

	let context = RequestContext {
		authenticated: Authenticated {
			access_key,
			identity,
			organization,
		},
	};
	request.extensions_mut().insert(context);

	Ok(next.run(request).await)
}

/// Resolve the organization the request addresses.
pub(crate) async fn resolve_organization(
	state: &AppState,
	headers: &HeaderMap,
) -> Result<Organization> {
	if let Some(base_domain) = &state.config.http.base_domain {
		let host = headers
			.get(HOST)
			.and_then(|h| h.to_str().ok())
			.map(|h| h.split(':').next().unwrap_or(h))
			.unwrap_or_default();

		if host != base_domain.as_str() && host.ends_with(&format!(".{base_domain}")) {
			return match state.store.get_organization_by_domain(host).await? {
				Some(org) => Ok(org),
				None => Err(ServerError::BadRequest(format!(
					"no organization for domain {host:?}"
				))),
			};
		}
	}

	if !state.config.auth.signups_enabled {
		// single-tenant mode
		return Ok(state.default_org.clone());
	}

	Err(ServerError::BadRequest(
		"could not determine the organization for this request".to_string(),
	))
}

/// A key that exists but belongs to a different organization than the host
/// addressed is a bad request, not an authentication failure.
async fn reject_cross_organization(
	state: &AppState,
	organization: &Organization,
	bearer: &str,
	original: ServerError,
) -> ServerError {
	let Ok((key_id, _)) = infra_server_auth::access_key::parse_token(bearer) else {
		return original;
	};
	match state.store.find_access_key_organization(key_id).await {
		Ok(Some(key_org)) if key_org != organization.id => ServerError::BadRequest(
			"access key belongs to a different organization".to_string(),
		),
		_ => original,
	}
}

/// Honor `Infra-Destination-Name` / `Infra-Destination-Unique-ID`: when a
/// request comes from a connector, mark its destination as seen (throttled).
async fn touch_connector_destination(
	state: &AppState,
	txn: &mut infra_server_db::OrgTxn,
	headers: &HeaderMap,
) -> Result<()> {
	let name = headers
		.get(HEADER_INFRA_DESTINATION_NAME)
		.and_then(|v| v.to_str().ok())
		.filter(|v| !v.is_empty());
	let unique_id = headers
		.get(HEADER_INFRA_DESTINATION_UNIQUE_ID)
		.and_then(|v| v.to_str().ok())
		.filter(|v| !v.is_empty());

	if name.is_none() && unique_id.is_none() {
		return Ok(());
	}

	let throttle_key = format!(
		"{}/{}/{}",
		txn.organization_id(),
		name.unwrap_or_default(),
		unique_id.unwrap_or_default()
	);
	let now = Utc::now();
	if !state.destination_activity.should_record(throttle_key, now) {
		return Ok(());
	}

	txn.touch_destination_last_seen(name, unique_id, now).await?;
	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn version_header_accepts_semver() {
		assert!(version_is_well_formed("0.21.0"));
		assert!(version_is_well_formed("1.2"));
		assert!(version_is_well_formed("2"));
		assert!(version_is_well_formed("0.21.0-beta1"));
	}

	#[test]
	fn version_header_rejects_garbage() {
		assert!(!version_is_well_formed(""));
		assert!(!version_is_well_formed("abc"));
		assert!(!version_is_well_formed("1.2.3.4"));
		assert!(!version_is_well_formed("1..3"));
	}
}
