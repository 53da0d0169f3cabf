// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Application state and the HTTP router.

use std::sync::Arc;

use axum::middleware;
use axum::routing::{get, post, put};
use axum::Router;
use infra_server_auth::AccessKeyId;
use infra_server_config::ServerConfig;
use infra_server_db::{Organization, Store};
use infra_server_secrets::{SecretsRegistry, SymmetricKeyProvider};

use crate::access_keys::ActivityThrottle;
use crate::error::Result;
use crate::middleware::{authenticate, require_infra_version};
use crate::routes;

/// Process-wide state. Exactly three pieces are global: the provider
/// registry (set once at startup), the database pool, and the default
/// organization. Everything else is request-scoped.
#[derive(Clone)]
pub struct AppState {
	pub store: Store,
	pub secrets: Arc<SecretsRegistry>,
	/// Key provider used for at-rest encryption of provider client secrets.
	pub encryption_keys: Arc<dyn SymmetricKeyProvider>,
	pub config: Arc<ServerConfig>,
	pub default_org: Organization,
	pub key_activity: Arc<ActivityThrottle<AccessKeyId>>,
	pub destination_activity: Arc<ActivityThrottle<String>>,
}

/// Build the application state: load the secrets registry, connect the
/// store, and ensure the default organization exists.
pub async fn create_app_state(config: ServerConfig, store: Store) -> Result<AppState> {
	let secrets = SecretsRegistry::load(&config.secrets, &config.keys).await?;
	let encryption_keys = secrets.key_provider(&config.database.encryption_key_provider)?;

	let default_domain = config
		.bootstrap
		.default_organization_domain
		.clone()
		.unwrap_or_default();
	let default_org = store
		.ensure_default_organization("default", &default_domain)
		.await?;

	Ok(AppState {
		store,
		secrets: Arc::new(secrets),
		encryption_keys,
		config: Arc::new(config),
		default_org,
		key_activity: Arc::new(ActivityThrottle::default()),
		destination_activity: Arc::new(ActivityThrottle::default()),
	})
}

/// Assemble the router: public routes, SCIM (authenticated, version header
/// optional), and the main API (authenticated, version header required).
pub fn create_router(state: AppState) -> Router {
	let public = Router::new()
		.route("/healthz", get(routes::health::healthz))
		.route("/api/login", post(routes::login::login))
		.route("/api/password-reset", post(routes::password_reset::request_password_reset))
		.route("/api/password-reset/verify", post(routes::password_reset::verify_password_reset));

	let scim = Router::new()
		.route(
			"/api/scim/v2/Users",
			get(routes::scim::list_provider_users).post(routes::scim::provision_provider_user),
		)
		.route_layer(middleware::from_fn_with_state(state.clone(), authenticate));

	let api = Router::new()
		.route("/api/users", get(routes::users::list_users))
		.route("/api/users/{id}", get(routes::users::get_user))
		.route("/api/users/{id}/credentials", put(routes::users::update_credentials))
		.route("/api/logout", post(routes::login::logout))
		.route(
			"/api/destinations",
			get(routes::destinations::list_destinations).post(routes::destinations::create_destination),
		)
		.route(
			"/api/destinations/{id}",
			get(routes::destinations::get_destination)
				.put(routes::destinations::update_destination)
				.delete(routes::destinations::delete_destination),
		)
		.route(
			// the path parameter is the destination name; grants key
			// destinations by name
			"/api/destinations/{id}/access",
			get(routes::destinations::list_destination_access),
		)
		.route(
			"/api/groups",
			get(routes::groups::list_groups).post(routes::groups::create_group),
		)
		.route(
			"/api/groups/{id}/users",
			get(routes::groups::list_group_members).patch(routes::groups::update_group_members),
		)
		.route(
			"/api/grants",
			get(routes::grants::list_grants).post(routes::grants::create_grant),
		)
		.route(
			"/api/grants/{id}",
			put(routes::grants::update_grant).delete(routes::grants::delete_grant),
		)
		.route_layer(middleware::from_fn_with_state(state.clone(), authenticate))
		.route_layer(middleware::from_fn(require_infra_version));

	public.merge(scim).merge(api).with_state(state)
}
