// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! End-to-end tests against a live Postgres database.
//!
//! Run with a database and `INFRA_SERVER_TEST_DATABASE_URL` set:
//!
//! ```text
//! INFRA_SERVER_TEST_DATABASE_URL=postgres://localhost/infra_test \
//!     cargo test -p infra-server -- --ignored
//! ```

use std::time::{Duration, Instant};

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use chrono::Utc;
use infra_server::{create_app_state, create_router, AppState};
use infra_server_auth::{AccessKey, AccessKeyId, Identity, IdentityId, Role, CREATED_BY_SYSTEM};
use infra_server_config::ServerConfig;
use infra_server_db::{Destination, GrantSubject, Store};
use tower::ServiceExt;

async fn test_state() -> AppState {
	let url = std::env::var("INFRA_SERVER_TEST_DATABASE_URL")
		.expect("INFRA_SERVER_TEST_DATABASE_URL must point at a postgres database");
	let pool = infra_server_db::create_pool(&url, 10).await.unwrap();
	infra_server_db::run_migrations(&pool).await.unwrap();

	let config = ServerConfig::default();
	create_app_state(config, Store::new(pool)).await.unwrap()
}

async fn create_user_with_key(state: &AppState, name: &str, ttl_secs: i64) -> (Identity, String) {
	let mut txn = state.store.begin(state.default_org.id).await.unwrap();
	let now = Utc::now();

	let identity = match txn.get_identity_by_name(name).await.unwrap() {
		Some(identity) => identity,
		None => {
			let identity = Identity {
				id: IdentityId::generate(),
				organization_id: state.default_org.id,
				name: name.to_string(),
				created_by: CREATED_BY_SYSTEM,
				verification_token: infra_server_auth::identity::generate_verification_token(),
				last_seen_at: None,
				created_at: now,
				updated_at: now,
				deleted_at: None,
			};
			txn.create_identity(&identity).await.unwrap();
			identity
		}
	};

	let infra = txn.infra_provider().await.unwrap();
	txn.create_provider_user(&infra_server_db::ProviderUser {
		id: infra_server_auth::snowflake::generate(),
		organization_id: state.default_org.id,
		provider_id: infra.id,
		identity_id: identity.id,
		email: identity.name.clone(),
		given_name: String::new(),
		family_name: String::new(),
		active: true,
		created_at: now,
		updated_at: now,
	})
	.await
	.unwrap();

	let key = AccessKey {
		id: AccessKeyId::generate(),
		organization_id: state.default_org.id,
		name: None,
		issued_for: identity.id,
		provider_id: infra.id,
		key_id: String::new(),
		secret_hash: String::new(),
		expires_at: now + chrono::Duration::seconds(ttl_secs),
		inactivity_timeout: None,
		inactivity_extension: None,
		scopes: vec![],
		created_at: now,
		updated_at: now,
		deleted_at: None,
	};
	let (_key, token) = infra_server::access_keys::create_access_key(&mut txn, key)
		.await
		.unwrap();
	txn.commit().await.unwrap();

	(identity, token)
}

async fn grant_infra_role(state: &AppState, identity: IdentityId, role: Role) {
	let mut txn = state.store.begin(state.default_org.id).await.unwrap();
	let subject = GrantSubject::Identity(identity);
	if txn
		.get_grant(subject, role.as_str(), infra_server_auth::INFRA_RESOURCE)
		.await
		.unwrap()
		.is_none()
	{
		let now = Utc::now();
		txn.create_grant(&infra_server_db::Grant {
			id: infra_server_auth::GrantId::generate(),
			organization_id: state.default_org.id,
			subject,
			privilege: role.as_str().to_string(),
			resource: infra_server_auth::INFRA_RESOURCE.to_string(),
			created_by: CREATED_BY_SYSTEM,
			update_index: 0,
			created_at: now,
			updated_at: now,
			deleted_at: None,
		})
		.await
		.unwrap();
	}
	txn.commit().await.unwrap();
}

async fn ensure_destination(state: &AppState, name: &str) -> Destination {
	let mut txn = state.store.begin(state.default_org.id).await.unwrap();
	let destination = match txn.get_destination_by_name(name).await.unwrap() {
		Some(destination) => destination,
		None => {
			let now = Utc::now();
			let destination = Destination {
				id: infra_server_auth::DestinationId::generate(),
				organization_id: state.default_org.id,
				name: name.to_string(),
				unique_id: format!("uid-{name}"),
				kind: "kubernetes".to_string(),
				connection_url: String::new(),
				connection_ca: String::new(),
				resources: vec![],
				roles: vec![],
				version: String::new(),
				last_seen_at: None,
				created_at: now,
				updated_at: now,
				deleted_at: None,
			};
			txn.create_destination(&destination).await.unwrap();
			destination
		}
	};
	txn.commit().await.unwrap();
	destination
}

fn get_request(path: &str, token: &str) -> Request<Body> {
	Request::builder()
		.method("GET")
		.uri(path)
		.header(header::AUTHORIZATION, format!("Bearer {token}"))
		.header("Infra-Version", "0.21.0")
		.body(Body::empty())
		.unwrap()
}

async fn body_json(response: axum::response::Response) -> serde_json::Value {
	let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
		.await
		.unwrap();
	serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null)
}

#[tokio::test]
#[ignore = "requires postgres (set INFRA_SERVER_TEST_DATABASE_URL)"]
async fn access_key_happy_path_and_expiry() {
	let state = test_state().await;
	let app = create_router(state.clone());

	let (alice, token) = create_user_with_key(&state, "alice@example.com", 10).await;

	let response = app
		.clone()
		.oneshot(get_request(&format!("/api/users/{}", alice.id), &token))
		.await
		.unwrap();
	assert_eq!(response.status(), StatusCode::OK);
	let body = body_json(response).await;
	assert_eq!(body["name"], "alice@example.com");

	// force the key past its absolute expiry
	sqlx::query("UPDATE access_keys SET expires_at = now() - interval '1 second' WHERE issued_for = $1")
		.bind(alice.id.as_i64())
		.execute(state.store.pool())
		.await
		.unwrap();

	let response = app
		.clone()
		.oneshot(get_request(&format!("/api/users/{}", alice.id), &token))
		.await
		.unwrap();
	assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
	let body = body_json(response).await;
	assert_eq!(body["message"], "access key has expired");
}

#[tokio::test]
#[ignore = "requires postgres (set INFRA_SERVER_TEST_DATABASE_URL)"]
async fn invalid_secret_is_rejected() {
	let state = test_state().await;
	let app = create_router(state.clone());

	let (alice, token) = create_user_with_key(&state, "alice-secret@example.com", 600).await;
	let (key_id, _) = token.split_once('.').unwrap();
	let forged = format!(
		"{key_id}.{}",
		infra_server_auth::access_key::random_alphanumeric(24)
	);

	let response = app
		.clone()
		.oneshot(get_request(&format!("/api/users/{}", alice.id), &forged))
		.await
		.unwrap();
	assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
	let body = body_json(response).await;
	assert_eq!(body["message"], "access key invalid secret");
}

#[tokio::test]
#[ignore = "requires postgres (set INFRA_SERVER_TEST_DATABASE_URL)"]
async fn signup_cookie_wins_over_other_credentials() {
	let state = test_state().await;
	let app = create_router(state.clone());

	let (signup_user, signup_token) =
		create_user_with_key(&state, "signup-user@example.com", 600).await;
	let (_auth_user, auth_token) = create_user_with_key(&state, "auth-user@example.com", 600).await;
	let (_hdr_user, header_token) =
		create_user_with_key(&state, "header-user@example.com", 600).await;

	let request = Request::builder()
		.method("GET")
		.uri(format!("/api/users/{}", signup_user.id))
		.header(
			header::COOKIE,
			format!("signup={signup_token}; auth={auth_token}"),
		)
		.header(header::AUTHORIZATION, format!("Bearer {header_token}"))
		.header("Infra-Version", "0.21.0")
		.body(Body::empty())
		.unwrap();

	// the request succeeds as the signup-cookie user reading itself; any
	// other credential winning would make this a 403
	let response = app.clone().oneshot(request).await.unwrap();
	assert_eq!(response.status(), StatusCode::OK);
	let body = body_json(response).await;
	assert_eq!(body["name"], "signup-user@example.com");
}

#[tokio::test]
#[ignore = "requires postgres (set INFRA_SERVER_TEST_DATABASE_URL)"]
async fn long_poll_returns_immediately_when_ahead() {
	let state = test_state().await;
	let app = create_router(state.clone());

	let (viewer, token) = create_user_with_key(&state, "viewer-lp1@example.com", 600).await;
	grant_infra_role(&state, viewer.id, Role::View).await;
	ensure_destination(&state, "cluster-lp1").await;

	let (alice, _) = create_user_with_key(&state, "alice-lp1@example.com", 600).await;
	let mut txn = state.store.begin(state.default_org.id).await.unwrap();
	let now = Utc::now();
	let _ = txn
		.create_grant(&infra_server_db::Grant {
			id: infra_server_auth::GrantId::generate(),
			organization_id: state.default_org.id,
			subject: GrantSubject::Identity(alice.id),
			privilege: "view".to_string(),
			resource: "cluster-lp1".to_string(),
			created_by: CREATED_BY_SYSTEM,
			update_index: 0,
			created_at: now,
			updated_at: now,
			deleted_at: None,
		})
		.await;
	txn.commit().await.unwrap();

	let started = Instant::now();
	let response = app
		.clone()
		.oneshot(get_request(
			"/api/destinations/cluster-lp1/access?lastUpdateIndex=0",
			&token,
		))
		.await
		.unwrap();
	assert_eq!(response.status(), StatusCode::OK);
	assert!(started.elapsed() < Duration::from_millis(100));

	let body = body_json(response).await;
	assert!(body["lastUpdateIndex"].as_i64().unwrap() > 0);
	let items = body["items"].as_array().unwrap();
	assert!(items
		.iter()
		.any(|item| item["userID"] == alice.id.to_string() && item["privilege"] == "view"));
}

#[tokio::test]
#[ignore = "requires postgres (set INFRA_SERVER_TEST_DATABASE_URL)"]
async fn long_poll_wakes_on_grant_change() {
	let state = test_state().await;
	let app = create_router(state.clone());

	let (viewer, token) = create_user_with_key(&state, "viewer-lp2@example.com", 600).await;
	grant_infra_role(&state, viewer.id, Role::View).await;
	// a fresh destination per run so the created grant is always new
	let dest = format!("cluster-lp2-{}", infra_server_auth::snowflake::generate());
	ensure_destination(&state, &dest).await;
	let (bob, _) = create_user_with_key(&state, "bob-lp2@example.com", 600).await;

	// learn the current index
	let response = app
		.clone()
		.oneshot(get_request(
			&format!("/api/destinations/{dest}/access?lastUpdateIndex=0"),
			&token,
		))
		.await
		.unwrap();
	let last_index = body_json(response).await["lastUpdateIndex"].as_i64().unwrap();

	let blocked = tokio::spawn({
		let app = app.clone();
		let token = token.clone();
		let dest = dest.clone();
		async move {
			let path = format!(
				"/api/destinations/{dest}/access?lastUpdateIndex={last_index}&timeoutSeconds=30"
			);
			let started = Instant::now();
			let response = app.clone().oneshot(get_request(&path, &token)).await.unwrap();
			(response, started.elapsed())
		}
	});

	// give the long-poll a moment to park, then change a grant
	tokio::time::sleep(Duration::from_millis(300)).await;
	let mut txn = state.store.begin(state.default_org.id).await.unwrap();
	let now = Utc::now();
	txn.create_grant(&infra_server_db::Grant {
		id: infra_server_auth::GrantId::generate(),
		organization_id: state.default_org.id,
		subject: GrantSubject::Identity(bob.id),
		privilege: "admin".to_string(),
		resource: dest.clone(),
		created_by: CREATED_BY_SYSTEM,
		update_index: 0,
		created_at: now,
		updated_at: now,
		deleted_at: None,
	})
	.await
	.unwrap();
	txn.commit().await.unwrap();

	let (response, elapsed) = blocked.await.unwrap();
	assert_eq!(response.status(), StatusCode::OK);
	assert!(elapsed < Duration::from_secs(2), "woke after {elapsed:?}");

	let body = body_json(response).await;
	assert!(body["lastUpdateIndex"].as_i64().unwrap() > last_index);
	let items = body["items"].as_array().unwrap();
	assert!(items.iter().any(|item| item["userID"] == bob.id.to_string()));
}

#[tokio::test]
#[ignore = "requires postgres (set INFRA_SERVER_TEST_DATABASE_URL)"]
async fn long_poll_wakes_on_group_membership_change() {
	let state = test_state().await;
	let app = create_router(state.clone());

	let (admin, token) = create_user_with_key(&state, "admin-lp4@example.com", 600).await;
	grant_infra_role(&state, admin.id, Role::Admin).await;
	let dest = format!("cluster-lp4-{}", infra_server_auth::snowflake::generate());
	ensure_destination(&state, &dest).await;
	let (carol, _) = create_user_with_key(&state, "carol-lp4@example.com", 600).await;

	// a group grant with no members yet
	let mut txn = state.store.begin(state.default_org.id).await.unwrap();
	let now = Utc::now();
	let group = infra_server_db::Group {
		id: infra_server_auth::GroupId::generate(),
		organization_id: state.default_org.id,
		name: format!("ops-{}", infra_server_auth::snowflake::generate()),
		created_by: CREATED_BY_SYSTEM,
		created_at: now,
		updated_at: now,
		deleted_at: None,
	};
	txn.create_group(&group).await.unwrap();
	txn.create_grant(&infra_server_db::Grant {
		id: infra_server_auth::GrantId::generate(),
		organization_id: state.default_org.id,
		subject: GrantSubject::Group(group.id),
		privilege: "view".to_string(),
		resource: dest.clone(),
		created_by: CREATED_BY_SYSTEM,
		update_index: 0,
		created_at: now,
		updated_at: now,
		deleted_at: None,
	})
	.await
	.unwrap();
	txn.commit().await.unwrap();

	let response = app
		.clone()
		.oneshot(get_request(
			&format!("/api/destinations/{dest}/access?lastUpdateIndex=0"),
			&token,
		))
		.await
		.unwrap();
	let last_index = body_json(response).await["lastUpdateIndex"].as_i64().unwrap();

	let blocked = tokio::spawn({
		let app = app.clone();
		let token = token.clone();
		let dest = dest.clone();
		async move {
			let path = format!(
				"/api/destinations/{dest}/access?lastUpdateIndex={last_index}&timeoutSeconds=30"
			);
			app.clone().oneshot(get_request(&path, &token)).await.unwrap()
		}
	});

	tokio::time::sleep(Duration::from_millis(300)).await;
	let mut txn = state.store.begin(state.default_org.id).await.unwrap();
	txn.add_group_member(group.id, carol.id).await.unwrap();
	txn.commit().await.unwrap();

	let response = blocked.await.unwrap();
	assert_eq!(response.status(), StatusCode::OK);
	let body = body_json(response).await;
	assert!(body["lastUpdateIndex"].as_i64().unwrap() > last_index);
	let items = body["items"].as_array().unwrap();
	assert!(
		items.iter().any(|item| item["userID"] == carol.id.to_string()),
		"expanded group member should appear in the access list"
	);
}

#[tokio::test]
#[ignore = "requires postgres (set INFRA_SERVER_TEST_DATABASE_URL)"]
async fn long_poll_times_out_with_not_modified() {
	let state = test_state().await;
	let app = create_router(state.clone());

	let (viewer, token) = create_user_with_key(&state, "viewer-lp3@example.com", 600).await;
	grant_infra_role(&state, viewer.id, Role::View).await;
	ensure_destination(&state, "cluster-lp3").await;

	let response = app
		.clone()
		.oneshot(get_request(
			"/api/destinations/cluster-lp3/access?lastUpdateIndex=0",
			&token,
		))
		.await
		.unwrap();
	let last_index = body_json(response).await["lastUpdateIndex"].as_i64().unwrap();

	let path = format!(
		"/api/destinations/cluster-lp3/access?lastUpdateIndex={last_index}&timeoutSeconds=1"
	);
	let started = Instant::now();
	let response = app.clone().oneshot(get_request(&path, &token)).await.unwrap();
	assert_eq!(response.status(), StatusCode::NOT_MODIFIED);
	assert!(started.elapsed() >= Duration::from_secs(1));
}

#[tokio::test]
#[ignore = "requires postgres (set INFRA_SERVER_TEST_DATABASE_URL)"]
async fn concurrent_authentication_shares_one_activity_write() {
	let state = test_state().await;
	let app = create_router(state.clone());

	let (alice, token) = create_user_with_key(&state, "alice-conc@example.com", 600).await;

	let started = Instant::now();
	let requests = (0..100).map(|_| {
		let app = app.clone();
		let token = token.clone();
		let path = format!("/api/users/{}", alice.id);
		tokio::spawn(async move { app.clone().oneshot(get_request(&path, &token)).await.unwrap() })
	});

	for handle in requests {
		let response = handle.await.unwrap();
		assert_eq!(response.status(), StatusCode::OK);
	}
	assert!(started.elapsed() < Duration::from_secs(1));

	// all requests landed within one throttle window: last_seen_at was
	// written at most once
	let row: (Option<chrono::DateTime<Utc>>,) =
		sqlx::query_as("SELECT last_seen_at FROM identities WHERE id = $1")
			.bind(alice.id.as_i64())
			.fetch_one(state.store.pool())
			.await
			.unwrap();
	assert!(row.0.is_some());
}

#[tokio::test]
#[ignore = "requires postgres (set INFRA_SERVER_TEST_DATABASE_URL)"]
async fn bootstrap_reconciles_providers() {
	let url = std::env::var("INFRA_SERVER_TEST_DATABASE_URL")
		.expect("INFRA_SERVER_TEST_DATABASE_URL must point at a postgres database");
	let pool = infra_server_db::create_pool(&url, 10).await.unwrap();
	infra_server_db::run_migrations(&pool).await.unwrap();

	let mut config = ServerConfig::default();
	config.bootstrap.root_access_key = String::new();
	config.bootstrap.engine_access_key = String::new();
	config.bootstrap.providers = vec![
		infra_server_config::ProviderConfig {
			kind: "okta".to_string(),
			domain: "acme.okta.com".to_string(),
			client_id: "okta-client".to_string(),
			client_secret: "okta-secret".to_string(),
		},
		infra_server_config::ProviderConfig {
			kind: "google".to_string(),
			domain: "accounts.google.com".to_string(),
			client_id: "google-client".to_string(),
			client_secret: "google-secret".to_string(),
		},
	];

	let state = create_app_state(config, Store::new(pool)).await.unwrap();

	// seed a provider that the configuration no longer lists
	let mut txn = state.store.begin(state.default_org.id).await.unwrap();
	if txn.get_provider_by_name("azure").await.unwrap().is_none() {
		let now = Utc::now();
		txn.create_provider(&infra_server_db::Provider {
			id: infra_server_auth::ProviderId::generate(),
			organization_id: state.default_org.id,
			name: "azure".to_string(),
			kind: "azure".to_string(),
			domain: "login.microsoftonline.com".to_string(),
			client_id: String::new(),
			client_secret: String::new(),
			created_by: CREATED_BY_SYSTEM,
			created_at: now,
			updated_at: now,
			deleted_at: None,
		})
		.await
		.unwrap();
	}
	txn.commit().await.unwrap();

	infra_server::bootstrap::load(&state).await.unwrap();

	let mut txn = state.store.begin(state.default_org.id).await.unwrap();
	let names: Vec<String> = txn
		.list_providers()
		.await
		.unwrap()
		.into_iter()
		.map(|p| p.name)
		.collect();
	txn.rollback().await.unwrap();

	assert!(names.contains(&"okta".to_string()));
	assert!(names.contains(&"google".to_string()));
	assert!(names.contains(&"infra".to_string()));
	assert!(!names.contains(&"azure".to_string()), "azure should be soft-deleted");
}
