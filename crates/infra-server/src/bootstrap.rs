// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! The bootstrap loader: reconciles configured users, credentials, access
//! keys, grants, and providers into the database at startup.
//!
//! The whole reconciliation runs inside one transaction on the default
//! organization; a partial failure rolls everything back and the process
//! exits non-zero.

use base64::Engine;
use chrono::{Duration, Utc};
use infra_server_auth::access_key::{
	hash_secret, parse_token, random_alphanumeric, LEGACY_KEY_ID_LENGTH, LEGACY_TOKEN_LENGTH,
};
use infra_server_auth::identity::{generate_verification_token, INTERNAL_CONNECTOR_IDENTITY_NAME};
use infra_server_auth::{
	AccessKey, AccessKeyId, AccessKeyScope, CredentialId, Identity, IdentityId, ProviderId, Role,
	CREATED_BY_SYSTEM,
};
use infra_server_config::{ProviderConfig, UserConfig};
use infra_server_db::{Credential, Grant, GrantSubject, OrgTxn, Provider, ProviderUser};
use infra_server_secrets::SecretsError;

use crate::api::AppState;
use crate::error::{Result, ServerError};

/// Lifetime of configured and legacy access keys.
const BOOTSTRAP_KEY_YEARS: i64 = 10;

/// Reconcile the bootstrap configuration. Idempotent: a restart with the
/// same configuration is a no-op.
#[tracing::instrument(skip(state))]
pub async fn load(state: &AppState) -> Result<()> {
	let config = &state.config.bootstrap;

	if let Some(domain) = &config.default_organization_domain {
		if *domain != state.default_org.domain {
			state
				.store
				.update_organization_domain(state.default_org.id, domain)
				.await?;
		}
	}

	let mut txn = state.store.begin(state.default_org.id).await?;

	for user in &config.users {
		load_user(state, &mut txn, user)
			.await
			.map_err(|e| ServerError::Internal(format!("load user {:?}: {e}", user.name)))?;
	}

	load_legacy_token(state, &mut txn, "root", &config.root_access_key, Role::Admin).await?;
	load_legacy_token(
		state,
		&mut txn,
		"engine",
		&config.engine_access_key,
		Role::Connector,
	)
	.await?;

	load_providers(state, &mut txn, &config.providers).await?;

	txn.commit().await?;
	tracing::info!(
		users = config.users.len(),
		providers = config.providers.len(),
		"bootstrap configuration loaded"
	);
	Ok(())
}

async fn load_user(state: &AppState, txn: &mut OrgTxn, input: &UserConfig) -> Result<()> {
	let identity = ensure_identity(txn, &input.name).await?;

	if !input.password.is_empty() {
		let password = state.secrets.get_secret(&input.password).await?;
		load_credential(txn, &identity, &password).await?;
	}

	if !input.access_key.is_empty() {
		let key = state.secrets.get_secret(&input.access_key).await?;
		load_access_key(txn, &identity, &key).await?;
	}

	if !input.infra_role.is_empty() {
		load_grant(txn, identity.id, &input.infra_role).await?;
	}

	Ok(())
}

async fn ensure_identity(txn: &mut OrgTxn, name: &str) -> Result<Identity> {
	if let Some(identity) = txn.get_identity_by_name(name).await? {
		return Ok(identity);
	}

	if name != INTERNAL_CONNECTOR_IDENTITY_NAME && !looks_like_email(name) {
		tracing::warn!(
			name = %name,
			"configured user name is not a valid email, please update it to a valid email"
		);
	}

	let now = Utc::now();
	let identity = Identity {
		id: IdentityId::generate(),
		organization_id: txn.organization_id(),
		name: name.to_string(),
		created_by: CREATED_BY_SYSTEM,
		verification_token: generate_verification_token(),
		last_seen_at: None,
		created_at: now,
		updated_at: now,
		deleted_at: None,
	};
	txn.create_identity(&identity).await?;
	ensure_infra_provider_user(txn, &identity).await?;
	Ok(identity)
}

fn looks_like_email(name: &str) -> bool {
	match name.split_once('@') {
		Some((local, domain)) => !local.is_empty() && domain.contains('.'),
		None => false,
	}
}

async fn ensure_infra_provider_user(txn: &mut OrgTxn, identity: &Identity) -> Result<()> {
	let infra = txn.infra_provider().await?;
	let now = Utc::now();
	txn.create_provider_user(&ProviderUser {
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

async fn load_credential(txn: &mut OrgTxn, identity: &Identity, password: &str) -> Result<()> {
	let hash = hash_secret(password)?;
	match txn.get_credential_by_identity_id(identity.id).await? {
		Some(mut credential) => {
			credential.password_hash = hash;
			txn.update_credential(&credential).await?;
		}
		None => {
			let now = Utc::now();
			txn.create_credential(&Credential {
				id: CredentialId::generate(),
				organization_id: txn.organization_id(),
				identity_id: identity.id,
				password_hash: hash,
				one_time_password: false,
				created_at: now,
				updated_at: now,
				deleted_at: None,
			})
			.await?;
			ensure_infra_provider_user(txn, identity).await?;
		}
	}
	Ok(())
}

async fn load_access_key(txn: &mut OrgTxn, identity: &Identity, key: &str) -> Result<()> {
	let (key_id, secret) = parse_token(key)
		.map_err(|e| ServerError::BadRequest(format!("configured access key: {e}")))?;

	match txn.get_access_key_by_key_id(key_id).await? {
		Some(existing) => {
			if existing.issued_for != identity.id {
				return Err(ServerError::BadRequest(format!(
					"access key assigned to {:?} is already assigned to another user, a user's access key must have a unique ID",
					identity.name
				)));
			}
			txn.update_access_key_secret(existing.id, &hash_secret(secret)?)
				.await?;
		}
		None => {
			let infra = txn.infra_provider().await?;
			let now = Utc::now();
			txn.create_access_key(&AccessKey {
				id: AccessKeyId::generate(),
				organization_id: txn.organization_id(),
				name: None,
				issued_for: identity.id,
				provider_id: infra.id,
				key_id: key_id.to_string(),
				secret_hash: hash_secret(secret)?,
				expires_at: now + Duration::days(BOOTSTRAP_KEY_YEARS * 365),
				inactivity_timeout: None,
				inactivity_extension: None,
				scopes: vec![AccessKeyScope::AllowCreateAccessKey],
				created_at: now,
				updated_at: now,
				deleted_at: None,
			})
			.await?;
			ensure_infra_provider_user(txn, identity).await?;
		}
	}
	Ok(())
}

async fn load_grant(txn: &mut OrgTxn, identity_id: IdentityId, role: &str) -> Result<()> {
	let subject = GrantSubject::Identity(identity_id);
	if txn
		.get_grant(subject, role, infra_server_auth::INFRA_RESOURCE)
		.await?
		.is_some()
	{
		return Ok(());
	}

	let now = Utc::now();
	txn.create_grant(&Grant {
		id: infra_server_auth::GrantId::generate(),
		organization_id: txn.organization_id(),
		subject,
		privilege: role.to_string(),
		resource: infra_server_auth::INFRA_RESOURCE.to_string(),
		created_by: CREATED_BY_SYSTEM,
		update_index: 0,
		created_at: now,
		updated_at: now,
		deleted_at: None,
	})
	.await?;
	Ok(())
}

/// Load one legacy API token (`root` or `engine`). The stored secret is a
/// 36-character string split into a 12-character key id and a 24-character
/// secret; when the secret reference resolves to nothing, a fresh secret is
/// generated and persisted through the provider registry.
async fn load_legacy_token(
	state: &AppState,
	txn: &mut OrgTxn,
	name: &str,
	secret_reference: &str,
	role: Role,
) -> Result<()> {
	if secret_reference.is_empty() {
		return Ok(());
	}

	let token = match state.secrets.get_secret(secret_reference).await {
		Ok(token) => token,
		Err(SecretsError::NotFound(_)) => String::new(),
		Err(e) => return Err(e.into()),
	};

	let token = if token.is_empty() {
		let token = random_alphanumeric(LEGACY_TOKEN_LENGTH);
		state.secrets.set_secret(secret_reference, &token).await?;
		token
	} else {
		token
	};

	if token.len() != LEGACY_TOKEN_LENGTH {
		return Err(ServerError::BadRequest(format!(
			"secret for {name:?} token must be {LEGACY_TOKEN_LENGTH} characters in length, but is {}",
			token.len()
		)));
	}

	let (key_id, secret) = token.split_at(LEGACY_KEY_ID_LENGTH);
	let identity = ensure_identity(txn, name).await?;

	match txn.get_access_key_by_key_id(key_id).await? {
		Some(existing) => {
			txn.update_access_key_secret(existing.id, &hash_secret(secret)?)
				.await?;
		}
		None => {
			let infra = txn.infra_provider().await?;
			let now = Utc::now();
			txn.create_access_key(&AccessKey {
				id: AccessKeyId::generate(),
				organization_id: txn.organization_id(),
				name: Some(format!("{name}-token")),
				issued_for: identity.id,
				provider_id: infra.id,
				key_id: key_id.to_string(),
				secret_hash: hash_secret(secret)?,
				expires_at: now + Duration::days(BOOTSTRAP_KEY_YEARS * 365),
				inactivity_timeout: None,
				inactivity_extension: None,
				scopes: vec![AccessKeyScope::AllowCreateAccessKey],
				created_at: now,
				updated_at: now,
				deleted_at: None,
			})
			.await?;
		}
	}

	load_grant(txn, identity.id, role.as_str()).await?;
	Ok(())
}

/// Upsert each configured provider and soft-delete the rest, preserving the
/// built-in `infra` provider.
async fn load_providers(
	state: &AppState,
	txn: &mut OrgTxn,
	providers: &[ProviderConfig],
) -> Result<()> {
	let mut keep: Vec<ProviderId> = Vec::with_capacity(providers.len());

	for config in providers {
		let domain = cleanup_domain(&config.domain);
		if domain.is_empty() {
			return Err(ServerError::BadRequest(format!(
				"provider {:?}: invalid domain {:?}",
				config.kind, config.domain
			)));
		}

		let client_secret = state.secrets.get_secret(&config.client_secret).await?;
		let encrypted = state.encryption_keys.encrypt(client_secret.as_bytes()).await?;
		let client_secret = base64::engine::general_purpose::STANDARD.encode(encrypted);

		match txn.get_provider_by_name(&config.kind).await? {
			Some(mut provider) => {
				provider.kind = config.kind.clone();
				provider.domain = domain;
				provider.client_id = config.client_id.clone();
				provider.client_secret = client_secret;
				txn.update_provider(&provider).await?;
				keep.push(provider.id);
			}
			None => {
				let now = Utc::now();
				let provider = Provider {
					id: ProviderId::generate(),
					organization_id: txn.organization_id(),
					name: config.kind.clone(),
					kind: config.kind.clone(),
					domain,
					client_id: config.client_id.clone(),
					client_secret,
					created_by: CREATED_BY_SYSTEM,
					created_at: now,
					updated_at: now,
					deleted_at: None,
				};
				txn.create_provider(&provider).await?;
				keep.push(provider.id);
			}
		}
	}

	txn.delete_providers_except(&keep).await?;
	Ok(())
}

/// Normalize a configured provider domain: trim whitespace, strip the
/// protocol, and fold the okta admin console domain to the org domain.
fn cleanup_domain(domain: &str) -> String {
	let domain = domain.trim();
	let domain = domain
		.strip_prefix("https://")
		.or_else(|| domain.strip_prefix("http://"))
		.unwrap_or(domain);
	match domain.strip_suffix("-admin.okta.com") {
		Some(prefix) => format!("{prefix}.okta.com"),
		None => domain.to_string(),
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn domain_cleanup_strips_protocol_and_admin_suffix() {
		assert_eq!(cleanup_domain("  acme.okta.com "), "acme.okta.com");
		assert_eq!(cleanup_domain("https://acme.okta.com"), "acme.okta.com");
		assert_eq!(cleanup_domain("acme-admin.okta.com"), "acme.okta.com");
		assert_eq!(
			cleanup_domain("http://acme-admin.okta.com"),
			"acme.okta.com"
		);
		assert_eq!(cleanup_domain("login.example.com"), "login.example.com");
	}

	#[test]
	fn email_shapes_are_detected() {
		assert!(looks_like_email("alice@example.com"));
		assert!(!looks_like_email("alice"));
		assert!(!looks_like_email("@example.com"));
		assert!(!looks_like_email("alice@nodot"));
	}

	#[test]
	fn legacy_token_splits_twelve_and_twenty_four() {
		let token = random_alphanumeric(LEGACY_TOKEN_LENGTH);
		let (key_id, secret) = token.split_at(LEGACY_KEY_ID_LENGTH);
		assert_eq!(key_id.len(), 12);
		assert_eq!(secret.len(), 24);
	}
}
