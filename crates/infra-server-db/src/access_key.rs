// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Access-key repository. Secrets are stored as bcrypt hashes, never
//! plaintext.

use chrono::{DateTime, Duration, Utc};
use infra_server_auth::{AccessKey, AccessKeyId, AccessKeyScope, IdentityId};
use sqlx::postgres::PgRow;
use sqlx::Row;

use crate::error::{DbError, Result};
use crate::store::{OrgTxn, Store};

const ACCESS_KEY_COLUMNS: &str = "id, organization_id, name, issued_for, provider_id, key_id, \
	secret_hash, expires_at, inactivity_timeout, inactivity_extension_secs, scopes, \
	created_at, updated_at, deleted_at";

impl OrgTxn {
	#[tracing::instrument(skip(self, key), fields(access_key_id = %key.id, issued_for = %key.issued_for))]
	pub async fn create_access_key(&mut self, key: &AccessKey) -> Result<()> {
		let org_id = self.organization_id.as_i64();
		sqlx::query(
			r#"
			INSERT INTO access_keys (
				id, organization_id, name, issued_for, provider_id, key_id, secret_hash,
				expires_at, inactivity_timeout, inactivity_extension_secs, scopes,
				created_at, updated_at
			) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
			"#,
		)
		.bind(key.id.as_i64())
		.bind(org_id)
		.bind(&key.name)
		.bind(key.issued_for.as_i64())
		.bind(key.provider_id.as_i64())
		.bind(&key.key_id)
		.bind(&key.secret_hash)
		.bind(key.expires_at)
		.bind(key.inactivity_timeout)
		.bind(key.inactivity_extension.map(|d| d.num_seconds()))
		.bind(AccessKeyScope::join(&key.scopes))
		.bind(key.created_at)
		.bind(key.updated_at)
		.execute(self.conn())
		.await?;

		tracing::debug!("access key created");
		Ok(())
	}

	pub async fn get_access_key_by_key_id(&mut self, key_id: &str) -> Result<Option<AccessKey>> {
		let org_id = self.organization_id.as_i64();
		let row = sqlx::query(&format!(
			"SELECT {ACCESS_KEY_COLUMNS} FROM access_keys \
			 WHERE organization_id = $1 AND key_id = $2 AND deleted_at IS NULL"
		))
		.bind(org_id)
		.bind(key_id)
		.fetch_optional(self.conn())
		.await?;

		row.map(|row| parse_access_key_row(&row)).transpose()
	}

	pub async fn get_access_key_by_name(&mut self, name: &str) -> Result<Option<AccessKey>> {
		let org_id = self.organization_id.as_i64();
		let row = sqlx::query(&format!(
			"SELECT {ACCESS_KEY_COLUMNS} FROM access_keys \
			 WHERE organization_id = $1 AND name = $2 AND deleted_at IS NULL"
		))
		.bind(org_id)
		.bind(name)
		.fetch_optional(self.conn())
		.await?;

		row.map(|row| parse_access_key_row(&row)).transpose()
	}

	pub async fn list_access_keys_for_identity(
		&mut self,
		identity_id: IdentityId,
	) -> Result<Vec<AccessKey>> {
		let org_id = self.organization_id.as_i64();
		let rows = sqlx::query(&format!(
			"SELECT {ACCESS_KEY_COLUMNS} FROM access_keys \
			 WHERE organization_id = $1 AND issued_for = $2 AND deleted_at IS NULL \
			 ORDER BY created_at DESC"
		))
		.bind(org_id)
		.bind(identity_id.as_i64())
		.fetch_all(self.conn())
		.await?;

		rows.iter().map(parse_access_key_row).collect()
	}

	/// Persist scope changes, e.g. dropping `password-reset` after a
	/// self-service password change.
	#[tracing::instrument(skip(self, key), fields(access_key_id = %key.id))]
	pub async fn update_access_key_scopes(&mut self, key: &AccessKey) -> Result<()> {
		let org_id = self.organization_id.as_i64();
		sqlx::query(
			"UPDATE access_keys SET scopes = $3, updated_at = $4 \
			 WHERE organization_id = $1 AND id = $2 AND deleted_at IS NULL",
		)
		.bind(org_id)
		.bind(key.id.as_i64())
		.bind(AccessKeyScope::join(&key.scopes))
		.bind(Utc::now())
		.execute(self.conn())
		.await?;
		Ok(())
	}

	/// Refresh the stored secret hash (bootstrap reconciliation).
	#[tracing::instrument(skip(self, secret_hash))]
	pub async fn update_access_key_secret(
		&mut self,
		id: AccessKeyId,
		secret_hash: &str,
	) -> Result<()> {
		let org_id = self.organization_id.as_i64();
		sqlx::query(
			"UPDATE access_keys SET secret_hash = $3, updated_at = $4 \
			 WHERE organization_id = $1 AND id = $2 AND deleted_at IS NULL",
		)
		.bind(org_id)
		.bind(id.as_i64())
		.bind(secret_hash)
		.bind(Utc::now())
		.execute(self.conn())
		.await?;
		Ok(())
	}

	/// Extend the sliding inactivity deadline.
	pub async fn update_access_key_inactivity(
		&mut self,
		id: AccessKeyId,
		inactivity_timeout: DateTime<Utc>,
	) -> Result<()> {
		let org_id = self.organization_id.as_i64();
		sqlx::query(
			"UPDATE access_keys SET inactivity_timeout = $3, updated_at = $4 \
			 WHERE organization_id = $1 AND id = $2 AND deleted_at IS NULL",
		)
		.bind(org_id)
		.bind(id.as_i64())
		.bind(inactivity_timeout)
		.bind(Utc::now())
		.execute(self.conn())
		.await?;
		Ok(())
	}

	/// Revoke an access key.
	#[tracing::instrument(skip(self))]
	pub async fn delete_access_key(&mut self, id: AccessKeyId) -> Result<()> {
		let org_id = self.organization_id.as_i64();
		let now = Utc::now();
		sqlx::query(
			"UPDATE access_keys SET deleted_at = $3, updated_at = $3 \
			 WHERE organization_id = $1 AND id = $2 AND deleted_at IS NULL",
		)
		.bind(org_id)
		.bind(id.as_i64())
		.bind(now)
		.execute(self.conn())
		.await?;

		tracing::info!(access_key_id = %id, "access key revoked");
		Ok(())
	}
}

impl Store {
	/// The organization a key id belongs to, looked up without tenant
	/// scoping. Used by the authentication middleware to distinguish an
	/// unknown key from one presented against the wrong organization.
	pub async fn find_access_key_organization(
		&self,
		key_id: &str,
	) -> Result<Option<infra_server_auth::OrganizationId>> {
		let row = sqlx::query(
			"SELECT organization_id FROM access_keys WHERE key_id = $1 AND deleted_at IS NULL",
		)
		.bind(key_id)
		.fetch_optional(self.pool())
		.await?;

		Ok(row.map(|row| infra_server_auth::OrganizationId::new(row.get("organization_id"))))
	}
}

fn parse_access_key_row(row: &PgRow) -> Result<AccessKey> {
	let scopes_raw: String = row.get("scopes");
	let scopes = AccessKeyScope::split(&scopes_raw)
		.map_err(|e| DbError::Internal(format!("invalid stored scopes: {e}")))?;

	let inactivity_extension_secs: Option<i64> = row.get("inactivity_extension_secs");

	Ok(AccessKey {
		id: AccessKeyId::new(row.get("id")),
		organization_id: infra_server_auth::OrganizationId::new(row.get("organization_id")),
		name: row.get("name"),
		issued_for: IdentityId::new(row.get("issued_for")),
		provider_id: infra_server_auth::ProviderId::new(row.get("provider_id")),
		key_id: row.get("key_id"),
		secret_hash: row.get("secret_hash"),
		expires_at: row.get("expires_at"),
		inactivity_timeout: row.get("inactivity_timeout"),
		inactivity_extension: inactivity_extension_secs.map(Duration::seconds),
		scopes,
		created_at: row.get("created_at"),
		updated_at: row.get("updated_at"),
		deleted_at: row.get("deleted_at"),
	})
}
