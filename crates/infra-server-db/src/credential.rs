// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Credential and password-reset-token repository.

use chrono::{Duration, Utc};
use infra_server_auth::access_key::random_alphanumeric;
use infra_server_auth::{CredentialId, IdentityId};
use sqlx::postgres::PgRow;
use sqlx::Row;

use crate::error::Result;
use crate::models::Credential;
use crate::store::OrgTxn;

const CREDENTIAL_COLUMNS: &str = "id, organization_id, identity_id, password_hash, \
	one_time_password, created_at, updated_at, deleted_at";

/// Length of an emailed password-reset token.
const RESET_TOKEN_LENGTH: usize = 24;

impl OrgTxn {
	#[tracing::instrument(skip(self, credential), fields(identity_id = %credential.identity_id))]
	pub async fn create_credential(&mut self, credential: &Credential) -> Result<()> {
		let org_id = self.organization_id.as_i64();
		sqlx::query(
			r#"
			INSERT INTO credentials (
				id, organization_id, identity_id, password_hash, one_time_password,
				created_at, updated_at
			) VALUES ($1, $2, $3, $4, $5, $6, $7)
			"#,
		)
		.bind(credential.id.as_i64())
		.bind(org_id)
		.bind(credential.identity_id.as_i64())
		.bind(&credential.password_hash)
		.bind(credential.one_time_password)
		.bind(credential.created_at)
		.bind(credential.updated_at)
		.execute(self.conn())
		.await?;
		Ok(())
	}

	pub async fn get_credential_by_identity_id(
		&mut self,
		identity_id: IdentityId,
	) -> Result<Option<Credential>> {
		let org_id = self.organization_id.as_i64();
		let row = sqlx::query(&format!(
			"SELECT {CREDENTIAL_COLUMNS} FROM credentials \
			 WHERE organization_id = $1 AND identity_id = $2 AND deleted_at IS NULL"
		))
		.bind(org_id)
		.bind(identity_id.as_i64())
		.fetch_optional(self.conn())
		.await?;

		Ok(row.map(|row| parse_credential_row(&row)))
	}

	#[tracing::instrument(skip(self, credential), fields(identity_id = %credential.identity_id))]
	pub async fn update_credential(&mut self, credential: &Credential) -> Result<()> {
		let org_id = self.organization_id.as_i64();
		sqlx::query(
			r#"
			UPDATE credentials
			SET password_hash = $3, one_time_password = $4, updated_at = $5
			WHERE organization_id = $1 AND id = $2 AND deleted_at IS NULL
			"#,
		)
		.bind(org_id)
		.bind(credential.id.as_i64())
		.bind(&credential.password_hash)
		.bind(credential.one_time_password)
		.bind(Utc::now())
		.execute(self.conn())
		.await?;
		Ok(())
	}

	/// Issue a password-reset token for an identity, valid for `ttl`.
	#[tracing::instrument(skip(self))]
	pub async fn create_password_reset_token(
		&mut self,
		identity_id: IdentityId,
		ttl: Duration,
	) -> Result<String> {
		let org_id = self.organization_id.as_i64();
		let token = random_alphanumeric(RESET_TOKEN_LENGTH);
		let now = Utc::now();
		sqlx::query(
			r#"
			INSERT INTO password_reset_tokens (
				id, organization_id, identity_id, token, expires_at, created_at
			) VALUES ($1, $2, $3, $4, $5, $6)
			"#,
		)
		.bind(infra_server_auth::snowflake::generate())
		.bind(org_id)
		.bind(identity_id.as_i64())
		.bind(&token)
		.bind(now + ttl)
		.bind(now)
		.execute(self.conn())
		.await?;
		Ok(token)
	}

	/// Consume a password-reset token. Returns the identity it was issued
	/// for, or `None` when the token is unknown or expired. Tokens are
	/// single-use: the row is deleted on claim.
	#[tracing::instrument(skip(self, token))]
	pub async fn claim_password_reset_token(
		&mut self,
		token: &str,
	) -> Result<Option<IdentityId>> {
		let org_id = self.organization_id.as_i64();
		let row = sqlx::query(
			"DELETE FROM password_reset_tokens \
			 WHERE organization_id = $1 AND token = $2 \
			 RETURNING identity_id, expires_at",
		)
		.bind(org_id)
		.bind(token)
		.fetch_optional(self.conn())
		.await?;

		let Some(row) = row else {
			return Ok(None);
		};
		let expires_at: chrono::DateTime<Utc> = row.get("expires_at");
		if expires_at < Utc::now() {
			return Ok(None);
		}
		Ok(Some(IdentityId::new(row.get("identity_id"))))
	}
}

fn parse_credential_row(row: &PgRow) -> Credential {
	Credential {
		id: CredentialId::new(row.get("id")),
		organization_id: infra_server_auth::OrganizationId::new(row.get("organization_id")),
		identity_id: IdentityId::new(row.get("identity_id")),
		password_hash: row.get("password_hash"),
		one_time_password: row.get("one_time_password"),
		created_at: row.get("created_at"),
		updated_at: row.get("updated_at"),
		deleted_at: row.get("deleted_at"),
	}
}
