// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Provider and provider-user repository.

use chrono::Utc;
use infra_server_auth::{IdentityId, ProviderId};
use sqlx::postgres::PgRow;
use sqlx::Row;

use crate::error::{DbError, Result};
use crate::models::{Provider, ProviderUser, INFRA_PROVIDER_NAME};
use crate::store::OrgTxn;

const PROVIDER_COLUMNS: &str = "id, organization_id, name, kind, domain, client_id, \
	client_secret, created_by, created_at, updated_at, deleted_at";

const PROVIDER_USER_COLUMNS: &str = "id, organization_id, provider_id, identity_id, email, \
	given_name, family_name, active, created_at, updated_at";

impl OrgTxn {
	#[tracing::instrument(skip(self, provider), fields(provider_id = %provider.id, name = %provider.name))]
	pub async fn create_provider(&mut self, provider: &Provider) -> Result<()> {
		let org_id = self.organization_id.as_i64();
		sqlx::query(
			r#"
			INSERT INTO providers (
				id, organization_id, name, kind, domain, client_id, client_secret,
				created_by, created_at, updated_at
			) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
			"#,
		)
		.bind(provider.id.as_i64())
		.bind(org_id)
		.bind(&provider.name)
		.bind(&provider.kind)
		.bind(&provider.domain)
		.bind(&provider.client_id)
		.bind(&provider.client_secret)
		.bind(provider.created_by)
		.bind(provider.created_at)
		.bind(provider.updated_at)
		.execute(self.conn())
		.await?;

		tracing::debug!("provider created");
		Ok(())
	}

	#[tracing::instrument(skip(self, provider), fields(provider_id = %provider.id))]
	pub async fn update_provider(&mut self, provider: &Provider) -> Result<()> {
		let org_id = self.organization_id.as_i64();
		sqlx::query(
			r#"
			UPDATE providers
			SET kind = $3, domain = $4, client_id = $5, client_secret = $6, updated_at = $7
			WHERE organization_id = $1 AND id = $2 AND deleted_at IS NULL
			"#,
		)
		.bind(org_id)
		.bind(provider.id.as_i64())
		.bind(&provider.kind)
		.bind(&provider.domain)
		.bind(&provider.client_id)
		.bind(&provider.client_secret)
		.bind(Utc::now())
		.execute(self.conn())
		.await?;
		Ok(())
	}

	pub async fn get_provider_by_id(&mut self, id: ProviderId) -> Result<Option<Provider>> {
		let org_id = self.organization_id.as_i64();
		let row = sqlx::query(&format!(
			"SELECT {PROVIDER_COLUMNS} FROM providers \
			 WHERE organization_id = $1 AND id = $2 AND deleted_at IS NULL"
		))
		.bind(org_id)
		.bind(id.as_i64())
		.fetch_optional(self.conn())
		.await?;

		Ok(row.map(|row| parse_provider_row(&row)))
	}

	pub async fn get_provider_by_name(&mut self, name: &str) -> Result<Option<Provider>> {
		let org_id = self.organization_id.as_i64();
		let row = sqlx::query(&format!(
			"SELECT {PROVIDER_COLUMNS} FROM providers \
			 WHERE organization_id = $1 AND name = $2 AND deleted_at IS NULL"
		))
		.bind(org_id)
		.bind(name)
		.fetch_optional(self.conn())
		.await?;

		Ok(row.map(|row| parse_provider_row(&row)))
	}

	/// The built-in provider for local credentials. Created with the
	/// organization; its absence is a data corruption error.
	pub async fn infra_provider(&mut self) -> Result<Provider> {
		self.get_provider_by_name(INFRA_PROVIDER_NAME)
			.await?
			.ok_or_else(|| DbError::Internal("infra provider is missing".to_string()))
	}

	pub async fn list_providers(&mut self) -> Result<Vec<Provider>> {
		let org_id = self.organization_id.as_i64();
		let rows = sqlx::query(&format!(
			"SELECT {PROVIDER_COLUMNS} FROM providers \
			 WHERE organization_id = $1 AND deleted_at IS NULL ORDER BY name"
		))
		.bind(org_id)
		.fetch_all(self.conn())
		.await?;

		Ok(rows.iter().map(parse_provider_row).collect())
	}

	/// Soft-delete every provider not in `keep`. The built-in `infra`
	/// provider is always preserved.
	#[tracing::instrument(skip(self, keep), fields(kept = keep.len()))]
	pub async fn delete_providers_except(&mut self, keep: &[ProviderId]) -> Result<()> {
		let org_id = self.organization_id.as_i64();
		let keep: Vec<i64> = keep.iter().map(|id| id.as_i64()).collect();
		sqlx::query(
			r#"
			UPDATE providers
			SET deleted_at = $3, updated_at = $3
			WHERE organization_id = $1 AND deleted_at IS NULL
			  AND name <> $2
			  AND NOT (id = ANY($4))
			"#,
		)
		.bind(org_id)
		.bind(INFRA_PROVIDER_NAME)
		.bind(Utc::now())
		.bind(&keep)
		.execute(self.conn())
		.await?;
		Ok(())
	}

	/// Ensure a provider-user link exists, updating profile fields when it
	/// already does.
	#[tracing::instrument(skip(self, user), fields(provider_id = %user.provider_id, identity_id = %user.identity_id))]
	pub async fn create_provider_user(&mut self, user: &ProviderUser) -> Result<()> {
		let org_id = self.organization_id.as_i64();
		sqlx::query(
			r#"
			INSERT INTO provider_users (
				id, organization_id, provider_id, identity_id, email, given_name,
				family_name, active, created_at, updated_at
			) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
			ON CONFLICT (provider_id, identity_id) DO UPDATE
			SET email = EXCLUDED.email,
			    given_name = EXCLUDED.given_name,
			    family_name = EXCLUDED.family_name,
			    active = EXCLUDED.active,
			    updated_at = EXCLUDED.updated_at
			"#,
		)
		.bind(user.id)
		.bind(org_id)
		.bind(user.provider_id.as_i64())
		.bind(user.identity_id.as_i64())
		.bind(&user.email)
		.bind(&user.given_name)
		.bind(&user.family_name)
		.bind(user.active)
		.bind(user.created_at)
		.bind(user.updated_at)
		.execute(self.conn())
		.await?;
		Ok(())
	}

	pub async fn get_provider_user(
		&mut self,
		provider_id: ProviderId,
		identity_id: IdentityId,
	) -> Result<Option<ProviderUser>> {
		let org_id = self.organization_id.as_i64();
		let row = sqlx::query(&format!(
			"SELECT {PROVIDER_USER_COLUMNS} FROM provider_users \
			 WHERE organization_id = $1 AND provider_id = $2 AND identity_id = $3"
		))
		.bind(org_id)
		.bind(provider_id.as_i64())
		.bind(identity_id.as_i64())
		.fetch_optional(self.conn())
		.await?;

		Ok(row.map(|row| parse_provider_user_row(&row)))
	}

	/// SCIM-style pagination: returns one page and the total count.
	pub async fn list_provider_users(
		&mut self,
		provider_id: ProviderId,
		limit: i64,
		offset: i64,
	) -> Result<(Vec<ProviderUser>, i64)> {
		let org_id = self.organization_id.as_i64();

		let count_row = sqlx::query(
			"SELECT COUNT(*) AS count FROM provider_users \
			 WHERE organization_id = $1 AND provider_id = $2",
		)
		.bind(org_id)
		.bind(provider_id.as_i64())
		.fetch_one(self.conn())
		.await?;
		let total: i64 = count_row.get("count");

		let rows = sqlx::query(&format!(
			"SELECT {PROVIDER_USER_COLUMNS} FROM provider_users \
			 WHERE organization_id = $1 AND provider_id = $2 \
			 ORDER BY email LIMIT $3 OFFSET $4"
		))
		.bind(org_id)
		.bind(provider_id.as_i64())
		.bind(limit)
		.bind(offset)
		.fetch_all(self.conn())
		.await?;

		Ok((rows.iter().map(parse_provider_user_row).collect(), total))
	}
}

fn parse_provider_row(row: &PgRow) -> Provider {
	Provider {
		id: ProviderId::new(row.get("id")),
		organization_id: infra_server_auth::OrganizationId::new(row.get("organization_id")),
		name: row.get("name"),
		kind: row.get("kind"),
		domain: row.get("domain"),
		client_id: row.get("client_id"),
		client_secret: row.get("client_secret"),
		created_by: row.get("created_by"),
		created_at: row.get("created_at"),
		updated_at: row.get("updated_at"),
		deleted_at: row.get("deleted_at"),
	}
}

fn parse_provider_user_row(row: &PgRow) -> ProviderUser {
	ProviderUser {
		id: row.get("id"),
		organization_id: infra_server_auth::OrganizationId::new(row.get("organization_id")),
		provider_id: ProviderId::new(row.get("provider_id")),
		identity_id: IdentityId::new(row.get("identity_id")),
		email: row.get("email"),
		given_name: row.get("given_name"),
		family_name: row.get("family_name"),
		active: row.get("active"),
		created_at: row.get("created_at"),
		updated_at: row.get("updated_at"),
	}
}
