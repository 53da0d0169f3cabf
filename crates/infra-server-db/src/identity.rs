// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Identity repository.

use chrono::{DateTime, Utc};
use infra_server_auth::{Identity, IdentityId};
use sqlx::postgres::PgRow;
use sqlx::Row;

use crate::error::Result;
use crate::store::OrgTxn;

const IDENTITY_COLUMNS: &str = "id, organization_id, name, created_by, verification_token, \
	last_seen_at, created_at, updated_at, deleted_at";

impl OrgTxn {
	#[tracing::instrument(skip(self, identity), fields(identity_id = %identity.id, name = %identity.name))]
	pub async fn create_identity(&mut self, identity: &Identity) -> Result<()> {
		let org_id = self.organization_id.as_i64();
		sqlx::query(
			r#"
			INSERT INTO identities (
				id, organization_id, name, created_by, verification_token,
				last_seen_at, created_at, updated_at
			) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
			"#,
		)
		.bind(identity.id.as_i64())
		.bind(org_id)
		.bind(&identity.name)
		.bind(identity.created_by)
		.bind(&identity.verification_token)
		.bind(identity.last_seen_at)
		.bind(identity.created_at)
		.bind(identity.updated_at)
		.execute(self.conn())
		.await?;

		tracing::debug!("identity created");
		Ok(())
	}

	pub async fn get_identity_by_id(&mut self, id: IdentityId) -> Result<Option<Identity>> {
		let org_id = self.organization_id.as_i64();
		let row = sqlx::query(&format!(
			"SELECT {IDENTITY_COLUMNS} FROM identities \
			 WHERE organization_id = $1 AND id = $2 AND deleted_at IS NULL"
		))
		.bind(org_id)
		.bind(id.as_i64())
		.fetch_optional(self.conn())
		.await?;

		Ok(row.map(|row| parse_identity_row(&row)))
	}

	pub async fn get_identity_by_name(&mut self, name: &str) -> Result<Option<Identity>> {
		let org_id = self.organization_id.as_i64();
		let row = sqlx::query(&format!(
			"SELECT {IDENTITY_COLUMNS} FROM identities \
			 WHERE organization_id = $1 AND name = $2 AND deleted_at IS NULL"
		))
		.bind(org_id)
		.bind(name)
		.fetch_optional(self.conn())
		.await?;

		Ok(row.map(|row| parse_identity_row(&row)))
	}

	pub async fn list_identities(&mut self, limit: i64, offset: i64) -> Result<Vec<Identity>> {
		let org_id = self.organization_id.as_i64();
		let rows = sqlx::query(&format!(
			"SELECT {IDENTITY_COLUMNS} FROM identities \
			 WHERE organization_id = $1 AND deleted_at IS NULL \
			 ORDER BY name LIMIT $2 OFFSET $3"
		))
		.bind(org_id)
		.bind(limit)
		.bind(offset)
		.fetch_all(self.conn())
		.await?;

		Ok(rows.iter().map(parse_identity_row).collect())
	}

	/// Advance an identity's `last_seen_at`. The column is monotonic: an
	/// older timestamp never overwrites a newer one.
	#[tracing::instrument(skip(self))]
	pub async fn touch_identity_last_seen(
		&mut self,
		id: IdentityId,
		at: DateTime<Utc>,
	) -> Result<()> {
		let org_id = self.organization_id.as_i64();
		sqlx::query(
			r#"
			UPDATE identities
			SET last_seen_at = $3, updated_at = $3
			WHERE organization_id = $1 AND id = $2
			  AND (last_seen_at IS NULL OR last_seen_at < $3)
			"#,
		)
		.bind(org_id)
		.bind(id.as_i64())
		.bind(at)
		.execute(self.conn())
		.await?;
		Ok(())
	}

	/// Soft-delete an identity. Access keys issued for it are revoked in the
	/// same statement batch.
	#[tracing::instrument(skip(self))]
	pub async fn delete_identity(&mut self, id: IdentityId) -> Result<()> {
		let org_id = self.organization_id.as_i64();
		let now = Utc::now();

		sqlx::query(
			"UPDATE identities SET deleted_at = $3, updated_at = $3 \
			 WHERE organization_id = $1 AND id = $2 AND deleted_at IS NULL",
		)
		.bind(org_id)
		.bind(id.as_i64())
		.bind(now)
		.execute(self.conn())
		.await?;

		sqlx::query(
			"UPDATE access_keys SET deleted_at = $3, updated_at = $3 \
			 WHERE organization_id = $1 AND issued_for = $2 AND deleted_at IS NULL",
		)
		.bind(org_id)
		.bind(id.as_i64())
		.bind(now)
		.execute(self.conn())
		.await?;

		tracing::info!(identity_id = %id, "identity deleted");
		Ok(())
	}
}

fn parse_identity_row(row: &PgRow) -> Identity {
	Identity {
		id: IdentityId::new(row.get("id")),
		organization_id: infra_server_auth::OrganizationId::new(row.get("organization_id")),
		name: row.get("name"),
		created_by: row.get("created_by"),
		verification_token: row.get("verification_token"),
		last_seen_at: row.get("last_seen_at"),
		created_at: row.get("created_at"),
		updated_at: row.get("updated_at"),
		deleted_at: row.get("deleted_at"),
	}
}
