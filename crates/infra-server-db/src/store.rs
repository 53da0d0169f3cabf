// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! The store and its organization-scoped transactions.
//!
//! All entity queries go through an [`OrgTxn`], which applies the tenant
//! filter automatically. Only organization lookup and creation run unscoped,
//! on the [`Store`] itself.

use chrono::Utc;
use infra_server_auth::identity::{generate_verification_token, INTERNAL_CONNECTOR_IDENTITY_NAME};
use infra_server_auth::{IdentityId, OrganizationId, ProviderId, CREATED_BY_SYSTEM};
use sqlx::postgres::{PgConnection, PgPool, PgRow};
use sqlx::Row;

use crate::error::Result;
use crate::models::{Organization, INFRA_PROVIDER_NAME};

/// Handle to the database pool.
#[derive(Clone)]
pub struct Store {
	pool: PgPool,
}

impl Store {
	pub fn new(pool: PgPool) -> Self {
		Self { pool }
	}

	/// The underlying pool, for listeners and health checks.
	pub fn pool(&self) -> &PgPool {
		&self.pool
	}

	/// Begin a read-write transaction scoped to an organization.
	pub async fn begin(&self, organization_id: OrganizationId) -> Result<OrgTxn> {
		let tx = self.pool.begin().await?;
		Ok(OrgTxn {
			tx,
			organization_id,
		})
	}

	/// Begin a REPEATABLE READ, READ ONLY transaction scoped to an
	/// organization. Used for consistent long-poll snapshots.
	pub async fn begin_read_only(&self, organization_id: OrganizationId) -> Result<OrgTxn> {
		let mut tx = self.pool.begin().await?;
		sqlx::query("SET TRANSACTION ISOLATION LEVEL REPEATABLE READ READ ONLY")
			.execute(&mut *tx)
			.await?;
		Ok(OrgTxn {
			tx,
			organization_id,
		})
	}

	/// Look up an organization by its domain label.
	#[tracing::instrument(skip(self))]
	pub async fn get_organization_by_domain(&self, domain: &str) -> Result<Option<Organization>> {
		let row = sqlx::query(
			r#"
			SELECT id, name, domain, created_at, updated_at, deleted_at
			FROM organizations
			WHERE domain = $1 AND deleted_at IS NULL
			"#,
		)
		.bind(domain)
		.fetch_optional(&self.pool)
		.await?;

		Ok(row.map(|row| parse_organization_row(&row)))
	}

	/// Fetch the default organization, creating it when the database is
	/// empty. The default organization is the oldest one.
	#[tracing::instrument(skip(self))]
	pub async fn ensure_default_organization(
		&self,
		name: &str,
		domain: &str,
	) -> Result<Organization> {
		let existing = sqlx::query(
			r#"
			SELECT id, name, domain, created_at, updated_at, deleted_at
			FROM organizations
			WHERE deleted_at IS NULL
			ORDER BY id
			LIMIT 1
			"#,
		)
		.fetch_optional(&self.pool)
		.await?;

		if let Some(row) = existing {
			return Ok(parse_organization_row(&row));
		}

		let now = Utc::now();
		let org = Organization {
			id: OrganizationId::generate(),
			name: name.to_string(),
			domain: domain.to_string(),
			created_at: now,
			updated_at: now,
			deleted_at: None,
		};

		let mut tx = self.pool.begin().await?;
		sqlx::query(
			r#"
			INSERT INTO organizations (id, name, domain, created_at, updated_at)
			VALUES ($1, $2, $3, $4, $5)
			"#,
		)
		.bind(org.id.as_i64())
		.bind(&org.name)
		.bind(&org.domain)
		.bind(org.created_at)
		.bind(org.updated_at)
		.execute(&mut *tx)
		.await?;

		// every organization gets the built-in infra provider and the
		// reserved connector identity
		sqlx::query(
			r#"
			INSERT INTO providers (id, organization_id, name, kind, created_by, created_at, updated_at)
			VALUES ($1, $2, $3, $3, $4, $5, $5)
			"#,
		)
		.bind(ProviderId::generate().as_i64())
		.bind(org.id.as_i64())
		.bind(INFRA_PROVIDER_NAME)
		.bind(CREATED_BY_SYSTEM)
		.bind(now)
		.execute(&mut *tx)
		.await?;

		sqlx::query(
			r#"
			INSERT INTO identities (id, organization_id, name, created_by, verification_token, created_at, updated_at)
			VALUES ($1, $2, $3, $4, $5, $6, $6)
			"#,
		)
		.bind(IdentityId::generate().as_i64())
		.bind(org.id.as_i64())
		.bind(INTERNAL_CONNECTOR_IDENTITY_NAME)
		.bind(CREATED_BY_SYSTEM)
		.bind(generate_verification_token())
		.bind(now)
		.execute(&mut *tx)
		.await?;

		tx.commit().await?;
		tracing::info!(org_id = %org.id, domain = %org.domain, "created default organization");
		Ok(org)
	}

	/// Change an organization's domain (bootstrap reconciliation).
	#[tracing::instrument(skip(self))]
	pub async fn update_organization_domain(
		&self,
		organization_id: OrganizationId,
		domain: &str,
	) -> Result<()> {
		sqlx::query(
			"UPDATE organizations SET domain = $2, updated_at = $3 \
			 WHERE id = $1 AND deleted_at IS NULL",
		)
		.bind(organization_id.as_i64())
		.bind(domain)
		.bind(Utc::now())
		.execute(&self.pool)
		.await?;
		Ok(())
	}
}

/// A transaction scoped to one organization. Every query made through this
/// type filters by the organization id.
pub struct OrgTxn {
	pub(crate) tx: sqlx::Transaction<'static, sqlx::Postgres>,
	pub(crate) organization_id: OrganizationId,
}

impl OrgTxn {
	pub fn organization_id(&self) -> OrganizationId {
		self.organization_id
	}

	pub(crate) fn conn(&mut self) -> &mut PgConnection {
		&mut self.tx
	}

	pub async fn commit(self) -> Result<()> {
		self.tx.commit().await?;
		Ok(())
	}

	pub async fn rollback(self) -> Result<()> {
		self.tx.rollback().await?;
		Ok(())
	}
}

fn parse_organization_row(row: &PgRow) -> Organization {
	Organization {
		id: OrganizationId::new(row.get("id")),
		name: row.get("name"),
		domain: row.get("domain"),
		created_at: row.get("created_at"),
		updated_at: row.get("updated_at"),
		deleted_at: row.get("deleted_at"),
	}
}
