// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Destination repository.

use chrono::{DateTime, Utc};
use infra_server_auth::DestinationId;
use sqlx::postgres::PgRow;
use sqlx::Row;

use crate::error::Result;
use crate::models::Destination;
use crate::store::OrgTxn;

const DESTINATION_COLUMNS: &str = "id, organization_id, name, unique_id, kind, connection_url, \
	connection_ca, resources, roles, version, last_seen_at, created_at, updated_at, deleted_at";

/// Filters for listing destinations.
#[derive(Debug, Clone, Default)]
pub struct ListDestinationsOptions {
	pub by_name: Option<String>,
	pub by_kind: Option<String>,
	pub by_unique_id: Option<String>,
	pub limit: i64,
	pub offset: i64,
}

impl OrgTxn {
	#[tracing::instrument(skip(self, destination), fields(destination_id = %destination.id, name = %destination.name))]
	pub async fn create_destination(&mut self, destination: &Destination) -> Result<()> {
		let org_id = self.organization_id.as_i64();
		sqlx::query(
			r#"
			INSERT INTO destinations (
				id, organization_id, name, unique_id, kind, connection_url, connection_ca,
				resources, roles, version, last_seen_at, created_at, updated_at
			) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
			"#,
		)
		.bind(destination.id.as_i64())
		.bind(org_id)
		.bind(&destination.name)
		.bind(&destination.unique_id)
		.bind(&destination.kind)
		.bind(&destination.connection_url)
		.bind(&destination.connection_ca)
		.bind(&destination.resources)
		.bind(&destination.roles)
		.bind(&destination.version)
		.bind(destination.last_seen_at)
		.bind(destination.created_at)
		.bind(destination.updated_at)
		.execute(self.conn())
		.await?;

		tracing::debug!("destination created");
		Ok(())
	}

	#[tracing::instrument(skip(self, destination), fields(destination_id = %destination.id))]
	pub async fn update_destination(&mut self, destination: &Destination) -> Result<()> {
		let org_id = self.organization_id.as_i64();
		sqlx::query(
			r#"
			UPDATE destinations
			SET name = $3, unique_id = $4, connection_url = $5, connection_ca = $6,
			    resources = $7, roles = $8, version = $9, updated_at = $10
			WHERE organization_id = $1 AND id = $2 AND deleted_at IS NULL
			"#,
		)
		.bind(org_id)
		.bind(destination.id.as_i64())
		.bind(&destination.name)
		.bind(&destination.unique_id)
		.bind(&destination.connection_url)
		.bind(&destination.connection_ca)
		.bind(&destination.resources)
		.bind(&destination.roles)
		.bind(&destination.version)
		.bind(Utc::now())
		.execute(self.conn())
		.await?;
		Ok(())
	}

	pub async fn get_destination_by_id(
		&mut self,
		id: DestinationId,
	) -> Result<Option<Destination>> {
		let org_id = self.organization_id.as_i64();
		let row = sqlx::query(&format!(
			"SELECT {DESTINATION_COLUMNS} FROM destinations \
			 WHERE organization_id = $1 AND id = $2 AND deleted_at IS NULL"
		))
		.bind(org_id)
		.bind(id.as_i64())
		.fetch_optional(self.conn())
		.await?;

		Ok(row.map(|row| parse_destination_row(&row)))
	}

	pub async fn get_destination_by_name(&mut self, name: &str) -> Result<Option<Destination>> {
		let org_id = self.organization_id.as_i64();
		let row = sqlx::query(&format!(
			"SELECT {DESTINATION_COLUMNS} FROM destinations \
			 WHERE organization_id = $1 AND name = $2 AND deleted_at IS NULL"
		))
		.bind(org_id)
		.bind(name)
		.fetch_optional(self.conn())
		.await?;

		Ok(row.map(|row| parse_destination_row(&row)))
	}

	pub async fn list_destinations(
		&mut self,
		opts: ListDestinationsOptions,
	) -> Result<Vec<Destination>> {
		let org_id = self.organization_id.as_i64();
		let limit = if opts.limit > 0 { opts.limit } else { 100 };
		let rows = sqlx::query(&format!(
			r#"
			SELECT {DESTINATION_COLUMNS} FROM destinations
			WHERE organization_id = $1 AND deleted_at IS NULL
			  AND ($2::text IS NULL OR name = $2)
			  AND ($3::text IS NULL OR kind = $3)
			  AND ($4::text IS NULL OR unique_id = $4)
			ORDER BY name
			LIMIT $5 OFFSET $6
			"#
		))
		.bind(org_id)
		.bind(&opts.by_name)
		.bind(&opts.by_kind)
		.bind(&opts.by_unique_id)
		.bind(limit)
		.bind(opts.offset)
		.fetch_all(self.conn())
		.await?;

		Ok(rows.iter().map(parse_destination_row).collect())
	}

	/// Advance a destination's `last_seen_at` by name or unique id, matching
	/// the connector identification headers. Monotonic.
	#[tracing::instrument(skip(self))]
	pub async fn touch_destination_last_seen(
		&mut self,
		name: Option<&str>,
		unique_id: Option<&str>,
		at: DateTime<Utc>,
	) -> Result<()> {
		if name.is_none() && unique_id.is_none() {
			return Ok(());
		}
		let org_id = self.organization_id.as_i64();
		sqlx::query(
			r#"
			UPDATE destinations
			SET last_seen_at = $4, updated_at = $4
			WHERE organization_id = $1 AND deleted_at IS NULL
			  AND (($2::text IS NOT NULL AND name = $2) OR ($3::text IS NOT NULL AND unique_id = $3))
			  AND (last_seen_at IS NULL OR last_seen_at < $4)
			"#,
		)
		.bind(org_id)
		.bind(name)
		.bind(unique_id)
		.bind(at)
		.execute(self.conn())
		.await?;
		Ok(())
	}

	#[tracing::instrument(skip(self))]
	pub async fn delete_destination(&mut self, id: DestinationId) -> Result<()> {
		let org_id = self.organization_id.as_i64();
		sqlx::query(
			"UPDATE destinations SET deleted_at = $3, updated_at = $3 \
			 WHERE organization_id = $1 AND id = $2 AND deleted_at IS NULL",
		)
		.bind(org_id)
		.bind(id.as_i64())
		.bind(Utc::now())
		.execute(self.conn())
		.await?;

		tracing::info!(destination_id = %id, "destination deleted");
		Ok(())
	}
}

fn parse_destination_row(row: &PgRow) -> Destination {
	Destination {
		id: DestinationId::new(row.get("id")),
		organization_id: infra_server_auth::OrganizationId::new(row.get("organization_id")),
		name: row.get("name"),
		unique_id: row.get("unique_id"),
		kind: row.get("kind"),
		connection_url: row.get("connection_url"),
		connection_ca: row.get("connection_ca"),
		resources: row.get("resources"),
		roles: row.get("roles"),
		version: row.get("version"),
		last_seen_at: row.get("last_seen_at"),
		created_at: row.get("created_at"),
		updated_at: row.get("updated_at"),
		deleted_at: row.get("deleted_at"),
	}
}
