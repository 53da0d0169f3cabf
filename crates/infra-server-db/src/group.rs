// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Group and group-membership repository.
//!
//! Membership writes bump the membership `update_index` (database trigger)
//! and notify the group's `group_membership` channel. Removal is a soft
//! delete so the index survives as a monotonic change marker.

use chrono::Utc;
use infra_server_auth::{GroupId, IdentityId};
use sqlx::postgres::PgRow;
use sqlx::Row;

use crate::error::Result;
use crate::models::Group;
use crate::notify::{self, ChannelDescriptor};
use crate::store::OrgTxn;

const GROUP_COLUMNS: &str = "id, organization_id, name, created_by, created_at, updated_at, deleted_at";

impl OrgTxn {
	#[tracing::instrument(skip(self, group), fields(group_id = %group.id, name = %group.name))]
	pub async fn create_group(&mut self, group: &Group) -> Result<()> {
		let org_id = self.organization_id.as_i64();
		sqlx::query(
			r#"
			INSERT INTO groups (id, organization_id, name, created_by, created_at, updated_at)
			VALUES ($1, $2, $3, $4, $5, $6)
			"#,
		)
		.bind(group.id.as_i64())
		.bind(org_id)
		.bind(&group.name)
		.bind(group.created_by)
		.bind(group.created_at)
		.bind(group.updated_at)
		.execute(self.conn())
		.await?;
		Ok(())
	}

	pub async fn get_group_by_name(&mut self, name: &str) -> Result<Option<Group>> {
		let org_id = self.organization_id.as_i64();
		let row = sqlx::query(&format!(
			"SELECT {GROUP_COLUMNS} FROM groups \
			 WHERE organization_id = $1 AND name = $2 AND deleted_at IS NULL"
		))
		.bind(org_id)
		.bind(name)
		.fetch_optional(self.conn())
		.await?;

		Ok(row.map(|row| parse_group_row(&row)))
	}

	pub async fn get_group_by_id(&mut self, id: GroupId) -> Result<Option<Group>> {
		let org_id = self.organization_id.as_i64();
		let row = sqlx::query(&format!(
			"SELECT {GROUP_COLUMNS} FROM groups \
			 WHERE organization_id = $1 AND id = $2 AND deleted_at IS NULL"
		))
		.bind(org_id)
		.bind(id.as_i64())
		.fetch_optional(self.conn())
		.await?;

		Ok(row.map(|row| parse_group_row(&row)))
	}

	pub async fn list_groups(&mut self, by_name: Option<&str>) -> Result<Vec<Group>> {
		let org_id = self.organization_id.as_i64();
		let rows = sqlx::query(&format!(
			"SELECT {GROUP_COLUMNS} FROM groups \
			 WHERE organization_id = $1 AND deleted_at IS NULL \
			   AND ($2::text IS NULL OR name = $2) \
			 ORDER BY name"
		))
		.bind(org_id)
		.bind(by_name)
		.fetch_all(self.conn())
		.await?;

		Ok(rows.iter().map(parse_group_row).collect())
	}

	/// Add an identity to a group, reviving a soft-deleted membership when
	/// one exists.
	#[tracing::instrument(skip(self))]
	pub async fn add_group_member(
		&mut self,
		group_id: GroupId,
		identity_id: IdentityId,
	) -> Result<()> {
		let org_id = self.organization_id.as_i64();
		let now = Utc::now();

		let revived = sqlx::query(
			r#"
			UPDATE group_memberships
			SET deleted_at = NULL, updated_at = $4
			WHERE organization_id = $1 AND group_id = $2 AND identity_id = $3
			  AND deleted_at IS NOT NULL
			"#,
		)
		.bind(org_id)
		.bind(group_id.as_i64())
		.bind(identity_id.as_i64())
		.bind(now)
		.execute(self.conn())
		.await?;

		if revived.rows_affected() == 0 {
			sqlx::query(
				r#"
				INSERT INTO group_memberships (
					id, organization_id, group_id, identity_id, created_at, updated_at
				) VALUES ($1, $2, $3, $4, $5, $5)
				ON CONFLICT (group_id, identity_id) WHERE deleted_at IS NULL DO NOTHING
				"#,
			)
			.bind(infra_server_auth::snowflake::generate())
			.bind(org_id)
			.bind(group_id.as_i64())
			.bind(identity_id.as_i64())
			.bind(now)
			.execute(self.conn())
			.await?;
		}

		self.notify_group_membership(group_id).await?;
		tracing::debug!(group_id = %group_id, identity_id = %identity_id, "group member added");
		Ok(())
	}

	/// Remove an identity from a group. Soft delete: the membership's
	/// `update_index` is bumped by the update, so watchers see the change.
	#[tracing::instrument(skip(self))]
	pub async fn remove_group_member(
		&mut self,
		group_id: GroupId,
		identity_id: IdentityId,
	) -> Result<()> {
		let org_id = self.organization_id.as_i64();
		sqlx::query(
			r#"
			UPDATE group_memberships
			SET deleted_at = $4, updated_at = $4
			WHERE organization_id = $1 AND group_id = $2 AND identity_id = $3
			  AND deleted_at IS NULL
			"#,
		)
		.bind(org_id)
		.bind(group_id.as_i64())
		.bind(identity_id.as_i64())
		.bind(Utc::now())
		.execute(self.conn())
		.await?;

		self.notify_group_membership(group_id).await?;
		tracing::debug!(group_id = %group_id, identity_id = %identity_id, "group member removed");
		Ok(())
	}

	pub async fn list_group_ids_for_identity(
		&mut self,
		identity_id: IdentityId,
	) -> Result<Vec<GroupId>> {
		let org_id = self.organization_id.as_i64();
		let rows = sqlx::query(
			"SELECT group_id FROM group_memberships \
			 WHERE organization_id = $1 AND identity_id = $2 AND deleted_at IS NULL",
		)
		.bind(org_id)
		.bind(identity_id.as_i64())
		.fetch_all(self.conn())
		.await?;

		Ok(rows
			.iter()
			.map(|row| GroupId::new(row.get("group_id")))
			.collect())
	}

	pub async fn list_group_members(&mut self, group_id: GroupId) -> Result<Vec<IdentityId>> {
		let org_id = self.organization_id.as_i64();
		let rows = sqlx::query(
			"SELECT identity_id FROM group_memberships \
			 WHERE organization_id = $1 AND group_id = $2 AND deleted_at IS NULL",
		)
		.bind(org_id)
		.bind(group_id.as_i64())
		.fetch_all(self.conn())
		.await?;

		Ok(rows
			.iter()
			.map(|row| IdentityId::new(row.get("identity_id")))
			.collect())
	}

	async fn notify_group_membership(&mut self, group_id: GroupId) -> Result<()> {
		let descriptor = ChannelDescriptor::GroupMembership {
			organization_id: self.organization_id,
			group_id,
		};
		notify::notify(self.conn(), &descriptor).await
	}
}

fn parse_group_row(row: &PgRow) -> Group {
	Group {
		id: GroupId::new(row.get("id")),
		organization_id: infra_server_auth::OrganizationId::new(row.get("organization_id")),
		name: row.get("name"),
		created_by: row.get("created_by"),
		created_at: row.get("created_at"),
		updated_at: row.get("updated_at"),
		deleted_at: row.get("deleted_at"),
	}
}
