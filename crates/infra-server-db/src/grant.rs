// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Grant repository.
//!
//! Every grant write bumps the grant `update_index` (database trigger) and
//! emits a notification on the `grantsByDest` channel of the destination its
//! resource resolves to, inside the same transaction.

use chrono::Utc;
use infra_server_auth::{GrantId, GroupId, IdentityId};
use sqlx::postgres::PgRow;
use sqlx::Row;

use crate::error::{DbError, Result};
use crate::models::{Grant, GrantSubject};
use crate::notify::{self, ChannelDescriptor};
use crate::store::OrgTxn;

const GRANT_COLUMNS: &str = "id, organization_id, subject_kind, subject_id, privilege, resource, \
	created_by, update_index, created_at, updated_at, deleted_at";

/// Filters for listing grants. Empty options list every grant in the
/// organization.
#[derive(Debug, Clone, Default)]
pub struct ListGrantsOptions {
	/// Grants whose resource is this destination or one of its
	/// sub-resources.
	pub by_destination: Option<String>,
	pub by_resource: Option<String>,
	pub by_privilege: Option<String>,
	pub by_subject: Option<GrantSubject>,
}

/// Escape `\`, `%`, and `_` so a value can be embedded in a LIKE pattern
/// with `ESCAPE '\'`. Destination names may contain `_`, which would
/// otherwise act as a single-character wildcard and match sub-resources of a
/// different destination.
pub(crate) fn escape_like(value: &str) -> String {
	let mut escaped = String::with_capacity(value.len());
	for c in value.chars() {
		if matches!(c, '\\' | '%' | '_') {
			escaped.push('\\');
		}
		escaped.push(c);
	}
	escaped
}

/// The LIKE pattern matching every sub-resource of a destination.
pub(crate) fn sub_resource_pattern(destination: &str) -> String {
	format!("{}.%", escape_like(destination))
}

impl OrgTxn {
	#[tracing::instrument(skip(self, grant), fields(grant_id = %grant.id, resource = %grant.resource))]
	pub async fn create_grant(&mut self, grant: &Grant) -> Result<()> {
		let org_id = self.organization_id.as_i64();
		sqlx::query(
			r#"
			INSERT INTO grants (
				id, organization_id, subject_kind, subject_id, privilege, resource,
				created_by, created_at, updated_at
			) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
			"#,
		)
		.bind(grant.id.as_i64())
		.bind(org_id)
		.bind(grant.subject.kind())
		.bind(grant.subject.id())
		.bind(&grant.privilege)
		.bind(&grant.resource)
		.bind(grant.created_by)
		.bind(grant.created_at)
		.bind(grant.updated_at)
		.execute(self.conn())
		.await?;

		self.notify_grant_changed(&grant.resource).await?;
		tracing::debug!("grant created");
		Ok(())
	}

	/// Soft-delete a grant. The update bumps the grant's `update_index`, so
	/// readers observe the deletion as an index increase.
	#[tracing::instrument(skip(self))]
	pub async fn delete_grant(&mut self, id: GrantId) -> Result<()> {
		let grant = self
			.get_grant_by_id(id)
			.await?
			.ok_or_else(|| DbError::NotFound(format!("grant {id}")))?;

		let org_id = self.organization_id.as_i64();
		sqlx::query(
			"UPDATE grants SET deleted_at = $3, updated_at = $3 \
			 WHERE organization_id = $1 AND id = $2 AND deleted_at IS NULL",
		)
		.bind(org_id)
		.bind(id.as_i64())
		.bind(Utc::now())
		.execute(self.conn())
		.await?;

		self.notify_grant_changed(&grant.resource).await?;
		tracing::info!(grant_id = %id, resource = %grant.resource, "grant deleted");
		Ok(())
	}

	/// Change a grant's privilege. The update bumps the grant's
	/// `update_index` and notifies the destination channel.
	#[tracing::instrument(skip(self))]
	pub async fn update_grant_privilege(
		&mut self,
		id: GrantId,
		privilege: &str,
	) -> Result<Grant> {
		let mut grant = self
			.get_grant_by_id(id)
			.await?
			.ok_or_else(|| DbError::NotFound(format!("grant {id}")))?;

		sqlx::query(
			"UPDATE grants SET privilege = $3, updated_at = $4 \
			 WHERE organization_id = $1 AND id = $2 AND deleted_at IS NULL",
		)
		.bind(self.organization_id.as_i64())
		.bind(id.as_i64())
		.bind(privilege)
		.bind(Utc::now())
		.execute(self.conn())
		.await?;

		self.notify_grant_changed(&grant.resource).await?;
		grant.privilege = privilege.to_string();
		Ok(grant)
	}

	pub async fn get_grant_by_id(&mut self, id: GrantId) -> Result<Option<Grant>> {
		let org_id = self.organization_id.as_i64();
		let row = sqlx::query(&format!(
			"SELECT {GRANT_COLUMNS} FROM grants \
			 WHERE organization_id = $1 AND id = $2 AND deleted_at IS NULL"
		))
		.bind(org_id)
		.bind(id.as_i64())
		.fetch_optional(self.conn())
		.await?;

		row.map(|row| parse_grant_row(&row)).transpose()
	}

	/// Fetch the grant with this exact binding, if present.
	pub async fn get_grant(
		&mut self,
		subject: GrantSubject,
		privilege: &str,
		resource: &str,
	) -> Result<Option<Grant>> {
		let org_id = self.organization_id.as_i64();
		let row = sqlx::query(&format!(
			"SELECT {GRANT_COLUMNS} FROM grants \
			 WHERE organization_id = $1 AND subject_kind = $2 AND subject_id = $3 \
			   AND privilege = $4 AND resource = $5 AND deleted_at IS NULL"
		))
		.bind(org_id)
		.bind(subject.kind())
		.bind(subject.id())
		.bind(privilege)
		.bind(resource)
		.fetch_optional(self.conn())
		.await?;

		row.map(|row| parse_grant_row(&row)).transpose()
	}

	pub async fn list_grants(&mut self, opts: ListGrantsOptions) -> Result<Vec<Grant>> {
		let org_id = self.organization_id.as_i64();
		let destination_pattern = opts.by_destination.as_deref().map(sub_resource_pattern);
		let rows = sqlx::query(&format!(
			r#"
			SELECT {GRANT_COLUMNS} FROM grants
			WHERE organization_id = $1 AND deleted_at IS NULL
			  AND ($2::text IS NULL OR resource = $2 OR resource LIKE $3::text ESCAPE '\')
			  AND ($4::text IS NULL OR resource = $4)
			  AND ($5::text IS NULL OR privilege = $5)
			  AND ($6::text IS NULL OR subject_kind = $6)
			  AND ($7::bigint IS NULL OR subject_id = $7)
			ORDER BY id
			"#
		))
		.bind(org_id)
		.bind(&opts.by_destination)
		.bind(&destination_pattern)
		.bind(&opts.by_resource)
		.bind(&opts.by_privilege)
		.bind(opts.by_subject.map(|s| s.kind()))
		.bind(opts.by_subject.map(|s| s.id()))
		.fetch_all(self.conn())
		.await?;

		rows.iter().map(parse_grant_row).collect()
	}

	/// True when the identity, directly or through any of its groups, holds
	/// one of `privileges` on the `infra` resource.
	#[tracing::instrument(skip(self, privileges))]
	pub async fn identity_has_infra_privilege(
		&mut self,
		identity_id: IdentityId,
		group_ids: &[GroupId],
		privileges: &[&str],
	) -> Result<bool> {
		let org_id = self.organization_id.as_i64();
		let privileges: Vec<String> = privileges.iter().map(|p| p.to_string()).collect();
		let group_ids: Vec<i64> = group_ids.iter().map(|g| g.as_i64()).collect();

		let row = sqlx::query(
			r#"
			SELECT EXISTS (
				SELECT 1 FROM grants
				WHERE organization_id = $1 AND deleted_at IS NULL
				  AND resource = $2
				  AND privilege = ANY($3)
				  AND (
					(subject_kind = 'identity' AND subject_id = $4)
					OR (subject_kind = 'group' AND subject_id = ANY($5))
				  )
			) AS authorized
			"#,
		)
		.bind(org_id)
		.bind(infra_server_auth::INFRA_RESOURCE)
		.bind(&privileges)
		.bind(identity_id.as_i64())
		.bind(&group_ids)
		.fetch_one(self.conn())
		.await?;

		Ok(row.get("authorized"))
	}

	async fn notify_grant_changed(&mut self, resource: &str) -> Result<()> {
		let Some(destination_name) = Grant::destination_name(resource) else {
			return Ok(());
		};
		let destination_name = destination_name.to_string();
		let Some(destination) = self.get_destination_by_name(&destination_name).await? else {
			// no connector can be listening for a destination that does not
			// exist yet
			return Ok(());
		};

		let descriptor = ChannelDescriptor::GrantsByDestination {
			organization_id: self.organization_id,
			destination_id: destination.id,
		};
		notify::notify(self.conn(), &descriptor).await
	}
}

fn parse_grant_row(row: &PgRow) -> Result<Grant> {
	let subject_kind: String = row.get("subject_kind");
	let subject_id: i64 = row.get("subject_id");
	let subject = GrantSubject::from_parts(&subject_kind, subject_id)
		.ok_or_else(|| DbError::Internal(format!("invalid grant subject kind {subject_kind:?}")))?;

	Ok(Grant {
		id: GrantId::new(row.get("id")),
		organization_id: infra_server_auth::OrganizationId::new(row.get("organization_id")),
		subject,
		privilege: row.get("privilege"),
		resource: row.get("resource"),
		created_by: row.get("created_by"),
		update_index: row.get("update_index"),
		created_at: row.get("created_at"),
		updated_at: row.get("updated_at"),
		deleted_at: row.get("deleted_at"),
	})
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn like_escaping_neutralizes_wildcards() {
		assert_eq!(escape_like("cluster"), "cluster");
		assert_eq!(escape_like("a_b"), "a\\_b");
		assert_eq!(escape_like("100%"), "100\\%");
		assert_eq!(escape_like("a\\b"), "a\\\\b");
	}

	#[test]
	fn sub_resource_pattern_keeps_only_the_trailing_wildcard() {
		assert_eq!(sub_resource_pattern("cluster"), "cluster.%");
		assert_eq!(sub_resource_pattern("a_b"), "a\\_b.%");
	}
}
