// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! The destination-access read model: grants expanded to member identities,
//! plus the max update index the long-poll compares against.

use infra_server_auth::IdentityId;
use sqlx::Row;

use crate::error::Result;
use crate::grant::sub_resource_pattern;
use crate::store::OrgTxn;

/// One entry of a destination's access list: a (user, privilege, resource)
/// triple after group expansion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DestinationAccess {
	pub user_id: IdentityId,
	pub user_ssh_login_name: String,
	pub privilege: String,
	pub resource: String,
}

impl OrgTxn {
	/// The full current access list for a destination. Group grants are
	/// expanded to member identities; duplicates collapse to one row per
	/// (user, privilege, resource).
	#[tracing::instrument(skip(self))]
	pub async fn list_destination_access(&mut self, name: &str) -> Result<Vec<DestinationAccess>> {
		let org_id = self.organization_id.as_i64();
		let pattern = sub_resource_pattern(name);
		let rows = sqlx::query(
			r#"
			SELECT i.id AS user_id, i.name AS user_name, g.privilege, g.resource
			FROM grants g
			JOIN identities i
			  ON i.organization_id = g.organization_id
			 AND i.id = g.subject_id
			 AND i.deleted_at IS NULL
			WHERE g.organization_id = $1 AND g.deleted_at IS NULL
			  AND g.subject_kind = 'identity'
			  AND (g.resource = $2 OR g.resource LIKE $3 ESCAPE '\')
			UNION
			SELECT i.id AS user_id, i.name AS user_name, g.privilege, g.resource
			FROM grants g
			JOIN group_memberships gm
			  ON gm.organization_id = g.organization_id
			 AND gm.group_id = g.subject_id
			 AND gm.deleted_at IS NULL
			JOIN identities i
			  ON i.organization_id = g.organization_id
			 AND i.id = gm.identity_id
			 AND i.deleted_at IS NULL
			WHERE g.organization_id = $1 AND g.deleted_at IS NULL
			  AND g.subject_kind = 'group'
			  AND (g.resource = $2 OR g.resource LIKE $3 ESCAPE '\')
			ORDER BY user_id, privilege, resource
			"#,
		)
		.bind(org_id)
		.bind(name)
		.bind(&pattern)
		.fetch_all(self.conn())
		.await?;

		Ok(rows
			.iter()
			.map(|row| {
				let user_name: String = row.get("user_name");
				DestinationAccess {
					user_id: IdentityId::new(row.get("user_id")),
					user_ssh_login_name: ssh_login_name(&user_name),
					privilege: row.get("privilege"),
					resource: row.get("resource"),
				}
			})
			.collect())
	}

	/// Max of the grant and group-membership update indexes visible to this
	/// destination.
	///
	/// Soft-deleted grants are included on purpose: deletion is an update
	/// that bumps the index, which is how watchers observe removals as an
	/// increase.
	#[tracing::instrument(skip(self))]
	pub async fn destination_access_max_update_index(&mut self, name: &str) -> Result<i64> {
		let org_id = self.organization_id.as_i64();
		let pattern = sub_resource_pattern(name);
		let row = sqlx::query(
			r#"
			WITH dest_grants AS (
				SELECT subject_kind, subject_id, update_index
				FROM grants
				WHERE organization_id = $1
				  AND (resource = $2 OR resource LIKE $3 ESCAPE '\')
			)
			SELECT GREATEST(
				COALESCE((SELECT MAX(update_index) FROM dest_grants), 0),
				COALESCE((
					SELECT MAX(gm.update_index)
					FROM group_memberships gm
					WHERE gm.organization_id = $1
					  AND gm.group_id IN (
						SELECT subject_id FROM dest_grants WHERE subject_kind = 'group'
					  )
				), 0)
			) AS max_index
			"#,
		)
		.bind(org_id)
		.bind(name)
		.bind(&pattern)
		.fetch_one(self.conn())
		.await?;

		Ok(row.get("max_index"))
	}
}

fn ssh_login_name(user_name: &str) -> String {
	user_name
		.split('@')
		.next()
		.unwrap_or(user_name)
		.to_ascii_lowercase()
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn ssh_login_name_is_local_part() {
		assert_eq!(ssh_login_name("Alice@example.com"), "alice");
		assert_eq!(ssh_login_name("connector"), "connector");
	}
}
