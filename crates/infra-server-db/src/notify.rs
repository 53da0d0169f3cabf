// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! The notification bus: Postgres LISTEN/NOTIFY on named channels.
//!
//! Channels carry no payload a reader may rely on; they only signal "something
//! changed, re-read". Correctness is carried by the `update_index` columns.

use std::time::Duration;

use infra_server_auth::{DestinationId, GroupId, OrganizationId};
use sqlx::postgres::{PgConnection, PgListener, PgPool};

use crate::error::Result;

/// Cap on how long a release may take once the request context is gone.
const RELEASE_DEADLINE: Duration = Duration::from_secs(60);

/// A named notification channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelDescriptor {
	/// Grant changes affecting one destination.
	GrantsByDestination {
		organization_id: OrganizationId,
		destination_id: DestinationId,
	},
	/// A connector credential request for a destination.
	DestinationCredentialsByDestination {
		organization_id: OrganizationId,
		destination_id: DestinationId,
	},
	/// The response to one connector credential request.
	DestinationCredentialsById {
		organization_id: OrganizationId,
		credential_request_id: i64,
	},
	/// Membership changes of one group.
	GroupMembership {
		organization_id: OrganizationId,
		group_id: GroupId,
	},
}

impl ChannelDescriptor {
	/// Render the channel name sent to LISTEN/NOTIFY.
	pub fn channel(&self) -> String {
		match self {
			ChannelDescriptor::GrantsByDestination {
				organization_id,
				destination_id,
			} => format!("grantsByDest.{organization_id}.{destination_id}"),
			ChannelDescriptor::DestinationCredentialsByDestination {
				organization_id,
				destination_id,
			} => format!("dcredReq.{organization_id}.{destination_id}"),
			ChannelDescriptor::DestinationCredentialsById {
				organization_id,
				credential_request_id,
			} => format!("dcredResp.{organization_id}.{credential_request_id}"),
			ChannelDescriptor::GroupMembership {
				organization_id,
				group_id,
			} => format!("group_membership.{organization_id}.{group_id}"),
		}
	}
}

/// Emit a notification on a channel, inside the caller's transaction so it is
/// delivered on commit.
pub async fn notify(conn: &mut PgConnection, descriptor: &ChannelDescriptor) -> Result<()> {
	sqlx::query("SELECT pg_notify($1, '')")
		.bind(descriptor.channel())
		.execute(conn)
		.await?;
	Ok(())
}

/// A dedicated connection listening on a set of channels.
///
/// The connection is drawn from the pool; callers must call
/// [`Listener::release`] on every exit path to return it.
pub struct Listener {
	inner: PgListener,
	channels: Vec<String>,
}

impl Listener {
	/// Acquire a connection and LISTEN on each descriptor's channel.
	#[tracing::instrument(skip(pool, descriptors), fields(channels = descriptors.len()))]
	pub async fn open(pool: &PgPool, descriptors: &[ChannelDescriptor]) -> Result<Self> {
		let mut inner = PgListener::connect_with(pool).await?;
		let channels: Vec<String> = descriptors.iter().map(|d| d.channel()).collect();
		for channel in &channels {
			inner.listen(channel).await?;
		}
		Ok(Self { inner, channels })
	}

	/// Block until any listened channel receives a notification.
	///
	/// Callers bound this with their request context
	/// (`tokio::time::timeout`); the notification payload is discarded.
	pub async fn wait_for_notification(&mut self) -> Result<()> {
		self.inner.recv().await?;
		Ok(())
	}

	/// UNLISTEN everything and return the connection to the pool.
	///
	/// Bounded by a detached deadline so shutdown stays bounded even when the
	/// request context has already fired. Failures are logged, not returned.
	pub async fn release(mut self) {
		match tokio::time::timeout(RELEASE_DEADLINE, self.inner.unlisten_all()).await {
			Ok(Ok(())) => {
				tracing::debug!(channels = self.channels.len(), "released listener");
			}
			Ok(Err(e)) => {
				tracing::error!(error = %e, "failed to unlisten notification channels");
			}
			Err(_) => {
				tracing::error!("timed out releasing listener connection");
			}
		}
		// dropping the PgListener returns the connection to the pool
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn channel_names_render_with_org_and_entity_ids() {
		let org = OrganizationId::new(100);
		assert_eq!(
			ChannelDescriptor::GrantsByDestination {
				organization_id: org,
				destination_id: DestinationId::new(7),
			}
			.channel(),
			"grantsByDest.100.7"
		);
		assert_eq!(
			ChannelDescriptor::DestinationCredentialsByDestination {
				organization_id: org,
				destination_id: DestinationId::new(7),
			}
			.channel(),
			"dcredReq.100.7"
		);
		assert_eq!(
			ChannelDescriptor::DestinationCredentialsById {
				organization_id: org,
				credential_request_id: 42,
			}
			.channel(),
			"dcredResp.100.42"
		);
		assert_eq!(
			ChannelDescriptor::GroupMembership {
				organization_id: org,
				group_id: GroupId::new(3),
			}
			.channel(),
			"group_membership.100.3"
		);
	}

	#[test]
	fn channels_for_different_tenants_are_distinct() {
		let a = ChannelDescriptor::GrantsByDestination {
			organization_id: OrganizationId::new(1),
			destination_id: DestinationId::new(7),
		};
		let b = ChannelDescriptor::GrantsByDestination {
			organization_id: OrganizationId::new(2),
			destination_id: DestinationId::new(7),
		};
		assert_ne!(a.channel(), b.channel());
	}
}
