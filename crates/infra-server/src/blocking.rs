// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Long-poll machinery for the blocking list endpoints.
//!
//! A blocking request carries the client's last observed update index. The
//! server answers immediately when it is ahead; otherwise it parks on the
//! notification bus until something changes or the deadline passes:
//!
//! ```text
//! READY → (index > client?) → RETURN_NEW
//!     ↓ else
//! LISTEN → wait for notification
//!     ├─ notify  → RECOMPUTE → RETURN_NEW
//!     ├─ timeout → 304 not-modified
//!     └─ cancel  → detached listener release
//! ```
//!
//! Notifications can arrive out of order relative to commits, so the
//! snapshot is always recomputed after a wake-up; correctness is carried by
//! the update index, never by the notification itself.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use infra_server_auth::Role;
use infra_server_db::{ChannelDescriptor, GrantSubject, Listener, ListGrantsOptions, OrgTxn};

use crate::access::is_authorized;
use crate::api::AppState;
use crate::context::RequestContext;
use crate::error::{Result, ServerError};

/// Hard ceiling on how long one blocking request may park, to prevent
/// connection hoarding.
pub const LONG_POLL_MAX_WAIT: Duration = Duration::from_secs(5 * 60);

/// Roles allowed to watch access and grant changes.
pub const WATCH_ROLES: &[Role] = &[Role::Admin, Role::View, Role::Connector];

/// A snapshot computation: given a fresh transaction and the destination
/// name, produce the items and the max update index they reflect.
pub type SnapshotFn<T> = for<'a> fn(
	&'a mut OrgTxn,
	&'a str,
) -> Pin<Box<dyn Future<Output = Result<(T, i64)>> + Send + 'a>>;

/// Serve a blocking list request for one destination.
///
/// `wait` is already bounded by [`LONG_POLL_MAX_WAIT`] by the caller. The
/// snapshot runs under a REPEATABLE READ, READ ONLY transaction so the items
/// and index are mutually consistent.
pub async fn list_with_long_poll<T>(
	state: &AppState,
	ctx: &RequestContext,
	destination_name: &str,
	last_update_index: i64,
	wait: Duration,
	snapshot: SnapshotFn<T>,
) -> Result<(T, i64)> {
	let org = ctx.organization().id;

	// resolve the destination and the groups whose membership feeds its
	// access list, then close the transaction: no locks may be held while
	// parked
	let mut txn = state.store.begin(org).await?;
	is_authorized(&mut txn, ctx, "watch access", WATCH_ROLES).await?;

	let destination = txn
		.get_destination_by_name(destination_name)
		.await?
		.ok_or_else(|| ServerError::NotFound(format!("destination {destination_name:?}")))?;

	let grants = txn
		.list_grants(ListGrantsOptions {
			by_destination: Some(destination_name.to_string()),
			..Default::default()
		})
		.await?;
	txn.rollback().await?;

	let mut channels = vec![ChannelDescriptor::GrantsByDestination {
		organization_id: org,
		destination_id: destination.id,
	}];
	for grant in &grants {
		if let GrantSubject::Group(group_id) = grant.subject {
			channels.push(ChannelDescriptor::GroupMembership {
				organization_id: org,
				group_id,
			});
		}
	}

	let mut listener = ListenerGuard::open(state, &channels).await?;

	let (items, max_index) = read_snapshot(state, ctx, destination_name, snapshot).await?;
	if max_index > last_update_index {
		listener.release().await;
		return Ok((items, max_index));
	}

	match tokio::time::timeout(wait, listener.wait()).await {
		Ok(Ok(())) => {}
		Ok(Err(e)) => {
			listener.release().await;
			return Err(e);
		}
		Err(_elapsed) => {
			listener.release().await;
			return Err(ServerError::NotModified);
		}
	}

	let result = read_snapshot(state, ctx, destination_name, snapshot).await;
	listener.release().await;
	result
}

/// Attempts per snapshot read before a transient conflict is surfaced.
const SNAPSHOT_RETRIES: u32 = 3;

async fn read_snapshot<T>(
	state: &AppState,
	ctx: &RequestContext,
	destination_name: &str,
	snapshot: SnapshotFn<T>,
) -> Result<(T, i64)> {
	let mut attempt = 0;
	loop {
		let mut txn = state.store.begin_read_only(ctx.organization().id).await?;
		let result = snapshot(&mut txn, destination_name).await;
		txn.rollback().await?;

		match result {
			Err(ServerError::TransientDb(detail)) if attempt + 1 < SNAPSHOT_RETRIES => {
				attempt += 1;
				tracing::debug!(attempt, error = %detail, "retrying snapshot after transient conflict");
			}
			other => return other,
		}
	}
}

/// Owns the LISTEN connection and guarantees release on every exit path:
/// explicit release on the normal paths, and a detached release task when
/// the request future is dropped (client disconnect, cancellation).
struct ListenerGuard {
	inner: Option<Listener>,
}

impl ListenerGuard {
	async fn open(state: &AppState, channels: &[ChannelDescriptor]) -> Result<Self> {
		let listener = Listener::open(state.store.pool(), channels)
			.await
			.map_err(|e| ServerError::Internal(format!("listen for notify: {e}")))?;
		Ok(Self {
			inner: Some(listener),
		})
	}

	async fn wait(&mut self) -> Result<()> {
		let listener = self
			.inner
			.as_mut()
			.ok_or_else(|| ServerError::Internal("listener already released".to_string()))?;
		listener
			.wait_for_notification()
			.await
			.map_err(|e| ServerError::Internal(format!("waiting for notify: {e}")))
	}

	async fn release(&mut self) {
		if let Some(listener) = self.inner.take() {
			listener.release().await;
		}
	}
}

impl Drop for ListenerGuard {
	fn drop(&mut self) {
		if let Some(listener) = self.inner.take() {
			// the request context is gone; release with its own deadline
			match tokio::runtime::Handle::try_current() {
				Ok(handle) => {
					handle.spawn(listener.release());
				}
				Err(_) => {
					tracing::warn!("dropping listener connection outside the runtime");
				}
			}
		}
	}
}

/// Clamp a client-requested wait to the server ceiling.
pub fn bounded_wait(timeout_secs: Option<u64>) -> Duration {
	match timeout_secs {
		Some(secs) => Duration::from_secs(secs).min(LONG_POLL_MAX_WAIT),
		None => LONG_POLL_MAX_WAIT,
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn wait_is_clamped_to_ceiling() {
		assert_eq!(bounded_wait(None), LONG_POLL_MAX_WAIT);
		assert_eq!(bounded_wait(Some(1)), Duration::from_secs(1));
		assert_eq!(bounded_wait(Some(86_400)), LONG_POLL_MAX_WAIT);
	}
}
