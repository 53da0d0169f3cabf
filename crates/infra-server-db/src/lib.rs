// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Postgres persistence and notification bus for the infra registry.
//!
//! - [`Store`] hands out organization-scoped transactions ([`OrgTxn`]); every
//!   entity query is tenant-filtered.
//! - Grant and group-membership writes bump a database-side `update_index`
//!   and emit LISTEN/NOTIFY events on per-destination and per-group channels
//!   ([`notify`]).
//! - Long-polls read their `(items, max_index)` snapshot under REPEATABLE
//!   READ via [`Store::begin_read_only`].

pub mod access_key;
pub mod credential;
pub mod destination;
pub mod destination_access;
pub mod error;
pub mod grant;
pub mod group;
pub mod identity;
pub mod models;
pub mod notify;
pub mod pool;
pub mod provider;
pub mod store;

pub use destination::ListDestinationsOptions;
pub use destination_access::DestinationAccess;
pub use error::{DbError, Result};
pub use grant::ListGrantsOptions;
pub use models::{
	Credential, Destination, Grant, GrantSubject, Group, Organization, Provider, ProviderUser,
	INFRA_PROVIDER_NAME,
};
pub use notify::{ChannelDescriptor, Listener};
pub use pool::{create_pool, run_migrations};
pub use store::{OrgTxn, Store};
