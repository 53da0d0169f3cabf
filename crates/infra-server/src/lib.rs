// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! The infra registry server.
//!
//! A centralized identity, access, and policy server. Clients authenticate
//! once with a federated identity or access key; connectors hold blocking
//! list requests open to observe grant changes for their destination with
//! bounded latency.

pub mod access;
pub mod access_keys;
pub mod api;
pub mod blocking;
pub mod bootstrap;
pub mod context;
pub mod error;
pub mod middleware;
pub mod pagination;
pub mod routes;

pub use api::{create_app_state, create_router, AppState};
pub use context::{Authenticated, RequestContext};
pub use error::ServerError;
