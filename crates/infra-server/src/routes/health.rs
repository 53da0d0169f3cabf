// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Liveness endpoint.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::Serialize;

use crate::api::AppState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
	pub status: &'static str,
	pub version: &'static str,
}

/// GET /healthz - database-backed liveness check.
pub async fn healthz(State(state): State<AppState>) -> impl IntoResponse {
	match sqlx::query("SELECT 1").execute(state.store.pool()).await {
		Ok(_) => (
			StatusCode::OK,
			Json(HealthResponse {
				status: "ok",
				version: env!("CARGO_PKG_VERSION"),
			}),
		),
		Err(e) => {
			tracing::error!(error = %e, "health check failed");
			(
				StatusCode::SERVICE_UNAVAILABLE,
				Json(HealthResponse {
					status: "unavailable",
					version: env!("CARGO_PKG_VERSION"),
				}),
			)
		}
	}
}
