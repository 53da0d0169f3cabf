// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use sqlx::postgres::{PgPool, PgPoolOptions};

use crate::error::{DbError, Result};

/// Create a Postgres pool with common settings.
///
/// One extra connection beyond `max_connections` is not reserved for
/// listeners; long-polls draw their LISTEN connection from the same pool and
/// return it on release.
#[tracing::instrument(skip(database_url))]
pub async fn create_pool(database_url: &str, max_connections: u32) -> Result<PgPool> {
	let pool = PgPoolOptions::new()
		.max_connections(max_connections)
		.connect(database_url)
		.await
		.map_err(DbError::Sqlx)?;

	tracing::debug!("database pool created");
	Ok(pool)
}

/// Run embedded migrations.
pub async fn run_migrations(pool: &PgPool) -> Result<()> {
	sqlx::migrate!("./migrations").run(pool).await?;
	tracing::debug!("database migrations applied");
	Ok(())
}
