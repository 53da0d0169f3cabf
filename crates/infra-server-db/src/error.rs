// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

#[derive(Debug, thiserror::Error)]
pub enum DbError {
	#[error("database error: {0}")]
	Sqlx(sqlx::Error),

	#[error("not found: {0}")]
	NotFound(String),

	#[error("conflict: {0}")]
	Conflict(String),

	#[error("internal: {0}")]
	Internal(String),

	#[error("migration error: {0}")]
	Migrate(#[from] sqlx::migrate::MigrateError),
}

impl DbError {
	/// True for transient serialization/deadlock failures that a caller may
	/// retry (bounded).
	pub fn is_transient(&self) -> bool {
		if let DbError::Sqlx(sqlx::Error::Database(db)) = self {
			if let Some(code) = db.code() {
				// serialization_failure, deadlock_detected
				return code == "40001" || code == "40P01";
			}
		}
		false
	}
}

impl From<sqlx::Error> for DbError {
	fn from(e: sqlx::Error) -> Self {
		if let sqlx::Error::Database(db) = &e {
			if db.is_unique_violation() {
				return DbError::Conflict(db.message().to_string());
			}
		}
		DbError::Sqlx(e)
	}
}

pub type Result<T> = std::result::Result<T, DbError>;
