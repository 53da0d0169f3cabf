// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! The server error type and its HTTP mapping.
//!
//! Error kinds are stable across the API boundary:
//!
//! | kind              | status |
//! |-------------------|--------|
//! | not-found         | 404    |
//! | not-authenticated | 401    |
//! | not-authorized    | 403    |
//! | bad-request       | 400    |
//! | not-modified      | 304    |
//! | conflict          | 409    |
//! | internal          | 500    |

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use infra_server_auth::password::ValidationError;
use serde::Serialize;

use infra_server_db::DbError;
use infra_server_secrets::SecretsError;

#[derive(Debug, thiserror::Error)]
pub enum ServerError {
	#[error("{0}")]
	NotFound(String),

	#[error("{0}")]
	NotAuthenticated(String),

	#[error("{subject} is not authorized to {action}, requires role {required:?}")]
	NotAuthorized {
		subject: String,
		action: String,
		required: Vec<String>,
	},

	#[error("{0}")]
	BadRequest(String),

	#[error("{0}")]
	Validation(ValidationError),

	#[error("{0}")]
	Conflict(String),

	/// Long-poll deadline reached with no change; HTTP 304.
	#[error("not modified")]
	NotModified,

	/// A serialization or deadlock failure the caller may retry (bounded).
	#[error("transient database conflict: {0}")]
	TransientDb(String),

	#[error("internal error: {0}")]
	Internal(String),
}

impl ServerError {
	fn kind(&self) -> &'static str {
		match self {
			ServerError::NotFound(_) => "not-found",
			ServerError::NotAuthenticated(_) => "not-authenticated",
			ServerError::NotAuthorized { .. } => "not-authorized",
			ServerError::BadRequest(_) | ServerError::Validation(_) => "bad-request",
			ServerError::Conflict(_) => "conflict",
			ServerError::NotModified => "not-modified",
			ServerError::TransientDb(_) | ServerError::Internal(_) => "internal",
		}
	}

	fn status(&self) -> StatusCode {
		match self {
			ServerError::NotFound(_) => StatusCode::NOT_FOUND,
			ServerError::NotAuthenticated(_) => StatusCode::UNAUTHORIZED,
			ServerError::NotAuthorized { .. } => StatusCode::FORBIDDEN,
			ServerError::BadRequest(_) | ServerError::Validation(_) => StatusCode::BAD_REQUEST,
			ServerError::Conflict(_) => StatusCode::CONFLICT,
			ServerError::NotModified => StatusCode::NOT_MODIFIED,
			ServerError::TransientDb(_) | ServerError::Internal(_) => {
				StatusCode::INTERNAL_SERVER_ERROR
			}
		}
	}
}

#[derive(Debug, Serialize)]
struct ErrorBody {
	error: &'static str,
	message: String,
	#[serde(skip_serializing_if = "Option::is_none")]
	fields: Option<ValidationError>,
}

impl IntoResponse for ServerError {
	fn into_response(self) -> Response {
		match &self {
			ServerError::NotModified => StatusCode::NOT_MODIFIED.into_response(),
			ServerError::TransientDb(detail) | ServerError::Internal(detail) => {
				// log the detail with a correlation id; the caller only sees
				// a generic message
				let correlation_id = infra_server_auth::access_key::random_alphanumeric(12);
				tracing::error!(correlation_id = %correlation_id, error = %detail, "internal server error");
				let body = ErrorBody {
					error: self.kind(),
					message: format!("internal error (id {correlation_id})"),
					fields: None,
				};
				(self.status(), Json(body)).into_response()
			}
			ServerError::Validation(validation) => {
				let body = ErrorBody {
					error: self.kind(),
					message: self.to_string(),
					fields: Some(validation.clone()),
				};
				(self.status(), Json(body)).into_response()
			}
			_ => {
				let body = ErrorBody {
					error: self.kind(),
					message: self.to_string(),
					fields: None,
				};
				(self.status(), Json(body)).into_response()
			}
		}
	}
}

impl From<DbError> for ServerError {
	fn from(e: DbError) -> Self {
		match e {
			DbError::NotFound(what) => ServerError::NotFound(what),
			DbError::Conflict(what) => ServerError::Conflict(what),
			other if other.is_transient() => ServerError::TransientDb(other.to_string()),
			other => ServerError::Internal(other.to_string()),
		}
	}
}

impl From<SecretsError> for ServerError {
	fn from(e: SecretsError) -> Self {
		ServerError::Internal(e.to_string())
	}
}

impl From<bcrypt::BcryptError> for ServerError {
	fn from(e: bcrypt::BcryptError) -> Self {
		ServerError::Internal(format!("bcrypt: {e}"))
	}
}

impl From<ValidationError> for ServerError {
	fn from(e: ValidationError) -> Self {
		ServerError::Validation(e)
	}
}

pub type Result<T> = std::result::Result<T, ServerError>;

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn kinds_map_to_statuses() {
		assert_eq!(ServerError::NotFound("x".into()).status(), StatusCode::NOT_FOUND);
		assert_eq!(
			ServerError::NotAuthenticated("x".into()).status(),
			StatusCode::UNAUTHORIZED
		);
		assert_eq!(
			ServerError::NotAuthorized {
				subject: "alice".into(),
				action: "list".into(),
				required: vec!["admin".into()],
			}
			.status(),
			StatusCode::FORBIDDEN
		);
		assert_eq!(ServerError::BadRequest("x".into()).status(), StatusCode::BAD_REQUEST);
		assert_eq!(ServerError::Conflict("x".into()).status(), StatusCode::CONFLICT);
		assert_eq!(ServerError::NotModified.status(), StatusCode::NOT_MODIFIED);
		assert_eq!(
			ServerError::Internal("x".into()).status(),
			StatusCode::INTERNAL_SERVER_ERROR
		);
	}

	#[test]
	fn not_authorized_message_names_subject_and_roles() {
		let err = ServerError::NotAuthorized {
			subject: "alice@example.com".into(),
			action: "create grants".into(),
			required: vec!["admin".into()],
		};
		let message = err.to_string();
		assert!(message.contains("alice@example.com"));
		assert!(message.contains("create grants"));
		assert!(message.contains("admin"));
	}

	#[test]
	fn db_not_found_maps_to_not_found() {
		let err: ServerError = DbError::NotFound("grant 1".into()).into();
		assert!(matches!(err, ServerError::NotFound(_)));
	}
}
