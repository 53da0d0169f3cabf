// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

#[derive(Debug, thiserror::Error)]
pub enum SecretsError {
	#[error("secret not found: {0}")]
	NotFound(String),

	#[error("duplicate secret configuration for {0:?}, please provide a unique name for this secret configuration")]
	DuplicateName(String),

	#[error("unknown secret provider kind {0:?}")]
	UnknownKind(String),

	#[error("secret provider name {0:?} not found")]
	UnknownProvider(String),

	#[error("invalid secrets configuration: {0}")]
	Validation(String),

	#[error("encryption failed: {0}")]
	Encryption(String),

	#[error("decryption failed: {0}")]
	Decryption(String),

	#[error("invalid key size: expected {expected} bytes, got {actual}")]
	InvalidKeySize { expected: usize, actual: usize },

	#[error("operation not supported by the {0} provider")]
	Unsupported(&'static str),

	#[error("io error: {0}")]
	Io(#[from] std::io::Error),

	#[error("http error: {0}")]
	Http(#[from] reqwest::Error),

	#[error("base64 decode error: {0}")]
	Base64(#[from] base64::DecodeError),

	#[error("internal: {0}")]
	Internal(String),
}

pub type SecretsResult<T> = std::result::Result<T, SecretsError>;
