// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
	#[error("failed to read config file {path}: {source}")]
	Read {
		path: String,
		source: std::io::Error,
	},

	#[error("failed to parse config file {path}: {source}")]
	Parse {
		path: String,
		source: toml::de::Error,
	},

	#[error("invalid environment value for {key}: {message}")]
	Env { key: String, message: String },

	#[error("invalid configuration: {0}")]
	Validation(String),
}
