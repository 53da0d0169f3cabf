// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Authentication behavior configuration.

use serde::Deserialize;

/// Authentication configuration (runtime, fully resolved).
#[derive(Debug, Clone)]
pub struct AuthConfig {
	/// Absolute lifetime of login-issued access keys, in seconds.
	pub session_duration_secs: u64,
	/// Inactivity extension added on activity, in seconds. Zero disables the
	/// sliding deadline.
	pub session_inactivity_extension_secs: u64,
	/// Whether organization signup is enabled. When disabled the server runs
	/// single-tenant against the default organization.
	pub signups_enabled: bool,
}

impl Default for AuthConfig {
	fn default() -> Self {
		Self {
			session_duration_secs: 12 * 60 * 60,
			session_inactivity_extension_secs: 3 * 24 * 60 * 60,
			signups_enabled: false,
		}
	}
}

/// Authentication configuration layer (partial, for merging).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AuthConfigLayer {
	#[serde(default)]
	pub session_duration_secs: Option<u64>,
	#[serde(default)]
	pub session_inactivity_extension_secs: Option<u64>,
	#[serde(default)]
	pub signups_enabled: Option<bool>,
}

impl AuthConfigLayer {
	pub fn merge(&mut self, other: AuthConfigLayer) {
		if other.session_duration_secs.is_some() {
			self.session_duration_secs = other.session_duration_secs;
		}
		if other.session_inactivity_extension_secs.is_some() {
			self.session_inactivity_extension_secs = other.session_inactivity_extension_secs;
		}
		if other.signups_enabled.is_some() {
			self.signups_enabled = other.signups_enabled;
		}
	}

	pub fn finalize(self) -> AuthConfig {
		let defaults = AuthConfig::default();
		AuthConfig {
			session_duration_secs: self
				.session_duration_secs
				.unwrap_or(defaults.session_duration_secs),
			session_inactivity_extension_secs: self
				.session_inactivity_extension_secs
				.unwrap_or(defaults.session_inactivity_extension_secs),
			signups_enabled: self.signups_enabled.unwrap_or(defaults.signups_enabled),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn defaults_are_single_tenant() {
		let config = AuthConfigLayer::default().finalize();
		assert!(!config.signups_enabled);
		assert_eq!(config.session_duration_secs, 43_200);
	}
}
