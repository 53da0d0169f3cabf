// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Password requirement validation.
//!
//! Failures are field-keyed so the API can return them as
//! `{"password": ["must be at least 8 characters"]}`.

use std::collections::BTreeMap;
use std::fmt;

/// The service name; passwords may not contain it.
const SERVICE_NAME: &str = "infra";

/// Minimum password length.
const MIN_PASSWORD_LENGTH: usize = 8;

/// Longest allowed run of identical or consecutive characters.
const MAX_RUN: usize = 3;

/// Field-keyed validation failures.
#[derive(Debug, Clone, PartialEq, Eq, Default, serde::Serialize)]
#[serde(transparent)]
pub struct ValidationError {
	pub fields: BTreeMap<String, Vec<String>>,
}

impl ValidationError {
	/// A single failure on one field.
	pub fn single(field: impl Into<String>, message: impl Into<String>) -> Self {
		let mut fields = BTreeMap::new();
		fields.insert(field.into(), vec![message.into()]);
		Self { fields }
	}

	/// Append a failure to a field.
	pub fn push(&mut self, field: impl Into<String>, message: impl Into<String>) {
		self.fields.entry(field.into()).or_default().push(message.into());
	}

	pub fn is_empty(&self) -> bool {
		self.fields.is_empty()
	}
}

impl fmt::Display for ValidationError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let mut first = true;
		for (field, messages) in &self.fields {
			for message in messages {
				if !first {
					write!(f, ", ")?;
				}
				write!(f, "{field}: {message}")?;
				first = false;
			}
		}
		Ok(())
	}
}

impl std::error::Error for ValidationError {}

/// Validate a new password for a user.
///
/// Rules: minimum length 8, must not contain the user name or the service
/// name, no run of 4+ identical characters, no run of 4+ consecutive
/// code points.
pub fn check_password_requirements(user: &str, password: &str) -> Result<(), ValidationError> {
	if password.len() < MIN_PASSWORD_LENGTH {
		return Err(ValidationError::single(
			"password",
			"must be at least 8 characters",
		));
	}

	if !user.is_empty() && password.contains(user) {
		return Err(ValidationError::single(
			"password",
			"cannot contain user name",
		));
	}

	if password.contains(SERVICE_NAME) {
		return Err(ValidationError::single(
			"password",
			"cannot contain common names such as the name of the service",
		));
	}

	if has_sequence(password) {
		return Err(ValidationError::single(
			"password",
			"must not have common sequences of characters",
		));
	}

	if has_repeat(password) {
		return Err(ValidationError::single(
			"password",
			"must not have repeating characters",
		));
	}

	Ok(())
}

fn has_repeat(password: &str) -> bool {
	longest_run(password, |prev, c| c == prev) > MAX_RUN
}

fn has_sequence(password: &str) -> bool {
	longest_run(password, |prev, c| c as u32 == prev as u32 + 1) > MAX_RUN
}

fn longest_run(password: &str, related: impl Fn(char, char) -> bool) -> usize {
	let mut longest = 0;
	let mut count = 0;
	let mut prev: Option<char> = None;
	for c in password.chars() {
		count = match prev {
			Some(p) if related(p, c) => count + 1,
			_ => 1,
		};
		longest = longest.max(count);
		prev = Some(c);
	}
	longest
}

#[cfg(test)]
mod tests {
	use super::*;

	fn message_for(user: &str, password: &str) -> String {
		check_password_requirements(user, password)
			.unwrap_err()
			.fields["password"][0]
			.clone()
	}

	#[test]
	fn accepts_a_reasonable_password() {
		assert!(check_password_requirements("alice@example.com", "correct-horse-battery").is_ok());
	}

	#[test]
	fn rejects_short_passwords() {
		assert_eq!(message_for("alice", "1234xyz"), "must be at least 8 characters");
	}

	#[test]
	fn rejects_password_containing_user_name() {
		assert_eq!(
			message_for("alice@example.com", "xx-alice@example.com-xx"),
			"cannot contain user name"
		);
	}

	#[test]
	fn rejects_password_containing_service_name() {
		assert_eq!(
			message_for("alice", "myinfrapassword"),
			"cannot contain common names such as the name of the service"
		);
	}

	#[test]
	fn rejects_four_repeating_characters() {
		assert_eq!(
			message_for("alice", "paaaassword"),
			"must not have repeating characters"
		);
	}

	#[test]
	fn allows_three_repeating_characters() {
		assert!(check_password_requirements("alice", "paaassword").is_ok());
	}

	#[test]
	fn rejects_four_consecutive_characters() {
		assert_eq!(
			message_for("alice", "pass-abcd"),
			"must not have common sequences of characters"
		);
		assert_eq!(
			message_for("alice", "pass-1234"),
			"must not have common sequences of characters"
		);
	}

	#[test]
	fn allows_three_consecutive_characters() {
		assert!(check_password_requirements("alice", "pass-abc-xyz1").is_ok());
	}

	#[test]
	fn error_serializes_field_keyed() {
		let err = check_password_requirements("alice", "short").unwrap_err();
		assert_eq!(
			serde_json::to_string(&err).unwrap(),
			r#"{"password":["must be at least 8 characters"]}"#
		);
	}
}
