// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Credential extraction from request headers.
//!
//! A request may present its access key three ways; the first present source
//! wins, even if its value turns out to be invalid:
//!
//! 1. the `signup` cookie (set during first-login flows)
//! 2. the `auth` cookie
//! 3. the `Authorization: Bearer <token>` header
//!
//! Token values are never logged.

use http::header::{AUTHORIZATION, COOKIE};
use http::HeaderMap;

/// Cookie carrying the regular session access key.
pub const COOKIE_AUTH: &str = "auth";

/// Cookie carrying the signup-flow access key; takes precedence over `auth`.
pub const COOKIE_SIGNUP: &str = "signup";

/// Extract a cookie value by name from the Cookie header.
pub fn extract_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
	headers
		.get(COOKIE)?
		.to_str()
		.ok()?
		.split(';')
		.find_map(|cookie| {
			let (cookie_name, value) = cookie.trim().split_once('=')?;
			if cookie_name == name {
				Some(value.to_string())
			} else {
				None
			}
		})
}

/// Extract the bearer token from the Authorization header.
///
/// Expects `Authorization: Bearer <token>`. The literal value `"Bearer "`
/// (trailing space, nothing after) yields an empty token, which callers must
/// treat as no credential.
pub fn extract_bearer_token(headers: &HeaderMap) -> Option<String> {
	headers
		.get(AUTHORIZATION)?
		.to_str()
		.ok()?
		.strip_prefix("Bearer ")
		.map(|token| token.to_string())
}

/// The bearer candidate for a request: signup cookie, then auth cookie, then
/// the Authorization header.
pub fn bearer_candidate(headers: &HeaderMap) -> Option<String> {
	extract_cookie(headers, COOKIE_SIGNUP)
		.or_else(|| extract_cookie(headers, COOKIE_AUTH))
		.or_else(|| extract_bearer_token(headers))
}

#[cfg(test)]
mod tests {
	use super::*;
	use http::header::HeaderValue;

	fn headers(pairs: &[(http::header::HeaderName, &'static str)]) -> HeaderMap {
		let mut headers = HeaderMap::new();
		for (name, value) in pairs {
			headers.insert(name, HeaderValue::from_static(value));
		}
		headers
	}

	mod cookies {
		use super::*;

		#[test]
		fn extracts_from_single_cookie() {
			let h = headers(&[(COOKIE, "auth=abc123")]);
			assert_eq!(extract_cookie(&h, "auth"), Some("abc123".to_string()));
		}

		#[test]
		fn extracts_from_multiple_cookies() {
			let h = headers(&[(COOKIE, "other=x; auth=abc123; signup=def456")]);
			assert_eq!(extract_cookie(&h, "auth"), Some("abc123".to_string()));
			assert_eq!(extract_cookie(&h, "signup"), Some("def456".to_string()));
		}

		#[test]
		fn returns_none_when_absent() {
			assert_eq!(extract_cookie(&HeaderMap::new(), "auth"), None);
			let h = headers(&[(COOKIE, "other=x")]);
			assert_eq!(extract_cookie(&h, "auth"), None);
		}

		#[test]
		fn handles_whitespace_between_cookies() {
			let h = headers(&[(COOKIE, "  other=x ;  auth=abc123  ")]);
			assert_eq!(extract_cookie(&h, "auth"), Some("abc123".to_string()));
		}
	}

	mod bearer {
		use super::*;

		#[test]
		fn extracts_bearer_token() {
			let h = headers(&[(AUTHORIZATION, "Bearer abc123.def456")]);
			assert_eq!(extract_bearer_token(&h), Some("abc123.def456".to_string()));
		}

		#[test]
		fn returns_none_for_other_schemes() {
			let h = headers(&[(AUTHORIZATION, "Basic dXNlcjpwYXNz")]);
			assert_eq!(extract_bearer_token(&h), None);
		}

		#[test]
		fn returns_none_without_space() {
			let h = headers(&[(AUTHORIZATION, "Bearer")]);
			assert_eq!(extract_bearer_token(&h), None);
		}

		#[test]
		fn trailing_space_yields_empty_token() {
			let h = headers(&[(AUTHORIZATION, "Bearer ")]);
			assert_eq!(extract_bearer_token(&h), Some(String::new()));
		}
	}

	mod precedence {
		use super::*;

		#[test]
		fn signup_cookie_wins_over_auth_cookie_and_header() {
			let h = headers(&[
				(COOKIE, "auth=from-auth; signup=from-signup"),
				(AUTHORIZATION, "Bearer from-header"),
			]);
			assert_eq!(bearer_candidate(&h), Some("from-signup".to_string()));
		}

		#[test]
		fn auth_cookie_wins_over_header() {
			let h = headers(&[
				(COOKIE, "auth=from-auth"),
				(AUTHORIZATION, "Bearer from-header"),
			]);
			assert_eq!(bearer_candidate(&h), Some("from-auth".to_string()));
		}

		#[test]
		fn header_is_used_last() {
			let h = headers(&[(AUTHORIZATION, "Bearer from-header")]);
			assert_eq!(bearer_candidate(&h), Some("from-header".to_string()));
		}

		#[test]
		fn no_credential_yields_none() {
			assert_eq!(bearer_candidate(&HeaderMap::new()), None);
		}
	}
}
