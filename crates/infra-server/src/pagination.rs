// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Page-number pagination for list endpoints.

use serde::Deserialize;

/// Default and maximum page sizes.
const DEFAULT_LIMIT: i64 = 100;
const MAX_LIMIT: i64 = 1000;

#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct Pagination {
	/// 1-based page number.
	#[serde(default)]
	pub page: i64,
	#[serde(default)]
	pub limit: i64,
}

impl Pagination {
	pub fn limit(&self) -> i64 {
		match self.limit {
			n if n <= 0 => DEFAULT_LIMIT,
			n => n.min(MAX_LIMIT),
		}
	}

	pub fn offset(&self) -> i64 {
		let page = self.page.max(1);
		(page - 1) * self.limit()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn defaults_to_first_page() {
		let p = Pagination::default();
		assert_eq!(p.limit(), DEFAULT_LIMIT);
		assert_eq!(p.offset(), 0);
	}

	#[test]
	fn offset_follows_page_number() {
		let p = Pagination { page: 3, limit: 25 };
		assert_eq!(p.limit(), 25);
		assert_eq!(p.offset(), 50);
	}

	#[test]
	fn limit_is_capped() {
		let p = Pagination { page: 1, limit: 10_000 };
		assert_eq!(p.limit(), MAX_LIMIT);
	}
}
