// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Client-side snowflake id generation.
//!
//! Ids are 64-bit, positive, and roughly time-ordered: 41 bits of
//! milliseconds since a fixed epoch, 10 bits of node id, 12 bits of
//! per-millisecond sequence. All entity ids in the registry are generated
//! here rather than by the database, so rows can reference each other before
//! the transaction commits.

use std::sync::Mutex;
use std::sync::OnceLock;
use std::time::{SystemTime, UNIX_EPOCH};

use rand::Rng;

/// 2022-01-01T00:00:00Z, the epoch ids are measured from.
const EPOCH_MS: i64 = 1_640_995_200_000;

const NODE_BITS: u8 = 10;
const SEQUENCE_BITS: u8 = 12;
const NODE_MAX: i64 = (1 << NODE_BITS) - 1;
const SEQUENCE_MASK: i64 = (1 << SEQUENCE_BITS) - 1;

struct Generator {
	last_ms: i64,
	sequence: i64,
}

static NODE_ID: OnceLock<i64> = OnceLock::new();
static GENERATOR: Mutex<Generator> = Mutex::new(Generator {
	last_ms: 0,
	sequence: 0,
});

fn node_id() -> i64 {
	*NODE_ID.get_or_init(|| rand::thread_rng().gen_range(0..=NODE_MAX))
}

fn now_ms() -> i64 {
	SystemTime::now()
		.duration_since(UNIX_EPOCH)
		.map(|d| d.as_millis() as i64)
		.unwrap_or(0)
}

/// Generate the next id.
///
/// Ids from a single process are strictly increasing. The sequence wraps at
/// 4096 ids per millisecond, at which point generation spins until the clock
/// moves forward.
pub fn generate() -> i64 {
	let mut state = GENERATOR.lock().unwrap_or_else(|e| e.into_inner());

	let mut ms = now_ms();
	if ms < state.last_ms {
		// clock went backwards; keep issuing from the last observed tick
		ms = state.last_ms;
	}

	if ms == state.last_ms {
		state.sequence = (state.sequence + 1) & SEQUENCE_MASK;
		if state.sequence == 0 {
			while ms <= state.last_ms {
				ms = now_ms();
			}
		}
	} else {
		state.sequence = 0;
	}
	state.last_ms = ms;

	((ms - EPOCH_MS) << (NODE_BITS + SEQUENCE_BITS)) | (node_id() << SEQUENCE_BITS) | state.sequence
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::collections::HashSet;

	#[test]
	fn ids_are_positive() {
		for _ in 0..100 {
			assert!(generate() > 0);
		}
	}

	#[test]
	fn ids_are_unique() {
		let mut seen = HashSet::new();
		for _ in 0..10_000 {
			assert!(seen.insert(generate()), "duplicate id generated");
		}
	}

	#[test]
	fn ids_are_increasing() {
		let mut last = 0;
		for _ in 0..10_000 {
			let id = generate();
			assert!(id > last, "id {id} not greater than {last}");
			last = id;
		}
	}

	#[test]
	fn ids_are_unique_across_threads() {
		let handles: Vec<_> = (0..4)
			.map(|_| std::thread::spawn(|| (0..2_000).map(|_| generate()).collect::<Vec<_>>()))
			.collect();

		let mut seen = HashSet::new();
		for handle in handles {
			for id in handle.join().unwrap() {
				assert!(seen.insert(id), "duplicate id across threads");
			}
		}
	}
}
