//! Per-path coalescing of raw watch events

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;
use tokio::time::Instant;

/// Merges bursts of events for the same path into one.
///
/// A path is released once no event for it arrived during the window.
#[derive(Debug)]
pub struct Debouncer {
	pending: HashMap<PathBuf, Instant>,
	window: Duration,
}

impl Debouncer {
	pub fn new(window: Duration) -> Self {
		Self {
			pending: HashMap::new(),
			window,
		}
	}

	/// Record an event for `path`. Returns true when this starts a new burst.
	pub fn ingest(&mut self, path: PathBuf) -> bool {
		self.ingest_at(path, Instant::now())
	}

	pub fn ingest_at(&mut self, path: PathBuf, now: Instant) -> bool {
		match self.pending.entry(path) {
			Entry::Occupied(mut e) => {
				*e.get_mut() = now;
				false
			}
			Entry::Vacant(e) => {
				e.insert(now);
				true
			}
		}
	}

	/// Remove and return paths that have been quiet for the whole window
	pub fn drain_settled(&mut self) -> Vec<PathBuf> {
		self.drain_settled_at(Instant::now())
	}

	pub fn drain_settled_at(&mut self, now: Instant) -> Vec<PathBuf> {
		let window = self.window;
		let mut settled = Vec::new();
		self.pending.retain(|path, last_seen| {
			if now.duration_since(*last_seen) >= window {
				settled.push(path.clone());
				false
			} else {
				true
			}
		});
		settled.sort();
		settled
	}

	pub fn len(&self) -> usize {
		self.pending.len()
	}

	pub fn is_empty(&self) -> bool {
		self.pending.is_empty()
	}
}
