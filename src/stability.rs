//! Detects when a newly observed file has stopped being written

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

/// Tracking entry for a file that is not yet known to be complete
#[derive(Debug, Clone)]
pub struct WatchedFile {
	pub path: PathBuf,
	pub size_at_last_check: u64,
	pub last_checked_at: Instant,
	/// When the file was first seen by the gate
	pub first_seen_at: Instant,
	/// When the current size was first observed
	pub size_changed_at: Instant,
	/// Set once the file is judged stable
	pub stable_since: Option<Instant>,
}

impl WatchedFile {
	fn new(path: PathBuf, size: u64, now: Instant) -> Self {
		Self {
			path,
			size_at_last_check: size,
			last_checked_at: now,
			first_seen_at: now,
			size_changed_at: now,
			stable_since: None,
		}
	}
}

/// Result of one stability check
#[derive(Debug, Clone)]
pub enum StabilityState {
	/// First sighting, nothing to compare against yet
	Unknown,
	/// Size changed since the last check, or the quiet period has not elapsed
	Growing,
	/// Same size on two checks at least the quiet period apart. Tracking ends.
	Stable(WatchedFile),
	/// The file disappeared. Tracking ends.
	Vanished,
}

impl StabilityState {
	pub fn is_stable(&self) -> bool {
		matches!(self, StabilityState::Stable(_))
	}

	pub fn is_pending(&self) -> bool {
		matches!(self, StabilityState::Unknown | StabilityState::Growing)
	}
}

/// Polling-based completeness check.
///
/// A file is stable once its size is the same on two consecutive checks and
/// that size has held for at least the quiet period. A shrinking file restarts
/// the timer. Empty files never become stable.
#[derive(Debug)]
pub struct StabilityGate {
	tracked: HashMap<PathBuf, WatchedFile>,
	quiet_period: Duration,
}

impl StabilityGate {
	pub fn new(quiet_period: Duration) -> Self {
		Self {
			tracked: HashMap::new(),
			quiet_period,
		}
	}

	pub fn quiet_period(&self) -> Duration {
		self.quiet_period
	}

	/// Stat `path` and advance its state
	pub async fn check(&mut self, path: &Path) -> StabilityState {
		let size = match tokio::fs::metadata(path).await {
			Ok(metadata) if metadata.is_file() => metadata.len(),
			_ => {
				if self.tracked.remove(path).is_some() {
					debug!("File vanished before becoming stable: {:?}", path);
				}
				return StabilityState::Vanished;
			}
		};
		self.observe(path, size, Instant::now())
	}

	/// Advance the state machine with a size observed at `now`
	pub fn observe(&mut self, path: &Path, size: u64, now: Instant) -> StabilityState {
		let Some(watched) = self.tracked.get_mut(path) else {
			debug!("Tracking {:?} (size {})", path, size);
			self.tracked
				.insert(path.to_path_buf(), WatchedFile::new(path.to_path_buf(), size, now));
			return StabilityState::Unknown;
		};

		let previous = watched.size_at_last_check;
		watched.size_at_last_check = size;
		watched.last_checked_at = now;

		if size != previous {
			if size < previous {
				debug!("{:?} shrank from {} to {} bytes, restarting", path, previous, size);
			}
			watched.size_changed_at = now;
			return StabilityState::Growing;
		}

		if size == 0 || now.duration_since(watched.size_changed_at) < self.quiet_period {
			return StabilityState::Growing;
		}

		match self.tracked.remove(path) {
			Some(mut watched) => {
				watched.stable_since = Some(now);
				debug!("{:?} is stable at {} bytes", path, size);
				StabilityState::Stable(watched)
			}
			None => StabilityState::Vanished,
		}
	}

	/// Stop tracking a path
	pub fn forget(&mut self, path: &Path) -> Option<WatchedFile> {
		self.tracked.remove(path)
	}

	pub fn get(&self, path: &Path) -> Option<&WatchedFile> {
		self.tracked.get(path)
	}

	pub fn is_tracked(&self, path: &Path) -> bool {
		self.tracked.contains_key(path)
	}

	/// Drop entries first seen longer than `max_age` ago, returning their paths
	pub fn expire_older_than(&mut self, max_age: Duration) -> Vec<PathBuf> {
		let now = Instant::now();
		let mut expired = Vec::new();
		self.tracked.retain(|path, watched| {
			let keep = now.duration_since(watched.first_seen_at) <= max_age;
			if !keep {
				expired.push(path.clone());
			}
			keep
		});
		expired
	}

	pub fn len(&self) -> usize {
		self.tracked.len()
	}

	pub fn is_empty(&self) -> bool {
		self.tracked.is_empty()
	}
}
