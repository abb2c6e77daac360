//! Per-file processing: stability, rule match, numbering and copy

use crate::config::WatcherConfig;
use crate::error::{Result, SorterError};
use crate::events::ProcessingOutcome;
use crate::paths::{dotted_extension, file_name_lossy};
use crate::resolver::EpisodeResolver;
use crate::rules::{Rule, RuleSet};
use crate::stability::{StabilityGate, StabilityState};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tracing::{debug, warn};
use uuid::Uuid;

/// Prefix of the hidden files the copier writes before publishing
pub const TEMP_PREFIX: &str = ".sorter-";

/// Identity of a source file version, used to skip files already copied
#[derive(Debug, Clone, PartialEq, Eq)]
struct Fingerprint {
	size: u64,
	modified: Option<SystemTime>,
}

impl Fingerprint {
	fn of(metadata: &std::fs::Metadata) -> Self {
		Self {
			size: metadata.len(),
			modified: metadata.modified().ok(),
		}
	}
}

/// A finished copy
#[derive(Debug, Clone)]
struct Placement {
	final_name: String,
	destination: PathBuf,
	episode: u32,
}

/// Runs the processing pipeline for one path at a time.
///
/// Owned by the single consumer task, so numbering for a destination is
/// never resolved by two copies at once.
pub struct Ingestor {
	rules: Arc<RuleSet>,
	gate: StabilityGate,
	config: WatcherConfig,
	processed: HashMap<PathBuf, Fingerprint>,
}

impl Ingestor {
	pub fn new(rules: Arc<RuleSet>, config: WatcherConfig) -> Self {
		Self {
			gate: StabilityGate::new(config.stability_interval),
			rules,
			config,
			processed: HashMap::new(),
		}
	}

	pub fn rules(&self) -> &RuleSet {
		&self.rules
	}

	/// Number of files waiting to become stable
	pub fn pending_count(&self) -> usize {
		self.gate.len()
	}

	/// Forget files that have been pending for longer than `max_age`
	pub fn expire_pending(&mut self, max_age: Duration) -> Vec<PathBuf> {
		self.gate.expire_older_than(max_age)
	}

	/// True for names the pipeline never touches
	pub fn is_ignored(&self, path: &Path) -> bool {
		let name = file_name_lossy(path);
		name.is_empty() || name.starts_with(TEMP_PREFIX) || self.config.is_ignored_name(&name)
	}

	/// Process one source file.
	///
	/// `SkippedNotStable` means the caller should check again later. The source
	/// is only ever read.
	pub async fn process(&mut self, path: &Path) -> ProcessingOutcome {
		if self.is_ignored(path) {
			return ProcessingOutcome::SkippedTemporary;
		}

		let metadata = match tokio::fs::metadata(path).await {
			Ok(metadata) if metadata.is_file() => metadata,
			_ => {
				self.gate.forget(path);
				return ProcessingOutcome::SkippedSourceMissing;
			}
		};

		if self.processed.get(path) == Some(&Fingerprint::of(&metadata)) {
			self.gate.forget(path);
			return ProcessingOutcome::SkippedAlreadyProcessed;
		}

		let watched = match self.gate.check(path).await {
			StabilityState::Stable(watched) => watched,
			StabilityState::Vanished => return ProcessingOutcome::SkippedSourceMissing,
			StabilityState::Unknown | StabilityState::Growing => {
				return ProcessingOutcome::SkippedNotStable
			}
		};

		let file_name = file_name_lossy(path);
		let Some(dir) = path.parent() else {
			return ProcessingOutcome::SkippedNoMatch;
		};
		let rules = Arc::clone(&self.rules);
		let Some(rule) = rules.find_match(&file_name, dir) else {
			debug!("No rule matches {:?}", file_name);
			return ProcessingOutcome::SkippedNoMatch;
		};

		match Self::place(path, rule, watched.size_at_last_check).await {
			Ok(placement) => {
				// Remember the version that was copied
				if let Ok(metadata) = tokio::fs::metadata(path).await {
					self.processed
						.insert(path.to_path_buf(), Fingerprint::of(&metadata));
				}
				ProcessingOutcome::Copied {
					final_name: placement.final_name,
					destination: placement.destination,
					rule: rule.index,
					episode: placement.episode,
				}
			}
			Err(e) => {
				warn!("Copy of {:?} for rule {} failed [{}]: {}", path, rule.label(), e.category(), e);
				ProcessingOutcome::FailedCopy {
					cause: e.to_string(),
				}
			}
		}
	}

	/// Resolve the episode, then copy `source` under its final name
	async fn place(source: &Path, rule: &Rule, expected_len: u64) -> Result<Placement> {
		let episode = EpisodeResolver::next_episode(rule).await?;
		let final_name = format!(
			"{}{}",
			rule.template.render(rule.season, episode),
			dotted_extension(source)
		);
		let destination = rule.destination_dir.join(&final_name);
		let copy_error = |cause: String| SorterError::CopyFailed {
			source_path: source.to_path_buf(),
			destination: destination.clone(),
			cause,
		};

		tokio::fs::create_dir_all(&rule.destination_dir)
			.await
			.map_err(|e| copy_error(format!("creating destination folder: {e}")))?;

		if tokio::fs::try_exists(&destination).await.unwrap_or(false) {
			return Err(SorterError::DestinationExists {
				path: destination.clone(),
			});
		}

		let temp = rule
			.destination_dir
			.join(format!("{TEMP_PREFIX}{}.partial", Uuid::new_v4().simple()));

		let result = async {
			let copied = tokio::fs::copy(source, &temp)
				.await
				.map_err(|e| copy_error(e.to_string()))?;
			if copied != expected_len {
				return Err(copy_error(format!(
					"source changed while copying ({copied} bytes copied, {expected_len} expected)"
				)));
			}
			publish(&temp, &destination).await
		}
		.await;

		if let Err(e) = result {
			if let Err(cleanup) = tokio::fs::remove_file(&temp).await {
				if cleanup.kind() != std::io::ErrorKind::NotFound {
					warn!("Could not remove temporary file {:?}: {}", temp, cleanup);
				}
			}
			return Err(e);
		}

		Ok(Placement {
			final_name,
			destination,
			episode,
		})
	}
}

/// Make a fully written `temp` file visible as `destination`.
///
/// A hard link fails atomically when the name is taken, so an existing file is
/// never replaced. Filesystems without hard links fall back to an existence
/// check followed by a rename.
pub(crate) async fn publish(temp: &Path, destination: &Path) -> Result<()> {
	match tokio::fs::hard_link(temp, destination).await {
		Ok(()) => {
			if let Err(e) = tokio::fs::remove_file(temp).await {
				warn!("Could not remove temporary file {:?}: {}", temp, e);
			}
			Ok(())
		}
		Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => Err(SorterError::DestinationExists {
			path: destination.to_path_buf(),
		}),
		Err(e) => {
			debug!("Hard link unavailable ({}), publishing {:?} by rename", e, destination);
			if tokio::fs::try_exists(destination).await? {
				return Err(SorterError::DestinationExists {
					path: destination.to_path_buf(),
				});
			}
			tokio::fs::rename(temp, destination).await?;
			Ok(())
		}
	}
}
