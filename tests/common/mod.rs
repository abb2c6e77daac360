//! Common test utilities for the episode-sorter library

#![allow(dead_code)]

use episode_sorter::{ProcessingOutcome, ReportKind, Rule, RuleSet, SortReport, WatcherConfig};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::mpsc::UnboundedReceiver;

pub const SUCCESSION_TEMPLATE: &str = "Succession - S{season:02d}E{episode:02d}";

/// Create a temporary directory for testing
pub fn setup_temp_dir() -> TempDir {
	TempDir::new().expect("Failed to create temp directory")
}

/// Source and destination folders under one temp root
pub struct Library {
	pub root: TempDir,
	pub downloads: PathBuf,
	pub destination: PathBuf,
}

impl Library {
	pub fn new() -> Self {
		let root = setup_temp_dir();
		let downloads = root.path().join("downloads");
		let destination = root.path().join("TV").join("Succession").join("S1");
		std::fs::create_dir_all(&downloads).expect("Failed to create downloads folder");
		Self {
			root,
			downloads,
			destination,
		}
	}

	pub fn succession_rule(&self) -> Rule {
		rule(0, &self.downloads, &["succession"], &self.destination, SUCCESSION_TEMPLATE, 1)
	}

	pub fn download(&self, name: &str, content: &[u8]) -> PathBuf {
		let path = self.downloads.join(name);
		std::fs::write(&path, content).expect("Failed to write download");
		path
	}

	pub fn existing_episode(&self, name: &str) {
		std::fs::create_dir_all(&self.destination).expect("Failed to create destination");
		std::fs::write(self.destination.join(name), b"already in library")
			.expect("Failed to write existing episode");
	}

	pub fn destination_names(&self) -> Vec<String> {
		let mut names: Vec<String> = match std::fs::read_dir(&self.destination) {
			Ok(entries) => entries
				.filter_map(|e| e.ok())
				.map(|e| e.file_name().to_string_lossy().into_owned())
				.collect(),
			Err(_) => Vec::new(),
		};
		names.sort();
		names
	}
}

pub fn rule(
	index: usize, source: &Path, keywords: &[&str], destination: &Path, template: &str, season: u32,
) -> Rule {
	Rule::new(
		index,
		source.to_path_buf(),
		keywords.iter().map(|k| k.to_string()).collect(),
		destination.to_path_buf(),
		template,
		season,
	)
	.expect("Invalid test rule")
}

pub fn rule_set(rules: Vec<Rule>) -> RuleSet {
	RuleSet::new(rules)
}

/// Settings short enough for tests to finish quickly
pub fn fast_config() -> WatcherConfig {
	WatcherConfig {
		stability_interval: Duration::from_millis(100),
		debounce_window: Duration::from_millis(50),
		tick_interval: Duration::from_millis(20),
		source_recheck_interval: Duration::from_millis(100),
		max_pending_age: Duration::from_secs(60),
		..Default::default()
	}
}

/// Wait until a report satisfying `predicate` arrives, or give up after `timeout`
pub async fn wait_for_report<F>(
	reports: &mut UnboundedReceiver<SortReport>, timeout: Duration, mut predicate: F,
) -> Option<SortReport>
where F: FnMut(&SortReport) -> bool {
	let deadline = tokio::time::Instant::now() + timeout;
	loop {
		match tokio::time::timeout_at(deadline, reports.recv()).await {
			Ok(Some(report)) => {
				if predicate(&report) {
					return Some(report);
				}
			}
			Ok(None) | Err(_) => return None,
		}
	}
}

/// Wait for the processing outcome of a file with the given name
pub async fn wait_for_outcome(
	reports: &mut UnboundedReceiver<SortReport>, file_name: &str,
) -> Option<ProcessingOutcome> {
	let report = wait_for_report(reports, Duration::from_secs(10), |report| {
		matches!(&report.kind, ReportKind::Processed { path, .. }
			if path.file_name().map_or(false, |n| n == file_name))
	})
	.await?;
	report.outcome().cloned()
}

/// Wait for a short duration to allow file system events to propagate
pub async fn wait_for_events() {
	tokio::time::sleep(Duration::from_millis(200)).await;
}
