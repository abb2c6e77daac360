//! Rules document and runtime settings

use crate::error::{Result, SorterError};
use crate::rules::{Rule, RuleSet};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

/// One entry of the rules document as written by the user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleRecord {
	pub source: String,
	pub match_keywords: Vec<String>,
	pub destination: String,
	pub rename_format: String,
	#[serde(default = "default_season")]
	pub season: u32,
}

fn default_season() -> u32 {
	1
}

impl RuleRecord {
	pub fn into_rule(self, index: usize) -> Result<Rule> {
		Rule::new(
			index,
			PathBuf::from(self.source),
			self.match_keywords,
			PathBuf::from(self.destination),
			&self.rename_format,
			self.season,
		)
	}
}

/// Top-level rules document. Entries stay untyped so that one malformed rule
/// does not reject the whole file.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct RulesDocument {
	#[serde(default)]
	pub rules: Vec<serde_json::Value>,
}

impl RulesDocument {
	/// Document written on first run
	pub fn sample() -> Self {
		let rule = RuleRecord {
			source: "downloads".to_string(),
			match_keywords: vec!["succession".to_string()],
			destination: "media/TV/Succession/Season 1".to_string(),
			rename_format: "Succession - S{season:02d}E{episode:02d}".to_string(),
			season: 1,
		};
		Self {
			rules: vec![serde_json::json!(rule)],
		}
	}

	pub fn parse(text: &str) -> Result<Self> {
		Ok(serde_json::from_str(text)?)
	}

	pub fn to_json(&self) -> serde_json::Result<String> {
		serde_json::to_string_pretty(self)
	}

	/// Decode every entry, skipping and reporting the invalid ones
	pub fn into_rules(self) -> (Vec<Rule>, Vec<SorterError>) {
		let mut rules = Vec::new();
		let mut rejected = Vec::new();

		for (index, value) in self.rules.into_iter().enumerate() {
			let decoded = serde_json::from_value::<RuleRecord>(value)
				.map_err(|e| SorterError::ConfigInvalid {
					index,
					reason: e.to_string(),
				})
				.and_then(|record| record.into_rule(index));

			match decoded {
				Ok(rule) => rules.push(rule),
				Err(e) => rejected.push(e),
			}
		}

		(rules, rejected)
	}
}

/// Write the sample rules document to `path`, creating parent folders
pub fn write_sample_rules(path: &Path) -> Result<()> {
	if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
		std::fs::create_dir_all(parent)?;
	}
	std::fs::write(path, RulesDocument::sample().to_json()?)?;
	Ok(())
}

/// Load the rules document at `path`.
///
/// A missing document is replaced by the sample and then loaded as-is.
/// Malformed entries are logged and skipped; a document left with no usable
/// rule is an error.
pub fn load_rules(path: &Path) -> Result<RuleSet> {
	if !path.exists() {
		write_sample_rules(path)?;
		warn!(
			"Rules file not found, wrote a sample to {:?}; edit it to configure your own rules",
			path
		);
	}

	let text = std::fs::read_to_string(path)?;
	let (rules, rejected) = RulesDocument::parse(&text)?.into_rules();

	for error in &rejected {
		warn!("Skipping rule: {}", error);
	}

	if rules.is_empty() {
		return Err(SorterError::NoUsableRules {
			path: path.to_path_buf(),
		});
	}

	info!("Loaded {} rule(s) from {:?}", rules.len(), path);
	Ok(RuleSet::new(rules))
}

/// Runtime settings for the watch pipeline
#[derive(Debug, Clone)]
pub struct WatcherConfig {
	/// Minimum time between the two identical size checks that mark a file stable
	pub stability_interval: Duration,
	/// Raw events for the same path closer together than this are merged
	pub debounce_window: Duration,
	/// Period of the consumer's housekeeping timer
	pub tick_interval: Duration,
	/// How often missing source folders are looked for again
	pub source_recheck_interval: Duration,
	/// Files pending stability longer than this are dropped
	pub max_pending_age: Duration,
	/// Name suffixes of in-progress downloads, compared case-insensitively
	pub ignored_suffixes: Vec<String>,
}

impl Default for WatcherConfig {
	fn default() -> Self {
		Self {
			stability_interval: Duration::from_secs(3),
			debounce_window: Duration::from_millis(500),
			tick_interval: Duration::from_millis(250),
			source_recheck_interval: Duration::from_secs(10),
			max_pending_age: Duration::from_secs(6 * 60 * 60),
			ignored_suffixes: [".part", ".!qb", ".crdownload", ".tmp"]
				.iter()
				.map(|s| s.to_string())
				.collect(),
		}
	}
}

impl WatcherConfig {
	/// Create a configuration with a custom stability interval
	pub fn with_stability_interval(interval: Duration) -> Self {
		Self {
			stability_interval: interval,
			..Default::default()
		}
	}

	/// Validate the configuration and return errors if invalid
	pub fn validate(&self) -> Result<()> {
		if self.tick_interval.is_zero() {
			return Err(SorterError::ConfigurationError {
				parameter: "tick_interval".to_string(),
				reason: "must be greater than zero".to_string(),
			});
		}

		if self.source_recheck_interval.is_zero() {
			return Err(SorterError::ConfigurationError {
				parameter: "source_recheck_interval".to_string(),
				reason: "must be greater than zero".to_string(),
			});
		}

		if self.max_pending_age <= self.stability_interval {
			return Err(SorterError::ConfigurationError {
				parameter: "max_pending_age".to_string(),
				reason: format!(
					"must exceed stability_interval ({:?} <= {:?})",
					self.max_pending_age, self.stability_interval
				),
			});
		}

		Ok(())
	}

	/// True when `file_name` looks like an in-progress download
	pub fn is_ignored_name(&self, file_name: &str) -> bool {
		let lower = file_name.to_lowercase();
		self.ignored_suffixes
			.iter()
			.any(|suffix| lower.ends_with(&suffix.to_lowercase()))
	}
}
