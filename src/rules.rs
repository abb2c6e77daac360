//! Sorting rules and keyword matching

use crate::error::{Result, SorterError};
use crate::paths::{normalize_path, paths_equal};
use crate::template::NameTemplate;
use std::path::{Path, PathBuf};

/// A single sorting rule, immutable once loaded
#[derive(Debug, Clone, PartialEq)]
pub struct Rule {
	/// Position in the rules document (0-based), used for reporting
	pub index: usize,
	pub source_dir: PathBuf,
	/// Lowercase match terms, all of which must occur in a file name
	pub keywords: Vec<String>,
	pub destination_dir: PathBuf,
	pub template: NameTemplate,
	pub season: u32,
}

impl Rule {
	pub fn new(
		index: usize, source_dir: PathBuf, keywords: Vec<String>, destination_dir: PathBuf,
		rename_format: &str, season: u32,
	) -> Result<Self> {
		let invalid = |reason: &str| SorterError::ConfigInvalid {
			index,
			reason: reason.to_string(),
		};

		if source_dir.as_os_str().is_empty() {
			return Err(invalid("'source' must not be empty"));
		}
		if destination_dir.as_os_str().is_empty() {
			return Err(invalid("'destination' must not be empty"));
		}
		if keywords.is_empty() {
			return Err(invalid("'match_keywords' must list at least one keyword"));
		}
		if keywords.iter().any(|k| k.is_empty()) {
			return Err(invalid("'match_keywords' must not contain empty keywords"));
		}

		let template = NameTemplate::compile(rename_format).map_err(|e| invalid(&e.to_string()))?;

		Ok(Self {
			index,
			source_dir,
			keywords: keywords.into_iter().map(|k| k.to_lowercase()).collect(),
			destination_dir,
			template,
			season,
		})
	}

	/// True when every keyword occurs in `filename`, ignoring case.
	///
	/// Matching is plain substring search, so `s2` also hits `seas2on`. A rule
	/// without keywords matches nothing.
	pub fn matches(&self, filename: &str) -> bool {
		if filename.is_empty() || self.keywords.is_empty() {
			return false;
		}
		let name = filename.to_lowercase();
		self.keywords.iter().all(|keyword| name.contains(keyword.as_str()))
	}

	/// True when `dir` is this rule's source folder
	pub fn watches(&self, dir: &Path) -> bool {
		paths_equal(&self.source_dir, dir)
	}

	/// Short human-readable label for logs
	pub fn label(&self) -> String {
		format!("#{} [{}]", self.index, self.keywords.join(", "))
	}
}

/// Return the first rule, in configured order, that matches `filename`
pub fn find_matching_rule<'a, I>(filename: &str, rules: I) -> Option<&'a Rule>
where I: IntoIterator<Item = &'a Rule> {
	rules.into_iter().find(|rule| rule.matches(filename))
}

/// Ordered collection of rules; order is match priority
#[derive(Debug, Clone, Default)]
pub struct RuleSet {
	rules: Vec<Rule>,
}

impl RuleSet {
	pub fn new(rules: Vec<Rule>) -> Self {
		Self { rules }
	}

	pub fn len(&self) -> usize {
		self.rules.len()
	}

	pub fn is_empty(&self) -> bool {
		self.rules.is_empty()
	}

	pub fn iter(&self) -> impl Iterator<Item = &Rule> {
		self.rules.iter()
	}

	/// Distinct source folders in first-seen order
	pub fn source_dirs(&self) -> Vec<PathBuf> {
		let mut seen: Vec<PathBuf> = Vec::new();
		let mut dirs = Vec::new();
		for rule in &self.rules {
			let key = normalize_path(&rule.source_dir);
			if !seen.contains(&key) {
				seen.push(key);
				dirs.push(rule.source_dir.clone());
			}
		}
		dirs
	}

	/// Rules whose source folder is `dir`, in configured order
	pub fn for_source(&self, dir: &Path) -> impl Iterator<Item = &Rule> + '_ {
		let key = normalize_path(dir);
		self.rules
			.iter()
			.filter(move |rule| normalize_path(&rule.source_dir) == key)
	}

	/// First matching rule among those watching `dir`
	pub fn find_match(&self, filename: &str, dir: &Path) -> Option<&Rule> {
		find_matching_rule(filename, self.for_source(dir))
	}
}

impl<'a> IntoIterator for &'a RuleSet {
	type Item = &'a Rule;
	type IntoIter = std::slice::Iter<'a, Rule>;

	fn into_iter(self) -> Self::IntoIter {
		self.rules.iter()
	}
}
