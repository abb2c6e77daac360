//! Episode number inference from the destination folder

use crate::error::Result;
use crate::rules::Rule;
use crate::template::NameTemplate;
use std::collections::BTreeSet;
use std::path::Path;
use tracing::debug;

/// Episode numbers already used at a destination for one season.
///
/// Built fresh from the folder listing on every request; nothing is cached,
/// so files added or removed by other programs are always seen.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DestinationIndex {
	episodes: BTreeSet<u32>,
}

impl DestinationIndex {
	/// Index names that parse against `template` for `season`.
	///
	/// Names that do not conform are ignored. When the template carries no
	/// `{season}` slot every conforming name counts.
	pub fn from_names<'a, I>(names: I, template: &NameTemplate, season: u32) -> Self
	where I: IntoIterator<Item = &'a str> {
		let episodes = names
			.into_iter()
			.filter_map(|name| template.parse(name))
			.filter(|parsed| parsed.season.map_or(true, |s| s == season))
			.map(|parsed| parsed.episode)
			.collect();
		Self { episodes }
	}

	/// List `dir` and index its regular files. A missing folder is empty.
	pub async fn scan(dir: &Path, template: &NameTemplate, season: u32) -> Result<Self> {
		let mut entries = match tokio::fs::read_dir(dir).await {
			Ok(entries) => entries,
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
				debug!("Destination {:?} does not exist yet, starting at episode 1", dir);
				return Ok(Self::default());
			}
			Err(e) => return Err(e.into()),
		};

		let mut names = Vec::new();
		while let Some(entry) = entries.next_entry().await? {
			if !entry.file_type().await?.is_file() {
				continue;
			}
			match entry.file_name().into_string() {
				Ok(name) => names.push(name),
				Err(raw) => debug!("Ignoring non UTF-8 name in {:?}: {:?}", dir, raw),
			}
		}

		Ok(Self::from_names(names.iter().map(String::as_str), template, season))
	}

	/// `max + 1`, or 1 when nothing conforms. Gaps are not reused.
	pub fn next_episode(&self) -> u32 {
		self.episodes
			.last()
			.map_or(1, |max| max.saturating_add(1))
	}

	pub fn contains(&self, episode: u32) -> bool {
		self.episodes.contains(&episode)
	}

	pub fn len(&self) -> usize {
		self.episodes.len()
	}

	pub fn is_empty(&self) -> bool {
		self.episodes.is_empty()
	}

	pub fn episodes(&self) -> impl Iterator<Item = u32> + '_ {
		self.episodes.iter().copied()
	}
}

/// Computes the next free episode number for a rule
pub struct EpisodeResolver;

impl EpisodeResolver {
	/// Index the rule's destination for the rule's season
	pub async fn destination_index(rule: &Rule) -> Result<DestinationIndex> {
		DestinationIndex::scan(&rule.destination_dir, &rule.template, rule.season).await
	}

	pub async fn next_episode(rule: &Rule) -> Result<u32> {
		let index = Self::destination_index(rule).await?;
		let next = index.next_episode();
		debug!(
			"Destination {:?} season {} has {} episode(s), next is {}",
			rule.destination_dir,
			rule.season,
			index.len(),
			next
		);
		Ok(next)
	}
}
