use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use uuid::Uuid;

/// Raw change kinds coming from the watch facility
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum EventType {
	Create,
	Write,
	Remove,
	RenameFrom, // Old name in rename operation
	RenameTo,   // New name in rename operation
	Rename,     // Generic rename (when direction unclear)
	Other(String),
}

impl From<notify::EventKind> for EventType {
	fn from(kind: notify::EventKind) -> Self {
		match kind {
			notify::EventKind::Create(_) => EventType::Create,
			notify::EventKind::Modify(modify_kind) => match modify_kind {
				notify::event::ModifyKind::Name(name_kind) => match name_kind {
					notify::event::RenameMode::From => EventType::RenameFrom,
					notify::event::RenameMode::To => EventType::RenameTo,
					_ => EventType::Rename,
				},
				_ => EventType::Write,
			},
			notify::EventKind::Remove(_) => EventType::Remove,
			notify::EventKind::Access(_) => EventType::Other("Access".to_string()),
			notify::EventKind::Other => EventType::Other("Unknown".to_string()),
			_ => EventType::Other(format!("{kind:?}")),
		}
	}
}

impl EventType {
	/// True for events that can mean a file appeared or changed under its
	/// final name. Download clients often finish with a rename, so the "to"
	/// side of a rename counts.
	pub fn is_arrival(&self) -> bool {
		matches!(
			self,
			EventType::Create | EventType::Write | EventType::RenameTo | EventType::Rename
		)
	}
}

/// Result of one attempt at processing a source file
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum ProcessingOutcome {
	Copied {
		final_name: String,
		destination: PathBuf,
		rule: usize,
		episode: u32,
	},
	SkippedNoMatch,
	SkippedNotStable,
	SkippedSourceMissing,
	/// Name of an in-progress download (`.part`, `.!qb`, ...)
	SkippedTemporary,
	/// Same path, size and mtime were already copied this session
	SkippedAlreadyProcessed,
	FailedCopy {
		cause: String,
	},
}

impl ProcessingOutcome {
	/// Outcomes that end processing for this attempt
	pub fn is_final(&self) -> bool {
		!matches!(self, ProcessingOutcome::SkippedNotStable)
	}

	pub fn is_copied(&self) -> bool {
		matches!(self, ProcessingOutcome::Copied { .. })
	}

	pub fn final_name(&self) -> Option<&str> {
		match self {
			ProcessingOutcome::Copied { final_name, .. } => Some(final_name),
			_ => None,
		}
	}
}

/// What a report is about
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum ReportKind {
	Processed {
		path: PathBuf,
		outcome: ProcessingOutcome,
	},
	SourceMissing {
		path: PathBuf,
	},
	SourceAvailable {
		path: PathBuf,
	},
	RescanCompleted {
		queued: usize,
	},
}

/// One entry on the report channel
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SortReport {
	pub id: Uuid,
	pub timestamp: DateTime<Utc>,
	pub kind: ReportKind,
}

impl SortReport {
	pub fn new(kind: ReportKind) -> Self {
		Self {
			id: Uuid::new_v4(),
			timestamp: Utc::now(),
			kind,
		}
	}

	pub fn processed(path: PathBuf, outcome: ProcessingOutcome) -> Self {
		Self::new(ReportKind::Processed { path, outcome })
	}

	pub fn outcome(&self) -> Option<&ProcessingOutcome> {
		match &self.kind {
			ReportKind::Processed { outcome, .. } => Some(outcome),
			_ => None,
		}
	}

	pub fn to_json(&self) -> serde_json::Result<String> {
		serde_json::to_string_pretty(self)
	}
}
