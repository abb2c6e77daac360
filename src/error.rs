use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by the sorter
///
/// Nothing here is fatal to a running watch loop: per-file failures are turned
/// into a [`crate::ProcessingOutcome`] and reported. Only `NoUsableRules` (and
/// I/O or JSON errors while reading the rules document) stop startup.
#[derive(Error, Debug)]
pub enum SorterError {
	#[error("IO error: {0}")]
	Io(#[from] std::io::Error),

	#[error("Notify error: {0}")]
	Notify(#[from] notify::Error),

	#[error("JSON serialization error: {0}")]
	Json(#[from] serde_json::Error),

	#[error("Channel send error")]
	ChannelSend,

	#[error("Failed to send stop signal to watcher")]
	StopSignal,

	#[error("Invalid rule #{index}: {reason}")]
	ConfigInvalid { index: usize, reason: String },

	#[error("No usable rules in {}", path.display())]
	NoUsableRules { path: PathBuf },

	#[error("Source folder does not exist or is invalid: {}", path.display())]
	SourceMissing { path: PathBuf },

	#[error("Invalid rename template {template:?}: {reason}")]
	InvalidTemplate { template: String, reason: String },

	#[error("Copy failed: {} -> {} - {cause}", source_path.display(), destination.display())]
	CopyFailed {
		source_path: PathBuf,
		destination: PathBuf,
		cause: String,
	},

	#[error("Destination already exists: {}", path.display())]
	DestinationExists { path: PathBuf },

	#[error("Configuration error: {parameter} - {reason}")]
	ConfigurationError { parameter: String, reason: String },
}

impl SorterError {
	/// Check if this error comes from the rules document or runtime settings
	pub fn is_configuration_error(&self) -> bool {
		matches!(
			self,
			SorterError::ConfigInvalid { .. }
				| SorterError::NoUsableRules { .. }
				| SorterError::InvalidTemplate { .. }
				| SorterError::ConfigurationError { .. }
		)
	}

	/// Get error category for logging
	pub fn category(&self) -> &'static str {
		match self {
			SorterError::Io(_) => "io",
			SorterError::Notify(_) => "notify",
			SorterError::Json(_) => "json",
			SorterError::ChannelSend | SorterError::StopSignal => "lifecycle",
			SorterError::ConfigInvalid { .. }
			| SorterError::NoUsableRules { .. }
			| SorterError::ConfigurationError { .. } => "configuration",
			SorterError::InvalidTemplate { .. } => "template",
			SorterError::SourceMissing { .. } => "source_missing",
			SorterError::CopyFailed { .. } | SorterError::DestinationExists { .. } => "copy",
		}
	}

	pub(crate) fn invalid_template(template: &str, reason: impl Into<String>) -> Self {
		SorterError::InvalidTemplate {
			template: template.to_string(),
			reason: reason.into(),
		}
	}
}

pub type Result<T> = std::result::Result<T, SorterError>;
