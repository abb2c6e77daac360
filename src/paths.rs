//! Path normalization for comparing configured folders with event paths
//!
//! Rules may name their source folder with a relative path, a trailing
//! separator or `..` segments, while notify reports absolute paths. Both sides
//! are normalized before comparison.

use std::ffi::OsStr;
use std::path::{Path, PathBuf};

/// Normalize a path for equality checks.
///
/// - On Windows, this lowercases the path and converts all separators to '\\'.
/// - Elsewhere, this returns the canonicalized path if possible, else the original.
pub fn normalize_path(path: &Path) -> PathBuf {
	#[cfg(windows)]
	{
		let resolved = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
		let s = resolved
			.to_string_lossy()
			.trim_start_matches(r"\\?\")
			.replace('/', "\\")
			.to_lowercase();
		PathBuf::from(s)
	}
	#[cfg(not(windows))]
	{
		path.canonicalize().unwrap_or_else(|_| path.to_path_buf())
	}
}

/// Compare two paths for equality after normalization
pub fn paths_equal(a: &Path, b: &Path) -> bool {
	normalize_path(a) == normalize_path(b)
}

/// Identity of the folder currently at `path`, or `None` if there is none.
///
/// Inode on Unix, creation time elsewhere. A folder deleted and recreated under
/// the same name usually gets a new identity.
pub fn dir_identity(path: &Path) -> Option<u64> {
	let metadata = std::fs::metadata(path).ok()?;
	if !metadata.is_dir() {
		return None;
	}

	#[cfg(unix)]
	{
		use std::os::unix::fs::MetadataExt;
		Some(metadata.ino())
	}

	#[cfg(not(unix))]
	{
		metadata
			.created()
			.ok()?
			.duration_since(std::time::UNIX_EPOCH)
			.ok()
			.map(|d| d.as_nanos() as u64)
	}
}

/// File name of a path as UTF-8, lossy for odd encodings
pub fn file_name_lossy(path: &Path) -> String {
	path.file_name()
		.map(|name| name.to_string_lossy().into_owned())
		.unwrap_or_default()
}

/// Extension including the leading dot, or an empty string
pub fn dotted_extension(path: &Path) -> String {
	path.extension()
		.and_then(OsStr::to_str)
		.map(|ext| format!(".{ext}"))
		.unwrap_or_default()
}
