//! Core data model (§3): `Profile`, `DirectoryProfile`, `Chunk`, `Job`, and the terminal
//! `ProfileResult`/`SnapshotRecord` types.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{OrchestratorError, Result};

/// How the planner should traverse a source tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScanMode {
	/// Recursive descent with size/file/depth acceptance predicates (§4.2).
	Smart,
	/// Emit a single chunk for the profile root and let the copy tool recurse itself.
	Flat,
}

/// Interpretation of a copy-tool exit code as a severity (§4.4, §4.7).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Severity {
	Success,
	Warning,
	Error,
	Fatal,
}

/// Per-profile override of how a file-mismatch exit code is classified.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MismatchSeverity {
	Success,
	Warning,
	Error,
}

/// A caller-supplied replication job definition (§3). Immutable once validated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Profile {
	pub name: String,
	pub source: PathBuf,
	pub destination: PathBuf,
	pub use_snapshot: bool,
	pub scan_mode: ScanMode,
	pub chunk_max_bytes: u64,
	pub chunk_max_files: u64,
	pub chunk_max_depth: u32,
	pub chunk_min_bytes: u64,
	pub mismatch_severity: Option<MismatchSeverity>,
}

impl Profile {
	/// Construct a profile, validating invariants eagerly so a malformed `Profile` can never
	/// reach the orchestrator. Mirrors the validate-at-the-boundary discipline used throughout
	/// this crate's chunk planner and scheduler entry points.
	#[allow(clippy::too_many_arguments)]
	pub fn new(
		name: impl Into<String>,
		source: impl Into<PathBuf>,
		destination: impl Into<PathBuf>,
		use_snapshot: bool,
		scan_mode: ScanMode,
		chunk_max_bytes: u64,
		chunk_max_files: u64,
		chunk_max_depth: u32,
		chunk_min_bytes: u64,
		mismatch_severity: Option<MismatchSeverity>,
	) -> Result<Self> {
		let name = name.into();
		if name.trim().is_empty() {
			return Err(OrchestratorError::Validation(
				"profile name must not be empty".into(),
			));
		}
		let source = source.into();
		if source.as_os_str().is_empty() {
			return Err(OrchestratorError::Validation(
				"profile source must not be empty".into(),
			));
		}
		let destination = destination.into();
		if destination.as_os_str().is_empty() {
			return Err(OrchestratorError::Validation(
				"profile destination must not be empty".into(),
			));
		}
		if chunk_max_bytes <= chunk_min_bytes {
			return Err(OrchestratorError::Validation(format!(
				"chunk_max_bytes ({chunk_max_bytes}) must be greater than chunk_min_bytes ({chunk_min_bytes})"
			)));
		}
		if chunk_max_files < 1 {
			return Err(OrchestratorError::Validation(
				"chunk_max_files must be at least 1".into(),
			));
		}
		Ok(Self {
			name,
			source,
			destination,
			use_snapshot,
			scan_mode,
			chunk_max_bytes,
			chunk_max_files,
			chunk_max_depth,
			chunk_min_bytes,
			mismatch_severity,
		})
	}
}

/// Statistics for one directory, as estimated by the [`crate::profiler::DirectoryProfiler`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirectoryProfile {
	pub path: PathBuf,
	pub total_size: u64,
	pub file_count: u64,
	pub dir_count: u64,
	pub last_scanned: DateTime<Utc>,
}

impl DirectoryProfile {
	pub fn avg_file_size(&self) -> u64 {
		if self.file_count > 0 {
			self.total_size / self.file_count
		} else {
			0
		}
	}
}

/// Discriminator replacing the source's untyped `IsFilesOnly` bag-of-properties (§9).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChunkKind {
	/// Covers the directory and everything beneath it.
	Recursive,
	/// Covers only the files directly inside the directory (no recursion).
	FilesOnly,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChunkStatus {
	Pending,
	Running,
	Complete,
	Warning,
	Failed,
}

/// An atomic unit of replication work, emitted by the [`crate::planner::ChunkPlanner`] and
/// mutated by the scheduler as it runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
	pub id: u64,
	pub kind: ChunkKind,
	pub source: PathBuf,
	pub destination: PathBuf,
	pub estimated_size: u64,
	pub estimated_files: u64,
	pub extra_copy_args: Vec<String>,
	pub status: ChunkStatus,
	pub retry_count: u32,
	pub retry_after: Option<DateTime<Utc>>,
}

impl Chunk {
	pub fn is_files_only(&self) -> bool {
		self.kind == ChunkKind::FilesOnly
	}
}

/// Terminal summary for one profile's run, recorded regardless of how it ended (§3, §7).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfileResult {
	pub name: String,
	pub status: ProfileStatus,
	pub chunks_complete: u64,
	pub chunks_failed: u64,
	pub bytes_copied: u64,
	pub files_copied: u64,
	pub files_skipped: u64,
	pub duration: std::time::Duration,
	pub errors: Vec<String>,
	pub preflight_error: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProfileStatus {
	Success,
	Warning,
	Failed,
}

/// A snapshot lifecycle record, persisted in the tracking file (§4.6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotRecord {
	pub shadow_id: String,
	pub source_volume: String,
	pub shadow_path: String,
	pub server_name: Option<String>,
	pub share_name: Option<String>,
	pub junction_path: Option<String>,
	pub created_at: DateTime<Utc>,
	pub session_id: uuid::Uuid,
}

/// The overall run phase (part of `OrchestrationState` in §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Phase {
	Idle,
	Scanning,
	Replicating,
	Complete,
	Stopped,
}

/// Normalize a path per the glossary: strip trailing separators, convert forward slashes to
/// backward slashes, preserve case. Comparisons over normalized paths are case-insensitive.
pub fn normalize_path(path: &Path) -> String {
	let s = path.to_string_lossy().replace('/', "\\");
	s.trim_end_matches('\\').to_string()
}

/// Case-insensitive comparison of two normalized paths.
pub fn paths_equal_ci(a: &Path, b: &Path) -> bool {
	normalize_path(a).eq_ignore_ascii_case(&normalize_path(b))
}
