//! Injected collaborators (§4.1, §4.4, §4.6, §6).
//!
//! The orchestration core never spawns the real copy tool or VSS-equivalent snapshot tool
//! directly; it depends on these trait objects so production code wires real binaries and
//! tests wire in-memory fakes, following this lineage's `#[async_trait]` pattern for
//! connection-pool and hardware-driver collaborators.

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::error::Result;
use crate::model::{Chunk, Severity};

/// Raw stdout of a list-only invocation, handed to [`crate::profiler::parser::parse_listing`].
#[async_trait]
pub trait DirectoryLister: Send + Sync {
	/// List everything under `path` in the copy tool's list-only mode, non-recursively
	/// unless `recursive` is set. Returns the raw captured stdout.
	async fn list(&self, path: &Path, recursive: bool) -> Result<String>;
}

/// A running copy-tool subprocess, as returned by [`CopyToolLauncher::start`].
pub struct Job {
	pub chunk_id: u64,
	pub child: tokio::process::Child,
	pub log_path: PathBuf,
	pub started_at: chrono::DateTime<chrono::Utc>,
}

/// Starts copy-tool subprocesses for chunks (§4.4).
#[async_trait]
pub trait CopyToolLauncher: Send + Sync {
	/// Start a copy subprocess for `chunk`, redirecting stdout/stderr to a unique per-chunk log
	/// file under `log_directory`. Returns `Ok(None)` (not an error) when launch fails after the
	/// failure has been logged by the implementation, matching the source's `null`-on-failure
	/// contract; returns `Err` only for sanitization/validation failures caught before spawning.
	async fn start(&self, chunk: &Chunk, log_directory: &Path) -> Result<Option<Job>>;
}

#[derive(Debug, Clone)]
pub struct ExitMeaning {
	pub severity: Severity,
	pub message: String,
	pub should_retry: bool,
}

/// Parses a completed copy-tool log file into aggregate stats (§4.4).
#[async_trait]
pub trait CopyLogParser: Send + Sync {
	async fn parse(&self, log_path: &Path) -> CopyLogStats;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CopyLogStats {
	pub files_copied: u64,
	pub bytes_copied: u64,
	pub files_skipped: u64,
	pub parse_success: bool,
}

/// A volume-level point-in-time snapshot handle (§4.6).
#[derive(Debug, Clone)]
pub struct SnapshotHandle {
	pub shadow_id: String,
	pub shadow_path: String,
}

/// Creates and deletes volume snapshots. Implementations wrap the host's VSS-equivalent tool.
#[async_trait]
pub trait SnapshotProvider: Send + Sync {
	async fn create(&self, volume: &str) -> Result<SnapshotHandle>;
	async fn delete(&self, shadow_id: &str) -> Result<()>;
	/// List shadow ids that currently exist on the host, for the orphan sweep.
	async fn list_existing(&self) -> Result<Vec<String>>;
}

/// Creates and removes filesystem junctions under a remote share (§4.6, remote rewrite).
#[async_trait]
pub trait JunctionProvider: Send + Sync {
	async fn create(&self, share_root: &str, junction_name: &str, target: &str) -> Result<()>;
	async fn remove(&self, share_root: &str, junction_name: &str) -> Result<()>;
}
