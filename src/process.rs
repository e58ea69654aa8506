//! Real, process-backed collaborators (§4.1, §4.4, §4.6, §6): the production wiring that
//! shells out to a configurable copy tool and snapshot tool, as opposed to the in-memory
//! fakes in [`crate::fakes`] used for demonstration and tests.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use tracing::{debug, instrument, warn};

use crate::error::{OrchestratorError, Result};
use crate::model::Chunk;
use crate::traits::{CopyToolLauncher, DirectoryLister, Job, JunctionProvider, SnapshotHandle, SnapshotProvider};

/// Lists directories by invoking the configured copy tool in list-only mode (`/L`) and
/// capturing its stdout, following this lineage's "spawn, capture stdout, read to completion"
/// shape rather than streaming line-by-line.
pub struct CopyToolLister {
	tool_path: String,
}

impl CopyToolLister {
	pub fn new(tool_path: impl Into<String>) -> Self {
		Self {
			tool_path: tool_path.into(),
		}
	}
}

#[async_trait]
impl DirectoryLister for CopyToolLister {
	#[instrument(skip(self))]
	async fn list(&self, path: &Path, recursive: bool) -> Result<String> {
		let mut command = tokio::process::Command::new(&self.tool_path);
		command
			.arg(path)
			.arg(path) // copy tools in list mode take source and destination; destination is unused under /L
			.arg("/L")
			.arg("/NJH")
			.arg("/NJS")
			.arg("/NC")
			.arg("/NDL")
			.stdin(Stdio::null())
			.stdout(Stdio::piped())
			.stderr(Stdio::null());
		if recursive {
			command.arg("/E");
		} else {
			command.arg("/LEV:1");
		}

		let output = command.output().await.map_err(|source| OrchestratorError::Profile {
			path: path.to_path_buf(),
			source,
		})?;
		Ok(String::from_utf8_lossy(&output.stdout).into_owned())
	}
}

/// Launches copy-tool subprocesses for chunks, redirecting output to a unique per-chunk log
/// file under `log_directory` (§4.4).
pub struct CopyToolProcessLauncher {
	tool_path: String,
}

impl CopyToolProcessLauncher {
	pub fn new(tool_path: impl Into<String>) -> Self {
		Self {
			tool_path: tool_path.into(),
		}
	}
}

#[async_trait]
impl CopyToolLauncher for CopyToolProcessLauncher {
	#[instrument(skip(self, chunk), fields(chunk_id = chunk.id))]
	async fn start(&self, chunk: &Chunk, log_directory: &Path) -> Result<Option<Job>> {
		if tokio::fs::create_dir_all(log_directory).await.is_err() {
			warn!(chunk_id = chunk.id, "failed to create log directory, launch aborted");
			return Ok(None);
		}
		let log_path = log_directory.join(format!("chunk-{}.log", chunk.id));
		let log_file = match std::fs::File::create(&log_path) {
			Ok(file) => file,
			Err(err) => {
				warn!(chunk_id = chunk.id, error = %err, "failed to create chunk log file, launch aborted");
				return Ok(None);
			}
		};

		let mut command = tokio::process::Command::new(&self.tool_path);
		command
			.arg(&chunk.source)
			.arg(&chunk.destination)
			.args(&chunk.extra_copy_args)
			.stdin(Stdio::null())
			.stdout(Stdio::from(log_file.try_clone().map_err(OrchestratorError::Io)?))
			.stderr(Stdio::from(log_file))
			.kill_on_drop(true);
		if chunk.is_files_only() {
			command.arg("/LEV:1");
		} else {
			command.arg("/E");
		}

		match command.spawn() {
			Ok(child) => {
				debug!(chunk_id = chunk.id, log_path = %log_path.display(), "launched copy process");
				Ok(Some(Job {
					chunk_id: chunk.id,
					child,
					log_path,
					started_at: chrono::Utc::now(),
				}))
			}
			Err(err) => {
				warn!(chunk_id = chunk.id, error = %err, "failed to spawn copy process");
				Ok(None)
			}
		}
	}
}

/// Creates and deletes volume snapshots by shelling out to a configurable VSS-equivalent tool.
/// The tool's stdout is expected to print the shadow id and shadow device path on separate
/// lines prefixed `SHADOW_ID:`/`SHADOW_PATH:`; a production deployment swaps this parsing for
/// whatever its chosen tool actually emits.
pub struct ShellSnapshotProvider {
	tool_path: String,
}

impl ShellSnapshotProvider {
	pub fn new(tool_path: impl Into<String>) -> Self {
		Self {
			tool_path: tool_path.into(),
		}
	}

	async fn run(&self, args: &[&str]) -> Result<String> {
		let output = tokio::process::Command::new(&self.tool_path)
			.args(args)
			.stdin(Stdio::null())
			.stdout(Stdio::piped())
			.stderr(Stdio::piped())
			.output()
			.await
			.map_err(|err| OrchestratorError::Snapshot(err.to_string()))?;
		if !output.status.success() {
			return Err(OrchestratorError::Snapshot(format!(
				"{} exited with {}: {}",
				self.tool_path,
				output.status,
				String::from_utf8_lossy(&output.stderr)
			)));
		}
		Ok(String::from_utf8_lossy(&output.stdout).into_owned())
	}
}

#[async_trait]
impl SnapshotProvider for ShellSnapshotProvider {
	async fn create(&self, volume: &str) -> Result<SnapshotHandle> {
		let stdout = self.run(&["create", volume]).await?;
		let mut shadow_id = None;
		let mut shadow_path = None;
		for line in stdout.lines() {
			if let Some(id) = line.strip_prefix("SHADOW_ID:") {
				shadow_id = Some(id.trim().to_string());
			} else if let Some(path) = line.strip_prefix("SHADOW_PATH:") {
				shadow_path = Some(path.trim().to_string());
			}
		}
		match (shadow_id, shadow_path) {
			(Some(shadow_id), Some(shadow_path)) => Ok(SnapshotHandle { shadow_id, shadow_path }),
			_ => Err(OrchestratorError::Snapshot(format!(
				"snapshot tool produced no SHADOW_ID/SHADOW_PATH for volume {volume}"
			))),
		}
	}

	async fn delete(&self, shadow_id: &str) -> Result<()> {
		self.run(&["delete", shadow_id]).await?;
		Ok(())
	}

	async fn list_existing(&self) -> Result<Vec<String>> {
		let stdout = self.run(&["list"]).await?;
		Ok(stdout
			.lines()
			.filter_map(|line| line.strip_prefix("SHADOW_ID:"))
			.map(|id| id.trim().to_string())
			.collect())
	}
}

/// Creates and removes filesystem junctions via the platform `mklink` / `rmdir` equivalents,
/// run through a configurable shell so non-Windows development hosts can substitute a stub.
pub struct MklinkJunctionProvider {
	tool_path: String,
}

impl MklinkJunctionProvider {
	pub fn new(tool_path: impl Into<String>) -> Self {
		Self {
			tool_path: tool_path.into(),
		}
	}
}

#[async_trait]
impl JunctionProvider for MklinkJunctionProvider {
	async fn create(&self, share_root: &str, junction_name: &str, target: &str) -> Result<()> {
		let link_path = PathBuf::from(share_root).join(junction_name);
		let status = tokio::process::Command::new(&self.tool_path)
			.arg("create-junction")
			.arg(&link_path)
			.arg(target)
			.stdin(Stdio::null())
			.status()
			.await
			.map_err(|err| OrchestratorError::Snapshot(err.to_string()))?;
		if !status.success() {
			return Err(OrchestratorError::Snapshot(format!(
				"junction creation at {} failed with {status}",
				link_path.display()
			)));
		}
		Ok(())
	}

	async fn remove(&self, share_root: &str, junction_name: &str) -> Result<()> {
		let link_path = PathBuf::from(share_root).join(junction_name);
		let status = tokio::process::Command::new(&self.tool_path)
			.arg("remove-junction")
			.arg(&link_path)
			.stdin(Stdio::null())
			.status()
			.await
			.map_err(|err| OrchestratorError::Snapshot(err.to_string()))?;
		if !status.success() {
			return Err(OrchestratorError::Snapshot(format!(
				"junction removal at {} failed with {status}",
				link_path.display()
			)));
		}
		Ok(())
	}
}
