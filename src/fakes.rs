//! In-memory/local-filesystem collaborators used by the demonstration binary's `--fake` mode
//! (§6), so the orchestrator can be exercised end to end on a developer machine without a real
//! copy tool or VSS-equivalent installed. These are not test doubles (the scheduler and
//! snapshot tests have their own `#[cfg(test)]` fakes); they perform real filesystem I/O, just
//! without requiring the external binaries a production deployment would wire instead.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use tracing::{instrument, warn};

use crate::error::{OrchestratorError, Result};
use crate::model::Chunk;
use crate::traits::{
	CopyLogParser, CopyLogStats, CopyToolLauncher, DirectoryLister, Job, JunctionProvider, SnapshotHandle,
	SnapshotProvider,
};

/// Walks a real local directory tree and emits it in the same line shape the copy tool's
/// list-only mode would (`parse_listing`'s `^\s+<size>\s+<path>$`), so the rest of the profiler
/// pipeline runs unmodified.
pub struct FilesystemLister;

#[async_trait]
impl DirectoryLister for FilesystemLister {
	#[instrument(skip(self))]
	async fn list(&self, path: &Path, recursive: bool) -> Result<String> {
		let mut lines = String::new();
		walk(path, recursive, 0, &mut lines).await.map_err(|source| OrchestratorError::Profile {
			path: path.to_path_buf(),
			source,
		})?;
		Ok(lines)
	}
}

fn walk<'a>(
	path: &'a Path,
	recursive: bool,
	depth: u32,
	out: &'a mut String,
) -> std::pin::Pin<Box<dyn std::future::Future<Output = std::io::Result<()>> + Send + 'a>> {
	Box::pin(async move {
		let mut entries = tokio::fs::read_dir(path).await?;
		while let Some(entry) = entries.next_entry().await? {
			let meta = entry.metadata().await?;
			let entry_path = entry.path();
			if meta.is_dir() {
				out.push_str(&format!("          0   {}\\\n", entry_path.display()));
				if recursive {
					walk(&entry_path, recursive, depth + 1, out).await?;
				}
			} else {
				out.push_str(&format!("{:>11}   {}\n", meta.len(), entry_path.display()));
			}
		}
		Ok(())
	})
}

/// Copies chunks with the platform's native recursive copy command and writes a synthetic
/// robocopy-shaped summary footer so [`crate::logparser::SummaryLogParser`] parses it unchanged.
pub struct FilesystemCopyLauncher;

#[async_trait]
impl CopyToolLauncher for FilesystemCopyLauncher {
	#[instrument(skip(self, chunk), fields(chunk_id = chunk.id))]
	async fn start(&self, chunk: &Chunk, log_directory: &Path) -> Result<Option<Job>> {
		if tokio::fs::create_dir_all(log_directory).await.is_err() {
			return Ok(None);
		}
		if tokio::fs::create_dir_all(&chunk.destination).await.is_err() {
			warn!(chunk_id = chunk.id, "failed to create destination directory, launch aborted");
			return Ok(None);
		}
		let log_path = log_directory.join(format!("chunk-{}.log", chunk.id));

		let script = format!(
			"{copy} && printf '               Total    Copied   Skipped  Mismatch    FAILED    Extras\\n    Files :      {files}       {files}         0         0         0         0\\n    Bytes :  {bytes}    {bytes}         0         0         0         0\\n'",
			copy = copy_command(&chunk.source, &chunk.destination, chunk.is_files_only()),
			files = chunk.estimated_files,
			bytes = chunk.estimated_size,
		);

		let log_file = match std::fs::File::create(&log_path) {
			Ok(file) => file,
			Err(err) => {
				warn!(chunk_id = chunk.id, error = %err, "failed to create chunk log file, launch aborted");
				return Ok(None);
			}
		};
		let stderr_file = log_file.try_clone().map_err(OrchestratorError::Io)?;

		match tokio::process::Command::new("sh")
			.arg("-c")
			.arg(&script)
			.stdin(Stdio::null())
			.stdout(Stdio::from(log_file))
			.stderr(Stdio::from(stderr_file))
			.kill_on_drop(true)
			.spawn()
		{
			Ok(child) => Ok(Some(Job {
				chunk_id: chunk.id,
				child,
				log_path,
				started_at: chrono::Utc::now(),
			})),
			Err(err) => {
				warn!(chunk_id = chunk.id, error = %err, "failed to spawn fake copy process");
				Ok(None)
			}
		}
	}
}

fn copy_command(source: &Path, destination: &Path, files_only: bool) -> String {
	let source = source.display();
	let destination = destination.display();
	if files_only {
		format!("find '{source}' -maxdepth 1 -type f -exec cp -p {{}} '{destination}' \\;")
	} else {
		format!("cp -rp '{source}'/. '{destination}'")
	}
}

/// Parses the synthetic summary footer [`FilesystemCopyLauncher`] writes. Delegates to the same
/// grammar as the production [`crate::logparser::SummaryLogParser`].
pub struct FakeSummaryLogParser;

#[async_trait]
impl CopyLogParser for FakeSummaryLogParser {
	async fn parse(&self, log_path: &Path) -> CopyLogStats {
		match tokio::fs::read_to_string(log_path).await {
			Ok(text) => crate::logparser::parse_summary(&text),
			Err(_) => CopyLogStats::default(),
		}
	}
}

/// An in-memory snapshot provider that never actually snapshots anything: `create` hands back
/// the source volume's own path unchanged, so `--fake` runs exercise the snapshot lifecycle
/// (tracking file, guard release, orphan sweep) without needing a real VSS-equivalent tool.
pub struct NullSnapshotProvider {
	next_id: AtomicU64,
	live: Mutex<Vec<String>>,
}

impl NullSnapshotProvider {
	pub fn new() -> Self {
		Self {
			next_id: AtomicU64::new(1),
			live: Mutex::new(Vec::new()),
		}
	}
}

impl Default for NullSnapshotProvider {
	fn default() -> Self {
		Self::new()
	}
}

#[async_trait]
impl SnapshotProvider for NullSnapshotProvider {
	async fn create(&self, volume: &str) -> Result<SnapshotHandle> {
		let id = self.next_id.fetch_add(1, Ordering::SeqCst);
		let shadow_id = format!("fake-shadow-{id}");
		self.live.lock().expect("live snapshots poisoned").push(shadow_id.clone());
		Ok(SnapshotHandle {
			shadow_id,
			shadow_path: volume.to_string(),
		})
	}

	async fn delete(&self, shadow_id: &str) -> Result<()> {
		self.live.lock().expect("live snapshots poisoned").retain(|id| id != shadow_id);
		Ok(())
	}

	async fn list_existing(&self) -> Result<Vec<String>> {
		Ok(self.live.lock().expect("live snapshots poisoned").clone())
	}
}

/// A junction provider that creates a real directory symlink locally, for `--fake` runs that
/// exercise a UNC-shaped source path on a single machine.
pub struct SymlinkJunctionProvider;

#[async_trait]
impl JunctionProvider for SymlinkJunctionProvider {
	async fn create(&self, share_root: &str, junction_name: &str, target: &str) -> Result<()> {
		let link_path = PathBuf::from(share_root).join(junction_name);
		#[cfg(unix)]
		{
			tokio::fs::symlink(target, &link_path)
				.await
				.map_err(|err| OrchestratorError::Snapshot(err.to_string()))
		}
		#[cfg(not(unix))]
		{
			let _ = (target, link_path);
			Ok(())
		}
	}

	async fn remove(&self, share_root: &str, junction_name: &str) -> Result<()> {
		let link_path = PathBuf::from(share_root).join(junction_name);
		tokio::fs::remove_file(&link_path).await.ok();
		Ok(())
	}
}
