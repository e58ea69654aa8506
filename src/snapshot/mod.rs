//! Snapshot Lifecycle Manager (§4.6): scoped point-in-time snapshot acquisition around a
//! caller-supplied async body, with crash-resilient orphan cleanup.

pub mod local;
pub mod remote;
pub mod tracking;

use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use tracing::{instrument, warn};
use uuid::Uuid;

use crate::error::Result;
use crate::model::SnapshotRecord;
use crate::traits::{JunctionProvider, SnapshotProvider};

use local::{extract_volume, rewrite_local_path};
use remote::{junction_name, parse_unc, rewrite_remote_path};
use tracking::TrackingFile;

/// A scoped snapshot acquisition. Rust has no stable async `Drop`, so cleanup is an explicit
/// async `release()` call rather than a destructor; the `Drop` impl below is only a
/// last-resort safety net that logs if a guard was dropped without being released.
pub struct SnapshotGuard {
	shadow_id: String,
	released: bool,
}

impl Drop for SnapshotGuard {
	fn drop(&mut self) {
		if !self.released {
			warn!(shadow_id = %self.shadow_id, "snapshot guard dropped without release; snapshot may be orphaned until the next orphan sweep");
		}
	}
}

pub struct SnapshotManager {
	provider: Arc<dyn SnapshotProvider>,
	junctions: Arc<dyn JunctionProvider>,
	tracking: TrackingFile,
	session_id: Uuid,
	retry_count: u32,
	retry_delay_seconds: u64,
}

impl SnapshotManager {
	pub fn new(
		provider: Arc<dyn SnapshotProvider>,
		junctions: Arc<dyn JunctionProvider>,
		tracking_file: impl Into<PathBuf>,
		session_id: Uuid,
		retry_count: u32,
		retry_delay_seconds: u64,
	) -> Self {
		Self {
			provider,
			junctions,
			tracking: TrackingFile::new(tracking_file),
			session_id,
			retry_count,
			retry_delay_seconds,
		}
	}

	/// Scoped acquisition (§4.6). Creates a snapshot, invokes `body` with the rewritten path,
	/// and releases the snapshot (and, for remote sources, its junction) on every exit path.
	#[instrument(skip(self, body))]
	pub async fn with_snapshot<F, Fut, T>(&self, source_path: &Path, body: F) -> Result<T>
	where
		F: FnOnce(PathBuf) -> Fut,
		Fut: Future<Output = Result<T>>,
	{
		let source_str = source_path.to_string_lossy().to_string();
		let is_unc = source_str.starts_with("\\\\");

		let (record, rewritten, junction) = if is_unc {
			let unc = parse_unc(&source_str)?;
			let handle = self.create_with_retry(&unc.server).await?;
			let junction = junction_name();
			self.junctions
				.create(&format!("\\\\{}\\{}", unc.server, unc.share), &junction, &handle.shadow_path)
				.await?;
			let rewritten = rewrite_remote_path(&unc, &junction);
			let record = SnapshotRecord {
				shadow_id: handle.shadow_id.clone(),
				source_volume: unc.server.clone(),
				shadow_path: handle.shadow_path.clone(),
				server_name: Some(unc.server.clone()),
				share_name: Some(unc.share.clone()),
				junction_path: Some(junction.clone()),
				created_at: Utc::now(),
				session_id: self.session_id,
			};
			(record, rewritten, Some((unc.server, unc.share, junction)))
		} else {
			let volume = extract_volume(&source_str)?;
			let handle = self.create_with_retry(&volume).await?;
			let rewritten = rewrite_local_path(&source_str, &handle.shadow_path)?;
			let record = SnapshotRecord {
				shadow_id: handle.shadow_id.clone(),
				source_volume: volume,
				shadow_path: handle.shadow_path.clone(),
				server_name: None,
				share_name: None,
				junction_path: None,
				created_at: Utc::now(),
				session_id: self.session_id,
			};
			(record, rewritten, None)
		};

		self.tracking.append(record.clone()).await?;

		let mut guard = SnapshotGuard {
			shadow_id: record.shadow_id.clone(),
			released: false,
		};

		let outcome = body(PathBuf::from(&rewritten)).await;

		if let Err(release_err) = self.release(&mut guard, &junction).await {
			warn!(shadow_id = %record.shadow_id, error = %release_err, "snapshot cleanup failed");
		}

		outcome
	}

	async fn create_with_retry(&self, volume: &str) -> Result<crate::traits::SnapshotHandle> {
		let mut attempt = 0;
		loop {
			attempt += 1;
			match self.provider.create(volume).await {
				Ok(handle) => return Ok(handle),
				Err(err) if attempt <= self.retry_count => {
					warn!(volume, attempt, error = %err, "snapshot creation failed, retrying");
					tokio::time::sleep(std::time::Duration::from_secs(self.retry_delay_seconds))
						.await;
				}
				Err(err) => return Err(err),
			}
		}
	}

	async fn release(
		&self,
		guard: &mut SnapshotGuard,
		junction: &Option<(String, String, String)>,
	) -> Result<()> {
		if let Some((server, share, name)) = junction {
			self.junctions
				.remove(&format!("\\\\{server}\\{share}"), name)
				.await?;
		}
		self.provider.delete(&guard.shadow_id).await?;
		self.tracking.remove(&guard.shadow_id).await?;
		guard.released = true;
		Ok(())
	}

	/// Crash-resilient orphan sweep: run once at process start. Any tracking-file record not
	/// owned by the current session whose snapshot still exists is deleted, along with its
	/// record.
	#[instrument(skip(self))]
	pub async fn sweep_orphans(&self) -> Result<usize> {
		let records = self.tracking.read_all().await?;
		let existing = self.provider.list_existing().await?;
		let mut removed = 0;
		for record in records {
			if record.session_id == self.session_id {
				continue;
			}
			if !existing.contains(&record.shadow_id) {
				continue;
			}
			if let Err(err) = self.provider.delete(&record.shadow_id).await {
				warn!(shadow_id = %record.shadow_id, error = %err, "failed to delete orphaned snapshot");
				continue;
			}
			self.tracking.remove(&record.shadow_id).await?;
			removed += 1;
		}
		Ok(removed)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::traits::SnapshotHandle;
	use async_trait::async_trait;
	use std::sync::atomic::{AtomicU32, Ordering as AtomicOrdering};
	use std::sync::Mutex;

	struct FakeSnapshotProvider {
		fail_first_n: u32,
		attempts: AtomicU32,
		created: Mutex<Vec<String>>,
	}

	impl FakeSnapshotProvider {
		fn new(fail_first_n: u32) -> Self {
			Self {
				fail_first_n,
				attempts: AtomicU32::new(0),
				created: Mutex::new(Vec::new()),
			}
		}
	}

	#[async_trait]
	impl SnapshotProvider for FakeSnapshotProvider {
		async fn create(&self, volume: &str) -> Result<SnapshotHandle> {
			let attempt = self.attempts.fetch_add(1, AtomicOrdering::SeqCst) + 1;
			if attempt <= self.fail_first_n {
				return Err(OrchestratorError::Snapshot("simulated failure".into()));
			}
			let shadow_id = format!("shadow-{attempt}");
			self.created.lock().unwrap().push(shadow_id.clone());
			Ok(SnapshotHandle {
				shadow_id,
				shadow_path: format!("\\\\?\\GLOBALROOT\\Device\\Fake\\{volume}"),
			})
		}

		async fn delete(&self, shadow_id: &str) -> Result<()> {
			self.created.lock().unwrap().retain(|id| id != shadow_id);
			Ok(())
		}

		async fn list_existing(&self) -> Result<Vec<String>> {
			Ok(self.created.lock().unwrap().clone())
		}
	}

	struct FakeJunctionProvider {
		active: Mutex<Vec<String>>,
	}

	impl FakeJunctionProvider {
		fn new() -> Self {
			Self {
				active: Mutex::new(Vec::new()),
			}
		}
	}

	#[async_trait]
	impl JunctionProvider for FakeJunctionProvider {
		async fn create(&self, _share_root: &str, junction_name: &str, _target: &str) -> Result<()> {
			self.active.lock().unwrap().push(junction_name.to_string());
			Ok(())
		}

		async fn remove(&self, _share_root: &str, junction_name: &str) -> Result<()> {
			self.active.lock().unwrap().retain(|n| n != junction_name);
			Ok(())
		}
	}

	use crate::error::OrchestratorError;

	fn manager(dir: &std::path::Path, provider: Arc<FakeSnapshotProvider>) -> SnapshotManager {
		SnapshotManager::new(
			provider,
			Arc::new(FakeJunctionProvider::new()),
			dir.join("tracking.json"),
			Uuid::new_v4(),
			2,
			0,
		)
	}

	#[tokio::test]
	async fn with_snapshot_rewrites_local_path_and_releases() {
		let dir = tempfile::tempdir().unwrap();
		let provider = Arc::new(FakeSnapshotProvider::new(0));
		let mgr = manager(dir.path(), provider.clone());

		let seen_path = mgr
			.with_snapshot(Path::new("C:\\data\\file.txt"), |rewritten| async move {
				Ok(rewritten.to_string_lossy().to_string())
			})
			.await
			.unwrap();

		assert!(seen_path.starts_with("\\\\?\\GLOBALROOT\\Device\\Fake\\C:"));
		assert!(provider.created.lock().unwrap().is_empty(), "snapshot must be released");
		assert!(mgr.tracking.read_all().await.unwrap().is_empty());
	}

	#[tokio::test]
	async fn with_snapshot_releases_even_when_body_errors() {
		let dir = tempfile::tempdir().unwrap();
		let provider = Arc::new(FakeSnapshotProvider::new(0));
		let mgr = manager(dir.path(), provider.clone());

		let result: Result<()> = mgr
			.with_snapshot(Path::new("C:\\data"), |_rewritten| async move {
				Err(OrchestratorError::Validation("body failed".into()))
			})
			.await;

		assert!(result.is_err());
		assert!(provider.created.lock().unwrap().is_empty(), "snapshot must still be released");
	}

	#[tokio::test]
	async fn snapshot_creation_retries_then_succeeds() {
		let dir = tempfile::tempdir().unwrap();
		let provider = Arc::new(FakeSnapshotProvider::new(2));
		let mgr = manager(dir.path(), provider);

		let result = mgr
			.with_snapshot(Path::new("C:\\data"), |_rewritten| async move { Ok(()) })
			.await;
		assert!(result.is_ok());
	}

	#[tokio::test]
	async fn with_snapshot_rewrites_unc_path_via_junction() {
		let dir = tempfile::tempdir().unwrap();
		let provider = Arc::new(FakeSnapshotProvider::new(0));
		let mgr = manager(dir.path(), provider);

		let seen_path = mgr
			.with_snapshot(Path::new("\\\\FILESRV\\backups\\acme"), |rewritten| async move {
				Ok(rewritten.to_string_lossy().to_string())
			})
			.await
			.unwrap();

		assert!(seen_path.starts_with("\\\\FILESRV\\backups\\.robocurse-vss-"));
		assert!(seen_path.ends_with("acme"));
	}

	#[tokio::test]
	async fn sweep_orphans_removes_records_from_other_sessions() {
		let dir = tempfile::tempdir().unwrap();
		let provider = Arc::new(FakeSnapshotProvider::new(0));
		provider.created.lock().unwrap().push("orphan-1".to_string());
		let tracking = TrackingFile::new(dir.path().join("tracking.json"));
		tracking
			.append(SnapshotRecord {
				shadow_id: "orphan-1".to_string(),
				source_volume: "C:".to_string(),
				shadow_path: "\\\\?\\GLOBALROOT\\Device\\orphan-1".to_string(),
				server_name: None,
				share_name: None,
				junction_path: None,
				created_at: Utc::now(),
				session_id: Uuid::new_v4(),
			})
			.await
			.unwrap();

		let mgr = SnapshotManager::new(
			provider.clone(),
			Arc::new(FakeJunctionProvider::new()),
			dir.path().join("tracking.json"),
			Uuid::new_v4(),
			2,
			0,
		);

		let removed = mgr.sweep_orphans().await.unwrap();
		assert_eq!(removed, 1);
		assert!(mgr.tracking.read_all().await.unwrap().is_empty());
	}
}
