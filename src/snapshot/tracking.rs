//! Snapshot tracking file: a JSON array of [`SnapshotRecord`] guarded by an OS exclusive lock
//! spanning each read-modify-write (§4.6), following this lineage's own use of `fs4` for
//! lock-guarded file mutation in its SSH action.

use std::path::{Path, PathBuf};

use fs4::tokio::AsyncFileExt;
use tokio::fs::OpenOptions;
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};

use crate::error::Result;
use crate::model::SnapshotRecord;

pub struct TrackingFile {
	path: PathBuf,
}

impl TrackingFile {
	pub fn new(path: impl Into<PathBuf>) -> Self {
		Self { path: path.into() }
	}

	async fn read_locked(&self, file: &tokio::fs::File) -> Result<Vec<SnapshotRecord>> {
		let mut contents = String::new();
		let mut file = file.try_clone().await?;
		file.seek(std::io::SeekFrom::Start(0)).await?;
		file.read_to_string(&mut contents).await?;
		if contents.trim().is_empty() {
			return Ok(Vec::new());
		}
		Ok(serde_json::from_str(&contents)?)
	}

	async fn write_locked(&self, records: &[SnapshotRecord]) -> Result<()> {
		let tmp_path = self.path.with_extension("json.tmp");
		let body = serde_json::to_string_pretty(records)?;
		tokio::fs::write(&tmp_path, body).await?;
		tokio::fs::rename(&tmp_path, &self.path).await?;
		Ok(())
	}

	async fn open_for_lock(&self) -> Result<tokio::fs::File> {
		if let Some(parent) = self.path.parent() {
			tokio::fs::create_dir_all(parent).await.ok();
		}
		let file = OpenOptions::new()
			.read(true)
			.write(true)
			.create(true)
			.truncate(false)
			.open(&self.path)
			.await?;
		file.lock_exclusive()?;
		Ok(file)
	}

	/// Append a new record under an exclusive lock.
	pub async fn append(&self, record: SnapshotRecord) -> Result<()> {
		let file = self.open_for_lock().await?;
		let mut records = self.read_locked(&file).await?;
		records.push(record);
		self.write_locked(&records).await?;
		AsyncFileExt::unlock(&file)?;
		Ok(())
	}

	/// Remove the record with the given shadow id under an exclusive lock.
	pub async fn remove(&self, shadow_id: &str) -> Result<()> {
		let file = self.open_for_lock().await?;
		let mut records = self.read_locked(&file).await?;
		records.retain(|r| r.shadow_id != shadow_id);
		self.write_locked(&records).await?;
		AsyncFileExt::unlock(&file)?;
		Ok(())
	}

	/// Snapshot the current contents for the orphan sweep; does not hold the lock afterwards.
	pub async fn read_all(&self) -> Result<Vec<SnapshotRecord>> {
		if !tokio::fs::try_exists(&self.path).await.unwrap_or(false) {
			return Ok(Vec::new());
		}
		let file = self.open_for_lock().await?;
		let records = self.read_locked(&file).await?;
		AsyncFileExt::unlock(&file)?;
		Ok(records)
	}

	pub fn path(&self) -> &Path {
		&self.path
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use chrono::Utc;
	use uuid::Uuid;

	fn record(shadow_id: &str) -> SnapshotRecord {
		SnapshotRecord {
			shadow_id: shadow_id.to_string(),
			source_volume: "C:".to_string(),
			shadow_path: format!("\\\\?\\GLOBALROOT\\Device\\{shadow_id}"),
			server_name: None,
			share_name: None,
			junction_path: None,
			created_at: Utc::now(),
			session_id: Uuid::new_v4(),
		}
	}

	#[tokio::test]
	async fn append_then_read_all_round_trips() {
		let dir = tempfile::tempdir().unwrap();
		let tracking = TrackingFile::new(dir.path().join("tracking.json"));
		tracking.append(record("shadow-1")).await.unwrap();
		tracking.append(record("shadow-2")).await.unwrap();
		let all = tracking.read_all().await.unwrap();
		assert_eq!(all.len(), 2);
	}

	#[tokio::test]
	async fn remove_filters_by_shadow_id() {
		let dir = tempfile::tempdir().unwrap();
		let tracking = TrackingFile::new(dir.path().join("tracking.json"));
		tracking.append(record("shadow-1")).await.unwrap();
		tracking.append(record("shadow-2")).await.unwrap();
		tracking.remove("shadow-1").await.unwrap();
		let all = tracking.read_all().await.unwrap();
		assert_eq!(all.len(), 1);
		assert_eq!(all[0].shadow_id, "shadow-2");
	}

	#[tokio::test]
	async fn read_all_on_missing_file_is_empty() {
		let dir = tempfile::tempdir().unwrap();
		let tracking = TrackingFile::new(dir.path().join("missing.json"));
		assert!(tracking.read_all().await.unwrap().is_empty());
	}
}
