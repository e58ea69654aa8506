//! Progress / Status / Health (§4.7).

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::Result;
use crate::model::Phase;

/// A point-in-time status snapshot (§4.7).
#[derive(Debug, Clone, Serialize)]
pub struct StatusSnapshot {
	pub phase: Phase,
	pub current_profile_name: Option<String>,
	pub profile_progress_percent: f64,
	pub chunks_complete: u64,
	pub chunks_total: u64,
	pub elapsed: std::time::Duration,
	pub eta: Option<std::time::Duration>,
}

/// The health document written to disk (§4.7).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthDocument {
	pub phase: Phase,
	pub healthy: bool,
	pub message: String,
	pub timestamp: DateTime<Utc>,
	pub session_id: Uuid,
}

/// Shared progress accounting for one replication run. All counters are atomics so the
/// controller and the best-effort log-reader task can update them without holding a lock
/// across an `.await` (§5).
pub struct ProgressTracker {
	completed_chunk_bytes: AtomicU64,
	total_files_copied: AtomicU64,
	total_files_skipped: AtomicU64,
	chunks_complete: AtomicU64,
	chunks_total: AtomicU64,
	start_time_millis: AtomicI64,
	last_health_write_millis: AtomicI64,
	health_file: PathBuf,
	session_id: Uuid,
	current_profile: Mutex<Option<String>>,
}

impl ProgressTracker {
	pub fn new(health_file: impl Into<PathBuf>, session_id: Uuid) -> Self {
		Self {
			completed_chunk_bytes: AtomicU64::new(0),
			total_files_copied: AtomicU64::new(0),
			total_files_skipped: AtomicU64::new(0),
			chunks_complete: AtomicU64::new(0),
			chunks_total: AtomicU64::new(0),
			start_time_millis: AtomicI64::new(0),
			last_health_write_millis: AtomicI64::new(0),
			health_file: health_file.into(),
			session_id,
			current_profile: Mutex::new(None),
		}
	}

	pub fn start_run(&self, total_chunks: u64, now: DateTime<Utc>) {
		self.chunks_total.store(total_chunks, Ordering::Relaxed);
		self.chunks_complete.store(0, Ordering::Relaxed);
		self.completed_chunk_bytes.store(0, Ordering::Relaxed);
		self.total_files_copied.store(0, Ordering::Relaxed);
		self.total_files_skipped.store(0, Ordering::Relaxed);
		self.start_time_millis.store(now.timestamp_millis(), Ordering::Relaxed);
	}

	pub fn set_current_profile(&self, name: Option<String>) {
		*self.current_profile.lock().expect("progress lock poisoned") = name;
	}

	pub fn add_completed_bytes(&self, bytes: u64) {
		self.completed_chunk_bytes.fetch_add(bytes, Ordering::Relaxed);
	}

	pub fn add_files_copied(&self, count: u64) {
		self.total_files_copied.fetch_add(count, Ordering::Relaxed);
	}

	pub fn add_files_skipped(&self, count: u64) {
		self.total_files_skipped.fetch_add(count, Ordering::Relaxed);
	}

	pub fn files_copied(&self) -> u64 {
		self.total_files_copied.load(Ordering::Relaxed)
	}

	pub fn files_skipped(&self) -> u64 {
		self.total_files_skipped.load(Ordering::Relaxed)
	}

	pub fn increment_chunks_complete(&self) {
		self.chunks_complete.fetch_add(1, Ordering::Relaxed);
	}

	pub fn completed_bytes(&self) -> u64 {
		self.completed_chunk_bytes.load(Ordering::Relaxed)
	}

	/// `BytesComplete = CompletedChunkBytes + in-flight bytes from active jobs' logs`, where
	/// `in_flight_bytes` is supplied by the caller (best-effort; 0 if no log was readable).
	pub fn bytes_complete(&self, in_flight_bytes: u64) -> u64 {
		self.completed_bytes().saturating_add(in_flight_bytes)
	}

	/// ETA per §4.7: undefined (`None`) below a 1ms elapsed floor, zero bytes complete, or an
	/// unset start time; zero once bytes complete reaches the total.
	pub fn eta(
		&self,
		total_bytes: u64,
		bytes_complete: u64,
		now: DateTime<Utc>,
	) -> Option<std::time::Duration> {
		let start_millis = self.start_time_millis.load(Ordering::Relaxed);
		if start_millis == 0 {
			return None;
		}
		let elapsed_millis = now.timestamp_millis() - start_millis;
		if elapsed_millis < 1 || bytes_complete == 0 {
			return None;
		}
		if bytes_complete >= total_bytes {
			return Some(std::time::Duration::ZERO);
		}
		let remaining = total_bytes - bytes_complete;
		let eta_millis = (elapsed_millis as u128) * (remaining as u128) / (bytes_complete as u128);
		Some(std::time::Duration::from_millis(eta_millis.min(u64::MAX as u128) as u64))
	}

	pub fn status(
		&self,
		phase: Phase,
		total_bytes: u64,
		in_flight_bytes: u64,
		now: DateTime<Utc>,
	) -> StatusSnapshot {
		let chunks_total = self.chunks_total.load(Ordering::Relaxed);
		let chunks_complete = self.chunks_complete.load(Ordering::Relaxed);
		let start_millis = self.start_time_millis.load(Ordering::Relaxed);
		let elapsed = if start_millis == 0 {
			std::time::Duration::ZERO
		} else {
			std::time::Duration::from_millis((now.timestamp_millis() - start_millis).max(0) as u64)
		};
		let bytes_complete = self.bytes_complete(in_flight_bytes);

		StatusSnapshot {
			phase,
			current_profile_name: self.current_profile.lock().expect("progress lock poisoned").clone(),
			profile_progress_percent: if chunks_total > 0 {
				100.0 * chunks_complete as f64 / chunks_total as f64
			} else {
				0.0
			},
			chunks_complete,
			chunks_total,
			elapsed,
			eta: self.eta(total_bytes, bytes_complete, now),
		}
	}

	/// Write the health file, throttled to once per `interval_seconds` unless `force`.
	pub async fn write_health(
		&self,
		phase: Phase,
		healthy: bool,
		message: impl Into<String>,
		interval_seconds: u64,
		force: bool,
		now: DateTime<Utc>,
	) -> Result<()> {
		let last = self.last_health_write_millis.load(Ordering::Relaxed);
		let elapsed_millis = now.timestamp_millis() - last;
		if !force && last != 0 && elapsed_millis < (interval_seconds as i64) * 1000 {
			return Ok(());
		}

		let doc = HealthDocument {
			phase,
			healthy,
			message: message.into(),
			timestamp: now,
			session_id: self.session_id,
		};
		write_atomic(&self.health_file, &doc).await?;
		self.last_health_write_millis.store(now.timestamp_millis(), Ordering::Relaxed);
		Ok(())
	}

	/// Read and parse the health file, returning `None` if it does not exist.
	pub async fn read_health(path: &Path) -> Result<Option<HealthDocument>> {
		if !tokio::fs::try_exists(path).await.unwrap_or(false) {
			return Ok(None);
		}
		let text = tokio::fs::read_to_string(path).await?;
		Ok(Some(serde_json::from_str(&text)?))
	}
}

async fn write_atomic<T: Serialize>(path: &Path, value: &T) -> Result<()> {
	if let Some(parent) = path.parent() {
		tokio::fs::create_dir_all(parent).await.ok();
	}
	let tmp_path = path.with_extension("json.tmp");
	let body = serde_json::to_string_pretty(value)?;
	tokio::fs::write(&tmp_path, body).await?;
	tokio::fs::rename(&tmp_path, path).await?;
	Ok(())
}

pub fn is_healthy(phase: Phase, circuit_breaker_tripped: bool) -> bool {
	!(phase == Phase::Stopped || circuit_breaker_tripped)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn files_copied_and_skipped_accumulate_and_reset_on_start_run() {
		let tracker = ProgressTracker::new("health.json", Uuid::new_v4());
		tracker.add_files_copied(3);
		tracker.add_files_copied(4);
		tracker.add_files_skipped(1);
		assert_eq!(tracker.files_copied(), 7);
		assert_eq!(tracker.files_skipped(), 1);

		tracker.start_run(10, Utc::now());
		assert_eq!(tracker.files_copied(), 0);
		assert_eq!(tracker.files_skipped(), 0);
	}

	#[test]
	fn eta_undefined_before_start() {
		let tracker = ProgressTracker::new("health.json", Uuid::new_v4());
		assert!(tracker.eta(1000, 0, Utc::now()).is_none());
	}

	#[test]
	fn eta_undefined_with_zero_bytes_complete() {
		let tracker = ProgressTracker::new("health.json", Uuid::new_v4());
		let now = Utc::now();
		tracker.start_run(10, now - chrono::Duration::seconds(5));
		assert!(tracker.eta(1000, 0, now).is_none());
	}

	#[test]
	fn eta_zero_when_complete() {
		let tracker = ProgressTracker::new("health.json", Uuid::new_v4());
		let now = Utc::now();
		tracker.start_run(10, now - chrono::Duration::seconds(5));
		assert_eq!(tracker.eta(1000, 1000, now), Some(std::time::Duration::ZERO));
	}

	#[test]
	fn eta_scales_with_remaining_work() {
		let tracker = ProgressTracker::new("health.json", Uuid::new_v4());
		let now = Utc::now();
		tracker.start_run(10, now - chrono::Duration::seconds(10));
		let eta = tracker.eta(1000, 500, now).unwrap();
		assert!(eta.as_secs() >= 9 && eta.as_secs() <= 11);
	}

	#[test]
	fn health_is_unhealthy_when_stopped_or_tripped() {
		assert!(!is_healthy(Phase::Stopped, false));
		assert!(!is_healthy(Phase::Replicating, true));
		assert!(is_healthy(Phase::Replicating, false));
	}

	#[tokio::test]
	async fn write_then_read_health_round_trips() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("health.json");
		let tracker = ProgressTracker::new(&path, Uuid::new_v4());
		tracker
			.write_health(Phase::Replicating, true, "running", 30, true, Utc::now())
			.await
			.unwrap();
		let read = ProgressTracker::read_health(&path).await.unwrap();
		assert!(read.is_some());
		assert!(read.unwrap().healthy);
	}

	#[tokio::test]
	async fn write_health_is_throttled_unless_forced() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("health.json");
		let tracker = ProgressTracker::new(&path, Uuid::new_v4());
		let now = Utc::now();
		tracker
			.write_health(Phase::Replicating, true, "first", 3600, true, now)
			.await
			.unwrap();
		tracker
			.write_health(Phase::Replicating, true, "second", 3600, false, now)
			.await
			.unwrap();
		let read = ProgressTracker::read_health(&path).await.unwrap().unwrap();
		assert_eq!(read.message, "first");
	}

	#[tokio::test]
	async fn read_health_on_missing_file_is_none() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("missing.json");
		assert!(ProgressTracker::read_health(&path).await.unwrap().is_none());
	}
}
