//! Tunables for the orchestration core (§3, ambient Config section).
//!
//! Loading a config from disk is left to the host application; this crate only defines the
//! shape and the defaults, following the distilled spec's choice to treat config loading as
//! an external collaborator.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// All tunables the orchestrator needs. `Deserialize`/`Serialize` so a host can load this from
/// whatever format it prefers (JSON/YAML/TOML are equally served by `serde`).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
	/// Upper bound on concurrently running copy subprocesses, `[1, 128]`.
	pub max_concurrent_jobs: u32,
	/// Chunks are abandoned (moved to `Failed`) after this many retries.
	pub max_chunk_retries: u32,
	/// Backoff base, in seconds: `delay = min(base * multiplier^(retry_count - 1), max_seconds)`.
	pub backoff_base_seconds: u64,
	pub backoff_multiplier: u64,
	pub backoff_max_seconds: u64,
	/// Consecutive chunk failures (Error/Fatal severity only) before the circuit breaker trips.
	pub circuit_breaker_threshold: u32,
	/// A cached `DirectoryProfile` is valid while `now - last_scanned <= max_age_hours`.
	pub cache_max_age_hours: i64,
	/// Minimum spacing between health-file writes, unless a write is forced.
	pub health_check_interval_seconds: u64,
	/// Snapshot creation retry count and delay.
	pub snapshot_retry_count: u32,
	pub snapshot_retry_delay_seconds: u64,
	/// Path to the copy tool binary (passed through to the injected `CopyToolLauncher`).
	pub copy_tool_path: PathBuf,
	/// Path to the snapshot tool binary (passed through to the injected `SnapshotProvider`).
	pub snapshot_tool_path: PathBuf,
	/// Directory where per-chunk copy-tool logs are written.
	pub log_directory: PathBuf,
	/// Path to the JSON snapshot tracking file (§4.6).
	pub snapshot_tracking_file: PathBuf,
	/// Path to the JSON health file (§4.6).
	pub health_file: PathBuf,
}

impl Default for OrchestratorConfig {
	fn default() -> Self {
		Self {
			max_concurrent_jobs: 4,
			max_chunk_retries: 3,
			backoff_base_seconds: 5,
			backoff_multiplier: 2,
			backoff_max_seconds: 300,
			circuit_breaker_threshold: 10,
			cache_max_age_hours: 24,
			health_check_interval_seconds: 30,
			snapshot_retry_count: 3,
			snapshot_retry_delay_seconds: 5,
			copy_tool_path: PathBuf::from("robocopy"),
			snapshot_tool_path: PathBuf::from("vshadow"),
			log_directory: PathBuf::from("./logs"),
			snapshot_tracking_file: PathBuf::from("./robocurse-snapshots.json"),
			health_file: PathBuf::from("./robocurse-health.json"),
		}
	}
}

impl OrchestratorConfig {
	/// Validate the subset of fields whose range is load-bearing for the scheduler's
	/// correctness (S1-S8); everything else is free-form and caught by normal type errors
	/// during deserialization.
	pub fn validate(&self) -> Result<(), String> {
		if !(1..=128).contains(&self.max_concurrent_jobs) {
			return Err(format!(
				"max_concurrent_jobs must be in [1, 128], got {}",
				self.max_concurrent_jobs
			));
		}
		if self.backoff_multiplier < 1 {
			return Err("backoff_multiplier must be at least 1".into());
		}
		if self.circuit_breaker_threshold == 0 {
			return Err("circuit_breaker_threshold must be at least 1".into());
		}
		Ok(())
	}
}
