//! Robocurse orchestration core: plans, schedules, and supervises a chunked replication run
//! against a native copy tool, with snapshot-safe source access and progress/health reporting.
//!
//! This crate is a library; [`Orchestrator`] is the explicit handle a host binary constructs
//! once per process and drives through one or more [`model::Profile`]s. See `src/main.rs` for
//! a thin demonstration binary wiring it to real or fake collaborators.

pub mod config;
pub mod error;
pub mod fakes;
pub mod logparser;
pub mod model;
pub mod planner;
pub mod process;
pub mod profiler;
pub mod progress;
pub mod scheduler;
pub mod snapshot;
pub mod traits;

use std::sync::Arc;

use tracing::{info, instrument, warn};
use uuid::Uuid;

pub use config::OrchestratorConfig;
pub use error::{OrchestratorError, Result};

use model::{Phase, Profile, ProfileResult, ProfileStatus};
use planner::{ChunkPlanner, PlanParams};
use profiler::DirectoryProfiler;
use progress::ProgressTracker;
use scheduler::worker::CopyWorker;
use scheduler::Scheduler;
use snapshot::SnapshotManager;
use traits::{CopyLogParser, CopyToolLauncher, DirectoryLister, JunctionProvider, SnapshotProvider};

/// The explicit, dependency-injected orchestration handle (§3, §9 "global mutable state →
/// explicit handle"). One value is constructed per run; all former module-level globals are
/// fields here instead.
pub struct Orchestrator {
	config: Arc<OrchestratorConfig>,
	session_id: Uuid,
	profiler: Arc<DirectoryProfiler>,
	planner: ChunkPlanner,
	worker: Arc<CopyWorker>,
	snapshot_manager: Option<SnapshotManager>,
	progress: Arc<ProgressTracker>,
	phase: std::sync::Mutex<Phase>,
	current_scheduler: std::sync::Mutex<Option<Arc<Scheduler>>>,
	current_total_bytes: std::sync::atomic::AtomicU64,
}

/// Every injected collaborator the orchestrator needs. Grouped into one struct so
/// `Orchestrator::new` doesn't take an unwieldy parameter list.
pub struct Collaborators {
	pub directory_lister: Arc<dyn DirectoryLister>,
	pub copy_tool_launcher: Arc<dyn CopyToolLauncher>,
	pub copy_log_parser: Arc<dyn CopyLogParser>,
	pub snapshot_provider: Option<Arc<dyn SnapshotProvider>>,
	pub junction_provider: Option<Arc<dyn JunctionProvider>>,
}

impl Orchestrator {
	pub fn new(config: OrchestratorConfig, collaborators: Collaborators) -> Result<Self> {
		config
			.validate()
			.map_err(OrchestratorError::Validation)?;

		let config = Arc::new(config);
		let session_id = Uuid::new_v4();
		let profiler = Arc::new(DirectoryProfiler::new(collaborators.directory_lister));
		let planner = ChunkPlanner::new(profiler.clone(), config.cache_max_age_hours);
		let worker = Arc::new(CopyWorker::new(
			collaborators.copy_tool_launcher,
			collaborators.copy_log_parser,
			config.log_directory.clone(),
		));
		let progress = Arc::new(ProgressTracker::new(config.health_file.clone(), session_id));

		let snapshot_manager = match (collaborators.snapshot_provider, collaborators.junction_provider) {
			(Some(sp), Some(jp)) => Some(SnapshotManager::new(
				sp,
				jp,
				config.snapshot_tracking_file.clone(),
				session_id,
				config.snapshot_retry_count,
				config.snapshot_retry_delay_seconds,
			)),
			_ => None,
		};

		Ok(Self {
			config,
			session_id,
			profiler,
			planner,
			worker,
			snapshot_manager,
			progress,
			phase: std::sync::Mutex::new(Phase::Idle),
			current_scheduler: std::sync::Mutex::new(None),
			current_total_bytes: std::sync::atomic::AtomicU64::new(0),
		})
	}

	/// A point-in-time status snapshot (§4.7). `None` while idle between runs.
	pub async fn status(&self) -> Option<progress::StatusSnapshot> {
		let scheduler = self.current_scheduler.lock().expect("scheduler lock poisoned").clone()?;
		let in_flight = scheduler.in_flight_bytes().await;
		let total_bytes = self.current_total_bytes.load(std::sync::atomic::Ordering::Relaxed);
		Some(
			self.progress
				.status(self.phase(), total_bytes, in_flight, chrono::Utc::now()),
		)
	}

	pub fn session_id(&self) -> Uuid {
		self.session_id
	}

	fn set_phase(&self, phase: Phase) {
		*self.phase.lock().expect("phase lock poisoned") = phase;
	}

	pub fn phase(&self) -> Phase {
		*self.phase.lock().expect("phase lock poisoned")
	}

	/// Run a crash-resilient sweep of orphaned snapshots left behind by a prior process. A
	/// no-op if this orchestrator was not constructed with snapshot collaborators.
	#[instrument(skip(self))]
	pub async fn sweep_orphaned_snapshots(&self) -> Result<usize> {
		match &self.snapshot_manager {
			Some(manager) => manager.sweep_orphans().await,
			None => Ok(0),
		}
	}

	/// Plan, schedule, and run a single profile to completion, wrapped in a snapshot if
	/// `profile.use_snapshot` and a manager was configured.
	#[instrument(skip(self, profile), fields(profile = %profile.name))]
	pub async fn start_replication_run(&self, profile: &Profile) -> ProfileResult {
		self.set_phase(Phase::Scanning);
		self.progress.set_current_profile(Some(profile.name.clone()));
		info!(profile = %profile.name, "starting replication run");

		let start = std::time::Instant::now();
		let outcome = if profile.use_snapshot {
			match &self.snapshot_manager {
				Some(manager) => {
					let source = profile.source.clone();
					manager
						.with_snapshot(&source, |rewritten| {
							let rewritten_profile = Profile {
								source: rewritten,
								..profile.clone()
							};
							async move { Ok(self.run_profile(&rewritten_profile).await) }
						})
						.await
						.unwrap_or_else(|err| self.preflight_failure(profile, &err.to_string()))
				}
				None => self.preflight_failure(
					profile,
					"profile requested a snapshot but no snapshot collaborators were configured",
				),
			}
		} else {
			self.run_profile(profile).await
		};

		self.set_phase(Phase::Complete);
		info!(profile = %profile.name, status = ?outcome.status, duration = ?start.elapsed(), "replication run finished");
		outcome
	}

	fn preflight_failure(&self, profile: &Profile, message: &str) -> ProfileResult {
		warn!(profile = %profile.name, message, "preflight failed");
		ProfileResult {
			name: profile.name.clone(),
			status: ProfileStatus::Failed,
			chunks_complete: 0,
			chunks_failed: 0,
			bytes_copied: 0,
			files_copied: 0,
			files_skipped: 0,
			duration: std::time::Duration::ZERO,
			errors: vec![message.to_string()],
			preflight_error: Some(message.to_string()),
		}
	}

	async fn run_profile(&self, profile: &Profile) -> ProfileResult {
		let start = std::time::Instant::now();

		let chunks = match self
			.planner
			.plan(PlanParams {
				path: &profile.source,
				dest_root: &profile.destination,
				max_bytes: profile.chunk_max_bytes,
				max_files: profile.chunk_max_files,
				max_depth: profile.chunk_max_depth,
				min_bytes: profile.chunk_min_bytes,
				scan_mode: profile.scan_mode,
			})
			.await
		{
			Ok(chunks) => chunks,
			Err(err) => return self.preflight_failure(profile, &err.to_string()),
		};

		self.set_phase(Phase::Replicating);
		let total_bytes: u64 = chunks.iter().map(|c| c.estimated_size).sum();
		self.current_total_bytes
			.store(total_bytes, std::sync::atomic::Ordering::Relaxed);
		self.progress.start_run(chunks.len() as u64, chrono::Utc::now());

		let scheduler = Arc::new(Scheduler::new(
			self.config.clone(),
			self.worker.clone(),
			self.progress.clone(),
			profile.mismatch_severity,
		));
		scheduler.enqueue(chunks);
		*self.current_scheduler.lock().expect("scheduler lock poisoned") = Some(scheduler.clone());

		let mut force_health_write = true;
		while scheduler.queue_len() > 0 || scheduler.active_count() > 0 {
			scheduler.tick(self.config.max_concurrent_jobs).await.ok();
			let tripped = scheduler.is_stop_requested();
			let healthy = progress::is_healthy(Phase::Replicating, tripped);
			self.progress
				.write_health(
					Phase::Replicating,
					healthy,
					"replicating",
					self.config.health_check_interval_seconds,
					force_health_write,
					chrono::Utc::now(),
				)
				.await
				.ok();
			force_health_write = false;
			if tripped {
				break;
			}
			tokio::time::sleep(std::time::Duration::from_millis(200)).await;
		}

		*self.current_scheduler.lock().expect("scheduler lock poisoned") = None;
		let errors = scheduler.take_error_messages();
		let chunks_failed = scheduler.failed_count() as u64;
		let status = if chunks_failed > 0 {
			ProfileStatus::Failed
		} else if scheduler.warning_count() > 0 {
			ProfileStatus::Warning
		} else {
			ProfileStatus::Success
		};

		ProfileResult {
			name: profile.name.clone(),
			status,
			chunks_complete: scheduler.completed_count() as u64,
			chunks_failed,
			bytes_copied: self.progress.completed_bytes(),
			files_copied: self.progress.files_copied(),
			files_skipped: self.progress.files_skipped(),
			duration: start.elapsed(),
			errors,
			preflight_error: None,
		}
	}
}
