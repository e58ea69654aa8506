//! Scheduler / Tick Loop (§4.3): the concurrent job scheduler driving chunks through copy
//! subprocesses, retries, and the circuit breaker.

pub mod retry;
pub mod severity;
pub mod worker;

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use tokio::sync::mpsc;
use tracing::{debug, error, info, instrument, warn};

use crate::config::OrchestratorConfig;
use crate::error::{OrchestratorError, Result};
use crate::model::{Chunk, ChunkStatus, MismatchSeverity, Severity};
use crate::progress::ProgressTracker;

use retry::{backoff_delay_seconds, retry_after, CircuitBreaker};
use worker::CopyWorker;

/// Messages the controlling task may send into a running scheduler loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlMessage {
	Pause,
	Resume,
	Stop,
}

struct ActiveEntry {
	job: crate::traits::Job,
	chunk: Chunk,
}

/// What happened during one call to [`Scheduler::tick`], useful for tests driving individual
/// ticks deterministically.
#[derive(Debug, Default)]
pub struct TickReport {
	pub harvested: u32,
	pub launched: u32,
	pub stopped: bool,
}

/// Drives chunks to completion. All shared state is either an atomic or a `std::sync::Mutex`
/// never held across an `.await` (§5) — the controller harvests with non-blocking
/// `Child::try_wait()`, never `Child::wait()`.
pub struct Scheduler {
	config: Arc<OrchestratorConfig>,
	worker: Arc<CopyWorker>,
	progress: Arc<ProgressTracker>,
	mismatch_override: Option<MismatchSeverity>,

	chunk_queue: Mutex<VecDeque<Chunk>>,
	active_jobs: Mutex<HashMap<u64, ActiveEntry>>,
	completed_chunks: Mutex<Vec<Chunk>>,
	warning_chunks: Mutex<Vec<Chunk>>,
	failed_chunks: Mutex<Vec<Chunk>>,
	error_messages: Mutex<Vec<String>>,

	circuit_breaker: CircuitBreaker,
	stop_requested: AtomicBool,
	pause_requested: AtomicBool,
}

impl Scheduler {
	pub fn new(
		config: Arc<OrchestratorConfig>,
		worker: Arc<CopyWorker>,
		progress: Arc<ProgressTracker>,
		mismatch_override: Option<MismatchSeverity>,
	) -> Self {
		let threshold = config.circuit_breaker_threshold;
		Self {
			config,
			worker,
			progress,
			mismatch_override,
			chunk_queue: Mutex::new(VecDeque::new()),
			active_jobs: Mutex::new(HashMap::new()),
			completed_chunks: Mutex::new(Vec::new()),
			warning_chunks: Mutex::new(Vec::new()),
			failed_chunks: Mutex::new(Vec::new()),
			error_messages: Mutex::new(Vec::new()),
			circuit_breaker: CircuitBreaker::new(threshold),
			stop_requested: AtomicBool::new(false),
			pause_requested: AtomicBool::new(false),
		}
	}

	pub fn enqueue(&self, chunks: impl IntoIterator<Item = Chunk>) {
		let mut queue = self.chunk_queue.lock().expect("chunk queue poisoned");
		queue.extend(chunks);
	}

	pub fn request_stop(&self) {
		self.stop_requested.store(true, Ordering::Release);
	}

	pub fn request_pause(&self) {
		self.pause_requested.store(true, Ordering::Release);
	}

	pub fn request_resume(&self) {
		self.pause_requested.store(false, Ordering::Release);
	}

	pub fn is_stop_requested(&self) -> bool {
		self.stop_requested.load(Ordering::Acquire)
	}

	pub fn queue_len(&self) -> usize {
		self.chunk_queue.lock().expect("chunk queue poisoned").len()
	}

	pub fn active_count(&self) -> usize {
		self.active_jobs.lock().expect("active jobs poisoned").len()
	}

	pub fn completed_count(&self) -> usize {
		self.completed_chunks.lock().expect("completed chunks poisoned").len()
	}

	pub fn failed_count(&self) -> usize {
		self.failed_chunks.lock().expect("failed chunks poisoned").len()
	}

	pub fn warning_count(&self) -> usize {
		self.warning_chunks.lock().expect("warning chunks poisoned").len()
	}

	pub fn take_error_messages(&self) -> Vec<String> {
		std::mem::take(&mut self.error_messages.lock().expect("error messages poisoned"))
	}

	/// In-flight byte estimate across currently active jobs, for [`ProgressTracker::bytes_complete`].
	/// Best-effort: an unreadable log contributes 0 rather than erroring.
	pub async fn in_flight_bytes(&self) -> u64 {
		let paths: Vec<_> = {
			let active = self.active_jobs.lock().expect("active jobs poisoned");
			active.values().map(|entry| entry.job.log_path.clone()).collect()
		};
		let mut total = 0u64;
		for path in paths {
			total = total.saturating_add(self.worker.peek_in_flight_bytes(&path).await);
		}
		total
	}

	/// One scheduler tick, per the four steps of §4.3.
	#[instrument(skip(self))]
	pub async fn tick(&self, max_concurrent: u32) -> Result<TickReport> {
		if !(1..=128).contains(&max_concurrent) {
			return Err(OrchestratorError::Validation(format!(
				"max_concurrent must be in [1, 128], got {max_concurrent}"
			)));
		}

		let mut report = TickReport::default();

		if self.is_stop_requested() {
			self.stop_all_jobs().await;
			report.stopped = true;
			return Ok(report);
		}

		report.harvested = self.harvest().await;
		report.launched = self.launch(max_concurrent).await?;

		Ok(report)
	}

	async fn harvest(&self) -> u32 {
		let finished: Vec<(u64, i32)> = {
			let mut active = self.active_jobs.lock().expect("active jobs poisoned");
			let mut finished = Vec::new();
			for (chunk_id, entry) in active.iter_mut() {
				match entry.job.child.try_wait() {
					Ok(Some(status)) => finished.push((*chunk_id, status.code().unwrap_or(-1))),
					Ok(None) => {}
					Err(err) => {
						warn!(chunk_id, error = %err, "failed to poll job status, treating as finished");
						finished.push((*chunk_id, -1));
					}
				}
			}
			finished
		};

		for (chunk_id, exit_code) in &finished {
			let entry = {
				let mut active = self.active_jobs.lock().expect("active jobs poisoned");
				active.remove(chunk_id)
			};
			let Some(mut entry) = entry else { continue };
			let outcome = self
				.worker
				.complete(entry.job, *exit_code, self.mismatch_override)
				.await;
			self.handle_completion(&mut entry.chunk, outcome).await;
		}

		finished.len() as u32
	}

	async fn handle_completion(&self, chunk: &mut Chunk, outcome: worker::ChunkOutcome) {
		self.progress.add_completed_bytes(outcome.bytes_copied);
		self.progress.add_files_copied(outcome.files_copied);
		self.progress.add_files_skipped(outcome.files_skipped);

		match outcome.exit_meaning.severity {
			Severity::Success => {
				chunk.status = ChunkStatus::Complete;
				self.circuit_breaker.reset_on_success();
				self.progress.increment_chunks_complete();
				self.completed_chunks.lock().expect("completed chunks poisoned").push(chunk.clone());
				debug!(chunk_id = chunk.id, "chunk complete");
			}
			Severity::Warning => {
				chunk.status = ChunkStatus::Warning;
				self.progress.increment_chunks_complete();
				self.warning_chunks.lock().expect("warning chunks poisoned").push(chunk.clone());
				warn!(chunk_id = chunk.id, message = %outcome.exit_meaning.message, "chunk completed with warning");
			}
			Severity::Error | Severity::Fatal => {
				self.on_failed_chunk(chunk, outcome).await;
			}
		}
	}

	/// `HandleFailedChunk` (§4.5): retry with backoff, or give up and record.
	async fn on_failed_chunk(&self, chunk: &mut Chunk, outcome: worker::ChunkOutcome) {
		if let Some(trip_message) = self.circuit_breaker.record_failure(chunk.id, &outcome.exit_meaning.message) {
			error!(message = %trip_message, "circuit breaker tripped");
			self.request_stop();
			self.error_messages.lock().expect("error messages poisoned").push(trip_message);
		}

		if !outcome.exit_meaning.should_retry {
			self.fail_chunk(chunk, &outcome.exit_meaning.message);
			return;
		}

		chunk.retry_count += 1;
		if chunk.retry_count >= self.config.max_chunk_retries {
			self.fail_chunk(chunk, &outcome.exit_meaning.message);
			return;
		}

		let delay = backoff_delay_seconds(
			chunk.retry_count,
			self.config.backoff_base_seconds,
			self.config.backoff_multiplier,
			self.config.backoff_max_seconds,
		);
		chunk.retry_after = Some(retry_after(Utc::now(), delay));
		debug!(chunk_id = chunk.id, retry_count = chunk.retry_count, delay, "retrying chunk after backoff");
		self.chunk_queue.lock().expect("chunk queue poisoned").push_back(chunk.clone());
	}

	fn fail_chunk(&self, chunk: &mut Chunk, message: &str) {
		chunk.status = ChunkStatus::Failed;
		error!(chunk_id = chunk.id, message, "chunk failed permanently");
		self.failed_chunks.lock().expect("failed chunks poisoned").push(chunk.clone());
		self.error_messages
			.lock()
			.expect("error messages poisoned")
			.push(format!("chunk {} failed: {}", chunk.id, message));
	}

	async fn launch(&self, max_concurrent: u32) -> Result<u32> {
		let mut launched = 0;
		loop {
			if self.pause_requested.load(Ordering::Acquire) {
				break;
			}
			if self.active_count() >= max_concurrent as usize {
				break;
			}

			let next = {
				let mut queue = self.chunk_queue.lock().expect("chunk queue poisoned");
				queue.pop_front()
			};
			let Some(mut chunk) = next else { break };

			if let Some(retry_after) = chunk.retry_after {
				if retry_after > Utc::now() {
					self.chunk_queue.lock().expect("chunk queue poisoned").push_back(chunk);
					break;
				}
			}

			match self.worker.start(&chunk).await {
				Ok(Some(job)) => {
					chunk.status = ChunkStatus::Running;
					self.active_jobs
						.lock()
						.expect("active jobs poisoned")
						.insert(chunk.id, ActiveEntry { job, chunk: chunk.clone() });
					launched += 1;
					info!(chunk_id = chunk.id, "launched copy job");
				}
				Ok(None) | Err(_) => {
					chunk.retry_count += 1;
					if chunk.retry_count >= self.config.max_chunk_retries {
						self.fail_chunk(&mut chunk, "failed to launch copy process");
					} else {
						self.chunk_queue.lock().expect("chunk queue poisoned").push_back(chunk);
					}
				}
			}
		}
		Ok(launched)
	}

	/// `StopAllJobs`: kill every active process. A kill failing because the process already
	/// exited is swallowed; any other failure is logged but does not block removal.
	pub async fn stop_all_jobs(&self) {
		let mut active = self.active_jobs.lock().expect("active jobs poisoned");
		for (chunk_id, entry) in active.iter_mut() {
			match entry.job.child.kill().await {
				Ok(()) => {}
				Err(err)
					if matches!(
						err.kind(),
						std::io::ErrorKind::InvalidInput | std::io::ErrorKind::NotFound
					) =>
				{
					// Already exited; not an error per §4.3.
				}
				Err(err) => {
					error!(chunk_id, error = %err, "failed to kill active job");
				}
			}
		}
		active.clear();
	}

	/// Drives `tick()` on a fixed-period `tokio::time::interval`, selecting against a control
	/// channel carrying Pause/Resume/Stop, in this lineage's daemon-loop shape.
	pub async fn run(
		&self,
		mut control_rx: mpsc::Receiver<ControlMessage>,
		max_concurrent: u32,
		tick_period: Duration,
	) -> Result<()> {
		let mut interval = tokio::time::interval(tick_period);
		interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

		loop {
			tokio::select! {
				_ = interval.tick() => {
					let report = self.tick(max_concurrent).await?;
					if report.stopped {
						break;
					}
				}
				msg = control_rx.recv() => {
					match msg {
						Some(ControlMessage::Pause) => self.request_pause(),
						Some(ControlMessage::Resume) => self.request_resume(),
						Some(ControlMessage::Stop) | None => {
							self.request_stop();
						}
					}
				}
			}

			if self.is_stop_requested() && self.active_count() == 0 && self.queue_len() == 0 {
				break;
			}
		}
		Ok(())
	}
}
