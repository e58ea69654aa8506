//! The error hierarchy surfaced by the orchestration core (§7 of the design doc).
//!
//! Every variant maps to exactly one row of the error-kind table: what triggers it, and
//! whether it aborts the run, aborts the current profile, or is recorded and retried.

use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, OrchestratorError>;

#[derive(Debug, Error, Diagnostic)]
pub enum OrchestratorError {
	/// Invalid parameter at a public entry point. Fails immediately, no state mutation.
	#[error("validation failed: {0}")]
	#[diagnostic(help("check the arguments passed to the orchestrator against their documented preconditions"))]
	Validation(String),

	/// The external list tool failed while profiling a directory.
	#[error("profiling {path} failed")]
	#[diagnostic(help("confirm the copy tool is on PATH and the source path is reachable"))]
	Profile {
		path: PathBuf,
		#[source]
		source: std::io::Error,
	},

	/// A pre-run check on a profile failed; the profile is marked Failed and the run continues.
	#[error("preflight check failed for profile '{profile}': {message}")]
	Preflight { profile: String, message: String },

	/// The copy tool's exit code mapped to Error or Fatal severity.
	#[error("copy failed for chunk {chunk_id} (exit code {exit_code}): {message}")]
	Copy {
		chunk_id: u64,
		exit_code: i32,
		message: String,
	},

	/// The copy tool's exit code indicated a file mismatch.
	#[error("mismatch detected in chunk {chunk_id}: {message}")]
	Mismatch { chunk_id: u64, message: String },

	/// Snapshot creation or deletion failed.
	#[error("snapshot operation failed: {0}")]
	#[diagnostic(help("check that the snapshot tool has permission to operate on the target volume"))]
	Snapshot(String),

	/// Consecutive chunk failures crossed the circuit breaker threshold.
	#[error("circuit breaker tripped after {consecutive_failures} consecutive failures")]
	CircuitBreakerTrip { consecutive_failures: u32 },

	/// The child copy process failed to start.
	#[error("failed to launch copy process for chunk {chunk_id}: {message}")]
	Launch { chunk_id: u64, message: String },

	#[error("I/O error")]
	Io(#[from] std::io::Error),

	#[error("failed to (de)serialize JSON")]
	Json(#[from] serde_json::Error),
}

impl OrchestratorError {
	/// Whether this error kind is fatal to the whole run, as opposed to one profile or chunk.
	///
	/// Only [`OrchestratorError::Validation`] is fatal at this granularity; everything else is
	/// recorded against a profile or chunk and the run proceeds to the next profile.
	pub fn is_run_fatal(&self) -> bool {
		matches!(self, OrchestratorError::Validation(_))
	}
}
