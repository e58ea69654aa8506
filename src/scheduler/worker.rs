//! Copy Worker (§4.4): launches copy-tool subprocesses and interprets their completion.

use std::path::PathBuf;
use std::time::Duration;

use tracing::{instrument, warn};

use crate::error::Result;
use crate::model::{Chunk, MismatchSeverity};
use crate::traits::{CopyLogParser, CopyToolLauncher, ExitMeaning};

use super::severity::classify;

/// The fixed whitelist of copy-tool switches the scheduler is permitted to pass through.
/// Destructive switches (e.g. purge-destination-extras) are intentionally absent.
const ARG_WHITELIST_PREFIXES: &[&str] = &[
	"/COPY:", "/R:", "/W:", "/B", "/ZB", "/MAXAGE:", "/MINAGE:", "/MAX:", "/MIN:", "/LEV:", "/SEC",
	"/J", "/E", "/S", "/MT:", "/Z", "/IPG:",
];

/// Check a single copy-tool argument against the fixed whitelist (§4.4).
pub fn is_whitelisted(arg: &str) -> bool {
	ARG_WHITELIST_PREFIXES
		.iter()
		.any(|prefix| arg.eq_ignore_ascii_case(prefix) || arg.to_ascii_uppercase().starts_with(prefix))
}

/// Result of running a chunk's copy process to completion, plus the severity verdict.
#[derive(Debug, Clone)]
pub struct ChunkOutcome {
	pub chunk_id: u64,
	pub exit_code: i32,
	pub exit_meaning: ExitMeaning,
	pub files_copied: u64,
	pub bytes_copied: u64,
	pub files_skipped: u64,
	pub duration: Duration,
}

/// Drives a single chunk's subprocess from launch to harvested completion, composing the
/// injected [`CopyToolLauncher`] and [`CopyLogParser`] collaborators.
pub struct CopyWorker {
	launcher: std::sync::Arc<dyn CopyToolLauncher>,
	log_parser: std::sync::Arc<dyn CopyLogParser>,
	log_directory: PathBuf,
}

impl CopyWorker {
	pub fn new(
		launcher: std::sync::Arc<dyn CopyToolLauncher>,
		log_parser: std::sync::Arc<dyn CopyLogParser>,
		log_directory: PathBuf,
	) -> Self {
		Self {
			launcher,
			log_parser,
			log_directory,
		}
	}

	/// Validate a chunk's extra args against the whitelist before handing it to the launcher.
	/// Matches §4.4: "any argument failing whitelist validation causes the job launch to fail."
	pub fn sanitize(&self, chunk: &Chunk) -> Result<()> {
		for arg in &chunk.extra_copy_args {
			if !is_whitelisted(arg) {
				return Err(crate::error::OrchestratorError::Launch {
					chunk_id: chunk.id,
					message: format!("argument '{arg}' is not in the copy-tool whitelist"),
				});
			}
		}
		Ok(())
	}

	#[instrument(skip(self, chunk), fields(chunk_id = chunk.id))]
	pub async fn start(&self, chunk: &Chunk) -> Result<Option<crate::traits::Job>> {
		self.sanitize(chunk)?;
		self.launcher.start(chunk, &self.log_directory).await
	}

	/// Best-effort peek at a still-running job's log for in-flight byte estimates (§4.7).
	/// Returns 0 if the log is not yet readable or not yet parseable.
	pub async fn peek_in_flight_bytes(&self, log_path: &std::path::Path) -> u64 {
		self.log_parser.parse(log_path).await.bytes_copied
	}

	/// Interpret a harvested job's exit code and parsed log, producing the chunk's outcome.
	#[instrument(skip(self, job), fields(chunk_id = job.chunk_id))]
	pub async fn complete(
		&self,
		job: crate::traits::Job,
		exit_code: i32,
		mismatch_override: Option<MismatchSeverity>,
	) -> ChunkOutcome {
		let exit_meaning = classify(exit_code, mismatch_override);
		let duration = chrono::Utc::now()
			.signed_duration_since(job.started_at)
			.to_std()
			.unwrap_or_default();
		let stats = self.log_parser.parse(&job.log_path).await;
		if !stats.parse_success {
			warn!(chunk_id = job.chunk_id, log_path = %job.log_path.display(), "copy log parse failed, reporting zero stats");
		}
		ChunkOutcome {
			chunk_id: job.chunk_id,
			exit_code,
			exit_meaning,
			files_copied: stats.files_copied,
			bytes_copied: stats.bytes_copied,
			files_skipped: stats.files_skipped,
			duration,
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn accepts_known_switches() {
		assert!(is_whitelisted("/COPY:DAT"));
		assert!(is_whitelisted("/LEV:1"));
		assert!(is_whitelisted("/E"));
		assert!(is_whitelisted("/MT:8"));
	}

	#[test]
	fn rejects_purge_style_switches() {
		assert!(!is_whitelisted("/PURGE"));
		assert!(!is_whitelisted("/MIR"));
	}
}
