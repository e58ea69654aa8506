//! Command-line arguments for the demonstration binary (§6, ambient addition), following this
//! lineage's `clap::Parser` + `lloggs::LoggingArgs` shape used throughout its daemon binaries.

use clap::Parser;
use lloggs::{LoggingArgs, PreArgs, WorkerGuard};
use miette::{miette, Result};
use tracing::debug;

/// Robocurse: chunked, supervised, snapshot-safe directory replication orchestrator.
///
/// This binary is a thin demonstration harness around the `robocurse` library: it wires up
/// either real process-backed collaborators or local filesystem fakes, runs the given profiles
/// to completion, and prints a summary table. It is not a production CLI; profile definitions,
/// credentials, and scheduling integration are a deploying host's responsibility.
#[derive(Debug, Clone, Parser)]
#[command(version, about)]
pub struct Args {
	#[command(flatten)]
	pub logging: LoggingArgs,

	/// Profiles to replicate, each as `source=>destination`.
	///
	/// Example: `C:\data=>D:\backup\data`. Every profile runs with this invocation's shared
	/// concurrency/retry/snapshot settings; per-profile tuning is a configuration-file concern
	/// out of scope for this demonstration binary.
	#[arg(required = true)]
	pub profiles: Vec<String>,

	/// Use local filesystem fakes instead of shelling out to a real copy tool / VSS-equivalent.
	///
	/// Intended for exercising the orchestrator on a development machine without the external
	/// binaries a production deployment would provide.
	#[arg(long)]
	pub fake: bool,

	/// Take a point-in-time snapshot of each source before copying (§4.6).
	///
	/// Requires a real snapshot tool on PATH unless `--fake` is also given.
	#[arg(long)]
	pub snapshot: bool,

	/// Recurse into subdirectories, splitting large ones into chunks (Smart mode). Without
	/// this, each profile is copied as a single Flat-mode chunk.
	#[arg(long)]
	pub smart: bool,

	/// Maximum concurrent copy jobs.
	#[arg(long, default_value_t = 4)]
	pub max_concurrent: u32,

	/// Path to the copy tool binary (ignored with `--fake`).
	#[arg(long, default_value = "robocopy")]
	pub copy_tool_path: String,

	/// Path to the snapshot tool binary (ignored with `--fake`).
	#[arg(long, default_value = "vshadow")]
	pub snapshot_tool_path: String,

	/// Directory for per-chunk copy logs.
	#[arg(long, default_value = "./logs")]
	pub log_directory: String,

	/// Path to the health-status JSON file.
	#[arg(long, default_value = "./robocurse-health.json")]
	pub health_file: String,

	/// Path to the snapshot-tracking JSON file.
	#[arg(long, default_value = "./robocurse-snapshots.json")]
	pub snapshot_tracking_file: String,
}

impl Args {
	/// Split `source=>destination` pairs, failing fast on anything malformed (§6's
	/// "positional source:destination pairs"; `=>` is used in place of a bare colon to avoid
	/// ambiguity with Windows drive-letter paths like `C:\data`).
	pub fn parse_profile_pairs(&self) -> Result<Vec<(String, String)>> {
		self.profiles
			.iter()
			.map(|raw| {
				raw.split_once("=>")
					.map(|(source, destination)| (source.trim().to_string(), destination.trim().to_string()))
					.ok_or_else(|| miette!("profile '{raw}' is not in 'source=>destination' form"))
			})
			.collect()
	}
}

pub fn get_args() -> Result<(Args, WorkerGuard)> {
	let log_guard = PreArgs::parse().setup().map_err(|err| miette!("{err}"))?;

	debug!("parsing arguments");
	let args = Args::parse();

	let log_guard = match log_guard {
		Some(guard) => guard,
		None => args
			.logging
			.setup(|v| match v {
				0 => "robocurse=info",
				1 => "info,robocurse=debug",
				2 => "debug",
				3 => "debug,robocurse=trace",
				_ => "trace",
			})
			.map_err(|err| miette!("{err}"))?,
	};

	debug!(?args, "got arguments");
	Ok((args, log_guard))
}
