mod args;

use std::sync::Arc;

use miette::{miette, IntoDiagnostic, Result};
use robocurse::model::{MismatchSeverity, Profile, ProfileStatus, ScanMode};
use robocurse::{Collaborators, Orchestrator, OrchestratorConfig};

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

fn main() -> Result<()> {
	tokio::runtime::Builder::new_multi_thread()
		.enable_all()
		.build()
		.into_diagnostic()?
		.block_on(run())
}

async fn run() -> Result<()> {
	let (args, _guard) = args::get_args()?;
	let pairs = args.parse_profile_pairs()?;

	let config = OrchestratorConfig {
		max_concurrent_jobs: args.max_concurrent,
		copy_tool_path: args.copy_tool_path.clone().into(),
		snapshot_tool_path: args.snapshot_tool_path.clone().into(),
		log_directory: args.log_directory.clone().into(),
		health_file: args.health_file.clone().into(),
		snapshot_tracking_file: args.snapshot_tracking_file.clone().into(),
		..OrchestratorConfig::default()
	};
	config.validate().map_err(|err| miette!("{err}"))?;

	let collaborators = build_collaborators(&args);
	let orchestrator =
		Orchestrator::new(config, collaborators).map_err(|err| miette!("{err}"))?;

	let orphans_removed = orchestrator
		.sweep_orphaned_snapshots()
		.await
		.map_err(|err| miette!("{err}"))?;
	if orphans_removed > 0 {
		println!("swept {orphans_removed} orphaned snapshot(s) from a prior run");
	}

	let scan_mode = if args.smart { ScanMode::Smart } else { ScanMode::Flat };
	let mut results = Vec::with_capacity(pairs.len());
	for (index, (source, destination)) in pairs.into_iter().enumerate() {
		let profile = Profile::new(
			format!("profile-{index}"),
			source,
			destination,
			args.snapshot,
			scan_mode,
			1024 * 1024 * 1024,
			50_000,
			8,
			1024 * 1024,
			Some(MismatchSeverity::Warning),
		)
		.map_err(|err| miette!("{err}"))?;

		let result = orchestrator.start_replication_run(&profile).await;
		results.push(result);
	}

	print_summary(&results);
	println!("health file: {}", args.health_file);

	if results.iter().any(|r| r.status == ProfileStatus::Failed) {
		std::process::exit(1);
	}
	Ok(())
}

fn build_collaborators(args: &args::Args) -> Collaborators {
	if args.fake {
		Collaborators {
			directory_lister: Arc::new(robocurse::fakes::FilesystemLister),
			copy_tool_launcher: Arc::new(robocurse::fakes::FilesystemCopyLauncher),
			copy_log_parser: Arc::new(robocurse::fakes::FakeSummaryLogParser),
			snapshot_provider: Some(Arc::new(robocurse::fakes::NullSnapshotProvider::new())),
			junction_provider: Some(Arc::new(robocurse::fakes::SymlinkJunctionProvider)),
		}
	} else {
		Collaborators {
			directory_lister: Arc::new(robocurse::process::CopyToolLister::new(&args.copy_tool_path)),
			copy_tool_launcher: Arc::new(robocurse::process::CopyToolProcessLauncher::new(&args.copy_tool_path)),
			copy_log_parser: Arc::new(robocurse::logparser::SummaryLogParser),
			snapshot_provider: Some(Arc::new(robocurse::process::ShellSnapshotProvider::new(
				&args.snapshot_tool_path,
			))),
			junction_provider: Some(Arc::new(robocurse::process::MklinkJunctionProvider::new(
				&args.snapshot_tool_path,
			))),
		}
	}
}

fn print_summary(results: &[robocurse::model::ProfileResult]) {
	println!(
		"{:<16} {:<9} {:>9} {:>9} {:>12} {:>10}",
		"PROFILE", "STATUS", "CHUNKS", "FAILED", "BYTES", "SKIPPED"
	);
	for result in results {
		println!(
			"{:<16} {:<9} {:>9} {:>9} {:>12} {:>10}",
			result.name,
			format!("{:?}", result.status),
			result.chunks_complete,
			result.chunks_failed,
			result.bytes_copied,
			result.files_skipped,
		);
		if let Some(message) = &result.preflight_error {
			println!("  preflight error: {message}");
		}
		for error in &result.errors {
			println!("  error: {error}");
		}
	}
}
