//! Default [`CopyLogParser`] implementation: parses a copy tool's textual summary footer.
//!
//! The grammar is a small subset of the common `robocopy /NP` summary block:
//!
//! ```text
//!                Total    Copied   Skipped  Mismatch    FAILED    Extras
//!     Files :      120       118         2         0         0         0
//!     Bytes :  10.5 m    10.4 m    89.2 k         0         0         0
//! ```
//!
//! Only the `Files`/`Bytes` rows are consulted; everything else is ignored. Parse failure
//! yields zero stats without affecting chunk severity, per §4.4.

use std::path::Path;
use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;

use crate::traits::{CopyLogParser, CopyLogStats};

static FILES_ROW: LazyLock<Regex> =
	LazyLock::new(|| Regex::new(r"(?i)^\s*Files\s*:\s*(\d+)\s+(\d+)\s+(\d+)").unwrap());
static BYTES_ROW: LazyLock<Regex> = LazyLock::new(|| {
	Regex::new(r"(?i)^\s*Bytes\s*:\s*([\d.]+)\s*([kmg])?\s+([\d.]+)\s*([kmg])?\s+([\d.]+)\s*([kmg])?")
		.unwrap()
});

/// Combine a number and an optional `k`/`m`/`g` suffix into a byte count (robocopy's
/// abbreviated unit style).
fn size_from_parts(number: &str, suffix: Option<&str>) -> Option<u64> {
	let base: f64 = number.parse().ok()?;
	let multiplier = match suffix.map(|s| s.to_ascii_lowercase()) {
		None => 1.0,
		Some(ref s) if s == "k" => 1024.0,
		Some(ref s) if s == "m" => 1024.0 * 1024.0,
		Some(ref s) if s == "g" => 1024.0 * 1024.0 * 1024.0,
		_ => return None,
	};
	Some((base * multiplier) as u64)
}

pub fn parse_summary(text: &str) -> CopyLogStats {
	let mut stats = CopyLogStats::default();
	let mut found_files = false;
	let mut found_bytes = false;

	for line in text.lines() {
		if let Some(caps) = FILES_ROW.captures(line) {
			stats.files_copied = caps[2].parse().unwrap_or(0);
			stats.files_skipped = caps[3].parse().unwrap_or(0);
			found_files = true;
		} else if let Some(caps) = BYTES_ROW.captures(line) {
			let copied_number = &caps[3];
			let copied_suffix = caps.get(4).map(|m| m.as_str());
			stats.bytes_copied = size_from_parts(copied_number, copied_suffix).unwrap_or(0);
			found_bytes = true;
		}
	}

	stats.parse_success = found_files && found_bytes;
	stats
}

/// Reads the per-chunk log file from disk and parses its summary footer.
pub struct SummaryLogParser;

#[async_trait]
impl CopyLogParser for SummaryLogParser {
	async fn parse(&self, log_path: &Path) -> CopyLogStats {
		match tokio::fs::read_to_string(log_path).await {
			Ok(text) => parse_summary(&text),
			Err(_) => CopyLogStats::default(),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	const SAMPLE: &str = "\
               Total    Copied   Skipped  Mismatch    FAILED    Extras
    Files :      120       118         2         0         0         0
    Bytes :  10.5 m    10.4 m    89.2 k         0         0         0
";

	#[test]
	fn parses_files_and_bytes_rows() {
		let stats = parse_summary(SAMPLE);
		assert!(stats.parse_success);
		assert_eq!(stats.files_copied, 118);
		assert_eq!(stats.files_skipped, 2);
		assert_eq!(stats.bytes_copied, (10.4 * 1024.0 * 1024.0) as u64);
	}

	#[test]
	fn missing_rows_yield_zero_stats_and_parse_failure() {
		let stats = parse_summary("nothing useful here\n");
		assert!(!stats.parse_success);
		assert_eq!(stats.files_copied, 0);
		assert_eq!(stats.bytes_copied, 0);
	}

	#[tokio::test]
	async fn unreadable_file_yields_zero_stats() {
		let parser = SummaryLogParser;
		let stats = parser.parse(Path::new("/nonexistent/does-not-exist.log")).await;
		assert_eq!(stats, CopyLogStats::default());
	}
}
