//! Parses the line-oriented output of a copy tool running in list-only mode (§4.1).

use std::sync::LazyLock;

use regex::Regex;

/// `^\s+<size:decimal>\s+<path>$`. Built once and reused for every parse call.
static LISTING_LINE: LazyLock<Regex> =
	LazyLock::new(|| Regex::new(r"^\s+(\d+)\s+(.+)$").expect("listing regex is valid"));

/// Accumulated counts from a directory listing (§4.1).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ListingTotals {
	pub total_size: u64,
	pub file_count: u64,
	pub dir_count: u64,
}

impl ListingTotals {
	pub fn avg_file_size(&self) -> u64 {
		if self.file_count > 0 {
			self.total_size / self.file_count
		} else {
			0
		}
	}
}

/// A directory is indicated by a zero-size line whose path ends in a separator.
fn is_directory_line(size: u64, path: &str) -> bool {
	size == 0 && (path.ends_with('\\') || path.ends_with('/'))
}

/// Parse the full stdout of a list-only copy-tool invocation. Lines that don't match the
/// expected shape are skipped silently rather than treated as errors.
pub fn parse_listing(output: &str) -> ListingTotals {
	let mut totals = ListingTotals::default();
	for line in output.lines() {
		let Some(caps) = LISTING_LINE.captures(line) else {
			continue;
		};
		let Ok(size) = caps[1].parse::<u64>() else {
			continue;
		};
		let path = &caps[2];
		if is_directory_line(size, path) {
			totals.dir_count += 1;
		} else {
			totals.file_count += 1;
			totals.total_size += size;
		}
	}
	totals
}
