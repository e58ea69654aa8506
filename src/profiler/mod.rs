//! Directory Profiler (§4.1): turns a raw directory listing into a [`DirectoryProfile`],
//! caching by normalized path.

pub mod cache;
pub mod parser;

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::Utc;
use tracing::instrument;

use crate::error::{OrchestratorError, Result};
use crate::model::DirectoryProfile;
use crate::traits::DirectoryLister;

use cache::ProfileCache;
use parser::parse_listing;

/// Hit/miss counters exposed via [`DirectoryProfiler::statistics`].
#[derive(Debug, Default)]
pub struct ProfilerStatistics {
	hits: AtomicU64,
	misses: AtomicU64,
}

#[derive(Debug, Clone, Copy)]
pub struct StatisticsSnapshot {
	pub hits: u64,
	pub misses: u64,
	pub hit_rate_percent: f64,
	pub entry_count: usize,
}

/// Profiles directories by delegating the actual listing to an injected [`DirectoryLister`]
/// and parsing its line-oriented output; never recurses itself.
pub struct DirectoryProfiler {
	lister: Arc<dyn DirectoryLister>,
	cache: ProfileCache,
	stats: ProfilerStatistics,
}

impl DirectoryProfiler {
	pub fn new(lister: Arc<dyn DirectoryLister>) -> Self {
		Self {
			lister,
			cache: ProfileCache::new(),
			stats: ProfilerStatistics::default(),
		}
	}

	#[instrument(skip(self), fields(path = %path.display(), use_cache))]
	pub async fn profile(
		&self,
		path: &Path,
		use_cache: bool,
		max_age_hours: i64,
	) -> Result<DirectoryProfile> {
		if use_cache {
			if let Some(hit) = self.cache.get_fresh(path, max_age_hours) {
				self.stats.hits.fetch_add(1, Ordering::Relaxed);
				return Ok(hit);
			}
			self.stats.misses.fetch_add(1, Ordering::Relaxed);
		}

		let output = self
			.lister
			.list(path, true)
			.await
			.map_err(|_| OrchestratorError::Profile {
				path: path.to_path_buf(),
				source: std::io::Error::new(std::io::ErrorKind::Other, "listing failed"),
			})?;
		let totals = parse_listing(&output);
		let profile = DirectoryProfile {
			path: path.to_path_buf(),
			total_size: totals.total_size,
			file_count: totals.file_count,
			dir_count: totals.dir_count,
			last_scanned: Utc::now(),
		};
		self.cache.insert(profile.clone());
		Ok(profile)
	}

	/// Immediate subdirectories of `path` only, not recursive.
	pub async fn list_child_directories(&self, path: &Path) -> Result<Vec<PathBuf>> {
		let output = self.lister.list(path, false).await?;
		Ok(parser_child_directories(&output, path))
	}

	/// Files directly inside `path`, not recursive.
	pub async fn list_files_at_level(&self, path: &Path) -> Result<Vec<(PathBuf, u64)>> {
		let output = self.lister.list(path, false).await?;
		Ok(parser_files_at_level(&output))
	}

	pub fn statistics(&self) -> StatisticsSnapshot {
		let hits = self.stats.hits.load(Ordering::Relaxed);
		let misses = self.stats.misses.load(Ordering::Relaxed);
		let total = hits + misses;
		StatisticsSnapshot {
			hits,
			misses,
			hit_rate_percent: if total > 0 {
				100.0 * hits as f64 / total as f64
			} else {
				0.0
			},
			entry_count: self.cache.len(),
		}
	}

	pub fn clear(&self) {
		self.cache.clear();
	}

	pub fn reset_statistics(&self) {
		self.stats.hits.store(0, Ordering::Relaxed);
		self.stats.misses.store(0, Ordering::Relaxed);
	}

	pub fn invalidate(&self, path: &Path) {
		self.cache.invalidate(path);
	}
}

fn parser_child_directories(output: &str, _root: &Path) -> Vec<PathBuf> {
	output
		.lines()
		.filter_map(|line| {
			let trimmed = line.trim();
			let (size_str, rest) = trimmed.split_once(char::is_whitespace)?;
			let size: u64 = size_str.parse().ok()?;
			if size == 0 && (rest.ends_with('\\') || rest.ends_with('/')) {
				Some(PathBuf::from(rest.trim_end_matches(['\\', '/'])))
			} else {
				None
			}
		})
		.collect()
}

fn parser_files_at_level(output: &str) -> Vec<(PathBuf, u64)> {
	output
		.lines()
		.filter_map(|line| {
			let trimmed = line.trim();
			let (size_str, rest) = trimmed.split_once(char::is_whitespace)?;
			let size: u64 = size_str.parse().ok()?;
			if size > 0 || !(rest.ends_with('\\') || rest.ends_with('/')) {
				Some((PathBuf::from(rest), size))
			} else {
				None
			}
		})
		.collect()
}

#[cfg(test)]
mod tests {
	use super::*;
	use async_trait::async_trait;
	use std::sync::Mutex;

	struct FakeLister {
		output: Mutex<String>,
	}

	#[async_trait]
	impl DirectoryLister for FakeLister {
		async fn list(&self, _path: &Path, _recursive: bool) -> Result<String> {
			Ok(self.output.lock().unwrap().clone())
		}
	}

	fn fixture() -> Arc<FakeLister> {
		Arc::new(FakeLister {
			output: Mutex::new(
				"       1000   C:\\data\\a.txt\n          0   C:\\data\\sub\\\n        500   C:\\data\\b.txt\n"
					.to_string(),
			),
		})
	}

	#[tokio::test]
	async fn profile_populates_cache_and_counts_miss_then_hit() {
		let profiler = DirectoryProfiler::new(fixture());
		let path = Path::new("C:\\data");

		let first = profiler.profile(path, true, 24).await.unwrap();
		assert_eq!(first.file_count, 2);
		assert_eq!(first.total_size, 1500);
		assert_eq!(first.dir_count, 1);

		let stats_after_first = profiler.statistics();
		assert_eq!(stats_after_first.misses, 1);
		assert_eq!(stats_after_first.hits, 0);

		let second = profiler.profile(path, true, 24).await.unwrap();
		assert_eq!(second.total_size, first.total_size);
		let stats_after_second = profiler.statistics();
		assert_eq!(stats_after_second.hits, 1);
	}

	#[tokio::test]
	async fn use_cache_false_always_misses_tool() {
		let profiler = DirectoryProfiler::new(fixture());
		let path = Path::new("C:\\data");
		profiler.profile(path, true, 24).await.unwrap();
		profiler.profile(path, false, 24).await.unwrap();
		let stats = profiler.statistics();
		assert_eq!(stats.misses, 2);
	}

	#[tokio::test]
	async fn list_child_directories_returns_only_dirs() {
		let profiler = DirectoryProfiler::new(fixture());
		let dirs = profiler
			.list_child_directories(Path::new("C:\\data"))
			.await
			.unwrap();
		assert_eq!(dirs, vec![PathBuf::from("C:\\data\\sub")]);
	}

	#[tokio::test]
	async fn list_files_at_level_returns_only_files() {
		let profiler = DirectoryProfiler::new(fixture());
		let files = profiler
			.list_files_at_level(Path::new("C:\\data"))
			.await
			.unwrap();
		assert_eq!(files.len(), 2);
	}
}
