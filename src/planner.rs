//! Chunk Planner (§4.2): splits a source tree into size-bounded [`Chunk`]s.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tracing::instrument;

use crate::error::{OrchestratorError, Result};
use crate::model::{normalize_path, Chunk, ChunkKind, ChunkStatus, ScanMode};
use crate::profiler::DirectoryProfiler;

pub struct PlanParams<'a> {
	pub path: &'a Path,
	pub dest_root: &'a Path,
	pub max_bytes: u64,
	pub max_files: u64,
	pub max_depth: u32,
	pub min_bytes: u64,
	pub scan_mode: ScanMode,
}

/// Plans replication chunks by recursively profiling directories and applying the acceptance
/// predicate from §4.2. Owns the run-scoped chunk id counter.
pub struct ChunkPlanner {
	profiler: Arc<DirectoryProfiler>,
	next_id: AtomicU64,
	cache_max_age_hours: i64,
}

impl ChunkPlanner {
	pub fn new(profiler: Arc<DirectoryProfiler>, cache_max_age_hours: i64) -> Self {
		Self {
			profiler,
			next_id: AtomicU64::new(1),
			cache_max_age_hours,
		}
	}

	/// Ids restart from 1 after a fresh `ChunkPlanner` (§8 Testable Property 2).
	fn next_chunk_id(&self) -> u64 {
		self.next_id.fetch_add(1, Ordering::Relaxed)
	}

	#[instrument(skip(self, params), fields(path = %params.path.display()))]
	pub async fn plan(&self, params: PlanParams<'_>) -> Result<Vec<Chunk>> {
		if params.path.as_os_str().is_empty() {
			return Err(OrchestratorError::Validation("plan path must not be empty".into()));
		}
		if params.dest_root.as_os_str().is_empty() {
			return Err(OrchestratorError::Validation(
				"plan destination root must not be empty".into(),
			));
		}
		if params.max_bytes <= params.min_bytes {
			return Err(OrchestratorError::Validation(
				"max_bytes must be greater than min_bytes".into(),
			));
		}
		if params.max_files < 1 {
			return Err(OrchestratorError::Validation("max_files must be at least 1".into()));
		}

		match params.scan_mode {
			ScanMode::Flat => Ok(vec![self.flat_chunk(params.path, params.dest_root).await?]),
			ScanMode::Smart => {
				self.plan_recursive(
					params.path,
					params.path,
					params.dest_root,
					0,
					params.max_bytes,
					params.max_files,
					params.max_depth,
					params.min_bytes,
				)
				.await
			}
		}
	}

	async fn flat_chunk(&self, path: &Path, dest_root: &Path) -> Result<Chunk> {
		let profile = self.profiler.profile(path, true, self.cache_max_age_hours).await?;
		Ok(Chunk {
			id: self.next_chunk_id(),
			kind: ChunkKind::Recursive,
			source: path.to_path_buf(),
			destination: map_dest(path, path, dest_root),
			estimated_size: profile.total_size,
			estimated_files: profile.file_count,
			extra_copy_args: Vec::new(),
			status: ChunkStatus::Pending,
			retry_count: 0,
			retry_after: None,
		})
	}

	#[allow(clippy::too_many_arguments)]
	fn plan_recursive<'a>(
		&'a self,
		dir: &'a Path,
		source_root: &'a Path,
		dest_root: &'a Path,
		depth: u32,
		max_bytes: u64,
		max_files: u64,
		max_depth: u32,
		min_bytes: u64,
	) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<Vec<Chunk>>> + Send + 'a>> {
		Box::pin(async move {
			let profile = self
				.profiler
				.profile(dir, true, self.cache_max_age_hours)
				.await?;
			let children = self.profiler.list_child_directories(dir).await?;

			let accept = depth >= max_depth
				|| profile.total_size <= min_bytes
				|| (profile.total_size <= max_bytes && profile.file_count <= max_files)
				|| children.is_empty();

			if accept {
				return Ok(vec![Chunk {
					id: self.next_chunk_id(),
					kind: ChunkKind::Recursive,
					source: dir.to_path_buf(),
					destination: map_dest(dir, source_root, dest_root),
					estimated_size: profile.total_size,
					estimated_files: profile.file_count,
					extra_copy_args: Vec::new(),
					status: ChunkStatus::Pending,
					retry_count: 0,
					retry_after: None,
				}]);
			}

			let mut chunks = Vec::new();
			for child in &children {
				let mut sub = self
					.plan_recursive(
						child,
						source_root,
						dest_root,
						depth + 1,
						max_bytes,
						max_files,
						max_depth,
						min_bytes,
					)
					.await?;
				chunks.append(&mut sub);
			}

			let files_at_level = self.profiler.list_files_at_level(dir).await?;
			if !files_at_level.is_empty() {
				let estimated_size: u64 = files_at_level.iter().map(|(_, size)| size).sum();
				chunks.push(Chunk {
					id: self.next_chunk_id(),
					kind: ChunkKind::FilesOnly,
					source: dir.to_path_buf(),
					destination: map_dest(dir, source_root, dest_root),
					estimated_size,
					estimated_files: files_at_level.len() as u64,
					extra_copy_args: vec!["/LEV:1".to_string()],
					status: ChunkStatus::Pending,
					retry_count: 0,
					retry_after: None,
				});
			}

			Ok(chunks)
		})
	}
}

/// Remap a source path under `dest_root`, preserving the remainder's case and converting
/// forward separators to backward (§4.2).
pub fn map_dest(src: &Path, source_root: &Path, dest_root: &Path) -> PathBuf {
	let norm_src = normalize_path(src);
	let norm_root = normalize_path(source_root);

	if norm_src.eq_ignore_ascii_case(&norm_root) {
		return dest_root.to_path_buf();
	}

	let remainder = if norm_src.len() > norm_root.len()
		&& norm_src[..norm_root.len()].eq_ignore_ascii_case(&norm_root)
	{
		norm_src[norm_root.len()..].trim_start_matches('\\').to_string()
	} else {
		norm_src
	};

	let mut dest = dest_root.to_path_buf();
	for component in remainder.split('\\').filter(|s| !s.is_empty()) {
		dest.push(component);
	}
	dest
}

#[cfg(test)]
mod tests {
	use super::*;
	use async_trait::async_trait;
	use std::collections::HashMap;

	use crate::profiler::DirectoryProfiler;

	/// A [`crate::traits::DirectoryLister`] fixture returning canned output keyed by path and
	/// by whether the caller asked for a recursive listing, so a directory's subtree totals and
	/// its immediate children can differ the way a real copy tool's `/L` output would.
	struct PathLister {
		recursive: HashMap<PathBuf, String>,
		shallow: HashMap<PathBuf, String>,
	}

	#[async_trait]
	impl crate::traits::DirectoryLister for PathLister {
		async fn list(&self, path: &Path, recursive: bool) -> Result<String> {
			let map = if recursive { &self.recursive } else { &self.shallow };
			Ok(map.get(path).cloned().unwrap_or_default())
		}
	}

	fn planner(lister: PathLister) -> ChunkPlanner {
		let profiler = Arc::new(DirectoryProfiler::new(Arc::new(lister)));
		ChunkPlanner::new(profiler, 24)
	}

	fn params<'a>(path: &'a Path, dest_root: &'a Path, scan_mode: ScanMode) -> PlanParams<'a> {
		PlanParams {
			path,
			dest_root,
			max_bytes: 5000,
			max_files: 10,
			max_depth: 5,
			min_bytes: 0,
			scan_mode,
		}
	}

	#[tokio::test]
	async fn flat_mode_emits_a_single_chunk_for_the_whole_root() {
		let mut recursive = HashMap::new();
		recursive.insert(
			PathBuf::from("C:\\src"),
			"      3000   C:\\src\\a.txt\n      9000   C:\\src\\sub\\b.txt\n".to_string(),
		);
		let planner = planner(PathLister {
			recursive,
			shallow: HashMap::new(),
		});

		let chunks = planner
			.plan(params(Path::new("C:\\src"), Path::new("D:\\dst"), ScanMode::Flat))
			.await
			.unwrap();

		assert_eq!(chunks.len(), 1);
		assert_eq!(chunks[0].id, 1);
		assert_eq!(chunks[0].kind, ChunkKind::Recursive);
		assert_eq!(chunks[0].source, PathBuf::from("C:\\src"));
		assert_eq!(chunks[0].destination, PathBuf::from("D:\\dst"));
		assert_eq!(chunks[0].estimated_size, 12000);
	}

	#[tokio::test]
	async fn smart_mode_accepts_whole_tree_when_within_budget() {
		let mut recursive = HashMap::new();
		recursive.insert(
			PathBuf::from("C:\\src"),
			"       200   C:\\src\\a.txt\n       300   C:\\src\\sub\\b.txt\n".to_string(),
		);
		let mut shallow = HashMap::new();
		shallow.insert(
			PathBuf::from("C:\\src"),
			"         0   C:\\src\\sub\\\n       200   C:\\src\\a.txt\n".to_string(),
		);
		let planner = planner(PathLister { recursive, shallow });

		let chunks = planner
			.plan(params(Path::new("C:\\src"), Path::new("D:\\dst"), ScanMode::Smart))
			.await
			.unwrap();

		assert_eq!(chunks.len(), 1);
		assert_eq!(chunks[0].kind, ChunkKind::Recursive);
		assert_eq!(chunks[0].source, PathBuf::from("C:\\src"));
		assert_eq!(chunks[0].estimated_size, 500);
	}

	#[tokio::test]
	async fn smart_mode_splits_oversize_parent_and_emits_a_files_at_level_chunk() {
		let mut recursive = HashMap::new();
		recursive.insert(
			PathBuf::from("C:\\src"),
			"       100   C:\\src\\root.txt\n      3000   C:\\src\\sub\\x.txt\n      2900   C:\\src\\sub\\y.txt\n"
				.to_string(),
		);
		recursive.insert(
			PathBuf::from("C:\\src\\sub"),
			"      3000   C:\\src\\sub\\x.txt\n      2900   C:\\src\\sub\\y.txt\n".to_string(),
		);
		let mut shallow = HashMap::new();
		shallow.insert(
			PathBuf::from("C:\\src"),
			"         0   C:\\src\\sub\\\n       100   C:\\src\\root.txt\n".to_string(),
		);
		shallow.insert(
			PathBuf::from("C:\\src\\sub"),
			"      3000   C:\\src\\sub\\x.txt\n      2900   C:\\src\\sub\\y.txt\n".to_string(),
		);
		let planner = planner(PathLister { recursive, shallow });

		let mut chunks = planner
			.plan(params(Path::new("C:\\src"), Path::new("D:\\dst"), ScanMode::Smart))
			.await
			.unwrap();
		chunks.sort_by_key(|c| c.id);

		assert_eq!(chunks.len(), 2);

		let sub_chunk = &chunks[0];
		assert_eq!(sub_chunk.id, 1);
		assert_eq!(sub_chunk.kind, ChunkKind::Recursive);
		assert_eq!(sub_chunk.source, PathBuf::from("C:\\src\\sub"));
		assert_eq!(sub_chunk.estimated_size, 5900);

		let files_chunk = &chunks[1];
		assert_eq!(files_chunk.id, 2);
		assert_eq!(files_chunk.kind, ChunkKind::FilesOnly);
		assert_eq!(files_chunk.source, PathBuf::from("C:\\src"));
		assert_eq!(files_chunk.estimated_files, 1);
		assert_eq!(files_chunk.estimated_size, 100);
		assert_eq!(files_chunk.extra_copy_args, vec!["/LEV:1".to_string()]);
	}

	#[test]
	fn map_dest_of_root_is_dest_root() {
		let result = map_dest(Path::new("C:\\src"), Path::new("C:\\src"), Path::new("D:\\dst"));
		assert_eq!(result, PathBuf::from("D:\\dst"));
	}

	#[test]
	fn map_dest_preserves_remainder_case() {
		let result = map_dest(
			Path::new("C:\\src\\Sub\\Leaf"),
			Path::new("C:\\src"),
			Path::new("D:\\dst"),
		);
		assert_eq!(result, PathBuf::from("D:\\dst\\Sub\\Leaf"));
	}

	#[test]
	fn map_dest_is_case_insensitive_on_the_root_prefix() {
		let result = map_dest(
			Path::new("c:\\SRC\\child"),
			Path::new("C:\\src"),
			Path::new("D:\\dst"),
		);
		assert_eq!(result, PathBuf::from("D:\\dst\\child"));
	}

	#[test]
	fn map_dest_converts_forward_slashes() {
		let result = map_dest(Path::new("C:/src/a/b"), Path::new("C:\\src"), Path::new("D:\\dst"));
		assert_eq!(result, PathBuf::from("D:\\dst\\a\\b"));
	}
}
