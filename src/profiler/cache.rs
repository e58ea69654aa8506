//! Keyed cache of [`DirectoryProfile`]s, keyed by normalized path (§3).

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Utc};

use crate::model::{normalize_path, DirectoryProfile};

/// Thread-safe cache guarded by a plain `Mutex`: lookups and inserts never hold the lock across
/// an `.await`, so `std::sync::Mutex` is sufficient and avoids an async lock's overhead.
#[derive(Debug, Default)]
pub struct ProfileCache {
	entries: Mutex<HashMap<String, DirectoryProfile>>,
}

impl ProfileCache {
	pub fn new() -> Self {
		Self::default()
	}

	/// Return the cached profile for `path` if present and fresh, per `max_age_hours`.
	pub fn get_fresh(&self, path: &std::path::Path, max_age_hours: i64) -> Option<DirectoryProfile> {
		let key = normalize_path(path);
		let entries = self.entries.lock().expect("profile cache poisoned");
		let entry = entries.get(&key)?;
		if is_fresh(entry.last_scanned, Utc::now(), max_age_hours) {
			Some(entry.clone())
		} else {
			None
		}
	}

	pub fn insert(&self, profile: DirectoryProfile) {
		let key = normalize_path(&profile.path);
		let mut entries = self.entries.lock().expect("profile cache poisoned");
		entries.insert(key, profile);
	}

	pub fn clear(&self) {
		self.entries.lock().expect("profile cache poisoned").clear();
	}

	pub fn invalidate(&self, path: &std::path::Path) {
		let key = normalize_path(path);
		self.entries
			.lock()
			.expect("profile cache poisoned")
			.remove(&key);
	}

	pub fn len(&self) -> usize {
		self.entries.lock().expect("profile cache poisoned").len()
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}
}

fn is_fresh(last_scanned: DateTime<Utc>, now: DateTime<Utc>, max_age_hours: i64) -> bool {
	(now - last_scanned) <= chrono::Duration::hours(max_age_hours)
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::path::PathBuf;

	fn profile_at(path: &str, age: chrono::Duration) -> DirectoryProfile {
		DirectoryProfile {
			path: PathBuf::from(path),
			total_size: 100,
			file_count: 1,
			dir_count: 0,
			last_scanned: Utc::now() - age,
		}
	}

	#[test]
	fn fresh_entry_is_returned() {
		let cache = ProfileCache::new();
		cache.insert(profile_at("C:\\data", chrono::Duration::hours(1)));
		assert!(cache.get_fresh(std::path::Path::new("C:\\data"), 24).is_some());
	}

	#[test]
	fn stale_entry_is_not_returned() {
		let cache = ProfileCache::new();
		cache.insert(profile_at("C:\\data", chrono::Duration::hours(25)));
		assert!(cache.get_fresh(std::path::Path::new("C:\\data"), 24).is_none());
	}

	#[test]
	fn lookup_is_case_insensitive_and_separator_normalized() {
		let cache = ProfileCache::new();
		cache.insert(profile_at("C:/data/", chrono::Duration::zero()));
		assert!(cache
			.get_fresh(std::path::Path::new("c:\\data"), 24)
			.is_some());
	}

	#[test]
	fn invalidate_removes_entry() {
		let cache = ProfileCache::new();
		cache.insert(profile_at("C:\\data", chrono::Duration::zero()));
		cache.invalidate(std::path::Path::new("C:\\data"));
		assert!(cache.get_fresh(std::path::Path::new("C:\\data"), 24).is_none());
	}
}
