//! A process-wide table of per-path locks, used by the backup worker pool to
//! serialize verify/rename/copy operations against a single destination path
//! when two jobs might otherwise race on it (rare, but possible once a
//! fingerprint collision forces disambiguation onto a shared candidate name).
//!
//! The registry never prunes entries within a run: the number of distinct
//! destination paths touched in one run is bounded and small enough that this
//! is a non-issue, and pruning would reintroduce exactly the race it exists to
//! prevent (a path being "forgotten" mid-use).

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Condvar, Mutex};

struct PathLock {
	locked: Mutex<bool>,
	unlocked: Condvar,
}

impl PathLock {
	fn new() -> Self {
		Self { locked: Mutex::new(false), unlocked: Condvar::new() }
	}

	fn acquire(&self) {
		let mut locked = self.locked.lock().expect("path lock poisoned");
		while *locked {
			locked = self.unlocked.wait(locked).expect("path lock poisoned");
		}
		*locked = true;
	}

	fn release(&self) {
		let mut locked = self.locked.lock().expect("path lock poisoned");
		*locked = false;
		self.unlocked.notify_one();
	}
}

/// Guards insertion into the path table; the inner per-path locks are acquired
/// and released independently, so this outer lock is only ever held briefly.
#[derive(Default)]
pub struct PathMutexRegistry {
	table: Mutex<HashMap<PathBuf, Arc<PathLock>>>,
}

impl PathMutexRegistry {
	pub fn new() -> Self {
		Self::default()
	}

	fn entry(&self, path: &Path) -> Arc<PathLock> {
		let mut table = self.table.lock().expect("path mutex registry poisoned");
		table.entry(path.to_path_buf()).or_insert_with(|| Arc::new(PathLock::new())).clone()
	}

	/// Blocks until the lock for `path` is held, creating its entry on first
	/// use. Returns a guard that releases the lock on drop.
	pub fn acquire(&self, path: &Path) -> PathGuard {
		let lock = self.entry(path);
		lock.acquire();
		PathGuard { lock }
	}

	/// Number of distinct paths the registry has ever seen a lock request for.
	/// Exposed for diagnostics/tests, not part of the locking contract.
	pub fn known_paths(&self) -> usize {
		self.table.lock().expect("path mutex registry poisoned").len()
	}
}

/// RAII handle on a path's lock; dropping it releases the lock.
pub struct PathGuard {
	lock: Arc<PathLock>,
}

impl Drop for PathGuard {
	fn drop(&mut self) {
		self.lock.release();
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::sync::atomic::{AtomicUsize, Ordering};
	use std::thread;
	use std::time::Duration;

	#[test]
	fn distinct_paths_do_not_contend() {
		let registry = PathMutexRegistry::new();
		let a = registry.acquire(Path::new("/backup/a.jpg"));
		let b = registry.acquire(Path::new("/backup/b.jpg"));
		drop(a);
		drop(b);
		assert_eq!(registry.known_paths(), 2);
	}

	#[test]
	fn same_path_serializes_concurrent_acquires() {
		let registry = Arc::new(PathMutexRegistry::new());
		let counter = Arc::new(AtomicUsize::new(0));
		let max_concurrent = Arc::new(AtomicUsize::new(0));
		let path = PathBuf::from("/backup/contended.jpg");

		thread::scope(|scope| {
			for _ in 0..8 {
				let registry = registry.clone();
				let counter = counter.clone();
				let max_concurrent = max_concurrent.clone();
				let path = path.clone();
				scope.spawn(move || {
					let _guard = registry.acquire(&path);
					let now = counter.fetch_add(1, Ordering::SeqCst) + 1;
					max_concurrent.fetch_max(now, Ordering::SeqCst);
					thread::sleep(Duration::from_millis(5));
					counter.fetch_sub(1, Ordering::SeqCst);
				});
			}
		});

		assert_eq!(max_concurrent.load(Ordering::SeqCst), 1);
	}

	#[test]
	fn reentry_after_release_succeeds() {
		let registry = PathMutexRegistry::new();
		let path = Path::new("/backup/a.jpg");
		{
			let _guard = registry.acquire(path);
		}
		let _guard = registry.acquire(path);
	}
}
