//! Per-key mutual exclusion.

use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Hands out one async mutex per key.
///
/// Holders of the guard for a key run one at a time; different keys never
/// contend. A key's entry is dropped from the map once its last holder and
/// waiter are gone.
#[derive(Debug, Default)]
pub struct KeyedLocks {
	locks: DashMap<String, Arc<Mutex<()>>>,
}

impl KeyedLocks {
	pub fn new() -> Self {
		Self::default()
	}

	/// Waits for exclusive access to `key`.
	pub async fn lock(&self, key: &str) -> KeyGuard<'_> {
		// Clone the Arc out so the map shard is not held across the await
		let mutex = self.locks.entry(key.to_string()).or_default().clone();
		let guard = mutex.lock_owned().await;
		KeyGuard {
			locks: &self.locks,
			key: key.to_string(),
			guard: Some(guard),
		}
	}

	/// Number of keys currently held or awaited.
	pub fn len(&self) -> usize {
		self.locks.len()
	}

	pub fn is_empty(&self) -> bool {
		self.locks.is_empty()
	}
}

/// Exclusive access to one key of a [`KeyedLocks`].
#[derive(Debug)]
pub struct KeyGuard<'a> {
	locks: &'a DashMap<String, Arc<Mutex<()>>>,
	key: String,
	guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for KeyGuard<'_> {
	fn drop(&mut self) {
		// Unlock first so the strong count is the map's own Arc plus waiters
		drop(self.guard.take());
		self.locks
			.remove_if(&self.key, |_, mutex| Arc::strong_count(mutex) == 1);
	}
}
