//! Size-bounded key-value backend that evicts the least-recently-used chunk on overflow.

use std::num::NonZeroUsize;

use async_trait::async_trait;
use lru::LruCache;
use parking_lot::Mutex;

use crate::{Result, blobstore::ChunkKey, blobstore::kv::KeyValueStore};

/// An `lru`-crate-backed store bounded to `max_size` distinct keys.
///
/// A `put` of a brand-new key that would exceed the bound evicts the least-recently-used key
/// outright, exactly as an explicit `delete` would once its reference count reaches zero —
/// eviction does not consult or decrement a count first, since there is no caller left to have
/// held a reference to an item that fell off the end of the cache.
pub struct LruStore {
	cache: Mutex<LruCache<ChunkKey, (u32, Vec<u8>)>>,
}
impl LruStore {
	/// Build a store bounded to `max_size` distinct keys (at least 1).
	pub fn new(max_size: usize) -> Self {
		let capacity = NonZeroUsize::new(max_size).unwrap_or(NonZeroUsize::new(1).expect("1 is nonzero"));
		Self { cache: Mutex::new(LruCache::new(capacity)) }
	}

	/// Number of distinct keys currently held.
	pub fn len(&self) -> usize {
		self.cache.lock().len()
	}
}
#[async_trait]
impl KeyValueStore for LruStore {
	async fn put(&self, key: ChunkKey, value: Vec<u8>) -> Result<()> {
		let mut cache = self.cache.lock();
		if let Some((count, _)) = cache.get_mut(&key) {
			*count += 1;
		} else {
			cache.put(key, (1, value));
		}
		Ok(())
	}

	async fn get(&self, key: &ChunkKey) -> Result<Option<Vec<u8>>> {
		Ok(self.cache.lock().get(key).map(|(_, value)| value.clone()))
	}

	async fn delete(&self, key: &ChunkKey) -> Result<()> {
		let mut cache = self.cache.lock();
		let mut remove = false;
		if let Some((count, _)) = cache.get_mut(key) {
			*count = count.saturating_sub(1);
			remove = *count == 0;
		}
		if remove {
			cache.pop(key);
		}
		Ok(())
	}
}
