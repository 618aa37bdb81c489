//! Unbounded, process-local key-value backend.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::{Result, blobstore::ChunkKey, blobstore::kv::KeyValueStore};

/// A `HashMap`-backed store with no eviction; every chunk lives until explicitly deleted.
#[derive(Default)]
pub struct InMemoryStore {
	entries: Mutex<HashMap<ChunkKey, (u32, Vec<u8>)>>,
}
impl InMemoryStore {
	/// An empty store.
	pub fn new() -> Self {
		Self::default()
	}

	/// Number of distinct keys currently held.
	pub fn len(&self) -> usize {
		self.entries.lock().len()
	}

	/// Whether the store holds no keys.
	pub fn is_empty(&self) -> bool {
		self.entries.lock().is_empty()
	}

	/// Reference count currently held for `key`, if present.
	pub fn ref_count(&self, key: &ChunkKey) -> Option<u32> {
		self.entries.lock().get(key).map(|(count, _)| *count)
	}
}
#[async_trait]
impl KeyValueStore for InMemoryStore {
	async fn put(&self, key: ChunkKey, value: Vec<u8>) -> Result<()> {
		let mut entries = self.entries.lock();
		match entries.get_mut(&key) {
			Some((count, _)) => *count += 1,
			None => {
				entries.insert(key, (1, value));
			},
		}
		Ok(())
	}

	async fn get(&self, key: &ChunkKey) -> Result<Option<Vec<u8>>> {
		Ok(self.entries.lock().get(key).map(|(_, value)| value.clone()))
	}

	async fn delete(&self, key: &ChunkKey) -> Result<()> {
		let mut entries = self.entries.lock();
		let mut remove = false;
		if let Some((count, _)) = entries.get_mut(key) {
			*count = count.saturating_sub(1);
			remove = *count == 0;
		}
		if remove {
			entries.remove(key);
		}
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn key(byte: u8) -> ChunkKey {
		ChunkKey::from_bytes([byte; 32])
	}

	#[tokio::test]
	async fn put_of_existing_key_bumps_count_without_overwriting_value() {
		let store = InMemoryStore::new();
		store.put(key(1), b"first".to_vec()).await.unwrap();
		store.put(key(1), b"second".to_vec()).await.unwrap();

		assert_eq!(store.ref_count(&key(1)), Some(2));
		assert_eq!(store.get(&key(1)).await.unwrap(), Some(b"first".to_vec()));
	}

	#[tokio::test]
	async fn delete_removes_only_once_count_reaches_zero() {
		let store = InMemoryStore::new();
		store.put(key(1), b"value".to_vec()).await.unwrap();
		store.put(key(1), b"value".to_vec()).await.unwrap();

		store.delete(&key(1)).await.unwrap();
		assert_eq!(store.get(&key(1)).await.unwrap(), Some(b"value".to_vec()));

		store.delete(&key(1)).await.unwrap();
		assert_eq!(store.get(&key(1)).await.unwrap(), None);
	}

	#[tokio::test]
	async fn deleting_unknown_key_is_a_no_op() {
		let store = InMemoryStore::new();
		store.delete(&key(9)).await.unwrap();
		assert!(store.is_empty());
	}
}
