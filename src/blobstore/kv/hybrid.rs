//! Local-then-remote composition of two backends.

use async_trait::async_trait;

use crate::{Result, blobstore::ChunkKey, blobstore::kv::KeyValueStore};

/// Reads check `local` first, falling back to `remote` and warming `local` on a remote hit.
/// Writes and deletes are applied to both, local first.
pub struct HybridStore<L, R> {
	local: L,
	remote: R,
}
impl<L: KeyValueStore, R: KeyValueStore> HybridStore<L, R> {
	/// Compose `local` (typically bounded, e.g. [`super::lru::LruStore`]) with `remote`
	/// (typically durable, e.g. a Redis or SQLite backend).
	pub fn new(local: L, remote: R) -> Self {
		Self { local, remote }
	}
}
#[async_trait]
impl<L: KeyValueStore, R: KeyValueStore> KeyValueStore for HybridStore<L, R> {
	async fn put(&self, key: ChunkKey, value: Vec<u8>) -> Result<()> {
		self.local.put(key, value.clone()).await?;
		self.remote.put(key, value).await
	}

	async fn get(&self, key: &ChunkKey) -> Result<Option<Vec<u8>>> {
		if let Some(value) = self.local.get(key).await? {
			return Ok(Some(value));
		}

		match self.remote.get(key).await? {
			Some(value) => {
				self.local.put(*key, value.clone()).await?;
				Ok(Some(value))
			},
			None => Ok(None),
		}
	}

	async fn delete(&self, key: &ChunkKey) -> Result<()> {
		self.local.delete(key).await?;
		self.remote.delete(key).await
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::blobstore::kv::memory::InMemoryStore;

	fn key(byte: u8) -> ChunkKey {
		ChunkKey::from_bytes([byte; 32])
	}

	#[tokio::test]
	async fn remote_hit_warms_local() {
		let local = InMemoryStore::new();
		let remote = InMemoryStore::new();
		remote.put(key(1), b"from remote".to_vec()).await.unwrap();

		let hybrid = HybridStore::new(local, remote);
		assert_eq!(hybrid.get(&key(1)).await.unwrap(), Some(b"from remote".to_vec()));
		assert_eq!(hybrid.local.get(&key(1)).await.unwrap(), Some(b"from remote".to_vec()));
	}

	#[tokio::test]
	async fn put_reaches_both_backends() {
		let hybrid = HybridStore::new(InMemoryStore::new(), InMemoryStore::new());
		hybrid.put(key(1), b"value".to_vec()).await.unwrap();

		assert_eq!(hybrid.local.get(&key(1)).await.unwrap(), Some(b"value".to_vec()));
		assert_eq!(hybrid.remote.get(&key(1)).await.unwrap(), Some(b"value".to_vec()));
	}
}
