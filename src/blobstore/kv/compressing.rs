//! Compression decorator wrapping a raw key-value backend.

use async_trait::async_trait;

use crate::{Result, blobstore::ChunkKey, blobstore::compressor::Compressor, blobstore::kv::KeyValueStore};

/// Compresses values on the way into `inner` and decompresses them on the way out.
///
/// The wrapped backend only ever sees compressed bytes; reference counting and eviction policy
/// remain entirely `inner`'s concern.
pub struct CompressingStore<S> {
	inner: S,
	compressor: Box<dyn Compressor>,
}
impl<S: KeyValueStore> CompressingStore<S> {
	/// Wrap `inner`, compressing values with `compressor` before they are written.
	pub fn new(inner: S, compressor: Box<dyn Compressor>) -> Self {
		Self { inner, compressor }
	}
}
#[async_trait]
impl<S: KeyValueStore> KeyValueStore for CompressingStore<S> {
	async fn put(&self, key: ChunkKey, value: Vec<u8>) -> Result<()> {
		let compressed = self.compressor.compress(&value)?;

		#[cfg(feature = "metrics")]
		crate::metrics::record_compression_ratio(value.len(), compressed.len());

		self.inner.put(key, compressed).await
	}

	async fn get(&self, key: &ChunkKey) -> Result<Option<Vec<u8>>> {
		match self.inner.get(key).await? {
			Some(bytes) => Ok(Some(self.compressor.decompress(&bytes)?)),
			None => Ok(None),
		}
	}

	async fn delete(&self, key: &ChunkKey) -> Result<()> {
		self.inner.delete(key).await
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::blobstore::{compressor::ZlibCompressor, kv::memory::InMemoryStore};

	fn key(byte: u8) -> ChunkKey {
		ChunkKey::from_bytes([byte; 32])
	}

	#[tokio::test]
	async fn round_trips_through_compression() {
		let store = CompressingStore::new(InMemoryStore::new(), Box::new(ZlibCompressor));
		store.put(key(1), b"plain text payload".to_vec()).await.unwrap();
		assert_eq!(store.get(&key(1)).await.unwrap(), Some(b"plain text payload".to_vec()));
	}
}
