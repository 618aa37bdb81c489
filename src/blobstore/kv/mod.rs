//! Key-value backends for chunk storage, each implementing its own reference counting.
//!
//! A `put` of a key already held by the backend only bumps its reference count — the stored
//! value is left untouched — while `delete` decrements the count and only actually drops the
//! entry once it reaches zero. This lets the same chunk be referenced by many blobs while only
//! ever occupying one slot in the backend.

pub mod hybrid;
pub mod lru;
pub mod memory;
#[cfg(feature = "redis")] pub mod redis;
#[cfg(feature = "sqlite")] pub mod sqlite;

mod compressing;
pub use compressing::CompressingStore;

use std::sync::Arc;

use async_trait::async_trait;

use crate::{Result, blobstore::ChunkKey};

/// A reference-counted, content-addressed byte store.
///
/// Implementations see only already-compressed bytes; [`CompressingStore`] is the sole place
/// where a [`crate::blobstore::compressor::Compressor`] is invoked.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
	/// Store `value` under `key`, or, if `key` is already present, bump its reference count
	/// without touching the stored value.
	async fn put(&self, key: ChunkKey, value: Vec<u8>) -> Result<()>;

	/// Fetch the value stored under `key`, if present.
	async fn get(&self, key: &ChunkKey) -> Result<Option<Vec<u8>>>;

	/// Decrement the reference count for `key`, removing the entry once it reaches zero.
	///
	/// Deleting a key the backend has never seen is a no-op.
	async fn delete(&self, key: &ChunkKey) -> Result<()>;

	/// Apply [`KeyValueStore::put`] to every pair in `entries`, in order.
	async fn put_batch(&self, entries: Vec<(ChunkKey, Vec<u8>)>) -> Result<()> {
		for (key, value) in entries {
			self.put(key, value).await?;
		}
		Ok(())
	}

	/// Apply [`KeyValueStore::get`] to every key in `keys`, in order.
	async fn get_batch(&self, keys: &[ChunkKey]) -> Result<Vec<Option<Vec<u8>>>> {
		let mut out = Vec::with_capacity(keys.len());
		for key in keys {
			out.push(self.get(key).await?);
		}
		Ok(out)
	}

	/// Apply [`KeyValueStore::delete`] to every key in `keys`, in order.
	async fn delete_batch(&self, keys: &[ChunkKey]) -> Result<()> {
		for key in keys {
			self.delete(key).await?;
		}
		Ok(())
	}
}

/// Delegates to the wrapped backend, letting a store be shared between a [`crate::blobstore::BlobStore`]
/// and an external handle kept for inspection or use in another composition.
#[async_trait]
impl<S: KeyValueStore + ?Sized> KeyValueStore for Arc<S> {
	async fn put(&self, key: ChunkKey, value: Vec<u8>) -> Result<()> {
		(**self).put(key, value).await
	}

	async fn get(&self, key: &ChunkKey) -> Result<Option<Vec<u8>>> {
		(**self).get(key).await
	}

	async fn delete(&self, key: &ChunkKey) -> Result<()> {
		(**self).delete(key).await
	}

	async fn put_batch(&self, entries: Vec<(ChunkKey, Vec<u8>)>) -> Result<()> {
		(**self).put_batch(entries).await
	}

	async fn get_batch(&self, keys: &[ChunkKey]) -> Result<Vec<Option<Vec<u8>>>> {
		(**self).get_batch(keys).await
	}

	async fn delete_batch(&self, keys: &[ChunkKey]) -> Result<()> {
		(**self).delete_batch(keys).await
	}
}
