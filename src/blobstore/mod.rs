//! Content-addressed, deduplicating blob storage.
//!
//! A [`BlobStore`] splits incoming byte blobs into content-defined chunks via a pluggable
//! [`Chunker`], stores each distinct chunk exactly once in a pluggable [`kv::KeyValueStore`]
//! keyed by its SHA-256 digest, and keeps a [`BlobIndex`] mapping external blob identifiers to
//! their ordered chunk lists so a blob can be reassembled and integrity-checked on retrieval.

pub mod chunker;
pub mod compressor;
pub mod index;
pub mod kv;

use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::instrument;

use crate::{
	Error, Result,
	blobstore::{chunker::Chunker, index::Blob, index::BlobIndex, kv::KeyValueStore},
};

/// Content key for a single chunk: the SHA-256 digest of its decompressed bytes.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ChunkKey(#[serde(with = "hex_bytes")] [u8; 32]);
impl ChunkKey {
	/// Wrap a raw 32-byte digest.
	pub fn from_bytes(bytes: [u8; 32]) -> Self {
		Self(bytes)
	}

	/// The raw digest bytes.
	pub fn as_bytes(&self) -> &[u8; 32] {
		&self.0
	}

	/// Hex-encoded digest.
	pub fn to_hex(&self) -> String {
		self.0.iter().map(|byte| format!("{byte:02x}")).collect()
	}
}
impl fmt::Display for ChunkKey {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.to_hex())
	}
}
impl fmt::Debug for ChunkKey {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "ChunkKey({})", self.to_hex())
	}
}

mod hex_bytes {
	use serde::{Deserialize, Deserializer, Serializer, de::Error};

	pub fn serialize<S: Serializer>(bytes: &[u8; 32], serializer: S) -> Result<S::Ok, S::Error> {
		let hex: String = bytes.iter().map(|b| format!("{b:02x}")).collect();
		serializer.serialize_str(&hex)
	}

	pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<[u8; 32], D::Error> {
		let hex = String::deserialize(deserializer)?;
		let mut out = [0u8; 32];
		for (i, chunk) in hex.as_bytes().chunks(2).enumerate() {
			if i >= 32 {
				return Err(D::Error::custom("chunk key hex too long"));
			}
			let byte_str = std::str::from_utf8(chunk).map_err(D::Error::custom)?;
			out[i] = u8::from_str_radix(byte_str, 16).map_err(D::Error::custom)?;
		}
		Ok(out)
	}
}

/// Coordinates chunking, deduplicated storage, and reassembly of identified blobs.
pub struct BlobStore<C, S> {
	chunker: C,
	store: S,
	index: BlobIndex,
}
impl<C: Chunker, S: KeyValueStore> BlobStore<C, S> {
	/// Build a store over the given chunking strategy and key-value backend, with an empty index.
	pub fn new(chunker: C, store: S) -> Self {
		Self { chunker, store, index: BlobIndex::new() }
	}

	/// Whether `identifier` is already stored.
	pub fn contains(&self, identifier: &str) -> bool {
		self.index.contains(identifier)
	}

	/// Chunk, deduplicate, and persist `data` under `identifier`.
	///
	/// Splits `data` with the configured chunker, writes any chunk the backend does not already
	/// hold a reference to, and records the blob's chunk list and whole-blob hash in the index.
	/// Already-present chunks are only reference-counted, never re-written.
	#[instrument(skip(self, data, meta), fields(identifier, bytes = data.len()))]
	pub async fn store_blob(
		&self,
		identifier: impl Into<String>,
		data: &[u8],
		meta: std::collections::HashMap<String, serde_json::Value>,
	) -> Result<()> {
		let identifier = identifier.into();
		if self.index.contains(&identifier) {
			return Err(Error::BlobExists { identifier });
		}

		let hash: [u8; 32] = Sha256::digest(data).into();
		let chunks = self.chunker.chunk_blob(data);
		let chunk_keys: Vec<ChunkKey> = chunks.iter().map(|(key, _)| *key).collect();

		#[cfg(feature = "metrics")]
		let deduped = chunk_keys.iter().filter(|key| self.index.ref_count(key).unwrap_or(0) > 0).count() as u64;

		// The backend's own put is reference-counting: a key already present only has its count
		// bumped, so repeated chunks across blobs are written once. The index row is only
		// inserted once every chunk is durably held, so a failure here leaves at most harmless,
		// unlinked chunks behind rather than a blob record pointing at missing data.
		self.store.put_batch(chunks).await?;

		self.index.insert(Blob { identifier, hash, chunk_keys: chunk_keys.clone(), version: 1, meta });

		#[cfg(feature = "metrics")]
		crate::metrics::record_blob_stored(chunk_keys.len() as u64, deduped);

		Ok(())
	}

	/// Reassemble and return the bytes stored under `identifier`.
	///
	/// Fetches every chunk in order, concatenates them, and verifies the whole-blob hash before
	/// returning — a mismatch yields [`Error::BlobCorrupted`] rather than silently returning bad
	/// bytes.
	#[instrument(skip(self), fields(identifier))]
	pub async fn retrieve_blob(&self, identifier: &str) -> Result<Vec<u8>> {
		let blob = self.index.get(identifier).ok_or_else(|| Error::BlobNotFound { identifier: identifier.to_string() })?;

		let mut data = Vec::new();
		for key in &blob.chunk_keys {
			let chunk = self
				.store
				.get(key)
				.await?
				.ok_or_else(|| Error::BlobNotFound { identifier: identifier.to_string() })?;
			data.extend_from_slice(&chunk);
		}

		let hash: [u8; 32] = Sha256::digest(&data).into();
		if hash != blob.hash {
			return Err(Error::BlobCorrupted { identifier: identifier.to_string() });
		}

		#[cfg(feature = "metrics")]
		crate::metrics::record_blob_retrieved();

		Ok(data)
	}

	/// Fetch the metadata record for `identifier` without reassembling its content.
	pub fn blob_meta(&self, identifier: &str) -> Option<Blob> {
		self.index.get(identifier)
	}

	/// Remove `identifier` from the index and drop the backend's hold on any chunk whose
	/// reference count reaches zero as a result.
	#[instrument(skip(self), fields(identifier))]
	pub async fn delete_blob(&self, identifier: &str) -> Result<()> {
		let (blob, drained) =
			self.index.remove(identifier).ok_or_else(|| Error::BlobNotFound { identifier: identifier.to_string() })?;

		// One delete per occurrence in the blob's chunk list, mirroring the one put per occurrence
		// that built it. The backend keeps its own reference count and decides independently when
		// a chunk actually drops out.
		self.store.delete_batch(&blob.chunk_keys).await?;

		tracing::debug!(identifier, dropped_chunks = drained.len(), "blob deleted");

		#[cfg(feature = "metrics")]
		crate::metrics::record_blob_deleted();

		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::blobstore::{chunker::FixedSizeChunker, kv::memory::InMemoryStore};

	fn store() -> BlobStore<FixedSizeChunker, InMemoryStore> {
		BlobStore::new(FixedSizeChunker::new(4), InMemoryStore::new())
	}

	#[tokio::test]
	async fn store_and_retrieve_round_trips() {
		let store = store();
		store.store_blob("a", b"hello, world! this is a blob.", Default::default()).await.unwrap();
		let data = store.retrieve_blob("a").await.unwrap();
		assert_eq!(data, b"hello, world! this is a blob.");
	}

	#[tokio::test]
	async fn duplicate_identifier_is_rejected() {
		let store = store();
		store.store_blob("a", b"one", Default::default()).await.unwrap();
		let err = store.store_blob("a", b"two", Default::default()).await.unwrap_err();
		assert!(matches!(err, Error::BlobExists { .. }));
	}

	#[tokio::test]
	async fn missing_identifier_errors_on_retrieve_and_delete() {
		let store = store();
		assert!(matches!(store.retrieve_blob("missing").await.unwrap_err(), Error::BlobNotFound { .. }));
		assert!(matches!(store.delete_blob("missing").await.unwrap_err(), Error::BlobNotFound { .. }));
	}

	#[tokio::test]
	async fn shared_chunks_survive_deletion_of_one_blob() {
		let store = store();
		store.store_blob("a", b"shared-prefixXXXX", Default::default()).await.unwrap();
		store.store_blob("b", b"shared-prefixYYYY", Default::default()).await.unwrap();

		store.delete_blob("a").await.unwrap();
		assert!(!store.contains("a"));

		let data = store.retrieve_blob("b").await.unwrap();
		assert_eq!(data, b"shared-prefixYYYY");
	}
}
