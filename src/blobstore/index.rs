//! Persistent mapping from blob identifier to its ordered chunk-key list and hash.

use std::collections::HashMap;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::blobstore::ChunkKey;

/// An application-level byte sequence, reconstructed from an ordered chunk list.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Blob {
	/// External identifier, unique within the index.
	pub identifier: String,
	/// SHA-256 hash of the full, decompressed byte content.
	pub hash: [u8; 32],
	/// Ordered chunk keys that reassemble into the blob's content.
	pub chunk_keys: Vec<ChunkKey>,
	/// Format version, incremented if the on-disk representation changes.
	pub version: u32,
	/// Free-form metadata carried alongside the blob.
	pub meta: HashMap<String, serde_json::Value>,
}

/// In-process bookkeeping mapping blob identifiers to chunk lists and tracking chunk liveness.
///
/// Many concurrent reads (`retrieve_blob`) and serialized writes
/// (`store_blob`/`delete_blob`) are expected, so the index is guarded by a single
/// `parking_lot::RwLock` covering both the blob table and the reference-count ledger — coarser
/// than per-identifier locking, but sufficient at this scale and simpler to reason about.
pub struct BlobIndex {
	inner: RwLock<BlobIndexState>,
}

struct BlobIndexState {
	blobs: HashMap<String, Blob>,
	chunk_refs: HashMap<ChunkKey, u32>,
}

impl BlobIndex {
	/// An empty index.
	pub fn new() -> Self {
		Self { inner: RwLock::new(BlobIndexState { blobs: HashMap::new(), chunk_refs: HashMap::new() }) }
	}

	/// Whether `identifier` is already present.
	pub fn contains(&self, identifier: &str) -> bool {
		self.inner.read().blobs.contains_key(identifier)
	}

	/// Fetch a blob record by identifier.
	pub fn get(&self, identifier: &str) -> Option<Blob> {
		self.inner.read().blobs.get(identifier).cloned()
	}

	/// Reference count currently held for `key`, if it has ever been seen.
	pub fn ref_count(&self, key: &ChunkKey) -> Option<u32> {
		self.inner.read().chunk_refs.get(key).copied()
	}

	/// Record a new blob and bump the reference count of every chunk it references.
	///
	/// Each occurrence of a repeated key in `chunk_keys` increments the count once, matching the
	/// delete-side rule that each occurrence decrements once.
	pub fn insert(&self, blob: Blob) {
		let mut state = self.inner.write();

		for key in &blob.chunk_keys {
			*state.chunk_refs.entry(*key).or_insert(0) += 1;
		}
		state.blobs.insert(blob.identifier.clone(), blob);
	}

	/// Remove a blob record and decrement the reference count of every chunk it referenced.
	///
	/// Returns the keys whose reference count reached zero, which the caller should also remove
	/// from the key-value backend.
	pub fn remove(&self, identifier: &str) -> Option<(Blob, Vec<ChunkKey>)> {
		let mut state = self.inner.write();
		let blob = state.blobs.remove(identifier)?;
		let mut drained = Vec::new();

		for key in &blob.chunk_keys {
			if let Some(count) = state.chunk_refs.get_mut(key) {
				*count = count.saturating_sub(1);
				if *count == 0 {
					state.chunk_refs.remove(key);
					drained.push(*key);
				}
			}
		}

		Some((blob, drained))
	}
}
impl Default for BlobIndex {
	fn default() -> Self {
		Self::new()
	}
}
