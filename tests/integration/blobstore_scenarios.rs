//! End-to-end exercises of the deduplicating blob store: round-trips, shared-chunk
//! reference counting, and chunker boundary cases.

use std::{collections::HashMap, sync::Arc};

use tidepool::{
	Error,
	blobstore::{BlobStore, chunker::FixedSizeChunker, kv::memory::InMemoryStore},
};

fn store(chunk_size: usize) -> BlobStore<FixedSizeChunker, Arc<InMemoryStore>> {
	BlobStore::new(FixedSizeChunker::new(chunk_size), Arc::new(InMemoryStore::new()))
}

#[tokio::test]
async fn round_trip_preserves_bytes() {
	let store = store(8);
	let data = b"the quick brown fox jumps over the lazy dog";
	store.store_blob("fox", data, HashMap::new()).await.unwrap();

	assert_eq!(store.retrieve_blob("fox").await.unwrap(), data);
}

#[tokio::test]
async fn empty_blob_round_trips_to_empty_bytes() {
	let store = store(1024);
	store.store_blob("empty", b"", HashMap::new()).await.unwrap();

	let data = store.retrieve_blob("empty").await.unwrap();
	assert!(data.is_empty());
}

#[tokio::test]
async fn single_byte_blob_yields_one_chunk() {
	let backend = Arc::new(InMemoryStore::new());
	let store = BlobStore::new(FixedSizeChunker::new(1024), backend.clone());
	store.store_blob("single", b"A", HashMap::new()).await.unwrap();

	assert_eq!(backend.len(), 1);
	assert_eq!(store.retrieve_blob("single").await.unwrap(), b"A");
}

#[tokio::test]
async fn shared_prefix_chunk_is_reference_counted_across_blobs() {
	let backend = Arc::new(InMemoryStore::new());
	let store = BlobStore::new(FixedSizeChunker::new(1024), backend.clone());

	let prefix = vec![0xABu8; 1024];
	let mut first = prefix.clone();
	first.extend_from_slice(b"first blob's own tail");
	let mut second = prefix.clone();
	second.extend_from_slice(b"second blob's own tail");

	store.store_blob("first", &first, HashMap::new()).await.unwrap();
	store.store_blob("second", &second, HashMap::new()).await.unwrap();

	let shared_key = store.blob_meta("first").unwrap().chunk_keys[0];
	assert_eq!(store.blob_meta("second").unwrap().chunk_keys[0], shared_key);
	assert_eq!(backend.ref_count(&shared_key), Some(2));

	store.delete_blob("first").await.unwrap();
	assert_eq!(backend.ref_count(&shared_key), Some(1));

	let recovered = store.retrieve_blob("second").await.unwrap();
	assert_eq!(recovered, second);
}

#[tokio::test]
async fn deleting_a_blob_drops_chunks_with_no_remaining_references() {
	let backend = Arc::new(InMemoryStore::new());
	let store = BlobStore::new(FixedSizeChunker::new(4), backend.clone());

	store.store_blob("solo", b"unshared content", HashMap::new()).await.unwrap();
	assert!(!backend.is_empty());

	store.delete_blob("solo").await.unwrap();
	assert!(backend.is_empty());
}

#[tokio::test]
async fn storing_a_duplicate_identifier_is_rejected() {
	let store = store(8);
	store.store_blob("dup", b"one", HashMap::new()).await.unwrap();

	let err = store.store_blob("dup", b"two", HashMap::new()).await.unwrap_err();
	assert!(matches!(err, Error::BlobExists { .. }));
}

#[tokio::test]
async fn retrieving_or_deleting_an_unknown_identifier_errors() {
	let store = store(8);
	assert!(matches!(store.retrieve_blob("nope").await.unwrap_err(), Error::BlobNotFound { .. }));
	assert!(matches!(store.delete_blob("nope").await.unwrap_err(), Error::BlobNotFound { .. }));
}
