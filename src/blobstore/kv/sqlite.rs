//! SQLite-backed key-value store, storing the reference count alongside each row.
//!
//! `rusqlite` is a blocking driver; its connection is guarded by a `parking_lot::Mutex` and each
//! call does its work synchronously inside the async method body, mirroring how the in-memory and
//! LRU backends are "async" purely for trait uniformity with the genuinely async Redis variant.

use parking_lot::Mutex;
use rusqlite::{Connection, OptionalExtension, params};

use crate::{Error, Result, blobstore::ChunkKey, blobstore::kv::KeyValueStore};

/// A chunk store over a SQLite database, with rows shaped `(key, value, ref_count)`.
pub struct SqliteStore {
	conn: Mutex<Connection>,
}
impl SqliteStore {
	/// Open (or create) the chunk table on `conn`.
	pub fn new(conn: Connection) -> Result<Self> {
		conn.execute(
			"CREATE TABLE IF NOT EXISTS chunks (
				key TEXT PRIMARY KEY,
				value BLOB NOT NULL,
				ref_count INTEGER NOT NULL
			)",
			[],
		)
		.map_err(Error::from)?;

		Ok(Self { conn: Mutex::new(conn) })
	}

	/// Open an in-memory database, primarily for tests.
	pub fn in_memory() -> Result<Self> {
		Self::new(Connection::open_in_memory().map_err(Error::from)?)
	}
}
#[async_trait::async_trait]
impl KeyValueStore for SqliteStore {
	async fn put(&self, key: ChunkKey, value: Vec<u8>) -> Result<()> {
		let conn = self.conn.lock();
		let hex = key.to_hex();

		let updated = conn
			.execute("UPDATE chunks SET ref_count = ref_count + 1 WHERE key = ?1", params![hex])
			.map_err(Error::from)?;

		if updated == 0 {
			conn.execute("INSERT INTO chunks (key, value, ref_count) VALUES (?1, ?2, 1)", params![hex, value])
				.map_err(Error::from)?;
		}

		Ok(())
	}

	async fn get(&self, key: &ChunkKey) -> Result<Option<Vec<u8>>> {
		let conn = self.conn.lock();
		conn.query_row("SELECT value FROM chunks WHERE key = ?1", params![key.to_hex()], |row| row.get(0))
			.optional()
			.map_err(Error::from)
	}

	async fn delete(&self, key: &ChunkKey) -> Result<()> {
		let conn = self.conn.lock();
		let hex = key.to_hex();

		conn.execute("UPDATE chunks SET ref_count = ref_count - 1 WHERE key = ?1", params![hex]).map_err(Error::from)?;
		conn.execute("DELETE FROM chunks WHERE key = ?1 AND ref_count <= 0", params![hex]).map_err(Error::from)?;

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
	async fn put_get_delete_round_trip() {
		let store = SqliteStore::in_memory().unwrap();
		store.put(key(1), b"value".to_vec()).await.unwrap();
		assert_eq!(store.get(&key(1)).await.unwrap(), Some(b"value".to_vec()));

		store.delete(&key(1)).await.unwrap();
		assert_eq!(store.get(&key(1)).await.unwrap(), None);
	}

	#[tokio::test]
	async fn repeated_put_increments_ref_count_without_overwriting_value() {
		let store = SqliteStore::in_memory().unwrap();
		store.put(key(1), b"first".to_vec()).await.unwrap();
		store.put(key(1), b"second".to_vec()).await.unwrap();

		store.delete(&key(1)).await.unwrap();
		assert_eq!(store.get(&key(1)).await.unwrap(), Some(b"first".to_vec()));

		store.delete(&key(1)).await.unwrap();
		assert_eq!(store.get(&key(1)).await.unwrap(), None);
	}
}
