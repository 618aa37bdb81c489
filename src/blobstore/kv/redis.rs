//! Redis-backed key-value store, colocating each chunk's reference count in a companion key.

use redis::AsyncCommands;

use crate::{Error, Result, blobstore::ChunkKey, blobstore::kv::KeyValueStore};

/// A chunk store over a Redis connection, using `get_multiplexed_async_connection` the way the
/// identity-provider registry's own Redis persistence does.
#[derive(Clone)]
pub struct RedisStore {
	client: redis::Client,
	namespace: String,
}
impl RedisStore {
	/// Build a store over `client`, namespacing every key under `namespace` to avoid collisions
	/// with unrelated data sharing the same Redis instance.
	pub fn new(client: redis::Client, namespace: impl Into<String>) -> Self {
		Self { client, namespace: namespace.into() }
	}

	fn value_key(&self, key: &ChunkKey) -> String {
		format!("{}:value:{key}", self.namespace)
	}

	fn count_key(&self, key: &ChunkKey) -> String {
		format!("{}:count:{key}", self.namespace)
	}
}
#[async_trait::async_trait]
impl KeyValueStore for RedisStore {
	async fn put(&self, key: ChunkKey, value: Vec<u8>) -> Result<()> {
		let mut conn = self.client.get_multiplexed_async_connection().await.map_err(Error::from)?;
		let count_key = self.count_key(&key);

		let count: i64 = conn.incr(&count_key, 1).await.map_err(Error::from)?;
		if count == 1 {
			conn.set::<_, _, ()>(self.value_key(&key), value).await.map_err(Error::from)?;
		}

		Ok(())
	}

	async fn get(&self, key: &ChunkKey) -> Result<Option<Vec<u8>>> {
		let mut conn = self.client.get_multiplexed_async_connection().await.map_err(Error::from)?;
		let value: Option<Vec<u8>> = conn.get(self.value_key(key)).await.map_err(Error::from)?;
		Ok(value)
	}

	async fn delete(&self, key: &ChunkKey) -> Result<()> {
		let mut conn = self.client.get_multiplexed_async_connection().await.map_err(Error::from)?;
		let count_key = self.count_key(key);

		let count: i64 = conn.decr(&count_key, 1).await.map_err(Error::from)?;
		if count <= 0 {
			let keys = vec![count_key, self.value_key(key)];
			let _: () = conn.del(keys).await.map_err(Error::from)?;
		}

		Ok(())
	}
}
