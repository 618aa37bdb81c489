//! Crate-wide error types and `Result` alias.

use crate::queue::ItemId;

/// Library-wide result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Unified error type covering both the priority queue and the blob store.
#[allow(missing_docs)]
#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error(transparent)]
	Io(#[from] std::io::Error),
	#[error(transparent)]
	Serde(#[from] serde_json::Error),

	#[cfg(feature = "redis")]
	#[error(transparent)]
	Redis(#[from] redis::RedisError),
	#[cfg(feature = "sqlite")]
	#[error(transparent)]
	Sqlite(#[from] rusqlite::Error),

	#[error("Item {item} has a deadline at or before the current time.")]
	ItemExpired { item: ItemId },
	#[error("Item {item} has a deadline earlier than its maturation time.")]
	InvalidWindow { item: ItemId },
	#[error("Item {item} would introduce a cyclic dependency.")]
	CyclicDependency { item: ItemId },
	#[error("Item {item} is invalid: {reason}")]
	InvalidItem { item: ItemId, reason: String },
	#[error("The queue has no eligible item to pop.")]
	QueueEmpty,
	#[error("Item {item} has exhausted its {max_retries} retries.")]
	RetryLimitExceeded { item: ItemId, max_retries: u32 },
	#[error("A blob with identifier '{identifier}' already exists.")]
	BlobExists { identifier: String },
	#[error("No blob with identifier '{identifier}' was found.")]
	BlobNotFound { identifier: String },
	#[error("Blob '{identifier}' failed integrity verification after reassembly.")]
	BlobCorrupted { identifier: String },

	#[error("Compression backend error: {0}")]
	Compression(String),
	#[error("Metrics error: {0}")]
	Metrics(String),
}

#[cfg(feature = "metrics")]
impl<T> From<metrics::SetRecorderError<T>> for Error
where
	T: std::fmt::Display,
{
	fn from(value: metrics::SetRecorderError<T>) -> Self {
		Self::Metrics(value.to_string())
	}
}
