//! Key/value persistence contract behind the cache manager, plus built-in stores.
//!
//! Stores only deal in opaque string keys and serialized string values, mirroring browser
//! storage: the [`CacheManager`](crate::cache::CacheManager) owns key layout and
//! encoding. Implementations may answer synchronously (by returning a ready future) or
//! suspend on real I/O; callers treat both the same way.

pub mod file;
pub mod memory;

pub use file::FileStore;
pub use memory::MemoryStore;

// self
use crate::_prelude::*;

/// Boxed future returned by [`CacheStore`] operations.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StoreError>> + 'a + Send>>;

/// Pluggable key/value storage shared by every client instance that points at it.
pub trait CacheStore
where
	Self: Send + Sync,
{
	/// Reads the raw value stored under `key`.
	fn get<'a>(&'a self, key: &'a str) -> StoreFuture<'a, Option<String>>;

	/// Writes `value` under `key`, replacing any previous value.
	fn set<'a>(&'a self, key: &'a str, value: String) -> StoreFuture<'a, ()>;

	/// Deletes `key`; missing keys are not an error.
	fn remove<'a>(&'a self, key: &'a str) -> StoreFuture<'a, ()>;

	/// Lists every key currently stored.
	fn all_keys(&self) -> StoreFuture<'_, Vec<String>>;
}

/// Error type produced by [`CacheStore`] implementations.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ThisError)]
pub enum StoreError {
	/// Serialization failures surfaced by the backend.
	#[error("Serialization error: {message}.")]
	Serialization {
		/// Human-readable error payload.
		message: String,
	},
	/// Backend-level failure for the storage engine.
	#[error("Backend failure: {message}.")]
	Backend {
		/// Human-readable error payload.
		message: String,
	},
}
