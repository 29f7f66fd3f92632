//! Thread-safe in-memory [`CacheStore`] that answers without suspending.

// self
use crate::{
	_prelude::*,
	store::{CacheStore, StoreError, StoreFuture},
};

type StoreMap = Arc<RwLock<HashMap<String, String>>>;

/// In-process key/value store.
///
/// Clones share the same map, which lets several client instances in one process behave like
/// tabs that share browser storage.
#[derive(Clone, Debug, Default)]
pub struct MemoryStore(StoreMap);
impl MemoryStore {
	/// Number of keys currently held.
	pub fn len(&self) -> usize {
		self.0.read().len()
	}

	/// Returns `true` when nothing is stored.
	pub fn is_empty(&self) -> bool {
		self.0.read().is_empty()
	}

	fn ready<'a, T>(value: T) -> StoreFuture<'a, T>
	where
		T: 'a + Send,
	{
		Box::pin(std::future::ready(Ok::<_, StoreError>(value)))
	}
}
impl CacheStore for MemoryStore {
	fn get<'a>(&'a self, key: &'a str) -> StoreFuture<'a, Option<String>> {
		Self::ready(self.0.read().get(key).cloned())
	}

	fn set<'a>(&'a self, key: &'a str, value: String) -> StoreFuture<'a, ()> {
		self.0.write().insert(key.to_owned(), value);

		Self::ready(())
	}

	fn remove<'a>(&'a self, key: &'a str) -> StoreFuture<'a, ()> {
		self.0.write().remove(key);

		Self::ready(())
	}

	fn all_keys(&self) -> StoreFuture<'_, Vec<String>> {
		Self::ready(self.0.read().keys().cloned().collect())
	}
}
