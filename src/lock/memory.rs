//! In-process [`InstanceLock`] for client instances that share one process.

// std
use std::sync::OnceLock;
// crates.io
use async_lock::{Mutex as AsyncMutex, MutexGuardArc};
// self
use crate::{
	_prelude::*,
	clock,
	lock::{InstanceLock, LockFuture},
};

/// Lock registry keyed by name.
///
/// Clones share the same registry; [`MemoryLock::global`] returns the process-wide registry so
/// independently built clients coordinate without sharing a handle.
#[derive(Clone, Default)]
pub struct MemoryLock(Arc<Registry>);
impl MemoryLock {
	/// Process-wide registry.
	pub fn global() -> Self {
		static GLOBAL: OnceLock<MemoryLock> = OnceLock::new();

		GLOBAL.get_or_init(Self::default).clone()
	}

	/// Returns `true` while `name` is held.
	pub fn is_held(&self, name: &str) -> bool {
		self.0.held.lock().contains_key(name)
	}

	fn slot(&self, name: &str) -> Arc<AsyncMutex<()>> {
		self.0.slots.lock().entry(name.to_owned()).or_default().clone()
	}
}
impl Debug for MemoryLock {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("MemoryLock")
			.field("held", &self.0.held.lock().keys().collect::<Vec<_>>())
			.finish()
	}
}
impl InstanceLock for MemoryLock {
	fn acquire<'a>(&'a self, name: &'a str, timeout: Duration) -> LockFuture<'a, bool> {
		let slot = self.slot(name);

		Box::pin(async move {
			match tokio::time::timeout(clock::to_std(timeout), slot.lock_arc()).await {
				Ok(guard) => {
					self.0.held.lock().insert(name.to_owned(), guard);

					Ok(true)
				},
				Err(_) => Ok(false),
			}
		})
	}

	fn release<'a>(&'a self, name: &'a str) -> LockFuture<'a, ()> {
		let guard = self.0.held.lock().remove(name);

		drop(guard);

		Box::pin(async { Ok(()) })
	}
}

#[derive(Default)]
struct Registry {
	slots: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
	held: Mutex<HashMap<String, MutexGuardArc<()>>>,
}
