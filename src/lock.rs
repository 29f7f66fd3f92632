//! Named mutual exclusion shared by every instance of the same client.
//!
//! Renewal takes one lock per client id (`{namespace}.{client_id}`), not per fingerprint, so
//! all renewals for a client are serialized across instances. [`acquire_with_retry`] performs
//! the bounded attempt loop and hands back a [`LockGuard`] that must be released on every exit
//! path; dropping an unreleased guard schedules the release on the current tokio runtime.

pub mod file;
pub mod memory;

pub use file::FileLock;
pub use memory::MemoryLock;

// self
use crate::{_prelude::*, error::TimeoutKind};

/// Namespace prefixed to every renewal lock name.
pub const LOCK_NAMESPACE: &str = "oauth2_silent.lock.get_token_silently";

/// Boxed future returned by [`InstanceLock`] operations.
pub type LockFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + 'a + Send>>;

/// Cross-instance named lock capability.
pub trait InstanceLock
where
	Self: Send + Sync,
{
	/// Tries to take `name`, waiting at most `timeout`; resolves to `false` on timeout.
	fn acquire<'a>(&'a self, name: &'a str, timeout: Duration) -> LockFuture<'a, bool>;

	/// Releases `name`; releasing a lock that is not held is a no-op.
	fn release<'a>(&'a self, name: &'a str) -> LockFuture<'a, ()>;
}

/// Attempt budget for renewal lock acquisition.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockPolicy {
	/// Maximum number of acquisition attempts.
	pub attempts: u32,
	/// Time allowed for each attempt.
	pub attempt_timeout: Duration,
}
impl LockPolicy {
	/// Default number of attempts.
	pub const DEFAULT_ATTEMPTS: u32 = 10;
	/// Default per-attempt timeout.
	pub const DEFAULT_ATTEMPT_TIMEOUT: Duration = Duration::milliseconds(5_000);
}
impl Default for LockPolicy {
	fn default() -> Self {
		Self { attempts: Self::DEFAULT_ATTEMPTS, attempt_timeout: Self::DEFAULT_ATTEMPT_TIMEOUT }
	}
}

/// Held renewal lock.
///
/// Call [`release`](Self::release) once the protected section finishes. If the guard is dropped
/// first (for example because the owning future was cancelled) the release is spawned on the
/// ambient tokio runtime.
pub struct LockGuard {
	lock: Arc<dyn InstanceLock>,
	name: String,
	released: bool,
}
impl LockGuard {
	/// Name of the held lock.
	pub fn name(&self) -> &str {
		&self.name
	}

	/// Releases the lock.
	pub async fn release(mut self) -> Result<()> {
		self.released = true;

		self.lock.release(&self.name).await
	}
}
impl Debug for LockGuard {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("LockGuard")
			.field("name", &self.name)
			.field("released", &self.released)
			.finish()
	}
}
impl Drop for LockGuard {
	fn drop(&mut self) {
		if self.released {
			return;
		}

		let Ok(handle) = tokio::runtime::Handle::try_current() else {
			#[cfg(feature = "tracing")]
			tracing::warn!(lock = %self.name, "Lock guard dropped outside a runtime; release skipped.");

			return;
		};
		let lock = self.lock.clone();
		let name = std::mem::take(&mut self.name);

		handle.spawn(async move {
			let _ = lock.release(&name).await;
		});
	}
}

/// Builds the renewal lock name for `client_id`.
pub fn lock_name(client_id: &str) -> String {
	format!("{LOCK_NAMESPACE}.{client_id}")
}

/// Acquires `name`, retrying up to `policy.attempts` times.
///
/// Attempts run back to back; each one waits at most `policy.attempt_timeout`. Exhausting the
/// budget yields a lock [`Timeout`](crate::error::Error::Timeout).
pub async fn acquire_with_retry(
	lock: Arc<dyn InstanceLock>,
	name: impl Into<String>,
	policy: LockPolicy,
) -> Result<LockGuard> {
	let name = name.into();

	for attempt in 1..=policy.attempts.max(1) {
		if lock.acquire(&name, policy.attempt_timeout).await? {
			#[cfg(feature = "tracing")]
			tracing::debug!(lock = %name, attempt, "Renewal lock acquired.");
			#[cfg(not(feature = "tracing"))]
			let _ = attempt;

			return Ok(LockGuard { lock, name, released: false });
		}
	}

	#[cfg(feature = "tracing")]
	tracing::warn!(lock = %name, attempts = policy.attempts, "Renewal lock attempts exhausted.");

	Err(TimeoutKind::Lock.into())
}
