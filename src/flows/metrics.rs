//! Renewal counters exposed by the client.

// std
use std::sync::atomic::{AtomicU64, Ordering};

/// Thread-safe counters for token requests and the renewals they caused.
#[derive(Debug, Default)]
pub struct RenewalMetrics {
	attempts: AtomicU64,
	cache_hits: AtomicU64,
	refresh_exchanges: AtomicU64,
	iframe_reauths: AtomicU64,
	fallbacks: AtomicU64,
	failures: AtomicU64,
}
impl RenewalMetrics {
	/// Token requests received, coalesced callers included.
	pub fn attempts(&self) -> u64 {
		self.attempts.load(Ordering::Relaxed)
	}

	/// Requests answered from the cache before or after taking the lock.
	pub fn cache_hits(&self) -> u64 {
		self.cache_hits.load(Ordering::Relaxed)
	}

	/// Refresh-token exchanges started.
	pub fn refresh_exchanges(&self) -> u64 {
		self.refresh_exchanges.load(Ordering::Relaxed)
	}

	/// Hidden-iframe re-authentications started.
	pub fn iframe_reauths(&self) -> u64 {
		self.iframe_reauths.load(Ordering::Relaxed)
	}

	/// Renewals that reached the network by either strategy.
	pub fn network_renewals(&self) -> u64 {
		self.refresh_exchanges() + self.iframe_reauths()
	}

	/// Refresh exchanges that fell back to the iframe after an invalid grant.
	pub fn fallbacks(&self) -> u64 {
		self.fallbacks.load(Ordering::Relaxed)
	}

	/// Requests that ended in an error.
	pub fn failures(&self) -> u64 {
		self.failures.load(Ordering::Relaxed)
	}

	pub(crate) fn record_attempt(&self) {
		self.attempts.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_cache_hit(&self) {
		self.cache_hits.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_refresh_exchange(&self) {
		self.refresh_exchanges.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_iframe_reauth(&self) {
		self.iframe_reauths.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_fallback(&self) {
		self.fallbacks.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_failure(&self) {
		self.failures.fetch_add(1, Ordering::Relaxed);
	}
}
