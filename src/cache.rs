//! Token cache layered over a [`CacheStore`].
//!
//! The [`CacheManager`] owns key layout and encoding. Lookups scan every stored key for the
//! client, accept entries whose scope is a superset of the requested scope, and judge expiry
//! lazily at read time against the injected [`Clock`]; nothing is swept in the background
//! and expired entries stay in the store until overwritten or removed.
//!
//! [`CacheManager::clear`] flips an in-memory cleared-generation marker before any storage
//! I/O happens. Until the asynchronous removal finishes, reads only see keys written after
//! the clear began, so a logout followed immediately by an authentication check observes an
//! empty cache even when the store is slow.

pub mod key;

pub use key::*;

// self
use crate::{
	_prelude::*,
	auth::{Audience, ClientId, TokenSecret, TokenSetEntry},
	clock::Clock,
	store::{CacheStore, StoreError},
};

/// Leeway applied when none is configured.
pub const DEFAULT_LEEWAY: Duration = Duration::seconds(60);

/// Scope-agnostic index of the latest refresh token for a client and audience.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WildcardRefreshRecord {
	/// Client that owns the refresh token.
	pub client_id: ClientId,
	/// Audience the refresh token was issued for.
	pub audience: Audience,
	/// Latest refresh token; last write wins.
	pub refresh_token: TokenSecret,
}

/// Scope-aware token cache with lazy expiry and a synchronous clear marker.
pub struct CacheManager {
	client_id: ClientId,
	store: Arc<dyn CacheStore>,
	clock: Arc<dyn Clock>,
	leeway: Duration,
	embed_refresh_token: bool,
	clear_state: Mutex<ClearState>,
}
impl CacheManager {
	/// Creates a manager for `client_id` over the provided store and clock.
	pub fn new(client_id: ClientId, store: Arc<dyn CacheStore>, clock: Arc<dyn Clock>) -> Self {
		Self {
			client_id,
			store,
			clock,
			leeway: DEFAULT_LEEWAY,
			embed_refresh_token: true,
			clear_state: Default::default(),
		}
	}

	/// Overrides the leeway subtracted from expiry before comparing to now.
	pub fn with_leeway(mut self, leeway: Duration) -> Self {
		self.leeway = if leeway.is_negative() { Duration::ZERO } else { leeway };

		self
	}

	/// Controls whether full-key entries keep their refresh token.
	///
	/// The wildcard refresh record is written either way.
	pub fn with_embedded_refresh_tokens(mut self, embed: bool) -> Self {
		self.embed_refresh_token = embed;

		self
	}

	/// Configured leeway.
	pub fn leeway(&self) -> Duration {
		self.leeway
	}

	/// Backing store.
	pub fn store(&self) -> &Arc<dyn CacheStore> {
		&self.store
	}

	/// Returns `true` while a clear is still removing keys.
	pub fn is_clearing(&self) -> bool {
		self.clear_state.lock().pending.is_some()
	}

	/// Looks up the best usable entry for `key` using the configured leeway.
	pub async fn get(&self, key: &CacheKey) -> Result<Option<TokenSetEntry>> {
		self.get_with_leeway(key, self.leeway).await
	}

	/// Looks up the best usable entry for `key`.
	///
	/// The exact key wins when it is still usable; otherwise the scope-compatible entry
	/// with the latest expiry is returned. Expired and unreadable entries count as misses
	/// and are left in place.
	pub async fn get_with_leeway(
		&self,
		key: &CacheKey,
		leeway: Duration,
	) -> Result<Option<TokenSetEntry>> {
		let now = self.clock.now();
		let mut best: Option<TokenSetEntry> = None;

		for raw in self.candidate_keys(key).await? {
			let Some(entry) = self.load::<TokenSetEntry>(&raw).await? else {
				continue;
			};

			if !entry.is_usable_at(now, leeway) {
				continue;
			}
			if raw == key.to_storage_key() {
				return Ok(Some(entry));
			}
			if best.as_ref().is_none_or(|current| entry.expires_at > current.expires_at) {
				best = Some(entry);
			}
		}

		Ok(best)
	}

	/// Persists `entry` under its full key and refreshes the wildcard record.
	pub async fn set(&self, entry: TokenSetEntry) -> Result<()> {
		let key = CacheKey::new(entry.client_id.clone(), entry.audience.clone(), entry.scope.clone());

		if let Some(refresh_token) = entry.refresh_token.as_ref().filter(|token| !token.is_empty()) {
			let record = WildcardRefreshRecord {
				client_id: entry.client_id.clone(),
				audience: entry.audience.clone(),
				refresh_token: refresh_token.clone(),
			};

			self.write(key.to_wildcard_storage_key(), &record).await?;
		}

		let stored = if self.embed_refresh_token { entry } else { entry.without_refresh_token() };

		self.write(key.to_storage_key(), &stored).await
	}

	/// Reads the wildcard refresh record for `(client_id, audience)`.
	pub async fn get_refresh_token(
		&self,
		client_id: &ClientId,
		audience: &Audience,
	) -> Result<Option<TokenSecret>> {
		let raw = wildcard_storage_key(client_id, audience);

		if !self.is_visible(&raw) {
			return Ok(None);
		}

		Ok(self.load::<WildcardRefreshRecord>(&raw).await?.map(|record| record.refresh_token))
	}

	/// Finds a refresh token for `key`, regardless of access-token expiry.
	///
	/// The exact entry is consulted first, then the wildcard record.
	pub async fn find_refresh_token(&self, key: &CacheKey) -> Result<Option<TokenSecret>> {
		let raw = key.to_storage_key();

		if self.is_visible(&raw) {
			let embedded = self
				.load::<TokenSetEntry>(&raw)
				.await?
				.and_then(|entry| entry.refresh_token)
				.filter(|token| !token.is_empty());

			if embedded.is_some() {
				return Ok(embedded);
			}
		}

		self.get_refresh_token(&key.client_id, &key.audience).await
	}

	/// Removes the full-key entry for `key`.
	pub async fn remove(&self, key: &CacheKey) -> Result<()> {
		self.store.remove(&key.to_storage_key()).await?;

		Ok(())
	}

	/// Clears every key that belongs to this client.
	///
	/// The cleared marker is set before this method returns, so dropping the future without
	/// awaiting it still hides the old entries from this manager. Keys written after the call
	/// stay visible and are not deleted. Calling it repeatedly is harmless.
	pub fn clear(&self) -> impl Future<Output = Result<()>> + Send + '_ {
		let generation = {
			let mut state = self.clear_state.lock();

			state.generation += 1;
			state.pending =
				Some(PendingClear { generation: state.generation, fresh_keys: HashSet::new() });

			state.generation
		};

		async move {
			let outcome = self.remove_client_keys().await;

			if outcome.is_ok() {
				let mut state = self.clear_state.lock();

				if state.pending.as_ref().is_some_and(|pending| pending.generation == generation) {
					state.pending = None;
				}
			}

			outcome
		}
	}

	async fn remove_client_keys(&self) -> Result<()> {
		let prefix = client_key_prefix(&self.client_id);

		for raw in self.store.all_keys().await? {
			if !raw.starts_with(&prefix) || self.is_fresh(&raw) {
				continue;
			}

			self.store.remove(&raw).await?;
		}

		Ok(())
	}

	async fn candidate_keys(&self, key: &CacheKey) -> Result<Vec<String>> {
		let exact = key.to_storage_key();
		let mut candidates = vec![exact.clone()];

		for raw in self.store.all_keys().await? {
			if raw == exact {
				continue;
			}
			if matches!(CacheKey::parse(&raw), Some((EntryKind::TokenSet, stored)) if key.is_satisfied_by(&stored))
			{
				candidates.push(raw);
			}
		}

		candidates.retain(|raw| self.is_visible(raw));

		Ok(candidates)
	}

	async fn load<T>(&self, raw: &str) -> Result<Option<T>>
	where
		T: for<'de> Deserialize<'de>,
	{
		let Some(value) = self.store.get(raw).await? else {
			return Ok(None);
		};
		let mut deserializer = serde_json::Deserializer::from_str(&value);

		match serde_path_to_error::deserialize::<_, T>(&mut deserializer) {
			Ok(decoded) => Ok(Some(decoded)),
			Err(e) => {
				#[cfg(feature = "tracing")]
				tracing::warn!(key = raw, path = %e.path(), "Ignoring unreadable cache entry.");
				#[cfg(not(feature = "tracing"))]
				let _ = e;

				Ok(None)
			},
		}
	}

	async fn write<T>(&self, raw: String, value: &T) -> Result<()>
	where
		T: Serialize,
	{
		let encoded = serde_json::to_string(value)
			.map_err(|e| StoreError::Serialization { message: e.to_string() })?;

		self.mark_fresh(&raw);
		self.store.set(&raw, encoded).await?;

		Ok(())
	}

	fn is_visible(&self, raw: &str) -> bool {
		self.clear_state.lock().pending.as_ref().is_none_or(|pending| pending.fresh_keys.contains(raw))
	}

	fn is_fresh(&self, raw: &str) -> bool {
		self.clear_state.lock().pending.as_ref().is_some_and(|pending| pending.fresh_keys.contains(raw))
	}

	fn mark_fresh(&self, raw: &str) {
		if let Some(pending) = self.clear_state.lock().pending.as_mut() {
			pending.fresh_keys.insert(raw.to_owned());
		}
	}
}
impl Debug for CacheManager {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("CacheManager")
			.field("client_id", &self.client_id)
			.field("leeway", &self.leeway)
			.field("embed_refresh_token", &self.embed_refresh_token)
			.field("clearing", &self.is_clearing())
			.finish_non_exhaustive()
	}
}

#[derive(Debug, Default)]
struct ClearState {
	generation: u64,
	pending: Option<PendingClear>,
}

#[derive(Debug)]
struct PendingClear {
	generation: u64,
	fresh_keys: HashSet<String>,
}

#[cfg(test)]
mod tests {
	// crates.io
	use time::macros;
	// self
	use super::*;
	use crate::{
		auth::{ScopeSet, TokenSetEntry},
		clock::TestClock,
		store::MemoryStore,
	};

	fn client() -> ClientId {
		ClientId::new("spa-client").expect("Client fixture should be valid.")
	}

	fn entry(scope: &str, expires_in: i64, clock: &TestClock) -> TokenSetEntry {
		TokenSetEntry::builder(
			client(),
			Audience::default(),
			scope.parse().expect("Scope fixture should parse."),
		)
		.access_token(format!("at-{scope}"))
		.id_token("id-token")
		.refresh_token(Some(TokenSecret::new("rt-1")))
		.issued_at(clock.now())
		.expires_in(expires_in)
		.build()
		.expect("Entry fixture should build.")
	}

	fn manager(store: Arc<MemoryStore>, clock: &TestClock) -> CacheManager {
		CacheManager::new(client(), store, Arc::new(clock.clone()))
	}

	fn key(scope: &str) -> CacheKey {
		CacheKey::new(client(), Audience::default(), scope.parse().expect("Scope should parse."))
	}

	#[tokio::test]
	async fn broader_entry_answers_narrower_request() {
		let clock = TestClock::new(macros::datetime!(2025-01-01 00:00 UTC));
		let cache = manager(Arc::new(MemoryStore::default()), &clock);

		cache
			.set(entry("openid profile email read:messages", 3_600, &clock))
			.await
			.expect("Set should succeed.");

		let hit = cache.get(&key("openid read:messages")).await.expect("Get should succeed.");

		assert_eq!(
			hit.map(|entry| entry.scope),
			Some(ScopeSet::from_str("openid profile email read:messages").expect("Scope should parse."))
		);
		assert!(
			cache.get(&key("openid write:messages")).await.expect("Get should succeed.").is_none()
		);
	}

	#[tokio::test]
	async fn expired_entries_miss_but_stay_stored() {
		let clock = TestClock::new(macros::datetime!(2025-01-01 00:00 UTC));
		let store = Arc::new(MemoryStore::default());
		let cache = manager(store.clone(), &clock);

		cache.set(entry("openid", 3_600, &clock)).await.expect("Set should succeed.");
		clock.advance(Duration::seconds(3_600 - 59));

		assert!(cache.get(&key("openid")).await.expect("Get should succeed.").is_none());
		assert_eq!(store.len(), 2, "Entry and wildcard record should remain stored.");
	}

	#[tokio::test]
	async fn corrupt_entries_are_misses() {
		let clock = TestClock::default();
		let store = Arc::new(MemoryStore::default());
		let cache = manager(store.clone(), &clock);

		store
			.set(&key("openid").to_storage_key(), "{\"access_token\":42}".into())
			.await
			.expect("Seeding corrupt entry should succeed.");

		assert!(cache.get(&key("openid")).await.expect("Corrupt entry should not error.").is_none());
	}

	#[tokio::test]
	async fn refresh_tokens_can_be_kept_out_of_full_entries() {
		let clock = TestClock::default();
		let store = Arc::new(MemoryStore::default());
		let cache = manager(store.clone(), &clock).with_embedded_refresh_tokens(false);

		cache.set(entry("openid", 3_600, &clock)).await.expect("Set should succeed.");

		let stored = cache
			.get(&key("openid"))
			.await
			.expect("Get should succeed.")
			.expect("Entry should be cached.");

		assert!(stored.refresh_token.is_none());
		assert_eq!(
			cache
				.get_refresh_token(&client(), &Audience::default())
				.await
				.expect("Wildcard lookup should succeed.")
				.map(|token| token.expose().to_owned()),
			Some("rt-1".into())
		);
		assert_eq!(
			cache
				.find_refresh_token(&key("openid other"))
				.await
				.expect("Refresh lookup should succeed.")
				.map(|token| token.expose().to_owned()),
			Some("rt-1".into())
		);
	}

	#[tokio::test]
	async fn dropped_clear_still_hides_entries_and_keeps_fresh_writes() {
		let clock = TestClock::default();
		let store = Arc::new(MemoryStore::default());
		let cache = manager(store.clone(), &clock);

		cache.set(entry("openid", 3_600, &clock)).await.expect("Set should succeed.");

		drop(cache.clear());

		assert!(cache.is_clearing());
		assert!(cache.get(&key("openid")).await.expect("Get should succeed.").is_none());

		cache.set(entry("openid profile", 3_600, &clock)).await.expect("Set should succeed.");

		assert!(cache.get(&key("openid profile")).await.expect("Get should succeed.").is_some());

		cache.clear().await.expect("Second clear should succeed.");

		assert!(!cache.is_clearing());
		assert!(store.is_empty());
	}
}
