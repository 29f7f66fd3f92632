//! Silent-renewal client: token requests, renewal strategies, and session helpers.
//!
//! [`SilentClient`] wires the cache manager, the renewal lock, the token endpoint, and the
//! external collaborators together. A token request first goes through the
//! [`SingleFlight`] coordinator, then the cache; a miss takes the renewal lock, re-checks
//! the cache, and renews by refresh-token exchange or hidden-iframe re-authentication.

pub mod get_token;
pub mod iframe;
pub mod metrics;
pub mod session;
pub mod single_flight;

mod refresh;

pub use get_token::*;
pub use metrics::RenewalMetrics;
pub use session::*;
pub use single_flight::SingleFlight;

// self
#[cfg(feature = "reqwest")]
use crate::{http::ReqwestHttpClient, oauth::ReqwestTokenEndpoint, oauth::ReqwestTransportErrorMapper};
use crate::{
	_prelude::*,
	auth::DetailedTokenResponse,
	cache::CacheManager,
	clock::{Clock, SystemClock},
	config::{CacheLocation, ClientConfig},
	error::ConfigError,
	ext::{
		ClaimsVerifier, MemoryTransactionStore, SilentAuthenticator, TokenVerifier,
		TransactionStore,
	},
	lock::{InstanceLock, MemoryLock},
	oauth::TokenEndpoint,
	store::{CacheStore, FileStore, MemoryStore},
	worker::TokenWorker,
};

/// OAuth 2.0/OIDC public client that caches token sets and renews them silently.
///
/// Share one instance (behind [`Arc`]) per process for a given client; independent
/// instances coordinate through the [`InstanceLock`] and the shared [`CacheStore`].
pub struct SilentClient {
	config: ClientConfig,
	cache: CacheManager,
	hints: Arc<dyn CacheStore>,
	clock: Arc<dyn Clock>,
	lock: Arc<dyn InstanceLock>,
	endpoint: Arc<dyn TokenEndpoint>,
	authenticator: Arc<dyn SilentAuthenticator>,
	verifier: Arc<dyn TokenVerifier>,
	transactions: Arc<dyn TransactionStore>,
	worker: Option<TokenWorker>,
	flights: SingleFlight<DetailedTokenResponse>,
	metrics: Arc<RenewalMetrics>,
}
impl SilentClient {
	/// Starts a builder for `config`.
	pub fn builder(config: ClientConfig) -> SilentClientBuilder {
		SilentClientBuilder::new(config)
	}

	/// Validated configuration.
	pub fn config(&self) -> &ClientConfig {
		&self.config
	}

	/// Token cache.
	pub fn cache(&self) -> &CacheManager {
		&self.cache
	}

	/// Renewal counters.
	pub fn metrics(&self) -> &Arc<RenewalMetrics> {
		&self.metrics
	}

	/// Returns `true` when refresh exchanges are relayed through the worker.
	pub fn uses_worker(&self) -> bool {
		self.worker.is_some()
	}
}
impl Debug for SilentClient {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("SilentClient")
			.field("client_id", &self.config.client_id)
			.field("cache", &self.cache)
			.field("uses_worker", &self.uses_worker())
			.field("flights", &self.flights)
			.finish_non_exhaustive()
	}
}

/// Builder for [`SilentClient`].
///
/// Only the [`SilentAuthenticator`] is mandatory. Defaults: the cache store follows
/// [`ClientConfig::cache_location`], session hints share the cache store, the lock is the
/// process-wide [`MemoryLock`], the verifier is [`ClaimsVerifier`], and the token endpoint is
/// reqwest-backed.
pub struct SilentClientBuilder {
	config: ClientConfig,
	store: Option<Arc<dyn CacheStore>>,
	hints: Option<Arc<dyn CacheStore>>,
	clock: Option<Arc<dyn Clock>>,
	lock: Option<Arc<dyn InstanceLock>>,
	endpoint: Option<Arc<dyn TokenEndpoint>>,
	authenticator: Option<Arc<dyn SilentAuthenticator>>,
	verifier: Option<Arc<dyn TokenVerifier>>,
	transactions: Option<Arc<dyn TransactionStore>>,
}
impl SilentClientBuilder {
	fn new(config: ClientConfig) -> Self {
		Self {
			config,
			store: None,
			hints: None,
			clock: None,
			lock: None,
			endpoint: None,
			authenticator: None,
			verifier: None,
			transactions: None,
		}
	}

	/// Uses a caller-supplied cache store; it wins over the configured cache location.
	pub fn store(mut self, store: Arc<dyn CacheStore>) -> Self {
		self.store = Some(store);

		self
	}

	/// Stores session hints separately from token sets.
	pub fn hint_store(mut self, store: Arc<dyn CacheStore>) -> Self {
		self.hints = Some(store);

		self
	}

	/// Overrides the clock.
	pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
		self.clock = Some(clock);

		self
	}

	/// Overrides the renewal lock.
	pub fn lock(mut self, lock: Arc<dyn InstanceLock>) -> Self {
		self.lock = Some(lock);

		self
	}

	/// Overrides the token endpoint client.
	pub fn token_endpoint(mut self, endpoint: Arc<dyn TokenEndpoint>) -> Self {
		self.endpoint = Some(endpoint);

		self
	}

	/// Sets the hidden-iframe navigator.
	pub fn authenticator(mut self, authenticator: Arc<dyn SilentAuthenticator>) -> Self {
		self.authenticator = Some(authenticator);

		self
	}

	/// Overrides the ID-token verifier.
	pub fn verifier(mut self, verifier: Arc<dyn TokenVerifier>) -> Self {
		self.verifier = Some(verifier);

		self
	}

	/// Overrides the transaction store.
	pub fn transactions(mut self, transactions: Arc<dyn TransactionStore>) -> Self {
		self.transactions = Some(transactions);

		self
	}

	/// Validates the collaborators and builds the client.
	///
	/// The worker is started only when refresh tokens are enabled, the cache lives in memory,
	/// the configuration allows it, and a tokio runtime is available.
	pub fn build(self) -> Result<SilentClient> {
		let config = self.config;
		let authenticator =
			self.authenticator.ok_or(ConfigError::MissingCollaborator("silent authenticator"))?;
		let store = match self.store {
			Some(store) => store,
			None => default_store(&config)?,
		};
		let hints = self.hints.unwrap_or_else(|| store.clone());
		let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
		let lock = self.lock.unwrap_or_else(|| Arc::new(MemoryLock::global()));
		let endpoint = match self.endpoint {
			Some(endpoint) => endpoint,
			None => default_endpoint(&config)?,
		};
		let worker = if config.use_refresh_tokens
			&& config.use_worker
			&& config.cache_location == CacheLocation::Memory
			&& TokenWorker::is_supported()
		{
			Some(TokenWorker::spawn(endpoint.clone())?)
		} else {
			None
		};
		let cache = CacheManager::new(config.client_id.clone(), store, clock.clone())
			.with_leeway(config.leeway)
			.with_embedded_refresh_tokens(worker.is_none());

		#[cfg(feature = "tracing")]
		tracing::debug!(
			client_id = %config.client_id,
			cache_location = %config.cache_location,
			worker = worker.is_some(),
			"Silent client built."
		);

		Ok(SilentClient {
			config,
			cache,
			hints,
			clock,
			lock,
			endpoint,
			authenticator,
			verifier: self.verifier.unwrap_or_else(|| Arc::new(ClaimsVerifier)),
			transactions: self
				.transactions
				.unwrap_or_else(|| Arc::new(MemoryTransactionStore::default())),
			worker,
			flights: SingleFlight::default(),
			metrics: Default::default(),
		})
	}
}

fn default_store(config: &ClientConfig) -> Result<Arc<dyn CacheStore>> {
	match (config.cache_location, config.cache_path.as_ref()) {
		(CacheLocation::Memory, _) => Ok(Arc::new(MemoryStore::default())),
		(CacheLocation::File, Some(path)) => Ok(Arc::new(FileStore::open(path.clone())?)),
		(CacheLocation::File, None) => Err(ConfigError::MissingCachePath.into()),
	}
}

#[cfg(feature = "reqwest")]
fn default_endpoint(config: &ClientConfig) -> Result<Arc<dyn TokenEndpoint>> {
	let http_client = ReqwestHttpClient::with_timeout(config.fetch_timeout)?;

	Ok(Arc::new(ReqwestTokenEndpoint::new(
		&config.client_id,
		config.token_endpoint.clone(),
		http_client,
		ReqwestTransportErrorMapper,
	)))
}

#[cfg(not(feature = "reqwest"))]
fn default_endpoint(_: &ClientConfig) -> Result<Arc<dyn TokenEndpoint>> {
	Err(ConfigError::MissingTokenEndpoint.into())
}
