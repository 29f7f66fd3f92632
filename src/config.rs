//! Client configuration and its validating builder.

// std
use std::path::PathBuf;
// self
use crate::{
	_prelude::*,
	auth::{Audience, ClientId, OFFLINE_ACCESS_SCOPE, OPENID_SCOPE, ScopeSet},
	cache::DEFAULT_LEEWAY,
	error::ConfigError,
	lock::LockPolicy,
};

/// Scope requested when the caller configures none.
pub const DEFAULT_SCOPE: &str = "openid profile email";
/// Time allowed for the hidden iframe to answer.
pub const DEFAULT_AUTHORIZE_TIMEOUT: Duration = Duration::seconds(60);
/// Time allowed for a token endpoint request.
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::seconds(10);
/// Lifetime of the is-authenticated session hint, in days.
pub const DEFAULT_SESSION_CHECK_EXPIRY_DAYS: u32 = 1;

/// Where token sets are persisted.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheLocation {
	/// Process memory; lost on restart.
	#[default]
	Memory,
	/// JSON file shared by every process pointing at the same path.
	File,
}
impl CacheLocation {
	/// Configuration name of the location.
	pub const fn as_str(self) -> &'static str {
		match self {
			CacheLocation::Memory => "memory",
			CacheLocation::File => "file",
		}
	}
}
impl AsRef<str> for CacheLocation {
	fn as_ref(&self) -> &str {
		self.as_str()
	}
}
impl Display for CacheLocation {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}
impl FromStr for CacheLocation {
	type Err = ConfigError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s {
			"memory" => Ok(Self::Memory),
			"file" => Ok(Self::File),
			other => Err(ConfigError::InvalidCacheLocation(other.to_owned())),
		}
	}
}

/// Validated client configuration.
#[derive(Clone, Debug)]
pub struct ClientConfig {
	/// OAuth client identifier.
	pub client_id: ClientId,
	/// Base URL derived from the domain; endpoints hang off it.
	pub domain_url: Url,
	/// Expected `iss` of ID tokens.
	pub issuer: Url,
	/// Token endpoint.
	pub token_endpoint: Url,
	/// Authorize endpoint used by iframe re-authentication.
	pub authorize_endpoint: Url,
	/// Redirect URI sent with authorize and code-exchange requests.
	pub redirect_uri: Option<Url>,
	/// Audience used when a request does not name one.
	pub audience: Audience,
	/// Client-level scope; carries `offline_access` when refresh tokens are enabled.
	pub scope: ScopeSet,
	/// Scope merged into every request; always carries `openid`.
	pub default_scope: ScopeSet,
	/// Renew with refresh tokens when one is available.
	pub use_refresh_tokens: bool,
	/// Token-set persistence location.
	pub cache_location: CacheLocation,
	/// File backing the [`CacheLocation::File`] store.
	pub cache_path: Option<PathBuf>,
	/// Seconds subtracted from expiry before comparing to now.
	pub leeway: Duration,
	/// Hidden iframe deadline.
	pub authorize_timeout: Duration,
	/// Token endpoint request deadline.
	pub fetch_timeout: Duration,
	/// Renewal lock attempt budget.
	pub lock: LockPolicy,
	/// Relay refresh exchanges through the worker when it is supported.
	pub use_worker: bool,
	/// Lifetime of the is-authenticated hint, in days.
	pub session_check_expiry_days: u32,
	/// Organization sent with authorize requests and enforced on ID tokens.
	pub organization: Option<String>,
	/// Maximum authentication age.
	pub max_age: Option<Duration>,
	/// Extra parameters sent with authorize and token requests.
	pub extra_params: BTreeMap<String, String>,
}
impl ClientConfig {
	/// Starts a builder for `client_id` at `domain` (a bare host or a full base URL).
	pub fn builder(domain: impl Into<String>, client_id: ClientId) -> ClientConfigBuilder {
		ClientConfigBuilder::new(domain.into(), client_id)
	}

	/// Unique union of the default scope, the client scope, and `requested`.
	pub fn effective_scope(&self, requested: Option<&ScopeSet>) -> ScopeSet {
		ScopeSet::merge([&self.default_scope, &self.scope].into_iter().chain(requested))
	}

	/// Origin allowed to post authorize callbacks.
	pub fn authorize_origin(&self) -> String {
		self.authorize_endpoint.origin().ascii_serialization()
	}

	/// Lifetime of the is-authenticated session hint.
	pub fn session_check_expiry(&self) -> Duration {
		Duration::days(i64::from(self.session_check_expiry_days))
	}
}

/// Builder for [`ClientConfig`]; every value is validated in [`build`](Self::build).
#[derive(Clone, Debug)]
pub struct ClientConfigBuilder {
	domain: String,
	client_id: ClientId,
	issuer: Option<String>,
	redirect_uri: Option<Url>,
	audience: Option<String>,
	scope: Option<String>,
	default_scope: Option<String>,
	use_refresh_tokens: bool,
	cache_location: Option<String>,
	cache_path: Option<PathBuf>,
	leeway: Duration,
	authorize_timeout: Duration,
	fetch_timeout: Duration,
	lock: LockPolicy,
	use_worker: bool,
	session_check_expiry_days: u32,
	organization: Option<String>,
	max_age: Option<Duration>,
	extra_params: BTreeMap<String, String>,
}
impl ClientConfigBuilder {
	fn new(domain: String, client_id: ClientId) -> Self {
		Self {
			domain,
			client_id,
			issuer: None,
			redirect_uri: None,
			audience: None,
			scope: None,
			default_scope: None,
			use_refresh_tokens: false,
			cache_location: None,
			cache_path: None,
			leeway: DEFAULT_LEEWAY,
			authorize_timeout: DEFAULT_AUTHORIZE_TIMEOUT,
			fetch_timeout: DEFAULT_FETCH_TIMEOUT,
			lock: LockPolicy::default(),
			use_worker: true,
			session_check_expiry_days: DEFAULT_SESSION_CHECK_EXPIRY_DAYS,
			organization: None,
			max_age: None,
			extra_params: BTreeMap::new(),
		}
	}

	/// Overrides the expected issuer (bare host or full URL).
	pub fn issuer(mut self, issuer: impl Into<String>) -> Self {
		self.issuer = Some(issuer.into());

		self
	}

	/// Sets the redirect URI.
	pub fn redirect_uri(mut self, redirect_uri: Url) -> Self {
		self.redirect_uri = Some(redirect_uri);

		self
	}

	/// Sets the default audience.
	pub fn audience(mut self, audience: impl Into<String>) -> Self {
		self.audience = Some(audience.into());

		self
	}

	/// Sets the client-level scope (space-delimited).
	pub fn scope(mut self, scope: impl Into<String>) -> Self {
		self.scope = Some(scope.into());

		self
	}

	/// Replaces the default scope (space-delimited); `openid` is always kept.
	pub fn default_scope(mut self, scope: impl Into<String>) -> Self {
		self.default_scope = Some(scope.into());

		self
	}

	/// Enables refresh-token renewal.
	pub fn use_refresh_tokens(mut self, enabled: bool) -> Self {
		self.use_refresh_tokens = enabled;

		self
	}

	/// Selects the cache location by name (`memory` or `file`).
	pub fn cache_location(mut self, location: impl AsRef<str>) -> Self {
		self.cache_location = Some(location.as_ref().to_owned());

		self
	}

	/// Sets the file used by the `file` cache location.
	pub fn cache_path(mut self, path: impl Into<PathBuf>) -> Self {
		self.cache_path = Some(path.into());

		self
	}

	/// Overrides the expiry leeway.
	pub fn leeway(mut self, leeway: Duration) -> Self {
		self.leeway = leeway;

		self
	}

	/// Overrides the hidden iframe deadline.
	pub fn authorize_timeout(mut self, timeout: Duration) -> Self {
		self.authorize_timeout = timeout;

		self
	}

	/// Overrides the token endpoint deadline.
	pub fn fetch_timeout(mut self, timeout: Duration) -> Self {
		self.fetch_timeout = timeout;

		self
	}

	/// Overrides the number of renewal lock attempts.
	pub fn lock_attempts(mut self, attempts: u32) -> Self {
		self.lock.attempts = attempts;

		self
	}

	/// Overrides the per-attempt renewal lock timeout.
	pub fn lock_attempt_timeout(mut self, timeout: Duration) -> Self {
		self.lock.attempt_timeout = timeout;

		self
	}

	/// Allows or forbids the worker execution context.
	pub fn use_worker(mut self, enabled: bool) -> Self {
		self.use_worker = enabled;

		self
	}

	/// Overrides the is-authenticated hint lifetime.
	pub fn session_check_expiry_days(mut self, days: u32) -> Self {
		self.session_check_expiry_days = days;

		self
	}

	/// Sets the organization.
	pub fn organization(mut self, organization: impl Into<String>) -> Self {
		self.organization = Some(organization.into());

		self
	}

	/// Sets the maximum authentication age.
	pub fn max_age(mut self, max_age: Duration) -> Self {
		self.max_age = Some(max_age);

		self
	}

	/// Adds an extra authorize/token parameter.
	pub fn extra_param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
		self.extra_params.insert(name.into(), value.into());

		self
	}

	/// Validates the settings and produces a [`ClientConfig`].
	pub fn build(self) -> Result<ClientConfig, ConfigError> {
		let domain_url = base_url(&self.domain)?;
		let issuer = match self.issuer.as_deref() {
			Some(issuer) => base_url(issuer)?,
			None => domain_url.clone(),
		};
		let token_endpoint = join(&domain_url, "oauth/token", &self.domain)?;
		let authorize_endpoint = join(&domain_url, "authorize", &self.domain)?;
		let audience = match self.audience {
			Some(audience) => Audience::new(audience)?,
			None => Audience::default(),
		};
		let mut scope = ScopeSet::from_str(self.scope.as_deref().unwrap_or_default())?;

		if self.use_refresh_tokens {
			scope = scope.with_scope(OFFLINE_ACCESS_SCOPE)?;
		}

		let default_scope = ScopeSet::from_str(self.default_scope.as_deref().unwrap_or(DEFAULT_SCOPE))?
			.with_scope(OPENID_SCOPE)?;
		let cache_location = match self.cache_location.as_deref() {
			Some(location) => location.parse()?,
			None => CacheLocation::default(),
		};

		if cache_location == CacheLocation::File && self.cache_path.is_none() {
			return Err(ConfigError::MissingCachePath);
		}

		Ok(ClientConfig {
			client_id: self.client_id,
			domain_url,
			issuer,
			token_endpoint,
			authorize_endpoint,
			redirect_uri: self.redirect_uri,
			audience,
			scope,
			default_scope,
			use_refresh_tokens: self.use_refresh_tokens,
			cache_location,
			cache_path: self.cache_path,
			leeway: if self.leeway.is_negative() { Duration::ZERO } else { self.leeway },
			authorize_timeout: self.authorize_timeout,
			fetch_timeout: self.fetch_timeout,
			lock: self.lock,
			use_worker: self.use_worker,
			session_check_expiry_days: self.session_check_expiry_days,
			organization: self.organization,
			max_age: self.max_age,
			extra_params: self.extra_params,
		})
	}
}

fn base_url(raw: &str) -> Result<Url, ConfigError> {
	let invalid = || ConfigError::InvalidDomain { domain: raw.to_owned() };
	let candidate = if raw.starts_with("https://") || raw.starts_with("http://") {
		raw.to_owned()
	} else {
		format!("https://{raw}/")
	};
	let mut url = Url::parse(&candidate).map_err(|_| invalid())?;

	if url.host_str().is_none_or(str::is_empty) {
		return Err(invalid());
	}
	if !url.path().ends_with('/') {
		let path = format!("{}/", url.path());

		url.set_path(&path);
	}

	Ok(url)
}

fn join(base: &Url, path: &str, domain: &str) -> Result<Url, ConfigError> {
	base.join(path).map_err(|_| ConfigError::InvalidDomain { domain: domain.to_owned() })
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	fn builder() -> ClientConfigBuilder {
		ClientConfig::builder(
			"tenant.example.com",
			ClientId::new("spa-client").expect("Client fixture should be valid."),
		)
	}

	#[test]
	fn endpoints_derive_from_the_domain() {
		let config = builder().build().expect("Default config should build.");

		assert_eq!(config.issuer.as_str(), "https://tenant.example.com/");
		assert_eq!(config.token_endpoint.as_str(), "https://tenant.example.com/oauth/token");
		assert_eq!(config.authorize_endpoint.as_str(), "https://tenant.example.com/authorize");
		assert_eq!(config.authorize_origin(), "https://tenant.example.com");
		assert!(config.audience.is_default());
		assert_eq!(config.lock, LockPolicy::default());
	}

	#[test]
	fn full_urls_are_accepted_for_domain_and_issuer() {
		let config = ClientConfig::builder(
			"http://127.0.0.1:8080",
			ClientId::new("spa-client").expect("Client fixture should be valid."),
		)
		.issuer("https://issuer.example.com")
		.build()
		.expect("Config should build.");

		assert_eq!(config.token_endpoint.as_str(), "http://127.0.0.1:8080/oauth/token");
		assert_eq!(config.issuer.as_str(), "https://issuer.example.com/");
	}

	#[test]
	fn scopes_compose_with_openid_and_offline_access() {
		let config = builder()
			.default_scope("profile")
			.scope("read:messages")
			.use_refresh_tokens(true)
			.build()
			.expect("Config should build.");
		let requested = ScopeSet::from_str("write:messages profile").expect("Scope should parse.");

		assert_eq!(
			config.effective_scope(Some(&requested)).normalized(),
			"offline_access openid profile read:messages write:messages"
		);
		assert_eq!(config.effective_scope(None).normalized(), "offline_access openid profile read:messages");
	}

	#[test]
	fn unknown_cache_locations_fail_fast() {
		let err = builder().cache_location("dummy").build().expect_err("Unknown location should fail.");

		assert_eq!(err.to_string(), "Invalid cache location \"dummy\"");
		assert!(matches!(
			builder().cache_location(CacheLocation::File).build(),
			Err(ConfigError::MissingCachePath)
		));
		assert_eq!(
			builder()
				.cache_location("file")
				.cache_path("/tmp/oauth2-silent.json")
				.build()
				.expect("File location with a path should build.")
				.cache_location,
			CacheLocation::File
		);
	}

	#[test]
	fn cache_location_serializes_by_name() {
		assert_eq!(
			serde_json::to_string(&CacheLocation::Memory).expect("Location should serialize."),
			"\"memory\""
		);
		assert_eq!(CacheLocation::from_str("file").expect("Location should parse."), CacheLocation::File);
	}
}
