//! Public token request and the renewal state machine behind it.
//!
//! `CHECK_CACHE → ACQUIRE_LOCK → RECHECK_CACHE → {REFRESH_EXCHANGE | IFRAME_REAUTH} → VERIFY →
//! STORE → RELEASE_LOCK`. The lock is released on every exit path, and the answer handed back
//! after release is re-derived from the cache.

// crates.io
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use sha2::{Digest, Sha256};
// self
use crate::{
	_prelude::*,
	auth::{Audience, DetailedTokenResponse, ScopeSet, TokenSecret, TokenSetEntry},
	cache::CacheKey,
	error::ConfigError,
	ext::VerifyRequest,
	flows::SilentClient,
	lock,
	oauth::TokenEndpointResponse,
	obs::{self, FlowKind, FlowOutcome, FlowSpan},
};

/// Per-request options for [`SilentClient::get_token`].
#[derive(Clone, Debug, Default)]
pub struct GetTokenOptions {
	/// Audience override; the configured audience applies otherwise.
	pub audience: Option<Audience>,
	/// Scope merged into the default and client scope.
	pub scope: Option<ScopeSet>,
	/// Skips both cache checks and always renews.
	pub ignore_cache: bool,
	/// Returns the full [`DetailedTokenResponse`] instead of the bare access token.
	pub detailed_response: bool,
	/// Iframe timeout override.
	pub timeout: Option<Duration>,
	/// Skips the refresh-token exchange even when a refresh token is available.
	pub force_iframe: bool,
	/// Extra parameters merged over the configured ones.
	pub extra_params: BTreeMap<String, String>,
}
impl GetTokenOptions {
	/// Requests a token for `audience`.
	pub fn audience(mut self, audience: Audience) -> Self {
		self.audience = Some(audience);

		self
	}

	/// Requests `scope` on top of the configured scopes.
	pub fn scope(mut self, scope: ScopeSet) -> Self {
		self.scope = Some(scope);

		self
	}

	/// Bypasses the cache.
	pub fn ignore_cache(mut self, ignore: bool) -> Self {
		self.ignore_cache = ignore;

		self
	}

	/// Asks for the detailed response.
	pub fn detailed_response(mut self, detailed: bool) -> Self {
		self.detailed_response = detailed;

		self
	}

	/// Overrides the iframe timeout.
	pub fn timeout(mut self, timeout: Duration) -> Self {
		self.timeout = Some(timeout);

		self
	}

	/// Forces iframe re-authentication.
	pub fn force_iframe(mut self, force: bool) -> Self {
		self.force_iframe = force;

		self
	}

	/// Adds one extra parameter.
	pub fn extra_param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
		self.extra_params.insert(name.into(), value.into());

		self
	}
}

/// Result of [`SilentClient::get_token`].
#[derive(Clone, PartialEq, Eq)]
pub enum TokenOutput {
	/// Bare access token.
	AccessToken(String),
	/// Full response; never carries the refresh token.
	Detailed(DetailedTokenResponse),
}
impl TokenOutput {
	/// Access token in either shape.
	pub fn access_token(&self) -> &str {
		match self {
			Self::AccessToken(token) => token,
			Self::Detailed(response) => &response.access_token,
		}
	}

	/// Detailed response, when one was requested.
	pub fn into_detailed(self) -> Option<DetailedTokenResponse> {
		match self {
			Self::AccessToken(_) => None,
			Self::Detailed(response) => Some(response),
		}
	}
}
impl Debug for TokenOutput {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		match self {
			Self::AccessToken(_) => f.write_str("AccessToken(<redacted>)"),
			Self::Detailed(response) => f.debug_tuple("Detailed").field(response).finish(),
		}
	}
}

/// Request after defaults and per-request overrides were applied.
#[derive(Clone, Debug)]
pub(crate) struct RenewalRequest {
	pub(crate) key: CacheKey,
	pub(crate) ignore_cache: bool,
	pub(crate) force_iframe: bool,
	pub(crate) authorize_timeout: Duration,
	pub(crate) extra_params: BTreeMap<String, String>,
}

impl SilentClient {
	/// Returns a usable access token, renewing it silently when the cache cannot answer.
	///
	/// Concurrent calls with the same fingerprint share one execution and its outcome.
	pub async fn get_token(&self, options: GetTokenOptions) -> Result<TokenOutput> {
		const KIND: FlowKind = FlowKind::GetToken;

		let span = FlowSpan::new(KIND, &self.config.client_id);

		obs::record_flow_outcome(KIND, FlowOutcome::Attempt);
		self.metrics.record_attempt();

		let detailed = options.detailed_response;
		let request = self.resolve_request(options);
		let fingerprint = request_fingerprint(&request.key, self.config.use_refresh_tokens);
		let result = span
			.instrument(self.flights.run(&fingerprint, || self.cached_or_renewed(&request)))
			.await;

		match &result {
			Ok(_) => obs::record_flow_outcome(KIND, FlowOutcome::Success),
			Err(_) => {
				obs::record_flow_outcome(KIND, FlowOutcome::Failure);
				self.metrics.record_failure();
			},
		}

		result.map(|response| match detailed {
			true => TokenOutput::Detailed(response),
			false => TokenOutput::AccessToken(response.access_token),
		})
	}

	/// Shorthand for [`get_token`](Self::get_token) with default options.
	pub async fn get_access_token(&self) -> Result<String> {
		let output = self.get_token(GetTokenOptions::default()).await?;

		Ok(output.access_token().to_owned())
	}

	/// Cache key a request with `options` would use.
	pub fn cache_key(&self, options: &GetTokenOptions) -> CacheKey {
		CacheKey::new(
			self.config.client_id.clone(),
			options.audience.clone().unwrap_or_else(|| self.config.audience.clone()),
			self.config.effective_scope(options.scope.as_ref()),
		)
	}

	fn resolve_request(&self, options: GetTokenOptions) -> RenewalRequest {
		let key = self.cache_key(&options);
		let mut extra_params = self.config.extra_params.clone();

		extra_params.extend(options.extra_params);

		RenewalRequest {
			key,
			ignore_cache: options.ignore_cache,
			force_iframe: options.force_iframe,
			authorize_timeout: options.timeout.unwrap_or(self.config.authorize_timeout),
			extra_params,
		}
	}

	async fn cached_or_renewed(&self, request: &RenewalRequest) -> Result<DetailedTokenResponse> {
		if let Some(entry) = self.cached(request).await? {
			self.record_cache_hit();

			return Ok(entry.detailed());
		}

		let guard = lock::acquire_with_retry(
			self.lock.clone(),
			lock::lock_name(&self.config.client_id),
			self.config.lock,
		)
		.await?;
		let outcome = self.renew_locked(request).await;

		if let Err(e) = guard.release().await {
			#[cfg(feature = "tracing")]
			tracing::warn!(error = %e, "Failed to release the renewal lock.");
			#[cfg(not(feature = "tracing"))]
			let _ = e;
		}

		let renewed = outcome?;
		// Another instance may have stored a compatible entry in the meantime.
		let current = self.cache.get(&request.key).await?;

		Ok(current.unwrap_or(renewed).detailed())
	}

	async fn renew_locked(&self, request: &RenewalRequest) -> Result<TokenSetEntry> {
		if let Some(entry) = self.cached(request).await? {
			#[cfg(feature = "tracing")]
			tracing::debug!("Cache populated while waiting for the renewal lock.");

			self.record_cache_hit();

			return Ok(entry);
		}

		let entry = match self.renew(request).await {
			Ok(entry) => entry,
			Err(e) => {
				if e.is_login_required() {
					#[cfg(feature = "tracing")]
					tracing::warn!(error = %e, "Silent renewal needs user interaction; logging out locally.");

					if let Err(logout_error) = self.logout_locally().await {
						#[cfg(feature = "tracing")]
						tracing::warn!(error = %logout_error, "Local logout failed.");
						#[cfg(not(feature = "tracing"))]
						let _ = logout_error;
					}
				}

				return Err(e);
			},
		};

		self.cache.set(entry.clone()).await?;
		self.write_session_hints(&entry).await?;

		Ok(entry)
	}

	async fn renew(&self, request: &RenewalRequest) -> Result<TokenSetEntry> {
		let refresh_token = if self.config.use_refresh_tokens && !request.force_iframe {
			self.cache.find_refresh_token(&request.key).await?
		} else {
			None
		};
		let Some(refresh_token) = refresh_token else {
			return self.iframe_reauth(request).await;
		};

		match self.refresh_exchange(request, refresh_token).await {
			Err(e) if e.is_invalid_grant() => {
				#[cfg(feature = "tracing")]
				tracing::debug!(error = %e, "Refresh token rejected; falling back to the iframe.");

				self.metrics.record_fallback();
				self.iframe_reauth(request).await
			},
			outcome => outcome,
		}
	}

	/// Verifies the ID token and assembles the entry to cache.
	///
	/// `previous_refresh_token` is kept when the endpoint did not rotate it.
	pub(crate) fn build_entry(
		&self,
		key: &CacheKey,
		response: TokenEndpointResponse,
		nonce: Option<String>,
		previous_refresh_token: Option<TokenSecret>,
	) -> Result<TokenSetEntry> {
		let id_token = response.id_token.ok_or(ConfigError::MissingIdToken)?;
		let now = self.clock.now();
		let verified = self.verifier.verify(&VerifyRequest {
			id_token: id_token.expose().to_owned(),
			issuer: self.config.issuer.to_string(),
			audience: self.config.client_id.clone(),
			nonce,
			leeway: self.config.leeway,
			max_age: self.config.max_age,
			organization: self.config.organization.clone(),
			now,
		})?;
		let refresh_token =
			response.refresh_token.filter(|token| !token.is_empty()).or(previous_refresh_token);
		let entry = TokenSetEntry::builder(key.client_id.clone(), key.audience.clone(), key.scope.clone())
			.access_token(response.access_token.expose())
			.id_token(id_token.expose())
			.refresh_token(refresh_token)
			.oauth_token_scope(response.scope)
			.issued_at(now)
			.expires_in(response.expires_in)
			.decoded_claims(verified.claims)
			.build()
			.map_err(ConfigError::from)?;

		Ok(entry)
	}

	async fn cached(&self, request: &RenewalRequest) -> Result<Option<TokenSetEntry>> {
		if request.ignore_cache {
			return Ok(None);
		}

		self.cache.get(&request.key).await
	}

	fn record_cache_hit(&self) {
		obs::record_flow_outcome(FlowKind::GetToken, FlowOutcome::CacheHit);
		self.metrics.record_cache_hit();
	}
}

/// Digest identifying a token request for in-process coalescing.
///
/// Covers the client id, the audience, the normalized effective scope, and whether refresh
/// tokens are in use; the SHA-256 digest is encoded as unpadded URL-safe base64.
pub fn request_fingerprint(key: &CacheKey, use_refresh_tokens: bool) -> String {
	let scope = key.scope.normalized();
	let parts: [&str; 4] = [
		&key.client_id,
		&key.audience,
		&scope,
		if use_refresh_tokens { "refresh" } else { "iframe" },
	];
	let mut hasher = Sha256::new();

	for part in parts {
		hasher.update(part.as_bytes());
		hasher.update([0]);
	}

	URL_SAFE_NO_PAD.encode(hasher.finalize())
}
