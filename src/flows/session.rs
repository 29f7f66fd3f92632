//! Session helpers: hint markers, startup session probe, user lookup, and local logout.

// self
use crate::{
	_prelude::*,
	auth::{ClientId, IdTokenClaims, TokenSetEntry},
	error::ConfigError,
	flows::{GetTokenOptions, SilentClient},
	obs::{self, FlowKind, FlowOutcome, FlowSpan},
};

/// Namespace prefixed to every session hint key.
pub const SESSION_HINT_NAMESPACE: &str = "oauth2_silent";

/// Options accepted by [`SilentClient::logout`].
///
/// Only the local half of a logout is performed; redirecting to the end-session endpoint is
/// left to the embedding application.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct LogoutOptions {
	/// Only clear local state.
	pub local_only: bool,
	/// The application intends to end the session at the identity provider as well.
	pub federated: bool,
}
impl LogoutOptions {
	/// Local-only logout.
	pub fn local() -> Self {
		Self { local_only: true, federated: false }
	}
}

/// Key of the is-authenticated hint for `client_id`.
pub fn authenticated_hint_key(client_id: &ClientId) -> String {
	format!("{SESSION_HINT_NAMESPACE}.{client_id}.is.authenticated")
}

/// Key of the organization hint for `client_id`.
pub fn organization_hint_key(client_id: &ClientId) -> String {
	format!("{SESSION_HINT_NAMESPACE}.{client_id}.organization_hint")
}

#[derive(Debug, Serialize, Deserialize)]
struct HintRecord {
	value: String,
	#[serde(with = "time::serde::timestamp")]
	expires_at: OffsetDateTime,
}

impl SilentClient {
	/// Probes the session once at startup.
	///
	/// Runs a cache-bypassing silent token request when the is-authenticated hint is present.
	/// Login-required errors are absorbed (the client has already logged out locally); any other
	/// error is returned. Without the hint nothing happens.
	pub async fn check_session(&self) -> Result<()> {
		const KIND: FlowKind = FlowKind::CheckSession;

		let span = FlowSpan::new(KIND, &self.config.client_id);

		obs::record_flow_outcome(KIND, FlowOutcome::Attempt);

		let result = span
			.instrument(async move {
				if !self.has_session_hint().await? {
					#[cfg(feature = "tracing")]
					tracing::debug!("No session hint; skipping the session probe.");

					return Ok(());
				}

				match self.get_token(GetTokenOptions::default().ignore_cache(true)).await {
					Ok(_) => Ok(()),
					Err(e) if e.is_login_required() => Ok(()),
					Err(e) => Err(e),
				}
			})
			.await;

		match &result {
			Ok(_) => obs::record_flow_outcome(KIND, FlowOutcome::Success),
			Err(_) => obs::record_flow_outcome(KIND, FlowOutcome::Failure),
		}

		result
	}

	/// Profile claims of the cached default-key token set; never touches the network.
	pub async fn get_user(&self) -> Result<Option<IdTokenClaims>> {
		Ok(self.default_entry().await?.map(|entry| entry.decoded_claims.user()))
	}

	/// Every claim of the cached default-key ID token.
	pub async fn get_id_token_claims(&self) -> Result<Option<IdTokenClaims>> {
		Ok(self.default_entry().await?.map(|entry| entry.decoded_claims))
	}

	/// Returns `true` when the cache holds a usable default-key token set.
	pub async fn is_authenticated(&self) -> Result<bool> {
		Ok(self.get_user().await?.is_some())
	}

	/// Returns `true` while an unexpired is-authenticated hint exists.
	pub async fn has_session_hint(&self) -> Result<bool> {
		Ok(self.read_hint(&authenticated_hint_key(&self.config.client_id)).await?.is_some())
	}

	/// Clears the local session.
	///
	/// The cache is hidden before this method returns, so an authentication check made right
	/// after calling it observes the logout even if the returned future is still pending. The
	/// future finishes the storage cleanup and removes the session hints.
	pub fn logout(
		&self,
		options: LogoutOptions,
	) -> Result<impl Future<Output = Result<()>> + Send + '_> {
		if options.local_only && options.federated {
			return Err(ConfigError::ConflictingLogoutOptions.into());
		}

		let clear = self.cache.clear();

		Ok(async move {
			clear.await?;
			self.hints.remove(&authenticated_hint_key(&self.config.client_id)).await?;
			self.hints.remove(&organization_hint_key(&self.config.client_id)).await?;

			#[cfg(feature = "tracing")]
			tracing::debug!(client_id = %self.config.client_id, "Local session cleared.");

			Ok(())
		})
	}

	pub(crate) async fn logout_locally(&self) -> Result<()> {
		self.logout(LogoutOptions::local())?.await
	}

	pub(crate) async fn organization_hint(&self) -> Result<Option<String>> {
		self.read_hint(&organization_hint_key(&self.config.client_id)).await
	}

	pub(crate) async fn write_session_hints(&self, entry: &TokenSetEntry) -> Result<()> {
		let expires_at = self
			.clock
			.now()
			.checked_add(self.config.session_check_expiry())
			.ok_or(ConfigError::SessionCheckExpiryOutOfRange)?;

		self.write_hint(&authenticated_hint_key(&self.config.client_id), "true", expires_at).await?;

		let organization_key = organization_hint_key(&self.config.client_id);

		match entry.decoded_claims.org_id() {
			Some(org_id) => self.write_hint(&organization_key, org_id, expires_at).await,
			None => Ok(self.hints.remove(&organization_key).await?),
		}
	}

	async fn default_entry(&self) -> Result<Option<TokenSetEntry>> {
		self.cache.get(&self.cache_key(&GetTokenOptions::default())).await
	}

	async fn write_hint(&self, key: &str, value: &str, expires_at: OffsetDateTime) -> Result<()> {
		let record = HintRecord { value: value.to_owned(), expires_at };
		let encoded = serde_json::to_string(&record)
			.map_err(|e| crate::store::StoreError::Serialization { message: e.to_string() })?;

		self.hints.set(key, encoded).await?;

		Ok(())
	}

	async fn read_hint(&self, key: &str) -> Result<Option<String>> {
		let Some(raw) = self.hints.get(key).await? else {
			return Ok(None);
		};
		let now = self.clock.now();

		Ok(serde_json::from_str::<HintRecord>(&raw)
			.ok()
			.filter(|record| record.expires_at > now)
			.map(|record| record.value))
	}
}
