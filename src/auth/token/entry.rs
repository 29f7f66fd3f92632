//! Cached token sets, their expiry rules, and the builder used after every renewal.

// self
use crate::{
	_prelude::*,
	auth::{
		Audience, ClientId, IdTokenClaims, ScopeSet,
		token::{response::DetailedTokenResponse, secret::TokenSecret},
	},
};

/// Errors produced by [`TokenSetEntryBuilder`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ThisError)]
pub enum TokenSetEntryBuilderError {
	/// Issued when no access token value was provided.
	#[error("Access token is required.")]
	MissingAccessToken,
	/// Issued when no ID token value was provided.
	#[error("ID token is required.")]
	MissingIdToken,
	/// Issued when no relative expiry was configured.
	#[error("Expiry must be supplied via expires_in.")]
	MissingExpiry,
	/// Issued when `issued_at + expires_in` cannot be represented.
	#[error("Expiry is out of range.")]
	ExpiryOutOfRange,
}

/// Token set persisted under a full cache key.
///
/// Entries are only ever replaced wholesale; no API mutates a single field in place.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenSetEntry {
	/// Client the tokens were issued to.
	pub client_id: ClientId,
	/// Audience the access token targets.
	pub audience: Audience,
	/// Scope the caller asked for; used for cache matching.
	pub scope: ScopeSet,
	/// Scope the token endpoint echoed, when it echoed one.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub oauth_token_scope: Option<ScopeSet>,
	/// Raw ID token.
	pub id_token: TokenSecret,
	/// Access token secret.
	pub access_token: TokenSecret,
	/// Refresh token, unless the store policy stripped it.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub refresh_token: Option<TokenSecret>,
	/// Lifetime reported by the token endpoint, in seconds.
	pub expires_in: i64,
	/// Absolute expiry derived from the issue instant plus `expires_in`.
	#[serde(with = "time::serde::timestamp")]
	pub expires_at: OffsetDateTime,
	/// Claims decoded from the verified ID token.
	pub decoded_claims: IdTokenClaims,
}
impl TokenSetEntry {
	/// Returns a builder for an entry belonging to the provided key components.
	pub fn builder(
		client_id: ClientId,
		audience: Audience,
		scope: ScopeSet,
	) -> TokenSetEntryBuilder {
		TokenSetEntryBuilder::new(client_id, audience, scope)
	}

	/// Returns `true` while `expires_at - leeway` is still in the future.
	///
	/// A leeway reaching past the representable range makes the entry unusable.
	pub fn is_usable_at(&self, now: OffsetDateTime, leeway: Duration) -> bool {
		self.expires_at.checked_sub(leeway).is_some_and(|usable_until| usable_until > now)
	}

	/// Caller-facing view of the entry; never carries the refresh token.
	pub fn detailed(&self) -> DetailedTokenResponse {
		DetailedTokenResponse {
			access_token: self.access_token.expose().to_owned(),
			id_token: self.id_token.expose().to_owned(),
			expires_in: self.expires_in,
			scope: self.oauth_token_scope.as_ref().map(ScopeSet::normalized),
		}
	}

	/// Copy of the entry with the refresh token removed.
	pub fn without_refresh_token(&self) -> Self {
		Self { refresh_token: None, ..self.clone() }
	}
}
impl Debug for TokenSetEntry {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("TokenSetEntry")
			.field("client_id", &self.client_id)
			.field("audience", &self.audience)
			.field("scope", &self.scope)
			.field("oauth_token_scope", &self.oauth_token_scope)
			.field("refresh_token", &self.refresh_token.as_ref().map(|_| "<redacted>"))
			.field("expires_in", &self.expires_in)
			.field("expires_at", &self.expires_at)
			.finish_non_exhaustive()
	}
}

/// Builder for [`TokenSetEntry`].
#[derive(Clone, Debug)]
pub struct TokenSetEntryBuilder {
	client_id: ClientId,
	audience: Audience,
	scope: ScopeSet,
	oauth_token_scope: Option<ScopeSet>,
	id_token: Option<TokenSecret>,
	access_token: Option<TokenSecret>,
	refresh_token: Option<TokenSecret>,
	issued_at: Option<OffsetDateTime>,
	expires_in: Option<i64>,
	decoded_claims: IdTokenClaims,
}
impl TokenSetEntryBuilder {
	fn new(client_id: ClientId, audience: Audience, scope: ScopeSet) -> Self {
		Self {
			client_id,
			audience,
			scope,
			oauth_token_scope: None,
			id_token: None,
			access_token: None,
			refresh_token: None,
			issued_at: None,
			expires_in: None,
			decoded_claims: IdTokenClaims::default(),
		}
	}

	/// Provides the access token value.
	pub fn access_token(mut self, token: impl Into<String>) -> Self {
		self.access_token = Some(TokenSecret::new(token));

		self
	}

	/// Provides the ID token value.
	pub fn id_token(mut self, token: impl Into<String>) -> Self {
		self.id_token = Some(TokenSecret::new(token));

		self
	}

	/// Provides the refresh token value.
	pub fn refresh_token(mut self, token: Option<TokenSecret>) -> Self {
		self.refresh_token = token;

		self
	}

	/// Records the scope the token endpoint echoed.
	pub fn oauth_token_scope(mut self, scope: Option<ScopeSet>) -> Self {
		self.oauth_token_scope = scope;

		self
	}

	/// Sets the issue instant used to compute `expires_at`.
	pub fn issued_at(mut self, instant: OffsetDateTime) -> Self {
		self.issued_at = Some(instant);

		self
	}

	/// Sets the lifetime in seconds reported by the token endpoint.
	pub fn expires_in(mut self, seconds: i64) -> Self {
		self.expires_in = Some(seconds);

		self
	}

	/// Attaches the verified ID-token claims.
	pub fn decoded_claims(mut self, claims: IdTokenClaims) -> Self {
		self.decoded_claims = claims;

		self
	}

	/// Consumes the builder and produces a [`TokenSetEntry`].
	pub fn build(self) -> Result<TokenSetEntry, TokenSetEntryBuilderError> {
		let access_token =
			self.access_token.ok_or(TokenSetEntryBuilderError::MissingAccessToken)?;
		let id_token = self.id_token.ok_or(TokenSetEntryBuilderError::MissingIdToken)?;
		let expires_in = self.expires_in.ok_or(TokenSetEntryBuilderError::MissingExpiry)?;
		let issued_at = self.issued_at.unwrap_or_else(OffsetDateTime::now_utc);
		let expires_at = issued_at
			.checked_add(Duration::seconds(expires_in))
			.ok_or(TokenSetEntryBuilderError::ExpiryOutOfRange)?;

		Ok(TokenSetEntry {
			client_id: self.client_id,
			audience: self.audience,
			scope: self.scope,
			oauth_token_scope: self.oauth_token_scope,
			id_token,
			access_token,
			refresh_token: self.refresh_token,
			expires_in,
			expires_at,
			decoded_claims: self.decoded_claims,
		})
	}
}
