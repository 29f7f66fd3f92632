//! Hidden-iframe `prompt=none` re-authentication with PKCE.
//!
//! Each attempt generates fresh `state`, `nonce`, and PKCE values, stores them as the current
//! transaction, and hands the authorize URL to the [`SilentAuthenticator`]. The returned
//! `state` must match the transaction; the code is then redeemed with the matching verifier.
//!
//! [`SilentAuthenticator`]: crate::ext::SilentAuthenticator

// crates.io
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use rand::{Rng, distr::Alphanumeric};
use sha2::{Digest, Sha256};
// self
use crate::{
	_prelude::*,
	auth::{Audience, ScopeSet, TokenSecret, TokenSetEntry},
	clock,
	error::{AuthError, ConfigError, TimeoutKind},
	ext::TransactionState,
	flows::{SilentClient, get_token::RenewalRequest},
	oauth::{self, TokenGrant, TokenRequest},
	obs::{self, FlowKind, FlowOutcome, FlowSpan},
};

const PKCE_VERIFIER_LEN: usize = 64;
const STATE_LEN: usize = 43;
// Parameters owned by the authorize request itself; extra parameters cannot override them.
const RESERVED_PARAMS: [&str; 11] = [
	"client_id",
	"response_type",
	"response_mode",
	"prompt",
	"redirect_uri",
	"scope",
	"audience",
	"state",
	"nonce",
	"code_challenge",
	"code_challenge_method",
];

/// PKCE verifier and its S256 challenge.
#[derive(Clone)]
pub struct PkcePair {
	verifier: TokenSecret,
	challenge: String,
}
impl PkcePair {
	/// Generates a random verifier and derives its challenge.
	pub fn generate() -> Self {
		let verifier = random_string(PKCE_VERIFIER_LEN);
		let challenge = pkce_challenge(&verifier);

		Self { verifier: TokenSecret::new(verifier), challenge }
	}

	/// Verifier redeemed with the authorization code.
	pub fn verifier(&self) -> &TokenSecret {
		&self.verifier
	}

	/// S256 challenge sent in the authorize URL.
	pub fn challenge(&self) -> &str {
		&self.challenge
	}
}
impl Debug for PkcePair {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("PkcePair")
			.field("verifier", &"<redacted>")
			.field("challenge", &self.challenge)
			.finish()
	}
}

/// Inputs of one `prompt=none` authorize URL.
#[derive(Clone, Debug)]
pub struct AuthorizeParams<'a> {
	/// Client requesting the tokens.
	pub client_id: &'a str,
	/// Where the authorization server posts the callback.
	pub redirect_uri: &'a Url,
	/// Effective scope.
	pub scope: &'a ScopeSet,
	/// Audience; the default audience is not sent.
	pub audience: &'a Audience,
	/// Anti-forgery value.
	pub state: &'a str,
	/// Nonce the ID token must echo.
	pub nonce: &'a str,
	/// PKCE S256 challenge.
	pub code_challenge: &'a str,
	/// Organization id or name.
	pub organization: Option<&'a str>,
	/// Maximum authentication age.
	pub max_age: Option<Duration>,
	/// Additional query parameters.
	pub extra_params: &'a BTreeMap<String, String>,
}

/// Builds the authorize URL for a silent attempt from `endpoint` and `params`.
pub fn build_authorize_url(endpoint: &Url, params: &AuthorizeParams<'_>) -> Url {
	let mut url = endpoint.clone();
	let mut pairs = url.query_pairs_mut();

	pairs.append_pair("client_id", params.client_id);
	pairs.append_pair("response_type", "code");
	pairs.append_pair("response_mode", "web_message");
	pairs.append_pair("prompt", "none");
	pairs.append_pair("redirect_uri", params.redirect_uri.as_str());
	pairs.append_pair("scope", &params.scope.normalized());

	if !params.audience.is_default() {
		pairs.append_pair("audience", params.audience);
	}

	pairs.append_pair("state", params.state);
	pairs.append_pair("nonce", params.nonce);
	pairs.append_pair("code_challenge", params.code_challenge);
	pairs.append_pair("code_challenge_method", "S256");

	if let Some(organization) = params.organization {
		pairs.append_pair("organization", organization);
	}
	if let Some(max_age) = params.max_age {
		pairs.append_pair("max_age", &max_age.whole_seconds().to_string());
	}

	for (name, value) in params.extra_params {
		if RESERVED_PARAMS.contains(&name.as_str()) {
			continue;
		}

		pairs.append_pair(name, value);
	}

	drop(pairs);

	url
}

impl SilentClient {
	/// Re-authenticates through the hidden iframe and redeems the returned code.
	pub(super) async fn iframe_reauth(&self, request: &RenewalRequest) -> Result<TokenSetEntry> {
		const KIND: FlowKind = FlowKind::IframeReauth;

		let span = FlowSpan::new(KIND, &self.config.client_id);

		obs::record_flow_outcome(KIND, FlowOutcome::Attempt);
		self.metrics.record_iframe_reauth();

		let result = span
			.instrument(async move {
				let key = &request.key;
				let redirect_uri =
					self.config.redirect_uri.clone().ok_or(ConfigError::MissingRedirectUri)?;
				let organization = match self.config.organization.clone() {
					Some(organization) => Some(organization),
					None => self.organization_hint().await?,
				};
				let state = random_string(STATE_LEN);
				let nonce = random_string(STATE_LEN);
				let pkce = PkcePair::generate();
				let authorize_url = build_authorize_url(
					&self.config.authorize_endpoint,
					&AuthorizeParams {
						client_id: &self.config.client_id,
						redirect_uri: &redirect_uri,
						scope: &key.scope,
						audience: &key.audience,
						state: &state,
						nonce: &nonce,
						code_challenge: pkce.challenge(),
						organization: organization.as_deref(),
						max_age: self.config.max_age,
						extra_params: &request.extra_params,
					},
				);

				self.transactions.create(TransactionState {
					state: state.clone(),
					nonce,
					code_verifier: pkce.verifier().clone(),
					app_state: None,
					scope: key.scope.clone(),
					audience: key.audience.clone(),
					redirect_uri,
				})?;

				let origin = self.config.authorize_origin();
				let callback = tokio::time::timeout(
					clock::to_std(request.authorize_timeout),
					self.authenticator.run_silent_auth(
						&authorize_url,
						&origin,
						request.authorize_timeout,
					),
				)
				.await;
				let transaction = self.transactions.get()?;

				self.transactions.remove()?;

				let callback = callback.map_err(|_| Error::from(TimeoutKind::Authorize))??;
				let Some(transaction) = transaction
					.filter(|transaction| callback.state.as_deref() == Some(transaction.state.as_str()))
					.filter(|transaction| transaction.state == state)
				else {
					return Err(Error::StateMismatch);
				};
				let code = callback.code.ok_or_else(|| {
					AuthError::new(
						"invalid_request",
						Some("Authorization callback did not carry a code.".into()),
					)
				})?;
				let token_request = TokenRequest::new(
					TokenGrant::AuthorizationCode {
						code,
						code_verifier: transaction.code_verifier,
						redirect_uri: transaction.redirect_uri,
					},
					transaction.audience,
					transaction.scope,
				);
				let response = oauth::exchange_with_timeout(
					self.endpoint.as_ref(),
					token_request,
					self.config.fetch_timeout,
				)
				.await?;

				self.build_entry(key, response, Some(transaction.nonce), None)
			})
			.await;

		match &result {
			Ok(_) => obs::record_flow_outcome(KIND, FlowOutcome::Success),
			Err(_) => obs::record_flow_outcome(KIND, FlowOutcome::Failure),
		}

		result
	}
}

fn random_string(len: usize) -> String {
	rand::rng().sample_iter(Alphanumeric).take(len).map(char::from).collect()
}

fn pkce_challenge(verifier: &str) -> String {
	let mut hasher = Sha256::new();

	hasher.update(verifier.as_bytes());

	URL_SAFE_NO_PAD.encode(hasher.finalize())
}
