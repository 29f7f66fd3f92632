#![allow(dead_code)]

// std
use std::{
	collections::{BTreeMap, VecDeque},
	sync::{
		Arc,
		atomic::{AtomicU32, AtomicUsize, Ordering},
	},
};
// crates.io
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use parking_lot::Mutex;
use serde_json::{Value, json};
use time::{Duration, OffsetDateTime, macros};
use url::Url;
// self
use oauth2_silent::{
	auth::{ClientId, TokenSecret},
	clock::TestClock,
	config::{ClientConfig, ClientConfigBuilder},
	error::{AuthError, Error, Result},
	ext::{
		AuthorizeCallback, SilentAuthFuture, SilentAuthenticator, TokenVerifier, VerifiedIdToken,
		VerifyRequest, decode_payload,
	},
	flows::SilentClient,
	lock::{InstanceLock, LockFuture, MemoryLock},
	oauth::{EndpointFuture, TokenEndpoint, TokenEndpointResponse, TokenGrant, TokenRequest},
	store::{CacheStore, MemoryStore},
};

pub const DOMAIN: &str = "tenant.example.com";
pub const CLIENT_ID: &str = "spa-client";
pub const START: OffsetDateTime = macros::datetime!(2025-01-01 00:00 UTC);

pub fn client_id() -> ClientId {
	ClientId::new(CLIENT_ID).expect("Client fixture should be valid.")
}

pub fn config_builder() -> ClientConfigBuilder {
	ClientConfig::builder(DOMAIN, client_id()).redirect_uri(
		Url::parse("https://app.example.com/callback").expect("Redirect fixture should parse."),
	)
}

pub fn config() -> ClientConfig {
	config_builder().build().expect("Default configuration should build.")
}

/// Compact JWT with an unsigned payload.
pub fn id_token(claims: Value) -> String {
	let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"RS256","typ":"JWT"}"#);
	let payload =
		URL_SAFE_NO_PAD.encode(serde_json::to_vec(&claims).expect("Claims should serialize."));

	format!("{header}.{payload}.signature")
}

pub fn user_claims(sub: &str) -> Value {
	json!({
		"iss": format!("https://{DOMAIN}/"),
		"sub": sub,
		"aud": CLIENT_ID,
		"exp": START.unix_timestamp() + 86_400,
		"iat": START.unix_timestamp(),
		"name": "Ada Lovelace",
	})
}

pub fn token_response(access_token: &str, refresh_token: Option<&str>, expires_in: i64) -> TokenEndpointResponse {
	TokenEndpointResponse {
		access_token: TokenSecret::new(access_token),
		id_token: Some(TokenSecret::new(id_token(user_claims("user-1")))),
		refresh_token: refresh_token.map(TokenSecret::new),
		expires_in,
		scope: None,
	}
}

pub fn invalid_grant() -> Error {
	AuthError::new("invalid_grant", Some("Unknown or invalid refresh token.".into())).into()
}

/// Recorded token endpoint call.
#[derive(Clone, Debug)]
pub struct RecordedExchange {
	pub grant: &'static str,
	pub refresh_token: Option<String>,
	pub code: Option<String>,
	pub scope: String,
	pub extra_params: BTreeMap<String, String>,
}

/// Token endpoint answering from a script, then with fresh tokens.
#[derive(Default)]
pub struct CountingEndpoint {
	url: Option<Url>,
	script: Mutex<VecDeque<Result<TokenEndpointResponse>>>,
	calls: Mutex<Vec<RecordedExchange>>,
	issued: AtomicUsize,
	delay: Option<std::time::Duration>,
}
impl CountingEndpoint {
	pub fn new() -> Self {
		Self {
			url: Some(
				Url::parse(&format!("https://{DOMAIN}/oauth/token"))
					.expect("Token URL fixture should parse."),
			),
			..Default::default()
		}
	}

	pub fn with_delay(mut self, delay: std::time::Duration) -> Self {
		self.delay = Some(delay);

		self
	}

	pub fn push(&self, outcome: Result<TokenEndpointResponse>) {
		self.script.lock().push_back(outcome);
	}

	pub fn calls(&self) -> Vec<RecordedExchange> {
		self.calls.lock().clone()
	}

	pub fn call_count(&self) -> usize {
		self.calls.lock().len()
	}
}
impl TokenEndpoint for CountingEndpoint {
	fn token_url(&self) -> &Url {
		self.url.as_ref().expect("Endpoint fixture should carry a URL.")
	}

	fn exchange(&self, request: TokenRequest) -> EndpointFuture<'_, TokenEndpointResponse> {
		let (refresh_token, code) = match &request.grant {
			TokenGrant::RefreshToken { refresh_token } =>
				(Some(refresh_token.expose().to_owned()), None),
			TokenGrant::AuthorizationCode { code, .. } => (None, Some(code.clone())),
		};

		self.calls.lock().push(RecordedExchange {
			grant: request.grant.as_str(),
			refresh_token,
			code,
			scope: request.scope.normalized(),
			extra_params: request.extra_params.clone(),
		});

		let scripted = self.script.lock().pop_front();

		Box::pin(async move {
			if let Some(delay) = self.delay {
				tokio::time::sleep(delay).await;
			}

			match scripted {
				Some(outcome) => outcome,
				None => {
					let n = self.issued.fetch_add(1, Ordering::SeqCst) + 1;

					Ok(token_response(&format!("at-{n}"), Some(&format!("rt-{n}")), 3_600))
				},
			}
		})
	}
}

/// Scripted hidden-iframe outcome.
#[derive(Clone, Debug)]
pub enum IframeStep {
	/// Echo the request state with this code.
	Code(&'static str),
	/// Answer with a different state.
	WrongState,
	/// Answer with an OAuth error carrying the request state.
	Error(&'static str),
	/// Never answer.
	Hang,
}

/// Silent authenticator replaying [`IframeStep`]s; answers with a code once the script ends.
#[derive(Default)]
pub struct ScriptedAuthenticator {
	script: Mutex<VecDeque<IframeStep>>,
	urls: Mutex<Vec<Url>>,
}
impl ScriptedAuthenticator {
	pub fn push(&self, step: IframeStep) {
		self.script.lock().push_back(step);
	}

	pub fn urls(&self) -> Vec<Url> {
		self.urls.lock().clone()
	}

	pub fn call_count(&self) -> usize {
		self.urls.lock().len()
	}
}
impl SilentAuthenticator for ScriptedAuthenticator {
	fn run_silent_auth<'a>(
		&'a self,
		authorize_url: &'a Url,
		_origin: &'a str,
		_timeout: Duration,
	) -> SilentAuthFuture<'a, AuthorizeCallback> {
		self.urls.lock().push(authorize_url.clone());

		let state = authorize_url
			.query_pairs()
			.find(|(name, _)| name == "state")
			.map(|(_, value)| value.into_owned())
			.unwrap_or_default();
		let step = self.script.lock().pop_front().unwrap_or(IframeStep::Code("code-default"));

		Box::pin(async move {
			match step {
				IframeStep::Code(code) => Ok(AuthorizeCallback::new(code, state)),
				IframeStep::WrongState => Ok(AuthorizeCallback::new("code-x", "forged-state")),
				IframeStep::Error(error) =>
					Err(AuthError::new(error, Some(format!("{error} raised by the iframe.")))
						.with_state(state)
						.into()),
				IframeStep::Hang => std::future::pending().await,
			}
		})
	}
}

/// Verifier that decodes the payload and accepts it.
#[derive(Default)]
pub struct AcceptingVerifier {
	pub requests: Mutex<Vec<VerifyRequest>>,
}
impl TokenVerifier for AcceptingVerifier {
	fn verify(&self, request: &VerifyRequest) -> Result<VerifiedIdToken> {
		self.requests.lock().push(request.clone());

		let claims = decode_payload(&request.id_token)?;

		Ok(VerifiedIdToken { user: claims.user(), claims })
	}
}

/// Lock that refuses a fixed number of attempts, then delegates to a [`MemoryLock`].
#[derive(Default)]
pub struct ScriptedLock {
	refusals: u32,
	attempts: AtomicU32,
	releases: AtomicU32,
	inner: MemoryLock,
}
impl ScriptedLock {
	pub fn refusing(refusals: u32) -> Self {
		Self { refusals, ..Default::default() }
	}

	pub fn attempts(&self) -> u32 {
		self.attempts.load(Ordering::SeqCst)
	}

	pub fn releases(&self) -> u32 {
		self.releases.load(Ordering::SeqCst)
	}
}
impl InstanceLock for ScriptedLock {
	fn acquire<'a>(&'a self, name: &'a str, timeout: Duration) -> LockFuture<'a, bool> {
		let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;

		Box::pin(async move {
			if attempt <= self.refusals {
				return Ok(false);
			}

			self.inner.acquire(name, timeout).await
		})
	}

	fn release<'a>(&'a self, name: &'a str) -> LockFuture<'a, ()> {
		self.releases.fetch_add(1, Ordering::SeqCst);

		self.inner.release(name)
	}
}

/// A client wired to fakes, with handles to each of them.
pub struct Harness {
	pub client: SilentClient,
	pub endpoint: Arc<CountingEndpoint>,
	pub authenticator: Arc<ScriptedAuthenticator>,
	pub verifier: Arc<AcceptingVerifier>,
	pub lock: Arc<ScriptedLock>,
	pub store: Arc<MemoryStore>,
	pub clock: TestClock,
}
impl Harness {
	pub fn new(config: ClientConfig) -> Self {
		Self::with_parts(
			config,
			Arc::new(MemoryStore::default()),
			Arc::new(ScriptedLock::default()),
			Arc::new(CountingEndpoint::new()),
		)
	}

	pub fn with_parts(
		config: ClientConfig,
		store: Arc<MemoryStore>,
		lock: Arc<ScriptedLock>,
		endpoint: Arc<CountingEndpoint>,
	) -> Self {
		let clock = TestClock::new(START);
		let authenticator = Arc::new(ScriptedAuthenticator::default());
		let verifier = Arc::new(AcceptingVerifier::default());
		let client = SilentClient::builder(config)
			.store(store.clone() as Arc<dyn CacheStore>)
			.clock(Arc::new(clock.clone()))
			.lock(lock.clone())
			.token_endpoint(endpoint.clone())
			.authenticator(authenticator.clone())
			.verifier(verifier.clone())
			.build()
			.expect("Client should build from fakes.");

		Self { client, endpoint, authenticator, verifier, lock, store, clock }
	}
}
