//! Token endpoint contract and the adapter built on the `oauth2` crate.
//!
//! The renewal engine only sees [`TokenEndpoint`]; [`OAuth2TokenEndpoint`] is the default
//! implementation and turns `oauth2` failures into the crate taxonomy: OAuth error objects
//! become [`Error::OAuth`], unparseable non-2xx answers become
//! [`TransportError::HttpStatus`], and transport failures go through a
//! [`TransportErrorMapper`].

pub use oauth2;

// std
use std::borrow::Cow;
// crates.io
use oauth2::{
	AuthType, AuthorizationCode, Client, EndpointNotSet, EndpointSet, ExtraTokenFields,
	HttpClientError, PkceCodeVerifier, RedirectUrl, RefreshToken, RequestTokenError, Scope,
	StandardRevocableToken, StandardTokenResponse, TokenResponse, TokenUrl,
	basic::{
		BasicErrorResponse, BasicRequestTokenError, BasicRevocationErrorResponse,
		BasicTokenIntrospectionResponse, BasicTokenType,
	},
};
// self
#[cfg(feature = "reqwest")] use crate::http::ReqwestHttpClient;
use crate::{
	_prelude::*,
	auth::{Audience, ClientId, ScopeSet, TokenSecret},
	clock,
	error::{AuthError, ConfigError, TimeoutKind, TransportError},
	http::{ResponseMetadata, ResponseMetadataSlot, TokenHttpClient},
};

type SilentTokenResponse = StandardTokenResponse<IdTokenFields, BasicTokenType>;
type ConfiguredClient = Client<
	BasicErrorResponse,
	SilentTokenResponse,
	BasicTokenIntrospectionResponse,
	StandardRevocableToken,
	BasicRevocationErrorResponse,
	EndpointNotSet,
	EndpointNotSet,
	EndpointNotSet,
	EndpointNotSet,
	EndpointSet,
>;

/// Boxed future returned by [`TokenEndpoint::exchange`].
pub type EndpointFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + 'a + Send>>;

/// [`OAuth2TokenEndpoint`] wired to reqwest.
#[cfg(feature = "reqwest")]
pub type ReqwestTokenEndpoint = OAuth2TokenEndpoint<ReqwestHttpClient, ReqwestTransportErrorMapper>;

/// Grant presented to the token endpoint.
#[derive(Clone, Debug)]
pub enum TokenGrant {
	/// Authorization code returned by the hidden iframe, redeemed with its PKCE verifier.
	AuthorizationCode {
		/// Authorization code.
		code: String,
		/// PKCE verifier generated for the same transaction.
		code_verifier: TokenSecret,
		/// Redirect URI used in the authorize request.
		redirect_uri: Url,
	},
	/// Refresh token grant.
	RefreshToken {
		/// Refresh token to spend.
		refresh_token: TokenSecret,
	},
}
impl TokenGrant {
	/// Wire name of the grant type.
	pub const fn as_str(&self) -> &'static str {
		match self {
			Self::AuthorizationCode { .. } => "authorization_code",
			Self::RefreshToken { .. } => "refresh_token",
		}
	}
}

/// Token endpoint request.
#[derive(Clone, Debug)]
pub struct TokenRequest {
	/// Grant to redeem.
	pub grant: TokenGrant,
	/// Audience the access token should target; the default audience is not sent.
	pub audience: Audience,
	/// Scope to request; empty sets are not sent.
	pub scope: ScopeSet,
	/// Additional form parameters.
	pub extra_params: BTreeMap<String, String>,
}
impl TokenRequest {
	/// Builds a request without extra parameters.
	pub fn new(grant: TokenGrant, audience: Audience, scope: ScopeSet) -> Self {
		Self { grant, audience, scope, extra_params: BTreeMap::new() }
	}

	/// Adds form parameters, overriding any previous value for the same name.
	pub fn with_extra_params(mut self, params: impl IntoIterator<Item = (String, String)>) -> Self {
		self.extra_params.extend(params);

		self
	}
}

/// Successful token endpoint answer.
#[derive(Clone, Debug, PartialEq)]
pub struct TokenEndpointResponse {
	/// Access token.
	pub access_token: TokenSecret,
	/// ID token, when issued.
	pub id_token: Option<TokenSecret>,
	/// Rotated or newly issued refresh token.
	pub refresh_token: Option<TokenSecret>,
	/// Lifetime in seconds; always positive.
	pub expires_in: i64,
	/// Scope echoed by the endpoint.
	pub scope: Option<ScopeSet>,
}

/// Token endpoint client.
pub trait TokenEndpoint
where
	Self: Send + Sync,
{
	/// Endpoint URL, used in transport error messages.
	fn token_url(&self) -> &Url;

	/// Redeems `request`; OAuth error objects surface as [`Error::OAuth`].
	fn exchange(&self, request: TokenRequest) -> EndpointFuture<'_, TokenEndpointResponse>;
}

/// Runs [`TokenEndpoint::exchange`] and aborts it after `timeout`.
///
/// Dropping the in-flight request cancels it; the caller observes a fetch
/// [`Timeout`](Error::Timeout).
pub async fn exchange_with_timeout(
	endpoint: &dyn TokenEndpoint,
	request: TokenRequest,
	timeout: Duration,
) -> Result<TokenEndpointResponse> {
	tokio::time::timeout(clock::to_std(timeout), endpoint.exchange(request))
		.await
		.map_err(|_| Error::from(TimeoutKind::Fetch))?
}

/// Maps HTTP transport failures into crate [`Error`] values.
pub trait TransportErrorMapper<E>
where
	Self: 'static + Send + Sync,
	E: 'static + Send + Sync + StdError,
{
	/// Converts an [`HttpClientError`] emitted while calling `url`.
	fn map_transport_error(
		&self,
		url: &Url,
		metadata: Option<&ResponseMetadata>,
		error: HttpClientError<E>,
	) -> Error;
}

/// Default mapper for reqwest-backed transports.
#[cfg(feature = "reqwest")]
#[derive(Clone, Debug, Default)]
pub struct ReqwestTransportErrorMapper;
#[cfg(feature = "reqwest")]
impl TransportErrorMapper<ReqwestError> for ReqwestTransportErrorMapper {
	fn map_transport_error(
		&self,
		url: &Url,
		meta: Option<&ResponseMetadata>,
		err: HttpClientError<ReqwestError>,
	) -> Error {
		match err {
			HttpClientError::Reqwest(inner) => map_reqwest_error(url, *inner),
			HttpClientError::Http(inner) => ConfigError::from(inner).into(),
			HttpClientError::Io(inner) => TransportError::from(inner).into(),
			HttpClientError::Other(message) => TransportError::UnexpectedResponse {
				message,
				status: meta.and_then(|value| value.status),
			}
			.into(),
			_ => TransportError::UnexpectedResponse {
				message: "HTTP client error".into(),
				status: meta.and_then(|value| value.status),
			}
			.into(),
		}
	}
}

/// Extra token response fields carrying the OIDC ID token.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct IdTokenFields {
	/// Raw ID token.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub id_token: Option<String>,
}
impl ExtraTokenFields for IdTokenFields {}

/// [`TokenEndpoint`] backed by an `oauth2` client.
///
/// The client is public: `client_id` travels in the form body and no secret is sent.
pub struct OAuth2TokenEndpoint<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	oauth_client: ConfiguredClient,
	token_url: Url,
	http_client: Arc<C>,
	error_mapper: Arc<M>,
}
impl<C, M> OAuth2TokenEndpoint<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	/// Creates an endpoint client for `client_id` posting to `token_url`.
	pub fn new(
		client_id: &ClientId,
		token_url: Url,
		http_client: impl Into<Arc<C>>,
		error_mapper: impl Into<Arc<M>>,
	) -> Self {
		let oauth_client = Client::new(oauth2::ClientId::new(client_id.to_string()))
			.set_token_uri(TokenUrl::from_url(token_url.clone()))
			.set_auth_type(AuthType::RequestBody);

		Self {
			oauth_client,
			token_url,
			http_client: http_client.into(),
			error_mapper: error_mapper.into(),
		}
	}
}
impl<C, M> TokenEndpoint for OAuth2TokenEndpoint<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	fn token_url(&self) -> &Url {
		&self.token_url
	}

	fn exchange(&self, request: TokenRequest) -> EndpointFuture<'_, TokenEndpointResponse> {
		let meta = ResponseMetadataSlot::default();

		Box::pin(async move {
			let instrumented = self.http_client.with_metadata(meta.clone());
			let TokenRequest { grant, audience, scope, extra_params } = request;
			let mut params = extra_params.into_iter().collect::<Vec<_>>();

			if !audience.is_default() {
				params.push(("audience".into(), audience.to_string()));
			}

			let outcome = match grant {
				TokenGrant::AuthorizationCode { code, code_verifier, redirect_uri } => {
					let mut builder = self
						.oauth_client
						.exchange_code(AuthorizationCode::new(code))
						.set_pkce_verifier(PkceCodeVerifier::new(code_verifier.expose().to_owned()))
						.set_redirect_uri(Cow::Owned(RedirectUrl::from_url(redirect_uri)));

					if !scope.is_empty() {
						builder = builder.add_extra_param("scope", scope.normalized());
					}
					for (name, value) in params {
						builder = builder.add_extra_param(name, value);
					}

					builder.request_async(&instrumented).await
				},
				TokenGrant::RefreshToken { refresh_token } => {
					let refresh_secret = RefreshToken::new(refresh_token.expose().to_owned());
					let mut builder = self.oauth_client.exchange_refresh_token(&refresh_secret);

					for value in scope.iter() {
						builder = builder.add_scope(Scope::new(value.to_owned()));
					}
					for (name, value) in params {
						builder = builder.add_extra_param(name, value);
					}

					builder.request_async(&instrumented).await
				},
			};
			let response = outcome.map_err(|err| {
				map_request_error(&self.token_url, meta.take(), err, self.error_mapper.as_ref())
			})?;

			map_token_response(response)
		})
	}
}

fn map_token_response(response: SilentTokenResponse) -> Result<TokenEndpointResponse> {
	let expires_in = response.expires_in().ok_or(ConfigError::MissingExpiresIn)?.as_secs();
	let expires_in = i64::try_from(expires_in).map_err(|_| ConfigError::ExpiresInOutOfRange)?;

	if expires_in <= 0 {
		return Err(ConfigError::NonPositiveExpiresIn.into());
	}

	let scope = response
		.scopes()
		.map(|scopes| ScopeSet::new(scopes.iter().map(|scope| scope.to_string())))
		.transpose()
		.map_err(ConfigError::from)?;

	Ok(TokenEndpointResponse {
		access_token: TokenSecret::new(response.access_token().secret().to_owned()),
		id_token: response.extra_fields().id_token.clone().map(TokenSecret::new),
		refresh_token: response.refresh_token().map(|token| TokenSecret::new(token.secret().to_owned())),
		expires_in,
		scope,
	})
}

fn map_request_error<E, M>(
	url: &Url,
	meta: Option<ResponseMetadata>,
	err: BasicRequestTokenError<HttpClientError<E>>,
	mapper: &M,
) -> Error
where
	E: 'static + Send + Sync + StdError,
	M: ?Sized + TransportErrorMapper<E>,
{
	let meta_ref = meta.as_ref();
	let status = meta_ref.and_then(|value| value.status);

	match err {
		RequestTokenError::ServerResponse(response) => {
			let code: &str = response.error().as_ref();

			AuthError::new(code, response.error_description().cloned()).into()
		},
		RequestTokenError::Request(error) => mapper.map_transport_error(url, meta_ref, error),
		RequestTokenError::Parse(..) | RequestTokenError::Other(_)
			if meta_ref.is_some_and(ResponseMetadata::is_error_status) =>
			TransportError::HttpStatus { url: url.to_string(), status: status.unwrap_or_default() }
				.into(),
		RequestTokenError::Parse(source, _body) =>
			TransportError::MalformedResponse { source: Arc::new(source), status }.into(),
		RequestTokenError::Other(message) =>
			TransportError::UnexpectedResponse { message, status }.into(),
	}
}

#[cfg(feature = "reqwest")]
fn map_reqwest_error(url: &Url, err: ReqwestError) -> Error {
	if err.is_builder() {
		return ConfigError::from(err).into();
	}
	if err.is_timeout() {
		return TimeoutKind::Fetch.into();
	}

	TransportError::network(url, err).into()
}
