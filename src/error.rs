//! Crate-level error types shared by the cache, lock, and renewal layers.
//!
//! Every error is [`Clone`] so a single-flight leader can hand the identical rejection to each
//! follower that joined its renewal; underlying sources are therefore kept behind [`Arc`].

// self
use crate::_prelude::*;

/// Crate-wide result type alias returning [`Error`] by default.
pub type Result<T, E = Error> = std::result::Result<T, E>;

type SharedError = Arc<dyn std::error::Error + Send + Sync>;

/// OAuth error codes that mean the session can no longer be maintained silently.
pub const LOGIN_REQUIRED_ERRORS: [&str; 5] = [
	"login_required",
	"consent_required",
	"interaction_required",
	"account_selection_required",
	"access_denied",
];
/// Description returned by the authorization server for a refresh token it no longer honors.
pub const INVALID_REFRESH_TOKEN_MESSAGE: &str = "Unknown or invalid refresh token.";

/// Canonical error exposed by public APIs.
#[derive(Clone, Debug, ThisError)]
pub enum Error {
	/// Storage-layer failure.
	#[error("{0}")]
	Storage(
		#[from]
		#[source]
		crate::store::StoreError,
	),
	/// Local configuration problem or conflicting options.
	#[error(transparent)]
	Config(#[from] ConfigError),
	/// Network failure or a non-OAuth HTTP error from the token endpoint.
	#[error(transparent)]
	Transport(#[from] TransportError),
	/// Lock acquisition, token fetch, or iframe wait ran out of time.
	#[error(transparent)]
	Timeout(#[from] TimeoutError),
	/// Authorization server answered with an OAuth error object.
	#[error(transparent)]
	OAuth(#[from] AuthError),

	/// Returned `state` does not match the transaction that started the attempt.
	#[error("Invalid state.")]
	StateMismatch,
	/// ID token verification rejected the response.
	#[error("ID token verification failed: {reason}.")]
	Verification {
		/// Verifier-supplied reason string.
		reason: String,
	},
	/// A refresh exchange was requested without a refresh token.
	#[error("Missing refresh token.")]
	MissingRefreshToken,
	/// Lock backend failed while acquiring or releasing.
	#[error("Lock backend failure: {message}.")]
	Lock {
		/// Human-readable error payload.
		message: String,
	},
}
impl Error {
	/// Returns `true` for the login-required family of OAuth errors.
	pub fn is_login_required(&self) -> bool {
		matches!(self, Self::OAuth(e) if e.class() == AuthErrorClass::LoginRequired)
	}

	/// Returns `true` when a refresh exchange should fall back to iframe re-authentication.
	pub fn is_invalid_grant(&self) -> bool {
		match self {
			Self::OAuth(e) => e.class() == AuthErrorClass::InvalidGrant,
			Self::MissingRefreshToken => true,
			_ => false,
		}
	}

	/// Returns the timeout kind when this error is a timeout.
	pub fn timeout_kind(&self) -> Option<TimeoutKind> {
		match self {
			Self::Timeout(e) => Some(e.kind),
			_ => None,
		}
	}
}
impl From<TimeoutKind> for Error {
	fn from(kind: TimeoutKind) -> Self {
		Self::Timeout(TimeoutError { kind })
	}
}

/// Configuration and validation failures.
#[derive(Clone, Debug, ThisError)]
pub enum ConfigError {
	/// HTTP client could not be constructed.
	#[error("HTTP client could not be constructed.")]
	HttpClientBuild {
		/// Underlying transport builder failure.
		#[source]
		source: SharedError,
	},
	/// HTTP request construction failed.
	#[error("HTTP request could not be constructed: {message}.")]
	HttpRequest {
		/// Rendered request builder failure.
		message: String,
	},
	/// Cache location string is not recognized.
	#[error("Invalid cache location \"{0}\"")]
	InvalidCacheLocation(String),
	/// `local_only` and `federated` were both requested.
	#[error("It is invalid to set both the `federated` and `local_only` logout options to `true`.")]
	ConflictingLogoutOptions,
	/// File cache location selected without a path.
	#[error("The file cache location requires a cache path.")]
	MissingCachePath,
	/// Domain or issuer cannot be turned into a URL.
	#[error("Domain `{domain}` cannot be turned into a URL.")]
	InvalidDomain {
		/// Offending domain or issuer string.
		domain: String,
	},
	/// Redirect URI cannot be parsed.
	#[error("Redirect URI is invalid.")]
	InvalidRedirect {
		/// Underlying parsing failure.
		#[source]
		source: url::ParseError,
	},
	/// Iframe re-authentication needs a redirect URI and none was configured.
	#[error("A redirect URI is required for iframe re-authentication.")]
	MissingRedirectUri,
	/// No token endpoint was configured and the default transport is disabled.
	#[error("A token endpoint must be supplied when the `reqwest` feature is disabled.")]
	MissingTokenEndpoint,
	/// A required collaborator was not supplied to the client builder.
	#[error("The {0} collaborator is required.")]
	MissingCollaborator(&'static str),
	/// Token endpoint response omitted `expires_in`.
	#[error("Token endpoint response is missing expires_in.")]
	MissingExpiresIn,
	/// Token endpoint returned an excessively large `expires_in`.
	#[error("The expires_in value exceeds the supported range.")]
	ExpiresInOutOfRange,
	/// Token endpoint returned a non-positive duration.
	#[error("The expires_in value must be positive.")]
	NonPositiveExpiresIn,
	/// Session hint expiry lands outside the representable time range.
	#[error("The session check expiry exceeds the supported range.")]
	SessionCheckExpiryOutOfRange,
	/// Token response did not carry an ID token.
	#[error("Token endpoint response is missing id_token.")]
	MissingIdToken,
	/// Scope string cannot be normalized.
	#[error("Requested scopes are invalid.")]
	InvalidScope(#[from] crate::auth::ScopeValidationError),
	/// Client identifier or audience is malformed.
	#[error("Identifier is invalid.")]
	InvalidIdentifier(#[from] crate::auth::IdentifierError),
	/// Cache entry builder validation failed.
	#[error("Unable to build token set entry.")]
	EntryBuild(#[from] crate::auth::TokenSetEntryBuilderError),
}
impl ConfigError {
	/// Wraps a transport's builder failure inside [`ConfigError`].
	pub fn http_client_build(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::HttpClientBuild { source: Arc::new(src) }
	}
}
#[cfg(feature = "reqwest")]
impl From<ReqwestError> for ConfigError {
	fn from(e: ReqwestError) -> Self {
		Self::http_client_build(e)
	}
}
impl From<oauth2::http::Error> for ConfigError {
	fn from(e: oauth2::http::Error) -> Self {
		Self::HttpRequest { message: e.to_string() }
	}
}

/// Transport-level failures while talking to the token endpoint.
#[derive(Clone, Debug, ThisError)]
pub enum TransportError {
	/// Underlying HTTP client reported a network failure.
	#[error("Network error occurred while calling {url}.")]
	Network {
		/// Endpoint that was being called.
		url: String,
		/// Transport-specific network error.
		#[source]
		source: SharedError,
	},
	/// Non-2xx response that does not carry an OAuth error object.
	#[error("HTTP error. Unable to fetch {url}")]
	HttpStatus {
		/// Endpoint that was being called.
		url: String,
		/// HTTP status code.
		status: u16,
	},
	/// Successful status with a body that could not be parsed.
	#[error("Token endpoint returned malformed JSON.")]
	MalformedResponse {
		/// Structured parsing failure.
		#[source]
		source: Arc<serde_path_to_error::Error<serde_json::Error>>,
		/// HTTP status code, when available.
		status: Option<u16>,
	},
	/// Token endpoint answered with a body `oauth2` refused to interpret.
	#[error("Token endpoint returned an unexpected response: {message}.")]
	UnexpectedResponse {
		/// Rendered reason.
		message: String,
		/// HTTP status code, when available.
		status: Option<u16>,
	},
	/// Underlying IO failure surfaced during transport.
	#[error("I/O error occurred while calling the token endpoint.")]
	Io(#[source] Arc<std::io::Error>),
	/// The worker execution context stopped before answering.
	#[error("Worker execution context is unavailable.")]
	WorkerUnavailable,
}
impl TransportError {
	/// Wraps a transport-specific network error.
	pub fn network(url: &Url, src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::Network { url: url.to_string(), source: Arc::new(src) }
	}
}
impl From<std::io::Error> for TransportError {
	fn from(e: std::io::Error) -> Self {
		Self::Io(Arc::new(e))
	}
}

/// Operation that exceeded its time budget.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeoutKind {
	/// Every cross-instance lock attempt timed out.
	Lock,
	/// Token endpoint request was aborted.
	Fetch,
	/// Hidden iframe did not answer in time.
	Authorize,
}
impl TimeoutKind {
	/// Returns a stable label suitable for messages and metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			TimeoutKind::Lock => "lock",
			TimeoutKind::Fetch => "fetch",
			TimeoutKind::Authorize => "authorize",
		}
	}
}
impl Display for TimeoutKind {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Typed timeout shared by the lock, network, and iframe paths.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ThisError)]
#[error("Timeout when executing '{kind}'.")]
pub struct TimeoutError {
	/// Which operation timed out.
	pub kind: TimeoutKind,
}

/// Classification of an [`AuthError`] used by the renewal state machine.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AuthErrorClass {
	/// User interaction is required; triggers a local logout.
	LoginRequired,
	/// Refresh token is no longer valid; triggers the iframe fallback.
	InvalidGrant,
	/// Anything else; surfaced as-is.
	Other,
}

/// OAuth error object returned by the authorization server or the hidden iframe.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthError {
	/// OAuth error code.
	pub error: String,
	/// Human-readable description, when provided.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub error_description: Option<String>,
	/// State echoed alongside the error, when provided.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub state: Option<String>,
}
impl AuthError {
	/// Builds an error from a code and optional description.
	pub fn new(error: impl Into<String>, error_description: Option<String>) -> Self {
		Self { error: error.into(), error_description, state: None }
	}

	/// Attaches the state echoed by the authorization server.
	pub fn with_state(mut self, state: impl Into<String>) -> Self {
		self.state = Some(state.into());

		self
	}

	/// Classifies the error code for fallback and logout decisions.
	pub fn class(&self) -> AuthErrorClass {
		if LOGIN_REQUIRED_ERRORS.contains(&self.error.as_str()) {
			return AuthErrorClass::LoginRequired;
		}
		if self.error == "invalid_grant" || self.error == "missing_refresh_token" {
			return AuthErrorClass::InvalidGrant;
		}
		if self
			.error_description
			.as_deref()
			.is_some_and(|description| description.contains(INVALID_REFRESH_TOKEN_MESSAGE))
		{
			return AuthErrorClass::InvalidGrant;
		}

		AuthErrorClass::Other
	}
}
impl Display for AuthError {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.error_description.as_deref().unwrap_or(&self.error))
	}
}
impl StdError for AuthError {}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn login_required_family_is_classified() {
		for code in LOGIN_REQUIRED_ERRORS {
			let error = Error::from(AuthError::new(code, None));

			assert!(error.is_login_required(), "{code} should be login-required.");
			assert!(!error.is_invalid_grant());
		}
	}

	#[test]
	fn invalid_refresh_token_description_triggers_fallback() {
		let by_code = Error::from(AuthError::new("invalid_grant", None));
		let by_description = Error::from(AuthError::new(
			"unauthorized",
			Some(INVALID_REFRESH_TOKEN_MESSAGE.into()),
		));
		let other = Error::from(AuthError::new("server_error", Some("boom".into())));

		assert!(by_code.is_invalid_grant());
		assert!(by_description.is_invalid_grant());
		assert!(Error::MissingRefreshToken.is_invalid_grant());
		assert!(!other.is_invalid_grant());
	}

	#[test]
	fn messages_match_the_public_contract() {
		let http = Error::from(TransportError::HttpStatus {
			url: "https://tenant.example.com/oauth/token".into(),
			status: 500,
		});

		assert_eq!(http.to_string(), "HTTP error. Unable to fetch https://tenant.example.com/oauth/token");
		assert_eq!(Error::StateMismatch.to_string(), "Invalid state.");
		assert_eq!(
			Error::from(TimeoutKind::Fetch).to_string(),
			"Timeout when executing 'fetch'."
		);
		assert_eq!(
			Error::from(ConfigError::InvalidCacheLocation("dummy".into())).to_string(),
			"Invalid cache location \"dummy\""
		);
		assert_eq!(
			AuthError::new("login_required", Some("Login required".into())).to_string(),
			"Login required"
		);
		assert_eq!(AuthError::new("login_required", None).to_string(), "login_required");
	}

	#[test]
	fn store_error_converts_with_source() {
		let store_error =
			crate::store::StoreError::Backend { message: "quota exceeded".into() };
		let error: Error = store_error.clone().into();

		assert!(matches!(error, Error::Storage(_)));

		let source =
			StdError::source(&error).expect("Storage error should expose the store error as source.");

		assert_eq!(source.to_string(), store_error.to_string());
	}
}
