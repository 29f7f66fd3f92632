//! Hidden-iframe navigation contract used for `prompt=none` re-authentication.

// self
use crate::{_prelude::*, error::AuthError};

/// Boxed future returned by [`SilentAuthenticator::run_silent_auth`].
pub type SilentAuthFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + 'a + Send>>;

/// Callback parameters posted back by the hidden navigation surface.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorizeCallback {
	/// Authorization code, absent when the server answered without one.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub code: Option<String>,
	/// State echoed by the authorization server.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub state: Option<String>,
}
impl AuthorizeCallback {
	/// Builds a callback carrying a code and state.
	pub fn new(code: impl Into<String>, state: impl Into<String>) -> Self {
		Self { code: Some(code.into()), state: Some(state.into()) }
	}

	/// Reads callback parameters from a redirect URL's query string.
	///
	/// An `error` parameter turns into [`Error::OAuth`] carrying the description and the
	/// echoed state.
	pub fn from_callback_url(url: &Url) -> Result<Self> {
		let mut callback = Self::default();
		let mut error = None;
		let mut error_description = None;

		for (name, value) in url.query_pairs() {
			match name.as_ref() {
				"code" => callback.code = Some(value.into_owned()),
				"state" => callback.state = Some(value.into_owned()),
				"error" => error = Some(value.into_owned()),
				"error_description" => error_description = Some(value.into_owned()),
				_ => {},
			}
		}

		if let Some(error) = error {
			let mut auth_error = AuthError::new(error, error_description);

			auth_error.state = callback.state;

			return Err(auth_error.into());
		}

		Ok(callback)
	}
}

/// Runs an authorize request in a hidden, short-lived navigation surface.
///
/// Implementations post `authorize_url` into the surface, accept only messages whose origin
/// equals `origin`, and remove the surface once a message arrives or `timeout` elapses. A
/// server error must be returned as [`Error::OAuth`] with the echoed state attached, and an
/// elapsed timeout as an authorize [`Timeout`](Error::Timeout).
pub trait SilentAuthenticator
where
	Self: Send + Sync,
{
	/// Navigates to `authorize_url` and waits for the callback.
	fn run_silent_auth<'a>(
		&'a self,
		authorize_url: &'a Url,
		origin: &'a str,
		timeout: Duration,
	) -> SilentAuthFuture<'a, AuthorizeCallback>;
}
