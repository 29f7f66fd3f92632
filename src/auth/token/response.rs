//! Caller-facing token response returned when full detail is requested.

// self
use crate::_prelude::*;

/// Full token response; `scope` is present only when the token endpoint echoed one.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetailedTokenResponse {
	/// Access token value.
	pub access_token: String,
	/// Raw ID token.
	pub id_token: String,
	/// Lifetime reported by the token endpoint, in seconds.
	pub expires_in: i64,
	/// Scope echoed by the token endpoint.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub scope: Option<String>,
}
impl Debug for DetailedTokenResponse {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("DetailedTokenResponse")
			.field("access_token", &"<redacted>")
			.field("id_token", &"<redacted>")
			.field("expires_in", &self.expires_in)
			.field("scope", &self.scope)
			.finish()
	}
}
