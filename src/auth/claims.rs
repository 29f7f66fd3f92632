//! Decoded ID-token claims attached to every cached token set.

// crates.io
use serde_json::{Map, Value};
// self
use crate::_prelude::*;

// Protocol claims stripped from the user profile view.
const PROTOCOL_CLAIMS: [&str; 13] = [
	"iss", "aud", "exp", "nbf", "iat", "jti", "azp", "nonce", "auth_time", "at_hash", "c_hash",
	"acr", "amr",
];

/// Claims object produced by the token verifier.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IdTokenClaims(Map<String, Value>);
impl IdTokenClaims {
	/// Wraps an already-decoded claims object.
	pub fn new(claims: Map<String, Value>) -> Self {
		Self(claims)
	}

	/// Returns a claim by name.
	pub fn get(&self, name: &str) -> Option<&Value> {
		self.0.get(name)
	}

	/// Returns a string claim by name.
	pub fn get_str(&self, name: &str) -> Option<&str> {
		self.get(name).and_then(Value::as_str)
	}

	/// Subject identifier.
	pub fn sub(&self) -> Option<&str> {
		self.get_str("sub")
	}

	/// Organization the session was issued for.
	pub fn org_id(&self) -> Option<&str> {
		self.get_str("org_id")
	}

	/// Nonce echoed by the authorization server.
	pub fn nonce(&self) -> Option<&str> {
		self.get_str("nonce")
	}

	/// Profile claims with protocol bookkeeping removed.
	pub fn user(&self) -> IdTokenClaims {
		let user = self
			.0
			.iter()
			.filter(|(name, _)| !PROTOCOL_CLAIMS.contains(&name.as_str()))
			.map(|(name, value)| (name.clone(), value.clone()))
			.collect();

		Self(user)
	}

	/// Borrows the raw claims map.
	pub fn as_map(&self) -> &Map<String, Value> {
		&self.0
	}
}
impl From<Map<String, Value>> for IdTokenClaims {
	fn from(claims: Map<String, Value>) -> Self {
		Self(claims)
	}
}

#[cfg(test)]
mod tests {
	// crates.io
	use serde_json::json;
	// self
	use super::*;

	#[test]
	fn user_view_strips_protocol_claims() {
		let claims: IdTokenClaims = serde_json::from_value(json!({
			"sub": "user-1",
			"name": "Ada",
			"iss": "https://tenant.example.com/",
			"aud": "spa-client",
			"nonce": "n-1",
			"org_id": "org_1",
		}))
		.expect("Claims fixture should deserialize.");
		let user = claims.user();

		assert_eq!(claims.nonce(), Some("n-1"));
		assert_eq!(user.sub(), Some("user-1"));
		assert_eq!(user.get_str("name"), Some("Ada"));
		assert_eq!(user.org_id(), Some("org_1"));
		assert!(user.get("iss").is_none());
		assert!(user.get("nonce").is_none());
	}
}
