//! Validated identifiers that make up the client half of a cache key.

// std
use std::{borrow::Borrow, ops::Deref};
// self
use crate::_prelude::*;

macro_rules! def_id {
	($name:ident, $doc:literal, $kind:literal) => {
		#[doc = $doc]
		#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
		#[serde(try_from = "String", into = "String")]
		pub struct $name(String);
		impl $name {
			/// Creates a new identifier after validation.
			pub fn new(value: impl AsRef<str>) -> Result<Self, IdentifierError> {
				let view = value.as_ref();

				validate_view($kind, view)?;

				Ok(Self(view.to_owned()))
			}
		}
		impl Deref for $name {
			type Target = str;

			fn deref(&self) -> &Self::Target {
				&self.0
			}
		}
		impl AsRef<str> for $name {
			fn as_ref(&self) -> &str {
				&self.0
			}
		}
		impl From<$name> for String {
			fn from(value: $name) -> Self {
				value.0
			}
		}
		impl TryFrom<String> for $name {
			type Error = IdentifierError;

			fn try_from(value: String) -> Result<Self, Self::Error> {
				validate_view($kind, &value)?;

				Ok(Self(value))
			}
		}
		impl Borrow<str> for $name {
			fn borrow(&self) -> &str {
				&self.0
			}
		}
		impl Debug for $name {
			fn fmt(&self, f: &mut Formatter) -> FmtResult {
				write!(f, concat!($kind, "({})"), self.0)
			}
		}
		impl Display for $name {
			fn fmt(&self, f: &mut Formatter) -> FmtResult {
				f.write_str(&self.0)
			}
		}
		impl FromStr for $name {
			type Err = IdentifierError;

			fn from_str(s: &str) -> Result<Self, Self::Err> {
				Self::new(s)
			}
		}
	};
}

/// Audience used when neither the client nor the request names one.
pub const DEFAULT_AUDIENCE: &str = "default";

const IDENTIFIER_MAX_LEN: usize = 256;
// Cache keys are `::`-delimited, so identifiers may not contain the delimiter.
const KEY_DELIMITER: &str = "::";

/// Error returned when identifier validation fails.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, ThisError)]
pub enum IdentifierError {
	/// The identifier was empty.
	#[error("{kind} identifier cannot be empty.")]
	Empty {
		/// Kind of identifier (client, audience).
		kind: &'static str,
	},
	/// The identifier contains whitespace characters.
	#[error("{kind} identifier contains whitespace.")]
	ContainsWhitespace {
		/// Kind of identifier (client, audience).
		kind: &'static str,
	},
	/// The identifier contains the cache-key delimiter.
	#[error("{kind} identifier contains the reserved `::` delimiter.")]
	ContainsDelimiter {
		/// Kind of identifier (client, audience).
		kind: &'static str,
	},
	/// The identifier exceeded the allowed character count.
	#[error("{kind} identifier exceeds {max} characters.")]
	TooLong {
		/// Kind of identifier (client, audience).
		kind: &'static str,
		/// Maximum permitted character count.
		max: usize,
	},
}

def_id! { ClientId, "OAuth client identifier of the single-page application.", "Client" }
def_id! { Audience, "API audience a token set was issued for.", "Audience" }
impl Audience {
	/// Returns `true` for the placeholder audience that is never sent to the server.
	pub fn is_default(&self) -> bool {
		self.0 == DEFAULT_AUDIENCE
	}
}
impl Default for Audience {
	fn default() -> Self {
		Self(DEFAULT_AUDIENCE.to_owned())
	}
}

fn validate_view(kind: &'static str, view: &str) -> Result<(), IdentifierError> {
	if view.is_empty() {
		return Err(IdentifierError::Empty { kind });
	}
	if view.chars().any(char::is_whitespace) {
		return Err(IdentifierError::ContainsWhitespace { kind });
	}
	if view.contains(KEY_DELIMITER) {
		return Err(IdentifierError::ContainsDelimiter { kind });
	}
	if view.len() > IDENTIFIER_MAX_LEN {
		return Err(IdentifierError::TooLong { kind, max: IDENTIFIER_MAX_LEN });
	}

	Ok(())
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn identifiers_reject_padding_and_delimiters() {
		assert!(ClientId::new(" spa").is_err(), "Leading whitespace must be rejected.");
		assert!(ClientId::new("spa ").is_err(), "Trailing whitespace must be rejected.");
		assert!(ClientId::new("").is_err());
		assert!(Audience::new("api::v1").is_err(), "The key delimiter must be rejected.");

		let audience = Audience::new("https://api.example.com/")
			.expect("URL-shaped audiences should be valid.");

		assert_eq!(audience.as_ref(), "https://api.example.com/");
		assert!(!audience.is_default());
	}

	#[test]
	fn default_audience_is_the_placeholder() {
		let audience = Audience::default();

		assert_eq!(audience.as_ref(), DEFAULT_AUDIENCE);
		assert!(audience.is_default());
	}

	#[test]
	fn serde_enforces_validation() {
		let client: ClientId =
			serde_json::from_str("\"spa-client\"").expect("Client should deserialize successfully.");

		assert_eq!(client.as_ref(), "spa-client");
		assert!(serde_json::from_str::<ClientId>("\"with space\"").is_err());
	}

	#[test]
	fn length_limit_is_enforced() {
		let exact = "a".repeat(IDENTIFIER_MAX_LEN);

		ClientId::new(&exact).expect("Exact length should succeed.");

		assert!(ClientId::new("a".repeat(IDENTIFIER_MAX_LEN + 1)).is_err());
	}

	#[test]
	fn borrow_supports_fast_lookup() {
		let map: HashMap<ClientId, u8> = HashMap::from_iter([(
			ClientId::new("spa-client").expect("Client used for lookup should be valid."),
			7_u8,
		)]);

		assert_eq!(map.get("spa-client"), Some(&7));
	}
}
