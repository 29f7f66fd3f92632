//! Composite cache identities and their storage-key encoding.

// self
use crate::{
	_prelude::*,
	auth::{Audience, ClientId, ScopeSet},
};

/// Prefix shared by every key the cache manager writes.
pub const CACHE_KEY_PREFIX: &str = "@@oauth2silent@@";
/// Scope slot used by the wildcard refresh record.
pub const WILDCARD_REFRESH_MARKER: &str = "@@refresh@@";

const SEPARATOR: &str = "::";

/// Kind of record a storage key points at.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EntryKind {
	/// Full token set keyed by client, audience, and scope.
	TokenSet,
	/// Scope-agnostic refresh token for a client and audience.
	WildcardRefresh,
}

/// Identity of a token set: `{client_id, audience, scope}`.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct CacheKey {
	/// Client that owns the entry; must match exactly.
	pub client_id: ClientId,
	/// Audience of the entry; must match exactly.
	pub audience: Audience,
	/// Requested scope on lookups, granted scope on stored entries.
	pub scope: ScopeSet,
}
impl CacheKey {
	/// Builds a key from its components.
	pub fn new(client_id: ClientId, audience: Audience, scope: ScopeSet) -> Self {
		Self { client_id, audience, scope }
	}

	/// Storage key of the full token-set entry.
	pub fn to_storage_key(&self) -> String {
		format!(
			"{CACHE_KEY_PREFIX}{SEPARATOR}{}{SEPARATOR}{}{SEPARATOR}{}",
			self.client_id,
			self.audience,
			self.scope.normalized()
		)
	}

	/// Storage key of the wildcard refresh record for this key's client and audience.
	pub fn to_wildcard_storage_key(&self) -> String {
		wildcard_storage_key(&self.client_id, &self.audience)
	}

	/// Decodes a storage key written by [`to_storage_key`](Self::to_storage_key) or
	/// [`wildcard_storage_key`]; foreign keys yield `None`.
	pub fn parse(raw: &str) -> Option<(EntryKind, CacheKey)> {
		let mut parts = raw.splitn(4, SEPARATOR);

		if parts.next()? != CACHE_KEY_PREFIX {
			return None;
		}

		let client_id = ClientId::new(parts.next()?).ok()?;
		let audience = Audience::new(parts.next()?).ok()?;
		let scope = parts.next()?;

		if scope == WILDCARD_REFRESH_MARKER {
			let key = Self::new(client_id, audience, ScopeSet::default());

			return Some((EntryKind::WildcardRefresh, key));
		}

		let scope = scope.parse().ok()?;

		Some((EntryKind::TokenSet, Self::new(client_id, audience, scope)))
	}

	/// Returns `true` when `stored` can answer a lookup for `self`.
	///
	/// Client and audience must match exactly; the requested scope must be a subset of the
	/// stored scope.
	pub fn is_satisfied_by(&self, stored: &CacheKey) -> bool {
		self.client_id == stored.client_id
			&& self.audience == stored.audience
			&& self.scope.is_subset_of(&stored.scope)
	}
}
impl Display for CacheKey {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(&self.to_storage_key())
	}
}

/// Storage key of the wildcard refresh record for `(client_id, audience)`.
pub fn wildcard_storage_key(client_id: &ClientId, audience: &Audience) -> String {
	format!(
		"{CACHE_KEY_PREFIX}{SEPARATOR}{client_id}{SEPARATOR}{audience}{SEPARATOR}{WILDCARD_REFRESH_MARKER}"
	)
}

/// Prefix shared by every key belonging to `client_id`.
pub fn client_key_prefix(client_id: &ClientId) -> String {
	format!("{CACHE_KEY_PREFIX}{SEPARATOR}{client_id}{SEPARATOR}")
}
