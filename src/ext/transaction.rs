//! Per-attempt authorization transaction persistence.

// crates.io
use serde_json::Value;
// self
use crate::{
	_prelude::*,
	auth::{Audience, ScopeSet, TokenSecret},
};

/// State kept between building an authorize URL and handling its callback.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TransactionState {
	/// Anti-forgery value that must round-trip unchanged.
	pub state: String,
	/// Nonce the ID token must echo.
	pub nonce: String,
	/// PKCE verifier matching the challenge sent in the authorize URL.
	pub code_verifier: TokenSecret,
	/// Application state carried through the round trip.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub app_state: Option<Value>,
	/// Scope sent in the authorize URL.
	pub scope: ScopeSet,
	/// Audience sent in the authorize URL.
	pub audience: Audience,
	/// Redirect URI sent in the authorize URL.
	pub redirect_uri: Url,
}

/// Storage for the transaction of the attempt currently in flight.
///
/// A transaction is created before navigation and consumed exactly once when the callback is
/// handled. Renewals for one client are serialized by the cross-instance lock, so a single
/// slot is enough.
pub trait TransactionStore
where
	Self: Send + Sync,
{
	/// Stores `transaction`, replacing any previous one.
	fn create(&self, transaction: TransactionState) -> Result<()>;

	/// Returns the stored transaction.
	fn get(&self) -> Result<Option<TransactionState>>;

	/// Deletes the stored transaction.
	fn remove(&self) -> Result<()>;
}

/// Single-slot in-memory [`TransactionStore`].
#[derive(Clone, Debug, Default)]
pub struct MemoryTransactionStore(Arc<Mutex<Option<TransactionState>>>);
impl TransactionStore for MemoryTransactionStore {
	fn create(&self, transaction: TransactionState) -> Result<()> {
		*self.0.lock() = Some(transaction);

		Ok(())
	}

	fn get(&self) -> Result<Option<TransactionState>> {
		Ok(self.0.lock().clone())
	}

	fn remove(&self) -> Result<()> {
		self.0.lock().take();

		Ok(())
	}
}
