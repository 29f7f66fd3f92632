//! In-process request coalescing keyed by request fingerprint.

// std
use std::sync::atomic::{AtomicU64, Ordering};
// crates.io
use tokio::sync::watch;
// self
use crate::_prelude::*;

type Outcome<T> = Option<Result<T>>;

/// Runs at most one operation per key at a time; concurrent callers share its outcome.
///
/// The first caller for a key becomes the leader and runs the operation. Callers arriving
/// while it runs wait for the leader's value or error. The slot is cleared as soon as the
/// leader settles, so later callers start fresh. If the leader is dropped before settling,
/// one of the waiting callers takes over.
pub struct SingleFlight<T> {
	slots: Mutex<HashMap<String, Slot<T>>>,
	next_id: AtomicU64,
}
impl<T> SingleFlight<T>
where
	T: Clone,
{
	/// Runs `operation` under `key`, or joins the call already running under it.
	pub async fn run<F, Fut>(&self, key: &str, operation: F) -> Result<T>
	where
		F: FnOnce() -> Fut,
		Fut: Future<Output = Result<T>>,
	{
		let (id, sender) = loop {
			let mut receiver = {
				let mut slots = self.slots.lock();

				match slots.get(key) {
					Some(slot) => slot.receiver.clone(),
					None => {
						let id = self.next_id.fetch_add(1, Ordering::Relaxed);
						let (sender, receiver) = watch::channel(None);

						slots.insert(key.to_owned(), Slot { id, receiver });

						break (id, sender);
					},
				}
			};

			let settled =
				receiver.wait_for(Option::is_some).await.ok().and_then(|outcome| (*outcome).clone());

			if let Some(outcome) = settled {
				return outcome;
			}
		};
		let slot = SlotGuard { flights: self, key, id };
		let outcome = operation().await;

		sender.send_replace(Some(outcome.clone()));
		drop(slot);

		outcome
	}
}
impl<T> SingleFlight<T> {
	/// Number of keys with an operation in flight.
	pub fn in_flight(&self) -> usize {
		self.slots.lock().len()
	}
}
impl<T> Default for SingleFlight<T> {
	fn default() -> Self {
		Self { slots: Mutex::new(HashMap::new()), next_id: AtomicU64::new(0) }
	}
}
impl<T> Debug for SingleFlight<T> {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("SingleFlight").field("in_flight", &self.in_flight()).finish()
	}
}

struct Slot<T> {
	id: u64,
	receiver: watch::Receiver<Outcome<T>>,
}

// Clears the slot when the leader settles or is dropped.
struct SlotGuard<'a, T> {
	flights: &'a SingleFlight<T>,
	key: &'a str,
	id: u64,
}
impl<T> Drop for SlotGuard<'_, T> {
	fn drop(&mut self) {
		let mut slots = self.flights.slots.lock();

		if slots.get(self.key).is_some_and(|slot| slot.id == self.id) {
			slots.remove(self.key);
		}
	}
}
