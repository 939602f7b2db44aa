//! Browser-side rehydration table.
//!
//! Values received from the server land here, keyed by state key. Cells
//! opened against the browser context share one [`Signal`] per key, so a
//! value pushed after mount reaches every cell that resolved that key.

use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

use indexmap::IndexMap;
use parking_lot::Mutex;

use crate::reactive::Signal;
use crate::value::StateValue;

/// Global key to value table plus the live signal registered for each key.
#[derive(Debug, Default)]
pub struct HydrationStore {
	table: Mutex<IndexMap<String, StateValue>>,
	live: Mutex<HashMap<String, Signal<StateValue>>>,
}

static GLOBAL: OnceLock<Arc<HydrationStore>> = OnceLock::new();

impl HydrationStore {
	/// An empty, standalone store.
	pub fn new() -> Self {
		Self::default()
	}

	/// The page session's store.
	pub fn global() -> Arc<HydrationStore> {
		Arc::clone(GLOBAL.get_or_init(|| Arc::new(Self::new())))
	}

	/// Last value received or written for `key`.
	pub fn get(&self, key: &str) -> Option<StateValue> {
		self.table.lock().get(key).cloned()
	}

	/// The live signal for `key`, if a cell has registered one.
	pub fn signal(&self, key: &str) -> Option<Signal<StateValue>> {
		self.live.lock().get(key).cloned()
	}

	/// Registers a live signal for `key` seeded with `seed`.
	///
	/// When another cell registered the key first, its signal is returned and
	/// `seed` is discarded.
	pub fn signal_or_insert(&self, key: &str, seed: StateValue) -> Signal<StateValue> {
		let signal = self
			.live
			.lock()
			.entry(key.to_string())
			.or_insert_with(|| Signal::new(seed.clone()))
			.clone();
		self.table.lock().entry(key.to_string()).or_insert(seed);
		signal
	}

	/// Records `value` and pushes it to the cell registered for `key`.
	pub fn write(&self, key: &str, value: StateValue) {
		self.table.lock().insert(key.to_string(), value.clone());
		let signal = self.signal(key);
		if let Some(signal) = signal {
			signal.set(value);
		}
	}

	/// Writes every entry in order; returns how many were applied.
	pub fn apply<I>(&self, entries: I) -> usize
	where
		I: IntoIterator<Item = (String, StateValue)>,
	{
		let mut applied = 0;
		for (key, value) in entries {
			self.write(&key, value);
			applied += 1;
		}
		if applied > 0 {
			tracing::debug!(applied, "rehydrated state entries");
		}
		applied
	}

	/// Copy of the table in arrival order.
	pub fn snapshot(&self) -> IndexMap<String, StateValue> {
		self.table.lock().clone()
	}

	/// Number of keys in the table
	pub fn len(&self) -> usize {
		self.table.lock().len()
	}

	/// Whether the table is empty
	pub fn is_empty(&self) -> bool {
		self.table.lock().is_empty()
	}

	/// Forgets every value and every live signal.
	pub fn clear(&self) {
		self.table.lock().clear();
		self.live.lock().clear();
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use rstest::rstest;

	#[rstest]
	fn test_write_reaches_registered_signal() {
		// Arrange
		let store = HydrationStore::new();
		let signal = store.signal_or_insert("count::state::0", StateValue::from(1i64));

		// Act
		store.write("count::state::0", StateValue::from(5i64));

		// Assert
		assert_eq!(signal.get(), StateValue::from(5i64));
		assert_eq!(store.get("count::state::0"), Some(StateValue::from(5i64)));
	}

	#[rstest]
	fn test_second_registration_shares_signal() {
		let store = HydrationStore::new();

		let first = store.signal_or_insert("k", StateValue::from("a"));
		let second = store.signal_or_insert("k", StateValue::from("b"));

		assert!(first.ptr_eq(&second));
		assert_eq!(second.get(), StateValue::from("a"));
	}

	#[rstest]
	fn test_write_before_registration_seeds_table_only() {
		let store = HydrationStore::new();

		let applied = store.apply([("k".to_string(), StateValue::Null)]);

		assert_eq!(applied, 1);
		assert!(store.signal("k").is_none());
		assert_eq!(store.get("k"), Some(StateValue::Null));
	}

	#[rstest]
	fn test_clear() {
		let store = HydrationStore::new();
		let _ = store.signal_or_insert("k", StateValue::Undefined);

		store.clear();

		assert!(store.is_empty());
		assert!(store.signal("k").is_none());
	}
}
