//! Minimal thread-safe signal.
//!
//! Browser-backed cells and the hydration table push values through
//! [`Signal`]. It holds a value, hands out clones on [`get`](Signal::get) and
//! notifies subscribers after every write.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::{Mutex, RwLock};

/// Callback invoked with the new value after each change.
pub type Subscriber<T> = Arc<dyn Fn(&T) + Send + Sync>;

struct SignalInner<T> {
	value: RwLock<T>,
	subscribers: Mutex<Vec<(u64, Subscriber<T>)>>,
	next_id: AtomicU64,
}

/// A shared reactive value. Clones share the same value and subscribers.
pub struct Signal<T> {
	inner: Arc<SignalInner<T>>,
}

impl<T> Clone for Signal<T> {
	fn clone(&self) -> Self {
		Self {
			inner: Arc::clone(&self.inner),
		}
	}
}

impl<T> Signal<T>
where
	T: Clone + Send + Sync + 'static,
{
	/// Create a new signal holding `value`
	///
	/// # Examples
	///
	/// ```
	/// use edges_state::Signal;
	///
	/// let count = Signal::new(0);
	/// count.update(|n| *n += 1);
	/// assert_eq!(count.get(), 1);
	/// ```
	pub fn new(value: T) -> Self {
		Self {
			inner: Arc::new(SignalInner {
				value: RwLock::new(value),
				subscribers: Mutex::new(Vec::new()),
				next_id: AtomicU64::new(0),
			}),
		}
	}

	/// Current value
	pub fn get(&self) -> T {
		self.inner.value.read().clone()
	}

	/// Replace the value and notify subscribers
	pub fn set(&self, value: T) {
		*self.inner.value.write() = value;
		self.notify();
	}

	/// Mutate the value in place and notify subscribers once
	pub fn update<F>(&self, f: F)
	where
		F: FnOnce(&mut T),
	{
		f(&mut self.inner.value.write());
		self.notify();
	}

	/// Registers `subscriber`, calling it right away with the current value.
	pub fn subscribe(&self, subscriber: Subscriber<T>) -> Unsubscribe {
		let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
		self.inner
			.subscribers
			.lock()
			.push((id, Arc::clone(&subscriber)));
		subscriber(&self.get());

		let weak: Weak<SignalInner<T>> = Arc::downgrade(&self.inner);
		Unsubscribe::new(move || {
			if let Some(inner) = weak.upgrade() {
				inner.subscribers.lock().retain(|(sid, _)| *sid != id);
			}
		})
	}

	/// Number of live subscribers
	pub fn subscriber_count(&self) -> usize {
		self.inner.subscribers.lock().len()
	}

	/// Whether both handles share one value
	pub fn ptr_eq(&self, other: &Self) -> bool {
		Arc::ptr_eq(&self.inner, &other.inner)
	}

	fn notify(&self) {
		let value = self.get();
		// Snapshot so a subscriber may subscribe or unsubscribe re-entrantly.
		let subscribers: Vec<Subscriber<T>> = self
			.inner
			.subscribers
			.lock()
			.iter()
			.map(|(_, s)| Arc::clone(s))
			.collect();
		for subscriber in subscribers {
			subscriber(&value);
		}
	}
}

impl<T: fmt::Debug> fmt::Debug for Signal<T> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Signal")
			.field("value", &*self.inner.value.read())
			.field("subscribers", &self.inner.subscribers.lock().len())
			.finish()
	}
}

/// Handle returned by `subscribe`. Dropping it keeps the subscription alive.
#[must_use = "call `unsubscribe()` to stop receiving updates"]
pub struct Unsubscribe {
	action: Option<Box<dyn FnOnce() + Send>>,
}

impl Unsubscribe {
	/// Wraps the cleanup action.
	pub fn new(action: impl FnOnce() + Send + 'static) -> Self {
		Self {
			action: Some(Box::new(action)),
		}
	}

	/// A handle that does nothing. Server-side cells return this.
	pub fn noop() -> Self {
		Self { action: None }
	}

	/// Stop receiving updates
	pub fn unsubscribe(mut self) {
		if let Some(action) = self.action.take() {
			action();
		}
	}
}

impl fmt::Debug for Unsubscribe {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Unsubscribe")
			.field("noop", &self.action.is_none())
			.finish()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use rstest::rstest;

	#[rstest]
	fn test_subscribe_calls_immediately_and_on_change() {
		// Arrange
		let signal = Signal::new(1);
		let seen = Arc::new(Mutex::new(Vec::new()));
		let sink = Arc::clone(&seen);

		// Act
		let handle = signal.subscribe(Arc::new(move |v: &i32| sink.lock().push(*v)));
		signal.set(2);
		signal.update(|v| *v *= 10);

		// Assert
		assert_eq!(*seen.lock(), vec![1, 2, 20]);
		assert_eq!(signal.subscriber_count(), 1);
		handle.unsubscribe();
	}

	#[rstest]
	fn test_unsubscribe_stops_updates() {
		let signal = Signal::new(String::from("a"));
		let seen = Arc::new(Mutex::new(0usize));
		let sink = Arc::clone(&seen);

		let handle = signal.subscribe(Arc::new(move |_: &String| *sink.lock() += 1));
		handle.unsubscribe();
		signal.set(String::from("b"));

		assert_eq!(*seen.lock(), 1);
		assert_eq!(signal.subscriber_count(), 0);
	}

	#[rstest]
	fn test_clones_share_value() {
		let a = Signal::new(vec![1]);
		let b = a.clone();

		b.update(|v| v.push(2));

		assert_eq!(a.get(), vec![1, 2]);
		assert!(a.ptr_eq(&b));
	}

	#[rstest]
	fn test_noop_unsubscribe() {
		Unsubscribe::noop().unsubscribe();
	}
}
