//! State constructors and key derivation.
//!
//! Keys look like `<namespace>::<kind>::<ordinal>`. The ordinal comes from a
//! counter owned by the [`Namespace`]; raw and subscribable cells draw from
//! the same counter, so call order alone decides every key.

use std::sync::atomic::{AtomicUsize, Ordering};

use crate::cell::{Backing, DerivedCell, DerivedSource, RawCell, StateCell};
use crate::context::RequestContext;
use crate::error::Result;
use crate::registry::current;
use crate::value::StateData;

/// Kind segment of a state key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateKind {
	/// Subscribable cells
	State,
	/// Raw cells
	RawState,
}

impl StateKind {
	/// The segment as it appears in keys
	pub fn as_str(self) -> &'static str {
		match self {
			Self::State => "state",
			Self::RawState => "rawstate",
		}
	}
}

/// A key prefix plus its ordinal counter.
#[derive(Debug)]
pub struct Namespace {
	name: String,
	counter: AtomicUsize,
}

impl Namespace {
	/// A namespace whose counter starts at zero.
	pub fn new(name: impl Into<String>) -> Self {
		Self {
			name: name.into(),
			counter: AtomicUsize::new(0),
		}
	}

	/// Name used as the first key segment
	pub fn name(&self) -> &str {
		&self.name
	}

	/// Builds the next key for `kind`, advancing the counter.
	///
	/// # Examples
	///
	/// ```
	/// use edges_state::{Namespace, StateKind};
	///
	/// let ns = Namespace::new("user");
	/// assert_eq!(ns.next_key(StateKind::RawState), "user::rawstate::0");
	/// assert_eq!(ns.next_key(StateKind::State), "user::state::1");
	/// ```
	pub fn next_key(&self, kind: StateKind) -> String {
		let ordinal = self.counter.fetch_add(1, Ordering::Relaxed);
		format!("{}::{}::{}", self.name, kind.as_str(), ordinal)
	}

	/// Key for `kind` with `key` in place of the ordinal; the counter does not move.
	pub fn explicit_key(&self, kind: StateKind, key: &str) -> String {
		format!("{}::{}::{}", self.name, kind.as_str(), key)
	}

	/// Restarts the counter at zero
	pub fn reset(&self) {
		self.counter.store(0, Ordering::Relaxed);
	}

	fn resolve_key(&self, kind: StateKind, key: Option<&str>) -> String {
		match key {
			Some(key) => self.explicit_key(kind, key),
			None => self.next_key(kind),
		}
	}
}

/// Opens a subscribable cell in the ambient request context.
///
/// `key` replaces the ordinal when given; otherwise the namespace counter
/// supplies it. On first access in a request the initializer's value is
/// stored; later accesses return the stored value.
///
/// # Errors
///
/// [`StateError::ContextUnavailable`](crate::StateError::ContextUnavailable)
/// outside a request scope, or an encode error from the initializer's value.
pub fn create_state<T, F>(namespace: &Namespace, key: Option<&str>, init: F) -> Result<StateCell<T>>
where
	T: StateData,
	F: FnOnce() -> T,
{
	create_state_in(&current()?, namespace, key, init)
}

/// [`create_state`] against an explicit context.
pub fn create_state_in<T, F>(
	ctx: &RequestContext,
	namespace: &Namespace,
	key: Option<&str>,
	init: F,
) -> Result<StateCell<T>>
where
	T: StateData,
	F: FnOnce() -> T,
{
	let key = namespace.resolve_key(StateKind::State, key);
	Backing::open(ctx, key, init).map(StateCell::from_backing)
}

/// Opens a raw cell in the ambient request context.
pub fn create_raw_state<T, F>(namespace: &Namespace, key: Option<&str>, init: F) -> Result<RawCell<T>>
where
	T: StateData,
	F: FnOnce() -> T,
{
	create_raw_state_in(&current()?, namespace, key, init)
}

/// [`create_raw_state`] against an explicit context.
pub fn create_raw_state_in<T, F>(
	ctx: &RequestContext,
	namespace: &Namespace,
	key: Option<&str>,
	init: F,
) -> Result<RawCell<T>>
where
	T: StateData,
	F: FnOnce() -> T,
{
	let key = namespace.resolve_key(StateKind::RawState, key);
	Backing::open(ctx, key, init).map(RawCell::from_backing)
}

/// Combines `sources` with `combine` in the ambient context.
///
/// Server cells resolve once; browser cells recompute on every change.
pub fn create_derived_state<T, D, F>(
	sources: &[&dyn DerivedSource<T>],
	combine: F,
) -> Result<DerivedCell<D>>
where
	T: Clone + Send + Sync + 'static,
	D: Clone + Send + Sync + 'static,
	F: Fn(&[T]) -> D + Send + Sync + 'static,
{
	Ok(create_derived_state_in(&current()?, sources, combine))
}

/// [`create_derived_state`] against an explicit context.
pub fn create_derived_state_in<T, D, F>(
	ctx: &RequestContext,
	sources: &[&dyn DerivedSource<T>],
	combine: F,
) -> DerivedCell<D>
where
	T: Clone + Send + Sync + 'static,
	D: Clone + Send + Sync + 'static,
	F: Fn(&[T]) -> D + Send + Sync + 'static,
{
	DerivedCell::new(ctx.is_browser(), sources, combine)
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::cell::{Readable, Subscribable, Writable};
	use crate::error::StateError;
	use crate::value::StateValue;
	use parking_lot::Mutex;
	use rstest::rstest;
	use serde::{Deserialize, Serialize};
	use std::sync::Arc;

	#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
	struct Cart {
		items: Vec<String>,
	}

	#[rstest]
	fn test_keys_follow_call_order() {
		// Arrange
		let ctx = RequestContext::for_request();
		let ns = Namespace::new("count");

		// Act
		let a = create_state_in(&ctx, &ns, None, || 1i64).unwrap();
		let b = create_raw_state_in(&ctx, &ns, None, || 2i64).unwrap();
		let c = create_state_in(&ctx, &ns, Some("total"), || 3i64).unwrap();

		// Assert
		assert_eq!(a.key(), "count::state::0");
		assert_eq!(b.key(), "count::rawstate::1");
		assert_eq!(c.key(), "count::state::total");
		assert_eq!(ns.next_key(StateKind::State), "count::state::2");
	}

	#[rstest]
	fn test_initializer_runs_only_on_first_access() {
		// Arrange
		let ctx = RequestContext::for_request();
		let first = Namespace::new("cart");
		let cell = create_state_in(&ctx, &first, None, || Cart { items: vec![] }).unwrap();
		cell.update(|mut cart| {
			cart.items.push("apple".into());
			cart
		})
		.unwrap();

		// Act
		let again = Namespace::new("cart");
		let reopened = create_state_in(&ctx, &again, None, || -> Cart {
			panic!("initializer must not run twice")
		})
		.unwrap();

		// Assert
		assert_eq!(reopened.get().unwrap().items, vec!["apple".to_string()]);
	}

	#[rstest]
	fn test_shared_default_is_copied_per_request() {
		// Arrange
		let shared = Cart {
			items: vec!["default".into()],
		};
		let a = RequestContext::for_request();
		let b = RequestContext::for_request();
		let cell_a = create_state_in(&a, &Namespace::new("cart"), None, || shared.clone()).unwrap();
		let cell_b = create_state_in(&b, &Namespace::new("cart"), None, || shared.clone()).unwrap();

		// Act
		cell_a
			.set(Cart {
				items: vec!["mutated".into()],
			})
			.unwrap();

		// Assert
		assert_eq!(cell_b.get().unwrap(), shared);
		assert_eq!(b.state_len(), 1);
	}

	#[rstest]
	fn test_server_subscribe_calls_once() {
		// Arrange
		let ctx = RequestContext::for_request();
		let cell = create_state_in(&ctx, &Namespace::new("n"), None, || 1i64).unwrap();
		let calls = Arc::new(Mutex::new(Vec::new()));
		let sink = Arc::clone(&calls);

		// Act
		let handle = cell.subscribe(Arc::new(move |v: &i64| sink.lock().push(*v)));
		cell.set(2).unwrap();
		handle.unsubscribe();

		// Assert
		assert_eq!(*calls.lock(), vec![1]);
		assert_eq!(ctx.state_value("n::state::0"), Some(StateValue::from(2i64)));
	}

	#[rstest]
	fn test_server_derived_combines_once() {
		// Arrange
		let ctx = RequestContext::for_request();
		let ns = Namespace::new("calc");
		let a = create_state_in(&ctx, &ns, None, || 2i64).unwrap();
		let b = create_state_in(&ctx, &ns, None, || 3i64).unwrap();
		let runs = Arc::new(Mutex::new(0));
		let counter = Arc::clone(&runs);

		let sources: [&dyn DerivedSource<i64>; 2] = [&a, &b];

		// Act
		let sum = create_derived_state_in(&ctx, &sources, move |values: &[i64]| {
			*counter.lock() += 1;
			values.iter().sum::<i64>()
		});
		a.set(100).unwrap();

		// Assert
		assert_eq!(sum.get().unwrap(), 5);
		assert_eq!(*runs.lock(), 1);
	}

	#[rstest]
	fn test_server_derived_over_mixed_sources() {
		// Arrange
		let ctx = RequestContext::for_request();
		let ns = Namespace::new("mixed");
		let name = create_raw_state_in(&ctx, &ns, None, || "ada".to_string()).unwrap();
		let visits = create_state_in(&ctx, &ns, None, || 3i64).unwrap();
		let name_value = name.as_value();
		let visits_value = visits.as_value();
		let sources: [&dyn DerivedSource<StateValue>; 2] = [&name_value, &visits_value];

		// Act
		let label = create_derived_state_in(&ctx, &sources, |v: &[StateValue]| match (&v[0], &v[1]) {
			(StateValue::String(name), StateValue::Number(visits)) => format!("{name}:{visits}"),
			_ => String::new(),
		});
		name.set("grace".to_string()).unwrap();

		// Assert
		assert_eq!(label.get().unwrap(), "ada:3");
	}

	#[rstest]
	fn test_derived_without_sources_resolves_immediately() {
		let ctx = RequestContext::for_request();

		let constant = create_derived_state_in(&ctx, &[] as &[&dyn DerivedSource<i64>], |_| 7i64);

		assert_eq!(constant.get().unwrap(), 7);
	}

	#[rstest]
	fn test_derived_of_derived() {
		let ctx = RequestContext::for_request();
		let ns = Namespace::new("chain");
		let base = create_state_in(&ctx, &ns, None, || 4i64).unwrap();
		let base_source: [&dyn DerivedSource<i64>; 1] = [&base];
		let doubled = create_derived_state_in(&ctx, &base_source, |v: &[i64]| v[0] * 2);

		let doubled_source: [&dyn DerivedSource<i64>; 1] = [&doubled];
		let quadrupled = create_derived_state_in(&ctx, &doubled_source, |v: &[i64]| v[0] * 2);

		assert_eq!(quadrupled.get().unwrap(), 16);
	}

	#[rstest]
	fn test_unresolved_derived_reports_pending() {
		// Arrange
		struct Silent;
		impl Readable<i64> for Silent {
			fn get(&self) -> Result<i64> {
				Err(StateError::Decode("never emits".into()))
			}
		}
		impl DerivedSource<i64> for Silent {
			fn observe(&self, _: crate::Subscriber<i64>) -> crate::Unsubscribe {
				crate::Unsubscribe::noop()
			}
		}
		let ctx = RequestContext::for_request();
		let ready = create_state_in(&ctx, &Namespace::new("p"), None, || 1i64).unwrap();
		let sources: [&dyn DerivedSource<i64>; 2] = [&ready, &Silent];

		// Act
		let derived = create_derived_state_in(&ctx, &sources, |v: &[i64]| v.len());

		// Assert
		assert!(matches!(
			derived.get(),
			Err(StateError::Unresolved {
				pending: 1,
				total: 2
			})
		));
	}

	#[rstest]
	fn test_cell_outliving_its_request_reports_expired() {
		// Arrange
		let ctx = RequestContext::for_request();
		let cell = create_state_in(&ctx, &Namespace::new("n"), None, || 1i64).unwrap();

		// Act
		drop(ctx);

		// Assert
		assert!(matches!(
			cell.get(),
			Err(StateError::ContextUnavailable(crate::UnavailableReason::Expired))
		));
	}

	#[rstest]
	fn test_ambient_constructor_requires_context() {
		let result = create_state(&Namespace::new("n"), None, || 0i64);

		assert!(result.unwrap_err().is_context_unavailable());
	}
}
