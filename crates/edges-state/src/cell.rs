//! Cells over the request state map.
//!
//! Capabilities are split into [`Readable`], [`Writable`] and
//! [`Subscribable`]. [`RawCell`] reads and writes, [`StateCell`] also
//! subscribes, and [`DerivedCell`] reads and subscribes.
//!
//! All three can feed a derived cell through [`DerivedSource`]. Sources of
//! different types are combined by viewing each as a [`StateValue`] with
//! [`DerivedSource::as_value`].
//!
//! A cell is backed either by a request context's state map (server) or by
//! a live signal in the [`HydrationStore`] (browser). Server cells never
//! notify: the response is serialized before a listener could matter.

use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use parking_lot::Mutex;

use crate::context::{RequestContext, WeakRequestContext};
use crate::error::{Result, StateError, UnavailableReason};
use crate::hydration::HydrationStore;
use crate::reactive::{Signal, Subscriber, Unsubscribe};
use crate::value::{StateData, StateValue};

/// Read access to a cell.
pub trait Readable<T> {
	/// Current value.
	fn get(&self) -> Result<T>;
}

/// Write access to a cell.
pub trait Writable<T>: Readable<T> {
	/// Replace the value.
	fn set(&self, value: T) -> Result<()>;

	/// Replace the value with `f(current)`.
	fn update<F>(&self, f: F) -> Result<()>
	where
		F: FnOnce(T) -> T,
		Self: Sized,
	{
		let current = self.get()?;
		self.set(f(current))
	}
}

/// Change notification for a cell.
pub trait Subscribable<T>: Readable<T> {
	/// Calls `subscriber` with the current value and, in the browser, after
	/// every change. Server cells call it exactly once.
	fn subscribe(&self, subscriber: Subscriber<T>) -> Unsubscribe;
}

/// Input of a derived cell.
///
/// Raw cells are sources too: a derived cell may follow them even though
/// their own consumers get no subscription.
pub trait DerivedSource<T>: Readable<T> {
	/// Emits the current value at once and, in the browser, every change.
	fn observe(&self, subscriber: Subscriber<T>) -> Unsubscribe;

	/// This source seen as raw [`StateValue`]s.
	fn as_value(&self) -> ValueSource<'_, T>
	where
		Self: Sized,
		T: StateData + 'static,
	{
		ValueSource { inner: self }
	}
}

/// A source projected to [`StateValue`], see [`DerivedSource::as_value`].
pub struct ValueSource<'a, T> {
	inner: &'a dyn DerivedSource<T>,
}

impl<T: StateData> Readable<StateValue> for ValueSource<'_, T> {
	fn get(&self) -> Result<StateValue> {
		self.inner.get()?.to_state()
	}
}

impl<T: StateData + 'static> DerivedSource<StateValue> for ValueSource<'_, T> {
	fn observe(&self, subscriber: Subscriber<StateValue>) -> Unsubscribe {
		self.inner.observe(Arc::new(move |value: &T| match value.to_state() {
			Ok(raw) => subscriber(&raw),
			Err(error) => tracing::warn!(%error, "dropping unencodable source value"),
		}))
	}
}

#[derive(Clone)]
pub(crate) enum Backing {
	Server {
		ctx: WeakRequestContext,
		key: String,
	},
	Browser {
		key: String,
		signal: Signal<StateValue>,
		store: Arc<HydrationStore>,
	},
}

impl Backing {
	/// Resolves `key` against `ctx`, seeding it from `init` on first access.
	///
	/// `init` runs without any lock held so it may open further cells.
	pub(crate) fn open<T, F>(ctx: &RequestContext, key: String, init: F) -> Result<Self>
	where
		T: StateData,
		F: FnOnce() -> T,
	{
		if ctx.is_browser() {
			let store = HydrationStore::global();
			let signal = match store.signal(&key) {
				Some(signal) => signal,
				None => {
					let seed = match store.get(&key) {
						Some(rehydrated) => rehydrated,
						None => init().to_state()?,
					};
					store.signal_or_insert(&key, seed)
				}
			};
			return Ok(Self::Browser { key, signal, store });
		}

		if !ctx.with_data(|data| data.state.contains_key(&key)) {
			let seed = init().to_state()?;
			ctx.with_data(|data| {
				data.state.entry(key.clone()).or_insert(seed);
			});
		}
		Ok(Self::Server {
			ctx: ctx.downgrade(),
			key,
		})
	}

	fn key(&self) -> &str {
		match self {
			Self::Server { key, .. } | Self::Browser { key, .. } => key,
		}
	}

	fn read<T: StateData>(&self) -> Result<T> {
		match self {
			Self::Server { ctx, key } => {
				let value = upgrade(ctx)?
					.with_data(|data| data.state.get(key).cloned())
					.unwrap_or_default();
				T::from_state(&value)
			}
			Self::Browser { signal, .. } => T::from_state(&signal.get()),
		}
	}

	fn write<T: StateData>(&self, value: &T) -> Result<()> {
		let value = value.to_state()?;
		match self {
			Self::Server { ctx, key } => {
				upgrade(ctx)?.with_data(|data| data.state.insert(key.clone(), value));
			}
			Self::Browser { key, store, .. } => store.write(key, value),
		}
		Ok(())
	}

	fn subscribe<T>(&self, subscriber: Subscriber<T>) -> Unsubscribe
	where
		T: StateData + 'static,
	{
		match self {
			Self::Server { key, .. } => {
				match self.read::<T>() {
					Ok(value) => subscriber(&value),
					Err(error) => tracing::warn!(%key, %error, "skipping subscriber"),
				}
				Unsubscribe::noop()
			}
			Self::Browser { key, signal, .. } => {
				let key = key.clone();
				signal.subscribe(Arc::new(move |raw: &StateValue| match T::from_state(raw) {
					Ok(value) => subscriber(&value),
					Err(error) => tracing::warn!(%key, %error, "dropping undecodable update"),
				}))
			}
		}
	}
}

fn upgrade(ctx: &WeakRequestContext) -> Result<RequestContext> {
	ctx.upgrade()
		.ok_or(StateError::ContextUnavailable(UnavailableReason::Expired))
}

impl fmt::Debug for Backing {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::Server { ctx, key } => f
				.debug_struct("Server")
				.field("context", &ctx.id())
				.field("key", key)
				.finish(),
			Self::Browser { key, .. } => f.debug_struct("Browser").field("key", key).finish(),
		}
	}
}

macro_rules! keyed_cell {
	($(#[$meta:meta])* $name:ident) => {
		$(#[$meta])*
		pub struct $name<T> {
			backing: Backing,
			_marker: PhantomData<fn() -> T>,
		}

		impl<T> $name<T> {
			pub(crate) fn from_backing(backing: Backing) -> Self {
				Self {
					backing,
					_marker: PhantomData,
				}
			}

			/// Storage key of this cell
			pub fn key(&self) -> &str {
				self.backing.key()
			}
		}

		impl<T> Clone for $name<T> {
			fn clone(&self) -> Self {
				Self::from_backing(self.backing.clone())
			}
		}

		impl<T> fmt::Debug for $name<T> {
			fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
				f.debug_tuple(stringify!($name)).field(&self.backing).finish()
			}
		}

		impl<T: StateData> Readable<T> for $name<T> {
			fn get(&self) -> Result<T> {
				self.backing.read()
			}
		}

		impl<T: StateData> Writable<T> for $name<T> {
			fn set(&self, value: T) -> Result<()> {
				self.backing.write(&value)
			}
		}
	};
}

keyed_cell! {
	/// A mutable slot without subscriptions (`<namespace>::rawstate::<n>`).
	RawCell
}

keyed_cell! {
	/// A mutable, subscribable slot (`<namespace>::state::<n>`).
	StateCell
}

impl<T: StateData + 'static> Subscribable<T> for StateCell<T> {
	fn subscribe(&self, subscriber: Subscriber<T>) -> Unsubscribe {
		self.backing.subscribe(subscriber)
	}
}

impl<T: StateData + 'static> DerivedSource<T> for StateCell<T> {
	fn observe(&self, subscriber: Subscriber<T>) -> Unsubscribe {
		self.backing.subscribe(subscriber)
	}
}

impl<T: StateData + 'static> DerivedSource<T> for RawCell<T> {
	fn observe(&self, subscriber: Subscriber<T>) -> Unsubscribe {
		self.backing.subscribe(subscriber)
	}
}

/// A read-only value combined from ordered sources.
///
/// On the server it resolves once, when every source has produced a value,
/// and ignores later writes. In the browser it recomputes on every change.
pub struct DerivedCell<D> {
	value: Signal<Option<D>>,
	total: usize,
	filled: Arc<AtomicUsize>,
	live: bool,
}

impl<D> Clone for DerivedCell<D> {
	fn clone(&self) -> Self {
		Self {
			value: self.value.clone(),
			total: self.total,
			filled: Arc::clone(&self.filled),
			live: self.live,
		}
	}
}

impl<D> DerivedCell<D>
where
	D: Clone + Send + Sync + 'static,
{
	pub(crate) fn new<T, F>(live: bool, sources: &[&dyn DerivedSource<T>], combine: F) -> Self
	where
		T: Clone + Send + Sync + 'static,
		F: Fn(&[T]) -> D + Send + Sync + 'static,
	{
		let total = sources.len();
		let cell = Self {
			value: Signal::new(None),
			total,
			filled: Arc::new(AtomicUsize::new(0)),
			live,
		};
		if total == 0 {
			cell.value.set(Some(combine(&[])));
			return cell;
		}

		let slots: Arc<Mutex<Vec<Option<T>>>> = Arc::new(Mutex::new(vec![None; total]));
		let frozen = Arc::new(AtomicBool::new(false));
		let combine = Arc::new(combine);
		for (position, source) in sources.iter().enumerate() {
			let slots = Arc::clone(&slots);
			let frozen = Arc::clone(&frozen);
			let combine = Arc::clone(&combine);
			let filled = Arc::clone(&cell.filled);
			let output = cell.value.clone();
			// Sources keep their subscriber alive; the handle is not needed.
			let _ = source.observe(Arc::new(move |value: &T| {
				if !live && frozen.load(Ordering::Acquire) {
					return;
				}
				let ready = {
					let mut slots = slots.lock();
					if slots[position].is_none() {
						filled.fetch_add(1, Ordering::AcqRel);
					}
					slots[position] = Some(value.clone());
					if slots.iter().all(Option::is_some) {
						Some(slots.iter().flatten().cloned().collect::<Vec<T>>())
					} else {
						None
					}
				};
				let Some(values) = ready else {
					return;
				};
				if live {
					output.set(Some(combine(&values)));
				} else if frozen
					.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
					.is_ok()
				{
					output.set(Some(combine(&values)));
				}
			}));
		}
		cell
	}

	/// Whether every source has produced a value
	pub fn is_resolved(&self) -> bool {
		self.value.get().is_some()
	}
}

impl<D> fmt::Debug for DerivedCell<D> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("DerivedCell")
			.field("sources", &self.total)
			.field("filled", &self.filled.load(Ordering::Acquire))
			.field("live", &self.live)
			.finish()
	}
}

impl<D> Readable<D> for DerivedCell<D>
where
	D: Clone + Send + Sync + 'static,
{
	fn get(&self) -> Result<D> {
		self.value.get().ok_or_else(|| {
			let filled = self.filled.load(Ordering::Acquire);
			StateError::Unresolved {
				pending: self.total - filled,
				total: self.total,
			}
		})
	}
}

impl<D> Subscribable<D> for DerivedCell<D>
where
	D: Clone + Send + Sync + 'static,
{
	fn subscribe(&self, subscriber: Subscriber<D>) -> Unsubscribe {
		if !self.live {
			if let Ok(value) = self.get() {
				subscriber(&value);
			}
			return Unsubscribe::noop();
		}
		self.value.subscribe(Arc::new(move |value: &Option<D>| {
			if let Some(value) = value {
				subscriber(value);
			}
		}))
	}
}

impl<D> DerivedSource<D> for DerivedCell<D>
where
	D: Clone + Send + Sync + 'static,
{
	fn observe(&self, subscriber: Subscriber<D>) -> Unsubscribe {
		self.subscribe(subscriber)
	}
}
