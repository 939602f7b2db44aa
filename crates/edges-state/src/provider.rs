//! Memoized per-context providers.
//!
//! A [`Provider`] runs its factory at most once per (context, name) and hands
//! out the same `Arc` afterwards. On the server the cache lives in the
//! request's data bag; in the browser it lives in the browser context and
//! survives for the page session.
//!
//! Keys of the cells a factory opens depend on the order it opens them, so a
//! factory re-run would shift every later ordinal. The cache prevents that.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, LazyLock};

use parking_lot::Mutex;
use sha2::{Digest, Sha256};

use crate::cell::{DerivedCell, DerivedSource, RawCell, StateCell};
use crate::context::RequestContext;
use crate::error::{Result, StateError};
use crate::hydration::HydrationStore;
use crate::registry::current;
use crate::store::{Namespace, create_derived_state_in, create_raw_state_in, create_state_in};
use crate::value::StateData;

type Factory<T, I> = dyn Fn(&ProviderScope<'_, I>) -> Result<T> + Send + Sync;

/// The dependency bundle handed to a provider factory.
///
/// Constructors share one [`Namespace`] named after the provider, with its
/// counter starting at zero for this factory run.
pub struct ProviderScope<'a, I> {
	ctx: &'a RequestContext,
	namespace: Namespace,
	inject: &'a I,
}

impl<'a, I> ProviderScope<'a, I> {
	fn new(ctx: &'a RequestContext, name: &str, inject: &'a I) -> Self {
		Self {
			ctx,
			namespace: Namespace::new(name),
			inject,
		}
	}

	/// Opens the next subscribable cell (`<name>::state::<n>`).
	pub fn create_state<T, F>(&self, init: F) -> Result<StateCell<T>>
	where
		T: StateData,
		F: FnOnce() -> T,
	{
		create_state_in(self.ctx, &self.namespace, None, init)
	}

	/// Opens the next raw cell (`<name>::rawstate::<n>`).
	pub fn create_raw_state<T, F>(&self, init: F) -> Result<RawCell<T>>
	where
		T: StateData,
		F: FnOnce() -> T,
	{
		create_raw_state_in(self.ctx, &self.namespace, None, init)
	}

	/// Combines `sources` into a derived cell.
	pub fn create_derived_state<T, D, F>(
		&self,
		sources: &[&dyn DerivedSource<T>],
		combine: F,
	) -> DerivedCell<D>
	where
		T: Clone + Send + Sync + 'static,
		D: Clone + Send + Sync + 'static,
		F: Fn(&[T]) -> D + Send + Sync + 'static,
	{
		create_derived_state_in(self.ctx, sources, combine)
	}

	/// Dependencies supplied through [`create_provider_with`]
	pub fn inject(&self) -> &I {
		self.inject
	}

	/// Context the factory runs against
	pub fn context(&self) -> &RequestContext {
		self.ctx
	}

	/// Namespace backing the constructors
	pub fn namespace(&self) -> &Namespace {
		&self.namespace
	}
}

/// A memoizing handle to a factory.
pub struct Provider<T, I = ()> {
	name: String,
	factory: Arc<Factory<T, I>>,
	inject: Arc<I>,
}

impl<T, I> Clone for Provider<T, I> {
	fn clone(&self) -> Self {
		Self {
			name: self.name.clone(),
			factory: Arc::clone(&self.factory),
			inject: Arc::clone(&self.inject),
		}
	}
}

impl<T, I> fmt::Debug for Provider<T, I> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Provider").field("name", &self.name).finish()
	}
}

impl<T, I> Provider<T, I>
where
	T: Send + Sync + 'static,
{
	/// Cache key of this provider
	pub fn name(&self) -> &str {
		&self.name
	}

	/// The instance for the ambient context.
	///
	/// # Errors
	///
	/// [`StateError::ContextUnavailable`] outside a request scope, any error
	/// the factory returns, or [`StateError::ProviderTypeMismatch`].
	pub fn get(&self) -> Result<Arc<T>> {
		self.get_in(&current()?)
	}

	/// The instance for `ctx`, running the factory on first use.
	pub fn get_in(&self, ctx: &RequestContext) -> Result<Arc<T>> {
		if let Some(cached) = ctx.with_data(|data| data.providers.get(&self.name).cloned()) {
			return self.downcast(cached);
		}

		// The factory opens cells, so it runs without the data bag locked.
		let scope = ProviderScope::new(ctx, &self.name, self.inject.as_ref());
		let fresh: Arc<dyn Any + Send + Sync> = Arc::new((self.factory)(&scope)?);
		let stored = ctx.with_data(|data| {
			Arc::clone(data.providers.entry(self.name.clone()).or_insert(fresh))
		});
		tracing::debug!(provider = %self.name, context = %ctx.id(), "provider instantiated");
		self.downcast(stored)
	}

	fn downcast(&self, instance: Arc<dyn Any + Send + Sync>) -> Result<Arc<T>> {
		instance
			.downcast::<T>()
			.map_err(|_| StateError::ProviderTypeMismatch {
				name: self.name.clone(),
			})
	}
}

/// A provider named `name` whose factory takes no injected dependencies.
///
/// # Examples
///
/// ```
/// use edges_state::{RequestContext, create_provider};
///
/// let counter = create_provider("counter", |scope| scope.create_state(|| 0i64));
/// let ctx = RequestContext::for_request();
///
/// let first = counter.get_in(&ctx).unwrap();
/// let second = counter.get_in(&ctx).unwrap();
/// assert!(std::sync::Arc::ptr_eq(&first, &second));
/// assert_eq!(first.key(), "counter::state::0");
/// ```
pub fn create_provider<T, F>(name: impl Into<String>, factory: F) -> Provider<T>
where
	T: Send + Sync + 'static,
	F: Fn(&ProviderScope<'_, ()>) -> Result<T> + Send + Sync + 'static,
{
	create_provider_with(name, factory, ())
}

/// A provider whose factory receives `inject` through [`ProviderScope::inject`].
pub fn create_provider_with<T, I, F>(name: impl Into<String>, factory: F, inject: I) -> Provider<T, I>
where
	T: Send + Sync + 'static,
	I: Send + Sync + 'static,
	F: Fn(&ProviderScope<'_, I>) -> Result<T> + Send + Sync + 'static,
{
	Provider {
		name: name.into(),
		factory: Arc::new(factory),
		inject: Arc::new(inject),
	}
}

/// Identity hints used to derive a provider name automatically.
#[derive(Debug, Clone, Default)]
pub struct AutoKey {
	/// Stable identifier; takes precedence over everything else.
	pub key: Option<String>,
	/// Display label, used when no key is given.
	pub label: Option<String>,
}

impl AutoKey {
	/// Hints with an explicit stable identifier
	pub fn key(key: impl Into<String>) -> Self {
		Self {
			key: Some(key.into()),
			label: None,
		}
	}

	/// Hints with a display label
	pub fn label(label: impl Into<String>) -> Self {
		Self {
			key: None,
			label: Some(label.into()),
		}
	}
}

static AUTO_KEYS: LazyLock<Mutex<HashMap<String, Vec<TypeId>>>> =
	LazyLock::new(|| Mutex::new(HashMap::new()));

/// Computes a provider name from `hints` and the factory type `F`.
///
/// The identity is the explicit key, else the label, else the factory's type
/// name. Type names of closures are not stable across builds or refactors;
/// pass an explicit key for anything that must survive a deploy. Distinct
/// factories hashing to the same name get a `_<n>` suffix and, in debug
/// builds, a warning.
pub fn auto_provider_name<F: 'static>(hints: &AutoKey) -> String {
	let identity = hints
		.key
		.as_deref()
		.or(hints.label.as_deref())
		.unwrap_or(std::any::type_name::<F>());
	let digest = Sha256::digest(identity.as_bytes());
	let base = format!("provider_{}", hex::encode(&digest[..8]));

	let factory = TypeId::of::<F>();
	let mut seen = AUTO_KEYS.lock();
	let owners = seen.entry(base.clone()).or_default();
	let index = match owners.iter().position(|owner| *owner == factory) {
		Some(index) => index,
		None => {
			owners.push(factory);
			owners.len() - 1
		}
	};
	if index == 0 {
		return base;
	}
	if cfg!(debug_assertions) {
		tracing::warn!(
			key = %base,
			identity,
			collisions = index,
			"distinct provider factories computed the same key; pass an explicit AutoKey::key"
		);
	}
	format!("{base}_{index}")
}

/// A provider named by [`auto_provider_name`].
pub fn create_auto_provider<T, F>(hints: AutoKey, factory: F) -> Provider<T>
where
	T: Send + Sync + 'static,
	F: Fn(&ProviderScope<'_, ()>) -> Result<T> + Send + Sync + 'static,
{
	let name = auto_provider_name::<F>(&hints);
	create_provider(name, factory)
}

/// Evicts cached providers of `ctx` whose name contains `pattern`, or all of
/// them when `pattern` is `None`. Returns how many were evicted.
pub fn clear_providers_in(ctx: &RequestContext, pattern: Option<&str>) -> usize {
	ctx.with_data(|data| {
		let before = data.providers.len();
		match pattern {
			Some(pattern) => data.providers.retain(|name, _| !name.contains(pattern)),
			None => data.providers.clear(),
		}
		before - data.providers.len()
	})
}

/// [`clear_providers_in`] for the ambient context.
pub fn clear_providers(pattern: Option<&str>) -> Result<usize> {
	Ok(clear_providers_in(&current()?, pattern))
}

/// Drops the browser session's providers and rehydrated state.
pub fn reset_browser_session() {
	let evicted = clear_providers_in(&RequestContext::browser(), None);
	HydrationStore::global().clear();
	tracing::debug!(evicted, "browser session reset");
}
