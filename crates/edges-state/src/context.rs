//! Ambient request context.
//!
//! Every request handled under [`scope`] sees its own [`RequestContext`]
//! through tokio task-local storage. The context follows the request's future
//! across every `.await` and thread migration in a work-stealing runtime, and
//! two interleaved requests never observe each other's context.
//!
//! Task-locals do not cross [`tokio::spawn`]; use [`spawn`] to start a task
//! that inherits the caller's context.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::{Arc, OnceLock, Weak};

use indexmap::IndexMap;
use parking_lot::Mutex;
use uuid::Uuid;

use crate::value::StateValue;

tokio::task_local! {
	/// Context of the request whose future is currently being polled.
	static REQUEST_CONTEXT: RequestContext;
}

/// Where a context lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextKind {
	/// An isolated per-request context on the server.
	Request,
	/// The single, non-isolated browser context.
	Browser,
}

/// Per-request storage owned by exactly one [`RequestContext`].
#[derive(Default)]
pub struct DataBag {
	pub(crate) providers: HashMap<String, Arc<dyn Any + Send + Sync>>,
	pub(crate) state: IndexMap<String, StateValue>,
	extensions: HashMap<TypeId, Box<dyn Any + Send + Sync>>,
}

impl fmt::Debug for DataBag {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("DataBag")
			.field("providers", &self.providers.keys().collect::<Vec<_>>())
			.field("state", &self.state)
			.field("extensions", &self.extensions.len())
			.finish()
	}
}

struct ContextInner {
	id: Uuid,
	kind: ContextKind,
	data: Mutex<DataBag>,
}

/// A request's identity and its data bag.
///
/// Cloning is cheap and every clone refers to the same bag.
#[derive(Clone)]
pub struct RequestContext {
	inner: Arc<ContextInner>,
}

static BROWSER_CONTEXT: OnceLock<RequestContext> = OnceLock::new();

impl RequestContext {
	fn with_kind(kind: ContextKind) -> Self {
		Self {
			inner: Arc::new(ContextInner {
				id: Uuid::new_v4(),
				kind,
				data: Mutex::new(DataBag::default()),
			}),
		}
	}

	/// Creates a fresh context with a new identity and an empty data bag.
	pub fn for_request() -> Self {
		Self::with_kind(ContextKind::Request)
	}

	/// The process-wide browser context.
	///
	/// Its provider map is the page session's provider cache. Cells created
	/// against it read and write the global hydration table instead of its
	/// state map.
	pub fn browser() -> Self {
		BROWSER_CONTEXT
			.get_or_init(|| Self::with_kind(ContextKind::Browser))
			.clone()
	}

	/// Identity token of this context
	pub fn id(&self) -> Uuid {
		self.inner.id
	}

	/// Whether this is a server request or the browser context
	pub fn kind(&self) -> ContextKind {
		self.inner.kind
	}

	/// Shorthand for `kind() == ContextKind::Browser`
	pub fn is_browser(&self) -> bool {
		self.inner.kind == ContextKind::Browser
	}

	/// Whether both handles refer to the same context
	pub fn ptr_eq(&self, other: &Self) -> bool {
		Arc::ptr_eq(&self.inner, &other.inner)
	}

	/// A handle that does not keep the context alive.
	pub(crate) fn downgrade(&self) -> WeakRequestContext {
		WeakRequestContext {
			id: self.inner.id,
			inner: Arc::downgrade(&self.inner),
		}
	}

	/// Runs `f` with exclusive access to the data bag.
	///
	/// The lock is held for the duration of `f`; never call back into a
	/// constructor or provider from inside it.
	pub(crate) fn with_data<R>(&self, f: impl FnOnce(&mut DataBag) -> R) -> R {
		f(&mut self.inner.data.lock())
	}

	/// Copy of the state map in insertion order.
	pub fn state(&self) -> IndexMap<String, StateValue> {
		self.with_data(|data| data.state.clone())
	}

	/// Stored value for `key`, if any.
	pub fn state_value(&self, key: &str) -> Option<StateValue> {
		self.with_data(|data| data.state.get(key).cloned())
	}

	/// Number of entries in the state map.
	pub fn state_len(&self) -> usize {
		self.with_data(|data| data.state.len())
	}

	/// Names currently held in the provider cache.
	pub fn provider_names(&self) -> Vec<String> {
		self.with_data(|data| data.providers.keys().cloned().collect())
	}

	/// Stores a typed extension, returning the previous value of that type.
	pub fn insert_extension<T: Send + Sync + 'static>(&self, value: T) -> Option<T> {
		self.with_data(|data| {
			data.extensions
				.insert(TypeId::of::<T>(), Box::new(value))
				.and_then(|old| old.downcast::<T>().ok())
				.map(|old| *old)
		})
	}

	/// Clone of the typed extension, if one was stored.
	pub fn extension<T: Clone + Send + Sync + 'static>(&self) -> Option<T> {
		self.with_data(|data| {
			data.extensions
				.get(&TypeId::of::<T>())
				.and_then(|value| value.downcast_ref::<T>())
				.cloned()
		})
	}
}

impl fmt::Debug for RequestContext {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("RequestContext")
			.field("id", &self.inner.id)
			.field("kind", &self.inner.kind)
			.finish_non_exhaustive()
	}
}

/// Non-owning reference to a [`RequestContext`].
///
/// Cells cached inside a provider hold this, so the provider cache never
/// keeps its own context alive.
#[derive(Clone)]
pub(crate) struct WeakRequestContext {
	id: Uuid,
	inner: Weak<ContextInner>,
}

impl WeakRequestContext {
	pub(crate) fn upgrade(&self) -> Option<RequestContext> {
		self.inner.upgrade().map(|inner| RequestContext { inner })
	}

	pub(crate) fn id(&self) -> Uuid {
		self.id
	}
}

/// Runs `future` with `ctx` as the ambient request context.
pub async fn scope<F>(ctx: RequestContext, future: F) -> F::Output
where
	F: Future,
{
	REQUEST_CONTEXT.scope(ctx, future).await
}

/// Runs the synchronous closure `f` with `ctx` as the ambient context.
pub fn sync_scope<R>(ctx: RequestContext, f: impl FnOnce() -> R) -> R {
	REQUEST_CONTEXT.sync_scope(ctx, f)
}

/// Context of the enclosing [`scope`], if any.
pub fn try_current_scope() -> Option<RequestContext> {
	REQUEST_CONTEXT.try_with(RequestContext::clone).ok()
}

/// Spawns a tokio task that inherits the caller's request context.
///
/// Outside a scope this is plain [`tokio::spawn`].
pub fn spawn<F>(future: F) -> tokio::task::JoinHandle<F::Output>
where
	F: Future + Send + 'static,
	F::Output: Send + 'static,
{
	match try_current_scope() {
		Some(ctx) => tokio::spawn(REQUEST_CONTEXT.scope(ctx, future)),
		None => tokio::spawn(future),
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use rstest::rstest;
	use std::time::Duration;

	#[rstest]
	fn test_fresh_contexts_are_distinct() {
		let a = RequestContext::for_request();
		let b = RequestContext::for_request();

		assert_ne!(a.id(), b.id());
		assert!(!a.ptr_eq(&b));
		assert!(a.ptr_eq(&a.clone()));
	}

	#[rstest]
	fn test_browser_context_is_shared() {
		let a = RequestContext::browser();
		let b = RequestContext::browser();

		assert!(a.ptr_eq(&b));
		assert!(a.is_browser());
		assert_eq!(RequestContext::for_request().kind(), ContextKind::Request);
	}

	#[rstest]
	fn test_weak_handle_does_not_keep_context_alive() {
		let ctx = RequestContext::for_request();
		let weak = ctx.downgrade();

		assert!(weak.upgrade().is_some_and(|strong| strong.ptr_eq(&ctx)));
		assert_eq!(weak.id(), ctx.id());
		drop(ctx);
		assert!(weak.upgrade().is_none());
	}

	#[rstest]
	fn test_extensions_are_typed() {
		// Arrange
		#[derive(Clone, Debug, PartialEq)]
		struct Locale(&'static str);
		let ctx = RequestContext::for_request();

		// Act
		let previous = ctx.insert_extension(Locale("en"));
		let replaced = ctx.insert_extension(Locale("ja"));

		// Assert
		assert!(previous.is_none());
		assert_eq!(replaced, Some(Locale("en")));
		assert_eq!(ctx.extension::<Locale>(), Some(Locale("ja")));
		assert_eq!(ctx.extension::<u32>(), None);
	}

	#[rstest]
	fn test_no_scope_outside_request() {
		assert!(try_current_scope().is_none());
	}

	#[rstest]
	fn test_sync_scope() {
		let ctx = RequestContext::for_request();
		let seen = sync_scope(ctx.clone(), try_current_scope);

		assert!(seen.is_some_and(|seen| seen.ptr_eq(&ctx)));
	}

	#[tokio::test]
	async fn test_scope_survives_awaits() {
		let ctx = RequestContext::for_request();

		let seen = scope(ctx.clone(), async {
			tokio::time::sleep(Duration::from_millis(5)).await;
			tokio::task::yield_now().await;
			try_current_scope()
		})
		.await;

		assert!(seen.is_some_and(|seen| seen.ptr_eq(&ctx)));
	}

	#[tokio::test]
	async fn test_spawn_inherits_context() {
		let ctx = RequestContext::for_request();

		let handle = scope(ctx.clone(), async { spawn(async { try_current_scope() }) }).await;
		let seen = handle.await.unwrap();

		assert!(seen.is_some_and(|seen| seen.ptr_eq(&ctx)));
	}

	#[tokio::test]
	async fn test_plain_tokio_spawn_loses_context() {
		let ctx = RequestContext::for_request();

		let handle = scope(ctx, async { tokio::spawn(async { try_current_scope() }) }).await;

		assert!(handle.await.unwrap().is_none());
	}
}
