//! Process-wide context resolution.
//!
//! A single [`ContextResolver`] is installed once at startup. Server
//! deployments install [`TaskLocalResolver`] (usually through
//! [`install_default`]); browser builds install [`BrowserResolver`].

use std::fmt;
use std::sync::OnceLock;

use crate::context::{RequestContext, try_current_scope};
use crate::error::{Result, StateError, UnavailableReason};

/// Produces the context of the current call chain.
pub trait ContextResolver: Send + Sync + 'static {
	/// The ambient context, or `None` outside a request scope.
	fn resolve(&self) -> Option<RequestContext>;
}

impl<F> ContextResolver for F
where
	F: Fn() -> Option<RequestContext> + Send + Sync + 'static,
{
	fn resolve(&self) -> Option<RequestContext> {
		self()
	}
}

/// Resolves the task-local context set by [`scope`](crate::scope).
#[derive(Debug, Clone, Copy, Default)]
pub struct TaskLocalResolver;

impl ContextResolver for TaskLocalResolver {
	fn resolve(&self) -> Option<RequestContext> {
		try_current_scope()
	}
}

/// Always resolves the process-wide browser context.
#[derive(Debug, Clone, Copy, Default)]
pub struct BrowserResolver;

impl ContextResolver for BrowserResolver {
	fn resolve(&self) -> Option<RequestContext> {
		Some(RequestContext::browser())
	}
}

/// Holds the installed resolver.
pub struct ContextRegistry {
	resolver: OnceLock<Box<dyn ContextResolver>>,
}

impl ContextRegistry {
	/// An empty registry; [`current`](Self::current) fails until a resolver is installed.
	pub const fn new() -> Self {
		Self {
			resolver: OnceLock::new(),
		}
	}

	/// Installs `resolver`.
	///
	/// # Errors
	///
	/// [`StateError::AlreadyInstalled`] if a resolver is already present.
	pub fn install<R: ContextResolver>(&self, resolver: R) -> Result<()> {
		self.resolver
			.set(Box::new(resolver))
			.map_err(|_| StateError::AlreadyInstalled)?;
		tracing::debug!("context resolver installed");
		Ok(())
	}

	/// Installs [`TaskLocalResolver`] unless a resolver is already present.
	pub fn install_default(&self) {
		self.resolver.get_or_init(|| {
			tracing::debug!("default task-local context resolver installed");
			Box::new(TaskLocalResolver)
		});
	}

	/// Whether a resolver has been installed
	pub fn is_installed(&self) -> bool {
		self.resolver.get().is_some()
	}

	/// The context of the current call chain.
	///
	/// # Errors
	///
	/// [`StateError::ContextUnavailable`] when nothing is installed or the
	/// installed resolver finds no active scope.
	pub fn current(&self) -> Result<RequestContext> {
		let resolver = self
			.resolver
			.get()
			.ok_or(StateError::ContextUnavailable(UnavailableReason::NotInstalled))?;
		resolver
			.resolve()
			.ok_or(StateError::ContextUnavailable(UnavailableReason::OutsideScope))
	}
}

impl Default for ContextRegistry {
	fn default() -> Self {
		Self::new()
	}
}

impl fmt::Debug for ContextRegistry {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("ContextRegistry")
			.field("installed", &self.is_installed())
			.finish()
	}
}

static REGISTRY: ContextRegistry = ContextRegistry::new();

/// The process-wide registry.
pub fn registry() -> &'static ContextRegistry {
	&REGISTRY
}

/// Installs `resolver` into the process-wide registry.
pub fn install<R: ContextResolver>(resolver: R) -> Result<()> {
	REGISTRY.install(resolver)
}

/// Installs the task-local resolver into the process-wide registry if empty.
pub fn install_default() {
	REGISTRY.install_default();
}

/// The ambient context according to the process-wide registry.
pub fn current() -> Result<RequestContext> {
	REGISTRY.current()
}
