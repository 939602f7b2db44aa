//! # Edges
//!
//! Per-request reactive state for server-rendered Rust apps, with the state
//! carried over to the browser.
//!
//! On the server every request runs inside its own
//! [`RequestContext`](state::RequestContext). Cells and providers created while
//! handling it live in that context only; concurrent requests never see each
//! other's values. When the handler returns, the middleware serializes the
//! context's state into the response: a `<script data-edges-state>` block for
//! HTML, an `__edges_state__` field for JSON. In the browser the client crate
//! moves that state into the page's hydration table, where cells created with
//! the same keys pick it up.
//!
//! ## Feature Flags
//!
//! - `server` (default) - HTTP types, settings and [`StateMiddleware`](middleware::StateMiddleware)
//! - `client` (default) - script watcher, fetch interception and, on wasm, DOM glue
//!
//! The state crate itself is always available.
//!
//! ## Quick Start
//!
//! ```
//! use edges::prelude::*;
//!
//! let counter = create_provider("counter", |scope| scope.create_state(|| 0i64));
//! assert_eq!(counter.name(), "counter");
//! ```

pub use edges_state as state;

#[cfg(feature = "server")]
pub use edges_conf as conf;
#[cfg(feature = "server")]
pub use edges_http as http;
#[cfg(feature = "server")]
pub use edges_middleware as middleware;

#[cfg(feature = "client")]
pub use edges_client as client;

/// The names most apps need.
pub mod prelude {
	pub use edges_state::{
		AutoKey, DerivedCell, DerivedSource, Provider, ProviderScope, RawCell, Readable, RequestContext,
		StateCell, StateError, StateValue, Subscribable, Writable, create_auto_provider,
		create_derived_state, create_provider, create_provider_with, create_raw_state,
		create_state,
	};

	#[cfg(feature = "server")]
	pub use edges_conf::StateSettings;
	#[cfg(feature = "server")]
	pub use edges_middleware::StateMiddleware;

	#[cfg(feature = "client")]
	pub use edges_client::{ClientSync, InterceptingFetch, ScriptWatcher};
}
