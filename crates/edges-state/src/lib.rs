//! # Edges state
//!
//! Per-request reactive state for server-rendered applications, and the
//! encoding that carries it to the browser.
//!
//! ## Features
//!
//! - **Isolated**: every request gets its own state map through a tokio
//!   task-local [`RequestContext`]
//! - **Keyed by call order**: cells are keyed `<namespace>::<kind>::<n>`
//! - **Memoized providers**: a factory runs once per request and name
//! - **Lossless transfer**: `undefined` and `null` survive at any depth
//!
//! ## Example
//!
//! ```rust
//! use edges_state::{RequestContext, Writable, create_provider, scope};
//!
//! # tokio_test_block(async {
//! edges_state::install_default();
//! let cart = create_provider("cart", |scope| scope.create_state(Vec::<String>::new));
//!
//! let ctx = RequestContext::for_request();
//! scope(ctx.clone(), async {
//!     let items = cart.get().unwrap();
//!     items.update(|mut list| {
//!         list.push("apple".into());
//!         list
//!     }).unwrap();
//! })
//! .await;
//!
//! assert_eq!(ctx.state_len(), 1);
//! # });
//! # fn tokio_test_block(f: impl std::future::Future<Output = ()>) {
//! #     tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(f)
//! # }
//! ```

#![warn(missing_docs)]

pub mod cell;
pub mod context;
pub mod error;
pub mod hydration;
pub mod provider;
pub mod reactive;
pub mod registry;
pub mod serializer;
pub mod store;
pub mod value;

pub use cell::{
	DerivedCell, DerivedSource, RawCell, Readable, StateCell, Subscribable, ValueSource, Writable,
};
pub use context::{ContextKind, DataBag, RequestContext, scope, spawn, sync_scope, try_current_scope};
pub use error::{Result, StateError, UnavailableReason};
pub use hydration::HydrationStore;
pub use provider::{
	AutoKey, Provider, ProviderScope, auto_provider_name, clear_providers, clear_providers_in,
	create_auto_provider, create_provider, create_provider_with, reset_browser_session,
};
pub use reactive::{Signal, Subscriber, Unsubscribe};
pub use registry::{
	BrowserResolver, ContextRegistry, ContextResolver, TaskLocalResolver, current, install,
	install_default, registry,
};
pub use serializer::{
	DEFAULT_THRESHOLD, PayloadEntry, SCRIPT_MARKER, SIDE_CHANNEL_FIELD, SerializeOptions,
	SerializedPayload, augment_json_body, decode, decode_side_channel, encode, extract_side_channel,
	inject_script, pack, parse_script_payload, serialize, unpack,
};
pub use store::{
	Namespace, StateKind, create_derived_state, create_derived_state_in, create_raw_state,
	create_raw_state_in, create_state, create_state_in,
};
pub use value::{NULL_SENTINEL, StateData, StateValue, UNDEFINED_SENTINEL};
