//! Browser-side rehydration for Edges.
//!
//! The server serializes per-request state into HTML (a marked `<script>`)
//! or JSON (the `__edges_state__` field). This crate moves that state into
//! the page's [`HydrationStore`](edges_state::HydrationStore), where browser
//! cells pick it up by key:
//!
//! - [`ScriptWatcher`] applies marked scripts from the document
//! - [`InterceptingFetch`] applies side channels from navigation responses,
//!   including streamed ones via [`SideChannelScanner`]
//! - `dom::start` (wasm only) wires both to the live document, patching
//!   `window.fetch` through `window::patch_fetch`; `window::WindowFetch`
//!   is the browser transport for [`InterceptingFetch`]
//!
//! Malformed payloads are logged and dropped without touching existing
//! state.

#[cfg(all(target_family = "wasm", target_os = "unknown"))]
pub mod dom;
pub mod error;
pub mod fetch;
pub mod scanner;
pub mod sync;
pub mod watcher;
#[cfg(all(target_family = "wasm", target_os = "unknown"))]
pub mod window;

pub use error::{ClientError, Result};
pub use fetch::{
	ByteStream, DATA_SUFFIX, Fetch, FetchBody, FetchRequest, FetchResponse, InterceptingFetch,
	NAVIGATION_HEADER, NavigationMatcher,
};
pub use scanner::{DEFAULT_SCAN_LIMIT, Scanned, SideChannelScanner};
pub use sync::ClientSync;
pub use watcher::{APPLIED_MARKER, ScriptWatcher, state_scripts};
#[cfg(all(target_family = "wasm", target_os = "unknown"))]
pub use window::{FetchPatch, WindowFetch, patch_fetch};
