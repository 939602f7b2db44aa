//! # Edges middleware
//!
//! [`StateMiddleware`] wraps request handling in a fresh per-request state
//! scope and writes the state the handler produced into the response: a
//! script block for HTML, a `__edges_state__` field for JSON.
//!
//! ## Configuration
//!
//! Behaviour is driven by [`edges_conf::StateSettings`]:
//!
//! - `compress` / `compress_threshold`: pack large script entries as base64
//! - `silence_devtools_probe`: answer [`DEVTOOLS_PROBE_PATH`] with `204`

#![warn(missing_docs)]

pub mod state;

pub use state::{BodyKind, DEVTOOLS_PROBE_PATH, StateMiddleware, attach_state, handle_with_state};
