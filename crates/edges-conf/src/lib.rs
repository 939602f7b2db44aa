//! # Edges settings
//!
//! Configuration for per-request state transfer: whether large serialized
//! entries are packed, the packing threshold, and whether the browser devtools
//! probe is answered before it reaches the application.
//!
//! Settings come from `EDGES_*` environment variables or a TOML document.

#![warn(missing_docs)]

pub mod env;
pub mod settings;

pub use env::{Env, EnvError, parse_bool};
pub use settings::{DEFAULT_COMPRESS_THRESHOLD, ENV_PREFIX, SettingsError, StateSettings};
