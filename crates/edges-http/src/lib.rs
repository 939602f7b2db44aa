//! HTTP primitives for the Edges request pipeline.
//!
//! This crate provides the small set of types the state middleware needs to
//! sit in front of an application's handlers:
//!
//! - [`Request`] / [`RequestBuilder`]: an inbound request with typed [`Extensions`]
//! - [`Response`]: a fully buffered response whose body can be rewritten
//! - [`Handler`] / [`Middleware`] / [`MiddlewareChain`]: composition of the pipeline
//! - [`Error`]: errors surfaced by handlers and middleware
//!
//! ## Example
//!
//! ```rust
//! use edges_http::{Handler, MiddlewareChain, Request, Response, Result};
//! use std::sync::Arc;
//!
//! struct Hello;
//!
//! #[async_trait::async_trait]
//! impl Handler for Hello {
//!     async fn handle(&self, _request: Request) -> Result<Response> {
//!         Ok(Response::ok().with_body("hello"))
//!     }
//! }
//!
//! let chain = MiddlewareChain::new(Arc::new(Hello));
//! # let _ = chain;
//! ```

#![warn(missing_docs)]

pub mod error;
pub mod extensions;
pub mod middleware;
pub mod request;
pub mod response;

pub use error::{Error, Result};
pub use extensions::Extensions;
pub use middleware::{Handler, Middleware, MiddlewareChain};
pub use request::{Request, RequestBuilder};
pub use response::Response;

// Re-exported so downstream crates name the same HTTP types.
pub use hyper::header;
pub use hyper::{HeaderMap, Method, StatusCode, Uri, Version};
