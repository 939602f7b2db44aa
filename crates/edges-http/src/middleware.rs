//! Request handlers and the middleware that wraps them.
//!
//! ## Handler
//!
//! ```rust
//! use edges_http::{Handler, Request, Response, Result};
//! use async_trait::async_trait;
//!
//! struct Page;
//!
//! #[async_trait]
//! impl Handler for Page {
//!     async fn handle(&self, _request: Request) -> Result<Response> {
//!         Ok(Response::ok().with_body("<html><body></body></html>"))
//!     }
//! }
//! ```
//!
//! ## Middleware
//!
//! Middleware wraps the next handler and may rewrite the response:
//!
//! ```rust
//! use edges_http::{Handler, Middleware, Request, Response, Result};
//! use async_trait::async_trait;
//! use std::sync::Arc;
//!
//! struct Tagging;
//!
//! #[async_trait]
//! impl Middleware for Tagging {
//!     async fn process(&self, request: Request, next: Arc<dyn Handler>) -> Result<Response> {
//!         let response = next.handle(request).await?;
//!         Ok(response.with_header("x-tagged", "1"))
//!     }
//! }
//! ```

use async_trait::async_trait;
use std::sync::Arc;

use crate::{Request, Response, Result};

/// Turns a request into a response.
#[async_trait]
pub trait Handler: Send + Sync {
	/// Handles one request. See `From<Error> for Response` for error bodies.
	async fn handle(&self, request: Request) -> Result<Response>;
}

#[async_trait]
impl<T: Handler + ?Sized> Handler for Arc<T> {
	async fn handle(&self, request: Request) -> Result<Response> {
		(**self).handle(request).await
	}
}

/// A layer around the next handler.
#[async_trait]
pub trait Middleware: Send + Sync {
	/// Processes a request, usually by delegating to `next`. Errors from
	/// `next` should propagate unchanged.
	async fn process(&self, request: Request, next: Arc<dyn Handler>) -> Result<Response>;

	/// Whether this layer applies to `request`. Skipped layers are not
	/// entered at all.
	fn should_continue(&self, _request: &Request) -> bool {
		true
	}
}

/// Composes middleware around a terminal handler.
///
/// Middleware run in the order they were added: the first added is the
/// outermost layer and sees the final response last.
pub struct MiddlewareChain {
	layers: Vec<Arc<dyn Middleware>>,
	handler: Arc<dyn Handler>,
}

impl MiddlewareChain {
	/// Creates a chain with no middleware around `handler`.
	pub fn new(handler: Arc<dyn Handler>) -> Self {
		Self {
			layers: Vec::new(),
			handler,
		}
	}

	/// Adds an inner layer.
	pub fn with_middleware(mut self, middleware: Arc<dyn Middleware>) -> Self {
		self.add_middleware(middleware);
		self
	}

	/// Adds an inner layer in place.
	pub fn add_middleware(&mut self, middleware: Arc<dyn Middleware>) {
		self.layers.push(middleware);
	}

	/// Number of layers, including ones that may skip a given request
	pub fn len(&self) -> usize {
		self.layers.len()
	}

	/// True when the handler has no layers around it
	pub fn is_empty(&self) -> bool {
		self.layers.is_empty()
	}
}

#[async_trait]
impl Handler for MiddlewareChain {
	async fn handle(&self, request: Request) -> Result<Response> {
		let innermost = Arc::clone(&self.handler);
		let entry = self
			.layers
			.iter()
			.rev()
			.filter(|layer| layer.should_continue(&request))
			.fold(innermost, |next, layer| -> Arc<dyn Handler> {
				Arc::new(Layer {
					middleware: Arc::clone(layer),
					next,
				})
			});
		entry.handle(request).await
	}
}

struct Layer {
	middleware: Arc<dyn Middleware>,
	next: Arc<dyn Handler>,
}

#[async_trait]
impl Handler for Layer {
	async fn handle(&self, request: Request) -> Result<Response> {
		self.middleware.process(request, Arc::clone(&self.next)).await
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use rstest::rstest;

	struct Body(&'static str);

	#[async_trait]
	impl Handler for Body {
		async fn handle(&self, _request: Request) -> Result<Response> {
			Ok(Response::ok().with_body(self.0))
		}
	}

	struct Prefix(&'static str);

	#[async_trait]
	impl Middleware for Prefix {
		async fn process(&self, request: Request, next: Arc<dyn Handler>) -> Result<Response> {
			let response = next.handle(request).await?;
			let body = String::from_utf8_lossy(&response.body).into_owned();
			Ok(Response::ok().with_body(format!("{}{}", self.0, body)))
		}
	}

	struct ApiOnly;

	#[async_trait]
	impl Middleware for ApiOnly {
		async fn process(&self, request: Request, next: Arc<dyn Handler>) -> Result<Response> {
			let response = next.handle(request).await?;
			Ok(response.with_header("x-api", "1"))
		}

		fn should_continue(&self, request: &Request) -> bool {
			request.path().starts_with("/api/")
		}
	}

	fn request(path: &str) -> Request {
		Request::builder().uri(path).build().unwrap()
	}

	#[rstest]
	#[tokio::test]
	async fn test_chain_without_middleware() {
		let chain = MiddlewareChain::new(Arc::new(Body("page")));

		let response = chain.handle(request("/")).await.unwrap();

		assert_eq!(&response.body[..], b"page");
	}

	#[rstest]
	#[tokio::test]
	async fn test_chain_applies_in_insertion_order() {
		// Arrange
		let chain = MiddlewareChain::new(Arc::new(Body("data")))
			.with_middleware(Arc::new(Prefix("outer:")))
			.with_middleware(Arc::new(Prefix("inner:")));

		// Act
		let response = chain.handle(request("/")).await.unwrap();

		// Assert
		assert_eq!(&response.body[..], b"outer:inner:data");
	}

	#[rstest]
	#[case("/api/items", true)]
	#[case("/about", false)]
	#[tokio::test]
	async fn test_conditional_middleware(#[case] path: &str, #[case] tagged: bool) {
		// Arrange
		let mut chain = MiddlewareChain::new(Arc::new(Body("x")));
		chain.add_middleware(Arc::new(ApiOnly));

		// Act
		let response = chain.handle(request(path)).await.unwrap();

		// Assert
		assert_eq!(response.headers.contains_key("x-api"), tagged);
	}
}
