//! Inbound request representation.

use bytes::Bytes;
use hyper::{HeaderMap, Method, Uri, Version};

use crate::{Error, Extensions, Result};

/// HTTP request as seen by handlers and middleware.
#[derive(Debug)]
pub struct Request {
	/// Request method
	pub method: Method,
	/// Request target
	pub uri: Uri,
	/// Protocol version
	pub version: Version,
	/// Request headers
	pub headers: HeaderMap,
	/// Fully buffered request body
	pub body: Bytes,
	/// Typed values attached by middleware
	pub extensions: Extensions,
}

impl Request {
	/// Start building a request.
	///
	/// # Examples
	///
	/// ```
	/// use edges_http::Request;
	/// use hyper::Method;
	///
	/// let request = Request::builder()
	///     .method(Method::GET)
	///     .uri("/dashboard")
	///     .build()
	///     .unwrap();
	/// assert_eq!(request.path(), "/dashboard");
	/// ```
	pub fn builder() -> RequestBuilder {
		RequestBuilder::default()
	}

	/// Path component of the request URI
	pub fn path(&self) -> &str {
		self.uri.path()
	}

	/// Returns a header value as a string, if present and valid UTF-8
	pub fn header(&self, name: &str) -> Option<&str> {
		self.headers.get(name).and_then(|v| v.to_str().ok())
	}
}

/// Builder for [`Request`].
#[derive(Debug, Default)]
pub struct RequestBuilder {
	method: Method,
	uri: Option<String>,
	version: Version,
	headers: HeaderMap,
	body: Bytes,
}

impl RequestBuilder {
	/// Set the request method
	pub fn method(mut self, method: Method) -> Self {
		self.method = method;
		self
	}

	/// Set the request target
	pub fn uri(mut self, uri: impl Into<String>) -> Self {
		self.uri = Some(uri.into());
		self
	}

	/// Set the protocol version
	pub fn version(mut self, version: Version) -> Self {
		self.version = version;
		self
	}

	/// Replace all request headers
	pub fn headers(mut self, headers: HeaderMap) -> Self {
		self.headers = headers;
		self
	}

	/// Add a single header; invalid names or values are ignored
	pub fn header(mut self, name: &str, value: &str) -> Self {
		if let (Ok(name), Ok(value)) = (
			hyper::header::HeaderName::from_bytes(name.as_bytes()),
			hyper::header::HeaderValue::from_str(value),
		) {
			self.headers.insert(name, value);
		}
		self
	}

	/// Set the request body
	pub fn body(mut self, body: impl Into<Bytes>) -> Self {
		self.body = body.into();
		self
	}

	/// Build the request.
	///
	/// # Errors
	///
	/// Returns [`Error::InvalidRequest`] when no URI was given or it does not parse.
	pub fn build(self) -> Result<Request> {
		let raw = self
			.uri
			.ok_or_else(|| Error::InvalidRequest("request URI is required".to_string()))?;
		let uri = raw
			.parse::<Uri>()
			.map_err(|e| Error::InvalidRequest(format!("invalid URI '{}': {}", raw, e)))?;

		Ok(Request {
			method: self.method,
			uri,
			version: self.version,
			headers: self.headers,
			body: self.body,
			extensions: Extensions::new(),
		})
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use rstest::rstest;

	#[rstest]
	fn test_builder_requires_uri() {
		// Arrange & Act
		let result = Request::builder().method(Method::GET).build();

		// Assert
		assert!(matches!(result, Err(Error::InvalidRequest(_))));
	}

	#[rstest]
	fn test_builder_sets_header() {
		// Arrange & Act
		let request = Request::builder()
			.uri("/page/__data.json")
			.header("x-edges-navigation", "1")
			.build()
			.unwrap();

		// Assert
		assert_eq!(request.header("x-edges-navigation"), Some("1"));
		assert_eq!(request.method, Method::GET);
		assert_eq!(request.path(), "/page/__data.json");
	}

	#[rstest]
	fn test_builder_rejects_bad_uri() {
		let result = Request::builder().uri("http://[::1").build();
		assert!(matches!(result, Err(Error::InvalidRequest(_))));
	}
}
