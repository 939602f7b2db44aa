//! Buffered HTTP response.

use bytes::Bytes;
use hyper::header::{CONTENT_LENGTH, CONTENT_TYPE, HeaderName, HeaderValue};
use hyper::{HeaderMap, StatusCode};
use serde::Serialize;

use crate::Result;

/// HTTP Response representation
///
/// Bodies are fully buffered so middleware can inspect and rewrite them.
#[derive(Debug)]
pub struct Response {
	/// Status code
	pub status: StatusCode,
	/// Response headers
	pub headers: HeaderMap,
	/// Response body
	pub body: Bytes,
}

impl Response {
	/// Create a new Response with the given status code
	///
	/// # Examples
	///
	/// ```
	/// use edges_http::Response;
	/// use hyper::StatusCode;
	///
	/// let response = Response::new(StatusCode::OK);
	/// assert_eq!(response.status, StatusCode::OK);
	/// assert!(response.body.is_empty());
	/// ```
	pub fn new(status: StatusCode) -> Self {
		Self {
			status,
			headers: HeaderMap::new(),
			body: Bytes::new(),
		}
	}

	/// Create a Response with HTTP 200 OK status
	pub fn ok() -> Self {
		Self::new(StatusCode::OK)
	}

	/// Create a Response with HTTP 204 No Content status
	pub fn no_content() -> Self {
		Self::new(StatusCode::NO_CONTENT)
	}

	/// Set the response body
	///
	/// # Examples
	///
	/// ```
	/// use edges_http::Response;
	/// use bytes::Bytes;
	///
	/// let response = Response::ok().with_body("Hello, World!");
	/// assert_eq!(response.body, Bytes::from("Hello, World!"));
	/// ```
	pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
		self.body = body.into();
		self
	}

	/// Add a custom header; invalid names or values are ignored
	pub fn with_header(mut self, name: &str, value: &str) -> Self {
		if let (Ok(name), Ok(value)) = (
			HeaderName::from_bytes(name.as_bytes()),
			HeaderValue::from_str(value),
		) {
			self.headers.insert(name, value);
		}
		self
	}

	/// Set the Content-Type header
	pub fn with_content_type(mut self, content_type: &'static str) -> Self {
		self.headers
			.insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
		self
	}

	/// Set the response body to JSON and add the matching Content-Type header
	///
	/// # Examples
	///
	/// ```
	/// use edges_http::Response;
	/// use serde_json::json;
	///
	/// let response = Response::ok().with_json(&json!({"message": "ok"})).unwrap();
	/// assert_eq!(response.content_type(), Some("application/json"));
	/// assert_eq!(&response.body[..], br#"{"message":"ok"}"#);
	/// ```
	pub fn with_json<T: Serialize>(mut self, data: &T) -> Result<Self> {
		let json = serde_json::to_vec(data)?;
		self.body = Bytes::from(json);
		self.headers
			.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
		Ok(self)
	}

	/// Returns the Content-Type header, if present and valid UTF-8
	pub fn content_type(&self) -> Option<&str> {
		self.headers
			.get(CONTENT_TYPE)
			.and_then(|v| v.to_str().ok())
	}

	/// Replace the body and rewrite `Content-Length` to its byte length.
	///
	/// # Examples
	///
	/// ```
	/// use edges_http::Response;
	///
	/// let mut response = Response::ok().with_body("short");
	/// response.replace_body("a longer body");
	/// assert_eq!(response.headers["content-length"], "13");
	/// ```
	pub fn replace_body(&mut self, body: impl Into<Bytes>) {
		self.body = body.into();
		self.headers
			.insert(CONTENT_LENGTH, HeaderValue::from(self.body.len()));
	}
}

impl From<crate::Error> for Response {
	fn from(error: crate::Error) -> Self {
		let status = error.status_code();
		let message = serde_json::json!({ "error": error.to_string() });
		Response::new(status)
			.with_json(&message)
			.unwrap_or_else(|_| Response::new(StatusCode::INTERNAL_SERVER_ERROR))
	}
}
