//! Navigation-aware fetch interception.
//!
//! [`InterceptingFetch`] wraps any [`Fetch`] implementation. Requests the
//! [`NavigationMatcher`] recognises as client-side navigation data get their
//! response bodies inspected for the side channel; everything else passes
//! straight through. Bodies are never altered.

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use futures::StreamExt;
use futures::stream::BoxStream;
use hyper::header::{CONTENT_TYPE, HeaderName};
use hyper::{HeaderMap, Method, StatusCode};

use crate::error::Result;
use crate::scanner::SideChannelScanner;
use crate::sync::ClientSync;

/// Header a router sets on navigation data requests.
pub const NAVIGATION_HEADER: &str = "x-edges-navigation";

/// Path suffix of navigation data endpoints.
pub const DATA_SUFFIX: &str = "__data.json";

/// Chunked response body.
pub type ByteStream = BoxStream<'static, Result<Bytes>>;

/// An outgoing request.
#[derive(Debug, Clone)]
pub struct FetchRequest {
	/// HTTP method
	pub method: Method,
	/// Absolute or page-relative URL, query and fragment included
	pub url: String,
	/// Request headers
	pub headers: HeaderMap,
	/// Request body, empty for `GET`
	pub body: Bytes,
	/// Set by routers that know the request is a navigation
	pub navigation: bool,
}

impl FetchRequest {
	/// A `GET` for `url`.
	pub fn get(url: impl Into<String>) -> Self {
		Self {
			method: Method::GET,
			url: url.into(),
			headers: HeaderMap::new(),
			body: Bytes::new(),
			navigation: false,
		}
	}

	/// Adds a header. Invalid names or values are ignored.
	pub fn with_header(mut self, name: &str, value: &str) -> Self {
		if let (Ok(name), Ok(value)) = (
			HeaderName::from_bytes(name.as_bytes()),
			value.parse(),
		) {
			self.headers.insert(name, value);
		}
		self
	}

	/// Marks the request as navigation data.
	pub fn as_navigation(mut self) -> Self {
		self.navigation = true;
		self
	}

	/// URL path without query or fragment
	pub fn path(&self) -> &str {
		let end = self.url.find(['?', '#']).unwrap_or(self.url.len());
		&self.url[..end]
	}

	/// Rebuilds a request from what a page handed to `fetch`.
	///
	/// `header` looks up one request header by name. Only the navigation
	/// header is asked for; the rest are not needed to classify the request.
	pub fn described(
		method: Option<&str>,
		url: impl Into<String>,
		header: impl Fn(&str) -> Option<String>,
	) -> Self {
		let mut request = Self::get(url);
		if let Some(method) =
			method.and_then(|m| Method::from_bytes(m.to_ascii_uppercase().as_bytes()).ok())
		{
			request.method = method;
		}
		if let Some(value) = header(NAVIGATION_HEADER) {
			request = request.with_header(NAVIGATION_HEADER, &value);
		}
		request
	}
}

/// Response body, whole or streamed.
pub enum FetchBody {
	/// The whole body, already received
	Full(Bytes),
	/// Chunks as they arrive
	Stream(ByteStream),
}

impl std::fmt::Debug for FetchBody {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			Self::Full(bytes) => f.debug_tuple("Full").field(&bytes.len()).finish(),
			Self::Stream(_) => f.write_str("Stream(..)"),
		}
	}
}

/// An incoming response.
#[derive(Debug)]
pub struct FetchResponse {
	/// Response status
	pub status: StatusCode,
	/// Response headers
	pub headers: HeaderMap,
	/// Response body
	pub body: FetchBody,
}

impl FetchResponse {
	/// A 200 response with a complete body.
	pub fn full(content_type: &str, body: impl Into<Bytes>) -> Self {
		let mut headers = HeaderMap::new();
		if let Ok(value) = content_type.parse() {
			headers.insert(CONTENT_TYPE, value);
		}
		Self {
			status: StatusCode::OK,
			headers,
			body: FetchBody::Full(body.into()),
		}
	}

	/// A 200 response with a streamed body.
	pub fn streamed(content_type: &str, body: ByteStream) -> Self {
		let mut response = Self::full(content_type, Bytes::new());
		response.body = FetchBody::Stream(body);
		response
	}

	/// The `Content-Type` header, if readable
	pub fn content_type(&self) -> Option<&str> {
		self.headers.get(CONTENT_TYPE).and_then(|v| v.to_str().ok())
	}

	/// True for `application/json` and `+json` types.
	pub fn is_json(&self) -> bool {
		is_json_type(&self.headers)
	}

	/// Collects the body.
	pub async fn bytes(self) -> Result<Bytes> {
		match self.body {
			FetchBody::Full(bytes) => Ok(bytes),
			FetchBody::Stream(mut stream) => {
				let mut buffer = BytesMut::new();
				while let Some(chunk) = stream.next().await {
					buffer.extend_from_slice(&chunk?);
				}
				Ok(buffer.freeze())
			}
		}
	}
}

/// Anything that can perform a request.
///
/// Browser futures are not `Send`, so on wasm the returned future carries
/// no `Send` bound.
#[cfg_attr(not(target_family = "wasm"), async_trait)]
#[cfg_attr(target_family = "wasm", async_trait(?Send))]
pub trait Fetch: Send + Sync {
	/// Performs `request` and returns the response, body unread.
	async fn fetch(&self, request: FetchRequest) -> Result<FetchResponse>;
}

#[cfg_attr(not(target_family = "wasm"), async_trait)]
#[cfg_attr(target_family = "wasm", async_trait(?Send))]
impl<F: Fetch + ?Sized> Fetch for std::sync::Arc<F> {
	async fn fetch(&self, request: FetchRequest) -> Result<FetchResponse> {
		(**self).fetch(request).await
	}
}

/// Decides which requests carry navigation data.
#[derive(Debug, Clone)]
pub struct NavigationMatcher {
	header: HeaderName,
	suffix: String,
}

impl Default for NavigationMatcher {
	fn default() -> Self {
		Self {
			header: HeaderName::from_static(NAVIGATION_HEADER),
			suffix: DATA_SUFFIX.to_string(),
		}
	}
}

impl NavigationMatcher {
	/// Matches paths ending in `suffix` instead of [`DATA_SUFFIX`].
	pub fn with_suffix(mut self, suffix: impl Into<String>) -> Self {
		self.suffix = suffix.into();
		self
	}

	/// True when the request is flagged as navigation, carries the
	/// navigation header, or its path ends with the data suffix.
	pub fn matches(&self, request: &FetchRequest) -> bool {
		request.navigation
			|| request.headers.contains_key(&self.header)
			|| request.path().ends_with(&self.suffix)
	}
}

/// Wraps a [`Fetch`] and syncs state out of navigation responses.
///
/// Whole JSON bodies are parsed once they arrive. Streamed bodies are
/// scanned chunk by chunk as the caller consumes them, so state lands as
/// soon as its closing brace is read. Sync failures are logged and never
/// affect the response.
#[derive(Debug, Clone)]
pub struct InterceptingFetch<F> {
	inner: F,
	sync: ClientSync,
	matcher: NavigationMatcher,
}

impl<F: Fetch> InterceptingFetch<F> {
	/// Intercepts into the global hydration store.
	pub fn new(inner: F) -> Self {
		Self::with_sync(inner, ClientSync::new())
	}

	/// Intercepts into the store behind `sync`.
	pub fn with_sync(inner: F, sync: ClientSync) -> Self {
		Self {
			inner,
			sync,
			matcher: NavigationMatcher::default(),
		}
	}

	/// Replaces the default [`NavigationMatcher`].
	pub fn with_matcher(mut self, matcher: NavigationMatcher) -> Self {
		self.matcher = matcher;
		self
	}

	/// The wrapped fetch
	pub fn inner(&self) -> &F {
		&self.inner
	}

	fn observe(&self, mut response: FetchResponse) -> FetchResponse {
		response.body = match response.body {
			FetchBody::Full(bytes) => {
				if is_json_type(&response.headers) {
					match self.sync.ingest_json_body(&bytes) {
						Ok(applied) if applied > 0 => {
							tracing::debug!(applied, "state synced from navigation response");
						}
						Ok(_) => {}
						Err(error) => {
							tracing::warn!(%error, "navigation state ignored");
						}
					}
				}
				FetchBody::Full(bytes)
			}
			FetchBody::Stream(stream) => FetchBody::Stream(scan_stream(stream, self.sync.clone())),
		};
		response
	}
}

#[cfg_attr(not(target_family = "wasm"), async_trait)]
#[cfg_attr(target_family = "wasm", async_trait(?Send))]
impl<F: Fetch> Fetch for InterceptingFetch<F> {
	async fn fetch(&self, request: FetchRequest) -> Result<FetchResponse> {
		if !self.matcher.matches(&request) {
			return self.inner.fetch(request).await;
		}
		let response = self.inner.fetch(request).await?;
		Ok(self.observe(response))
	}
}

fn is_json_type(headers: &HeaderMap) -> bool {
	headers
		.get(CONTENT_TYPE)
		.and_then(|v| v.to_str().ok())
		.and_then(|ct| ct.split(';').next())
		.map(|essence| {
			let essence = essence.trim().to_ascii_lowercase();
			essence == "application/json" || essence.ends_with("+json")
		})
		.unwrap_or(false)
}

fn scan_stream(stream: ByteStream, sync: ClientSync) -> ByteStream {
	let mut scanner = SideChannelScanner::new();
	stream
		.map(move |chunk| {
			if let Ok(bytes) = &chunk {
				let scanned = scanner.feed(bytes);
				if let Some(error) = scanned.overflow {
					tracing::warn!(%error, "streamed navigation state ignored");
				}
				for object in scanned.objects {
					if let Err(error) = sync.ingest_side_channel(&object) {
						tracing::warn!(%error, "streamed navigation state ignored");
					}
				}
			}
			chunk
		})
		.boxed()
}

#[cfg(test)]
mod tests {
	use super::*;
	use rstest::rstest;

	#[rstest]
	#[case(FetchRequest::get("/blog/__data.json"), true)]
	#[case(FetchRequest::get("/blog/__data.json?x-sveltekit-invalidated=01"), true)]
	#[case(FetchRequest::get("/blog").with_header(NAVIGATION_HEADER, "1"), true)]
	#[case(FetchRequest::get("/blog").as_navigation(), true)]
	#[case(FetchRequest::get("/api/blog"), false)]
	#[case(FetchRequest::get("/blog#__data.json"), false)]
	fn test_navigation_matcher(#[case] request: FetchRequest, #[case] expected: bool) {
		assert_eq!(NavigationMatcher::default().matches(&request), expected);
	}

	#[rstest]
	#[case(Some("post"), None, Method::POST, false)]
	#[case(None, Some("1"), Method::GET, true)]
	#[case(Some("not a method"), None, Method::GET, false)]
	fn test_described_request(
		#[case] method: Option<&str>,
		#[case] navigation_header: Option<&str>,
		#[case] expected_method: Method,
		#[case] expected_match: bool,
	) {
		// Act
		let request = FetchRequest::described(method, "/blog", |name| {
			(name == NAVIGATION_HEADER)
				.then_some(navigation_header)
				.flatten()
				.map(str::to_string)
		});

		// Assert
		assert_eq!(request.method, expected_method);
		assert_eq!(NavigationMatcher::default().matches(&request), expected_match);
	}

	#[rstest]
	#[case("application/json", true)]
	#[case("application/json; charset=utf-8", true)]
	#[case("application/vnd.api+json", true)]
	#[case("text/html", false)]
	fn test_is_json(#[case] content_type: &str, #[case] expected: bool) {
		assert_eq!(FetchResponse::full(content_type, "").is_json(), expected);
	}
}
