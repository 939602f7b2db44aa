//! The page's own `fetch`, as a [`Fetch`] and as a patch point.
//!
//! [`WindowFetch`] performs requests through `window.fetch`, so it can sit
//! inside an [`InterceptingFetch`](crate::InterceptingFetch) like any other
//! transport. Routers that call the global `fetch` directly are covered by
//! [`patch_fetch`], which swaps `window.fetch` for a wrapper that applies the
//! side channel of navigation responses before handing them back.

use async_trait::async_trait;
use bytes::Bytes;
use hyper::header::{HeaderName, HeaderValue};
use hyper::{HeaderMap, StatusCode};
use js_sys::{Function, Promise, Reflect, Uint8Array};
use wasm_bindgen::JsCast;
use wasm_bindgen::prelude::*;
use wasm_bindgen_futures::{JsFuture, future_to_promise};
use web_sys::{Headers, RequestInit, Window};

use crate::error::{ClientError, Result};
use crate::fetch::{Fetch, FetchBody, FetchRequest, FetchResponse, NavigationMatcher};
use crate::sync::ClientSync;

type FetchWrapper = Closure<dyn Fn(JsValue, JsValue) -> Promise>;

/// Performs requests with `window.fetch`.
///
/// Bodies are read whole.
#[derive(Debug, Default, Clone, Copy)]
pub struct WindowFetch;

#[async_trait(?Send)]
impl Fetch for WindowFetch {
	async fn fetch(&self, request: FetchRequest) -> Result<FetchResponse> {
		let window = window()?;
		let init = RequestInit::new();
		init.set_method(request.method.as_str());
		let headers = Headers::new().map_err(fetch_error)?;
		for (name, value) in &request.headers {
			if let Ok(value) = value.to_str() {
				headers.append(name.as_str(), value).map_err(fetch_error)?;
			}
		}
		init.set_headers(&headers);
		if !request.body.is_empty() {
			init.set_body(&Uint8Array::from(request.body.as_ref()));
		}
		let js_request =
			web_sys::Request::new_with_str_and_init(&request.url, &init).map_err(fetch_error)?;

		let value = JsFuture::from(window.fetch_with_request(&js_request))
			.await
			.map_err(fetch_error)?;
		let js_response: web_sys::Response = value.dyn_into().map_err(fetch_error)?;
		let status = StatusCode::from_u16(js_response.status())
			.map_err(|e| ClientError::Fetch(e.to_string()))?;
		let headers = header_map(&js_response.headers());
		let buffer = JsFuture::from(js_response.array_buffer().map_err(fetch_error)?)
			.await
			.map_err(fetch_error)?;

		Ok(FetchResponse {
			status,
			headers,
			body: FetchBody::Full(Bytes::from(Uint8Array::new(&buffer).to_vec())),
		})
	}
}

/// Restores the original `window.fetch` when dropped.
pub struct FetchPatch {
	window: Window,
	original: Function,
	_wrapper: FetchWrapper,
}

impl FetchPatch {
	/// The `fetch` that was installed before the patch
	pub fn original(&self) -> &Function {
		&self.original
	}
}

impl Drop for FetchPatch {
	fn drop(&mut self) {
		if let Err(error) = Reflect::set(&self.window, &JsValue::from_str("fetch"), &self.original) {
			tracing::warn!(error = ?error, "could not restore window.fetch");
		}
	}
}

/// Replaces `window.fetch` with a wrapper that syncs navigation responses.
///
/// Requests `matcher` accepts have their JSON response cloned and read; the
/// side channel lands in `sync`'s store before the page sees the response.
/// The page always gets the original response object back, body unread.
/// Every other request goes straight to the original `fetch`.
pub fn patch_fetch(sync: ClientSync, matcher: NavigationMatcher) -> Result<FetchPatch> {
	let window = window()?;
	let original: Function = Reflect::get(&window, &JsValue::from_str("fetch"))
		.map_err(fetch_error)?
		.dyn_into()
		.map_err(fetch_error)?;

	let target = original.clone();
	let this = window.clone();
	let wrapper: FetchWrapper = Closure::new(move |input: JsValue, init: JsValue| {
		let pending = match target.call2(&this, &input, &init) {
			Ok(value) => Promise::resolve(&value),
			Err(error) => return Promise::reject(&error),
		};
		if !matcher.matches(&describe(&input, &init)) {
			return pending;
		}
		let sync = sync.clone();
		future_to_promise(async move {
			let value = JsFuture::from(pending).await?;
			if let Some(response) = value.dyn_ref::<web_sys::Response>() {
				sync_response(response, &sync).await;
			}
			Ok(value)
		})
	});

	Reflect::set(&window, &JsValue::from_str("fetch"), wrapper.as_ref()).map_err(fetch_error)?;
	tracing::debug!("window.fetch patched for navigation state");

	Ok(FetchPatch {
		window,
		original,
		_wrapper: wrapper,
	})
}

async fn sync_response(response: &web_sys::Response, sync: &ClientSync) {
	let json = response
		.headers()
		.get("content-type")
		.ok()
		.flatten()
		.is_some_and(|ct| {
			let essence = ct.split(';').next().unwrap_or_default().trim().to_ascii_lowercase();
			essence == "application/json" || essence.ends_with("+json")
		});
	if !json {
		return;
	}
	let Ok(copy) = response.clone() else {
		return;
	};
	let Ok(text) = copy.text() else {
		return;
	};
	let text = match JsFuture::from(text).await {
		Ok(text) => text.as_string().unwrap_or_default(),
		Err(error) => {
			tracing::warn!(error = ?error, "navigation response body unreadable");
			return;
		}
	};
	match sync.ingest_json_body(text.as_bytes()) {
		Ok(applied) if applied > 0 => {
			tracing::debug!(applied, "state synced from patched fetch");
		}
		Ok(_) => {}
		Err(error) => tracing::warn!(%error, "navigation state ignored"),
	}
}

/// Classifies what the page passed to `fetch(input, init)`.
fn describe(input: &JsValue, init: &JsValue) -> FetchRequest {
	let request = input.dyn_ref::<web_sys::Request>();
	let url = match request {
		Some(request) => request.url(),
		None => input
			.as_string()
			.or_else(|| input.dyn_ref::<js_sys::Object>().map(|o| String::from(o.to_string())))
			.unwrap_or_default(),
	};
	let method = init_field(init, "method")
		.and_then(|m| m.as_string())
		.or_else(|| request.map(|r| r.method()));
	let init_headers = init_field(init, "headers");

	FetchRequest::described(method.as_deref(), url, |name| {
		init_headers
			.as_ref()
			.and_then(|headers| header_value(headers, name))
			.or_else(|| request.and_then(|r| r.headers().get(name).ok().flatten()))
	})
}

fn init_field(init: &JsValue, field: &str) -> Option<JsValue> {
	if !init.is_object() {
		return None;
	}
	Reflect::get(init, &JsValue::from_str(field))
		.ok()
		.filter(|value| !value.is_undefined() && !value.is_null())
}

fn header_value(headers: &JsValue, name: &str) -> Option<String> {
	if let Some(headers) = headers.dyn_ref::<Headers>() {
		return headers.get(name).ok().flatten();
	}
	Reflect::get(headers, &JsValue::from_str(name))
		.ok()
		.and_then(|value| value.as_string())
}

fn header_map(headers: &Headers) -> HeaderMap {
	let mut map = HeaderMap::new();
	let Ok(Some(entries)) = js_sys::try_iter(headers) else {
		return map;
	};
	for entry in entries.flatten() {
		let pair = js_sys::Array::from(&entry);
		if let (Some(name), Some(value)) = (pair.get(0).as_string(), pair.get(1).as_string())
			&& let (Ok(name), Ok(value)) = (
				HeaderName::from_bytes(name.as_bytes()),
				HeaderValue::from_str(&value),
			) {
			map.append(name, value);
		}
	}
	map
}

fn window() -> Result<Window> {
	web_sys::window().ok_or_else(|| ClientError::Fetch("no window".into()))
}

fn fetch_error(value: JsValue) -> ClientError {
	ClientError::Fetch(format!("{value:?}"))
}
