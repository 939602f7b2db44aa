//! Server render to browser rehydration, through the public facade.

use std::sync::Arc;

use async_trait::async_trait;
use edges::client::{ClientSync, FetchRequest, FetchResponse, ScriptWatcher};
use edges::http::{Error, Handler, MiddlewareChain, Request, Response, Result};
use edges::prelude::*;
use edges::state::{Namespace, create_raw_state_in, create_state_in, reset_browser_session};
use rstest::rstest;
use serial_test::serial;

fn internal(error: StateError) -> Error {
	Error::Internal(error.to_string())
}

struct Profile;

#[async_trait]
impl Handler for Profile {
	async fn handle(&self, request: Request) -> Result<Response> {
		let visits = create_provider("visits", |scope| scope.create_state(|| 0i64))
			.get()
			.map_err(internal)?;
		visits.update(|v| v + 3).map_err(internal)?;
		let theme = create_provider("theme", |scope| {
			scope.create_raw_state(|| StateValue::object([("mode", StateValue::Undefined)]))
		})
		.get()
		.map_err(internal)?;
		theme.get().map_err(internal)?;

		if request.path().ends_with("__data.json") {
			Response::ok().with_json(&serde_json::json!({"type": "data"}))
		} else {
			Ok(Response::ok()
				.with_content_type("text/html")
				.with_body("<html><body><p>profile</p></body></html>"))
		}
	}
}

async fn render(path: &str) -> Response {
	let chain = MiddlewareChain::new(Arc::new(Profile))
		.with_middleware(Arc::new(StateMiddleware::new(StateSettings::default())));
	chain
		.handle(Request::builder().uri(path).build().unwrap())
		.await
		.unwrap()
}

#[rstest]
#[serial]
#[tokio::test]
async fn test_html_state_rehydrates_browser_cells() {
	// Arrange
	reset_browser_session();
	let response = render("/profile").await;
	let html = String::from_utf8(response.body.to_vec()).unwrap();

	// Act
	let applied = ScriptWatcher::new(ClientSync::new()).on_html(&html);
	let browser = RequestContext::browser();
	let visits = create_state_in(&browser, &Namespace::new("visits"), None, || 0i64).unwrap();
	let theme = create_raw_state_in(&browser, &Namespace::new("theme"), None, || StateValue::Null).unwrap();

	// Assert
	assert_eq!(applied, 2);
	assert_eq!(visits.get().unwrap(), 3);
	assert_eq!(theme.get().unwrap().get("mode"), Some(&StateValue::Undefined));
}

#[rstest]
#[serial]
#[tokio::test]
async fn test_navigation_json_reaches_browser_cells() {
	// Arrange
	reset_browser_session();
	let browser = RequestContext::browser();
	let visits = create_state_in(&browser, &Namespace::new("visits"), None, || 0i64).unwrap();
	let response = render("/profile/__data.json").await;
	let body = response.body.clone();
	let fetch = edges::client::InterceptingFetch::new(Served(body.to_vec()));

	// Act
	let response = edges::client::Fetch::fetch(&fetch, FetchRequest::get("/profile/__data.json"))
		.await
		.unwrap();

	// Assert
	assert_eq!(response.bytes().await.unwrap(), body);
	assert_eq!(visits.get().unwrap(), 3);
}

/// Replays a body the server already produced.
struct Served(Vec<u8>);

#[async_trait]
impl edges::client::Fetch for Served {
	async fn fetch(&self, _request: FetchRequest) -> edges::client::Result<FetchResponse> {
		Ok(FetchResponse::full("application/json", self.0.clone()))
	}
}
