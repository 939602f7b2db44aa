//! Request-scope middleware.
//!
//! For each request: answer the devtools probe early when configured, create
//! a fresh [`RequestContext`], run the rest of the chain inside it, then
//! write the accumulated state into the response.

use std::sync::Arc;

use async_trait::async_trait;
use edges_conf::{SettingsError, StateSettings};
use edges_http::{Handler, Middleware, Request, Response, Result};
use edges_state::{
	RequestContext, SerializeOptions, SerializedPayload, augment_json_body, inject_script, scope,
};

/// Path browsers probe for workspace integration.
pub const DEVTOOLS_PROBE_PATH: &str = "/.well-known/appspecific/com.chrome.devtools.json";

/// How a response body can carry state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyKind {
	/// `text/html`: gets a script block
	Html,
	/// `application/json` or any `+json` type: gets the side-channel field
	Json,
	/// Anything else passes through untouched
	Other,
}

impl BodyKind {
	/// Classifies a `Content-Type` header value.
	pub fn of(content_type: Option<&str>) -> Self {
		let Some(content_type) = content_type else {
			return Self::Other;
		};
		let essence = content_type
			.split(';')
			.next()
			.unwrap_or_default()
			.trim()
			.to_ascii_lowercase();
		if essence == "text/html" {
			Self::Html
		} else if essence == "application/json" || essence.ends_with("+json") {
			Self::Json
		} else {
			Self::Other
		}
	}
}

/// Establishes the per-request state scope.
///
/// # Examples
///
/// ```
/// use edges_http::{Handler, MiddlewareChain, Request, Response, Result};
/// use edges_middleware::StateMiddleware;
/// use edges_state::{Writable, create_provider};
/// use std::sync::Arc;
///
/// struct Counter;
///
/// #[async_trait::async_trait]
/// impl Handler for Counter {
///     async fn handle(&self, _request: Request) -> Result<Response> {
///         let count = create_provider("count", |scope| scope.create_state(|| 0i64))
///             .get()
///             .map_err(|e| edges_http::Error::Internal(e.to_string()))?;
///         count.set(5).map_err(|e| edges_http::Error::Internal(e.to_string()))?;
///         Ok(Response::ok().with_content_type("application/json").with_body(r#"{"message":"ok"}"#))
///     }
/// }
///
/// # tokio_test::block_on(async {
/// let chain = MiddlewareChain::new(Arc::new(Counter))
///     .with_middleware(Arc::new(StateMiddleware::default()));
/// let request = Request::builder().uri("/count").build().unwrap();
///
/// let response = chain.handle(request).await.unwrap();
/// assert_eq!(
///     &response.body[..],
///     br#"{"message":"ok","__edges_state__":{"count::state::0":"5"}}"#
/// );
/// # });
/// ```
#[derive(Debug, Clone)]
pub struct StateMiddleware {
	settings: StateSettings,
}

impl StateMiddleware {
	/// Creates the middleware and installs the task-local context resolver
	/// if no resolver is installed yet.
	pub fn new(settings: StateSettings) -> Self {
		edges_state::install_default();
		Self { settings }
	}

	/// Creates the middleware from `EDGES_*` environment variables.
	pub fn from_env() -> std::result::Result<Self, SettingsError> {
		Ok(Self::new(StateSettings::from_env()?))
	}

	/// Active settings
	pub fn settings(&self) -> &StateSettings {
		&self.settings
	}
}

impl Default for StateMiddleware {
	fn default() -> Self {
		Self::new(StateSettings::default())
	}
}

#[async_trait]
impl Middleware for StateMiddleware {
	async fn process(&self, request: Request, next: Arc<dyn Handler>) -> Result<Response> {
		handle_with_state(request, next, &self.settings).await
	}
}

/// Runs `next` inside a fresh request scope and attaches the resulting state.
///
/// The context is also placed in the request's extensions. Errors from
/// `next` propagate unchanged.
pub async fn handle_with_state(
	request: Request,
	next: Arc<dyn Handler>,
	settings: &StateSettings,
) -> Result<Response> {
	if settings.silence_devtools_probe && request.path() == DEVTOOLS_PROBE_PATH {
		tracing::debug!(path = DEVTOOLS_PROBE_PATH, "answered devtools probe");
		return Ok(Response::no_content());
	}

	let ctx = RequestContext::for_request();
	request.extensions.insert(ctx.clone());
	let response = scope(ctx.clone(), async move { next.handle(request).await }).await?;
	Ok(attach_state(response, &ctx, settings))
}

/// Writes the state of `ctx` into `response`.
///
/// HTML bodies get the script before `</body>`; JSON object bodies get the
/// side-channel field. `Content-Length` is rewritten whenever the body
/// changes. On any failure the response is returned as it was.
pub fn attach_state(mut response: Response, ctx: &RequestContext, settings: &StateSettings) -> Response {
	let kind = BodyKind::of(response.content_type());
	if kind == BodyKind::Other {
		return response;
	}
	let state = ctx.state();
	if state.is_empty() {
		return response;
	}

	let options = SerializeOptions {
		compress: settings.compress,
		threshold: settings.compress_threshold,
	};
	let payload = match SerializedPayload::encode(&state, &options) {
		Ok(payload) => payload,
		Err(error) => {
			tracing::warn!(%error, context = %ctx.id(), "state not attached");
			return response;
		}
	};

	match kind {
		BodyKind::Html => match std::str::from_utf8(&response.body) {
			Ok(html) => {
				let body = inject_script(html, &payload.to_script());
				response.replace_body(body);
			}
			Err(error) => {
				tracing::warn!(%error, context = %ctx.id(), "HTML body is not UTF-8; state not attached");
			}
		},
		BodyKind::Json => match augment_json_body(&response.body, &payload) {
			Ok(body) => response.replace_body(body),
			Err(error) => {
				tracing::warn!(%error, context = %ctx.id(), "state not attached");
			}
		},
		BodyKind::Other => {}
	}
	tracing::debug!(entries = payload.len(), context = %ctx.id(), "state attached");
	response
}
