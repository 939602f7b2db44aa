//! Document observation in the browser.
//!
//! Marked state scripts present at startup are applied immediately; scripts
//! added later (streamed HTML, client-side inserts) are picked up by a
//! `MutationObserver` on the whole document. Each handled element is tagged
//! with [`APPLIED_MARKER`] so re-observing it never applies it twice, while a
//! new element with the same text still is.

use std::sync::Arc;

use edges_state::{BrowserResolver, SCRIPT_MARKER, StateError};
use wasm_bindgen::JsCast;
use wasm_bindgen::prelude::*;
use web_sys::{Document, Element, MutationObserver, MutationObserverInit, MutationRecord, Node};

use crate::error::{ClientError, Result};
use crate::fetch::NavigationMatcher;
use crate::sync::ClientSync;
use crate::watcher::{APPLIED_MARKER, ScriptWatcher};
use crate::window::{FetchPatch, patch_fetch};

type MutationCallback = Closure<dyn FnMut(js_sys::Array, MutationObserver)>;

/// Keeps the observer alive. Dropping it disconnects.
pub struct DocumentObserver {
	observer: MutationObserver,
	_callback: MutationCallback,
	watcher: Arc<ScriptWatcher>,
}

impl DocumentObserver {
	/// The watcher fed by this observer
	pub fn watcher(&self) -> &Arc<ScriptWatcher> {
		&self.watcher
	}
}

impl Drop for DocumentObserver {
	fn drop(&mut self) {
		self.observer.disconnect();
	}
}

/// Everything [`start`] set up. Dropping it stops observing and restores
/// `window.fetch`.
pub struct Hydration {
	/// Document observer
	pub observer: DocumentObserver,
	/// Patched `window.fetch`
	pub fetch: FetchPatch,
}

/// Installs the browser context resolver, starts observing the document and
/// patches `window.fetch` for navigation responses.
///
/// Call once during app startup, before any cell is created.
pub fn start() -> Result<Hydration> {
	match edges_state::install(BrowserResolver) {
		Ok(()) | Err(StateError::AlreadyInstalled) => {}
		Err(error) => return Err(error.into()),
	}
	let sync = ClientSync::new();
	let observer = observe_document(Arc::new(ScriptWatcher::new(sync.clone())))?;
	let fetch = patch_fetch(sync, NavigationMatcher::default())?;
	Ok(Hydration { observer, fetch })
}

/// Applies existing state scripts and watches for new ones.
pub fn observe_document(watcher: Arc<ScriptWatcher>) -> Result<DocumentObserver> {
	let document = web_sys::window()
		.and_then(|window| window.document())
		.ok_or_else(|| ClientError::Dom("no document".into()))?;
	let root = document
		.document_element()
		.ok_or_else(|| ClientError::Dom("document has no root element".into()))?;

	scan(&document, &watcher);

	let callback_watcher = Arc::clone(&watcher);
	let callback: MutationCallback = Closure::new(move |records: js_sys::Array, _: MutationObserver| {
		for record in records.iter() {
			let Ok(record) = record.dyn_into::<MutationRecord>() else {
				continue;
			};
			let added = record.added_nodes();
			for i in 0..added.length() {
				if let Some(node) = added.item(i) {
					visit(&node, &callback_watcher);
				}
			}
		}
	});

	let observer = MutationObserver::new(callback.as_ref().unchecked_ref()).map_err(js_error)?;
	let init = MutationObserverInit::new();
	init.set_child_list(true);
	init.set_subtree(true);
	observer
		.observe_with_options(&root, &init)
		.map_err(js_error)?;
	tracing::debug!(applied = watcher.applied_count(), "observing document for state scripts");

	Ok(DocumentObserver {
		observer,
		_callback: callback,
		watcher,
	})
}

fn scan(document: &Document, watcher: &ScriptWatcher) {
	let selector = format!("script[{SCRIPT_MARKER}]");
	let Ok(scripts) = document.query_selector_all(&selector) else {
		return;
	};
	for i in 0..scripts.length() {
		if let Some(element) = scripts.item(i).and_then(|n| n.dyn_into::<Element>().ok()) {
			ingest(&element, watcher);
		}
	}
}

fn visit(node: &Node, watcher: &ScriptWatcher) {
	let Some(element) = node.dyn_ref::<Element>() else {
		return;
	};
	if element.tag_name().eq_ignore_ascii_case("script") {
		ingest(element, watcher);
		return;
	}
	let selector = format!("script[{SCRIPT_MARKER}]");
	if let Ok(scripts) = element.query_selector_all(&selector) {
		for i in 0..scripts.length() {
			if let Some(script) = scripts.item(i).and_then(|n| n.dyn_into::<Element>().ok()) {
				ingest(&script, watcher);
			}
		}
	}
}

fn ingest(element: &Element, watcher: &ScriptWatcher) {
	if element.has_attribute(APPLIED_MARKER) {
		return;
	}
	let text = element.text_content().unwrap_or_default();
	// Failures are already logged by the watcher.
	if watcher
		.on_script(element.has_attribute(SCRIPT_MARKER), &text)
		.is_ok()
		&& let Err(error) = element.set_attribute(APPLIED_MARKER, "")
	{
		tracing::debug!(error = ?error, "could not tag applied state script");
	}
}

fn js_error(value: JsValue) -> ClientError {
	ClientError::Dom(format!("{value:?}"))
}
