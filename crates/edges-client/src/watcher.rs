//! Applies state scripts as they appear in the document.

use std::sync::atomic::{AtomicUsize, Ordering};

use edges_state::SCRIPT_MARKER;

use crate::error::Result;
use crate::sync::ClientSync;

/// Attribute set on a script element once its payload has been applied.
pub const APPLIED_MARKER: &str = "data-edges-applied";

/// Ingests marked state scripts.
///
/// Every payload handed in is applied, even one whose text matches an
/// earlier payload: a later render that re-sends a server value must win
/// over a client write made in between. Telling an already handled element
/// apart from a new one is the caller's job; the DOM glue tags handled
/// elements with [`APPLIED_MARKER`].
#[derive(Debug, Default)]
pub struct ScriptWatcher {
	sync: ClientSync,
	applied: AtomicUsize,
}

impl ScriptWatcher {
	/// Watcher that applies payloads through `sync`.
	pub fn new(sync: ClientSync) -> Self {
		Self {
			sync,
			applied: AtomicUsize::new(0),
		}
	}

	/// The sync target
	pub fn sync(&self) -> &ClientSync {
		&self.sync
	}

	/// Handles one `<script>` element.
	///
	/// Scripts without the marker attribute yield `Ok(0)`. A malformed
	/// payload is logged and leaves the store untouched.
	pub fn on_script(&self, marked: bool, text: &str) -> Result<usize> {
		if !marked {
			return Ok(0);
		}
		let applied = self.sync.ingest_script(text).inspect_err(|error| {
			tracing::warn!(%error, "state script ignored");
		})?;
		self.applied.fetch_add(1, Ordering::Relaxed);
		Ok(applied)
	}

	/// Handles every marked script in an HTML fragment, in document order.
	///
	/// Returns the total number of entries applied. Malformed scripts are
	/// skipped.
	pub fn on_html(&self, html: &str) -> usize {
		state_scripts(html)
			.into_iter()
			.filter_map(|text| self.on_script(true, text).ok())
			.sum()
	}

	/// Number of scripts applied so far.
	pub fn applied_count(&self) -> usize {
		self.applied.load(Ordering::Relaxed)
	}
}

/// Bodies of the marked `<script>` elements in `html`.
pub fn state_scripts(html: &str) -> Vec<&str> {
	let mut scripts = Vec::new();
	let mut rest = html;
	while let Some(start) = rest.find("<script") {
		let after = &rest[start..];
		let Some(open_end) = after.find('>') else {
			break;
		};
		let open_tag = &after[..open_end];
		let body = &after[open_end + 1..];
		let Some(close) = body.find("</script>") else {
			break;
		};
		if has_marker(open_tag) {
			scripts.push(&body[..close]);
		}
		rest = &body[close + "</script>".len()..];
	}
	scripts
}

fn has_marker(open_tag: &str) -> bool {
	open_tag
		.split(|c: char| c.is_ascii_whitespace())
		.any(|attr| attr == SCRIPT_MARKER || attr.starts_with(&format!("{SCRIPT_MARKER}=")))
}
