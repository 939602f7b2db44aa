//! Pushes server-sent state into the browser's hydration table.

use std::sync::Arc;

use edges_state::{
	HydrationStore, StateError, StateValue, decode_side_channel, extract_side_channel,
	parse_script_payload,
};

use crate::error::Result;

/// Applies decoded payloads to a [`HydrationStore`].
///
/// A payload is decoded completely before anything is written, so a
/// malformed payload leaves the store untouched.
#[derive(Debug, Clone)]
pub struct ClientSync {
	store: Arc<HydrationStore>,
}

impl Default for ClientSync {
	fn default() -> Self {
		Self::new()
	}
}

impl ClientSync {
	/// Syncs into the page session's global store.
	pub fn new() -> Self {
		Self::with_store(HydrationStore::global())
	}

	/// Syncs into `store`.
	pub fn with_store(store: Arc<HydrationStore>) -> Self {
		Self { store }
	}

	/// The target store
	pub fn store(&self) -> &Arc<HydrationStore> {
		&self.store
	}

	/// Applies the entries of a state script. Returns how many were applied.
	pub fn ingest_script(&self, text: &str) -> Result<usize> {
		let entries = parse_script_payload(text)?;
		Ok(self.apply(entries))
	}

	/// Applies the side channel of a complete JSON body, if it has one.
	pub fn ingest_json_body(&self, body: &[u8]) -> Result<usize> {
		match extract_side_channel(body)? {
			Some(entries) => Ok(self.apply(entries)),
			None => Ok(0),
		}
	}

	/// Applies a side-channel object cut out of a stream.
	pub fn ingest_side_channel(&self, slice: &[u8]) -> Result<usize> {
		let channel: serde_json::Value = serde_json::from_slice(slice)
			.map_err(|e| StateError::ParseFailure(e.to_string()))?;
		let entries = decode_side_channel(&channel)?;
		Ok(self.apply(entries))
	}

	fn apply(&self, entries: Vec<(String, StateValue)>) -> usize {
		self.store.apply(entries)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use edges_state::{SerializeOptions, serialize};
	use rstest::rstest;

	fn isolated() -> ClientSync {
		ClientSync::with_store(Arc::new(HydrationStore::new()))
	}

	#[rstest]
	fn test_ingest_script() {
		// Arrange
		let sync = isolated();
		let server = HydrationStore::new();
		server.write("count::state::0", StateValue::from(5i64));
		let script = serialize(&server.snapshot(), &SerializeOptions::compressed(0)).unwrap();

		// Act
		let applied = sync.ingest_script(&script).unwrap();

		// Assert
		assert_eq!(applied, 1);
		assert_eq!(sync.store().get("count::state::0"), Some(StateValue::from(5i64)));
	}

	#[rstest]
	fn test_malformed_script_leaves_store_untouched() {
		let sync = isolated();
		let text = "e(\"a::state::0\",\"1\");\ne(\"b::state::0\",\"{\");";

		let result = sync.ingest_script(text);

		assert!(result.is_err());
		assert!(sync.store().is_empty());
	}

	#[rstest]
	fn test_ingest_side_channel_slice() {
		let sync = isolated();

		let applied = sync
			.ingest_side_channel(br#"{"user::rawstate::0":"{\"theme\":{\"__EDGES_UNDEFINED__\":true}}"}"#)
			.unwrap();

		assert_eq!(applied, 1);
		let user = sync.store().get("user::rawstate::0").unwrap();
		assert_eq!(user.get("theme"), Some(&StateValue::Undefined));
	}

	#[rstest]
	fn test_json_body_without_channel() {
		let sync = isolated();

		assert_eq!(sync.ingest_json_body(br#"{"data":1}"#).unwrap(), 0);
	}
}
