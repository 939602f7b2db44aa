//! State transfer encoding.
//!
//! A request's state map leaves the server in one of two shapes:
//!
//! - an HTML `<script data-edges-state>` block inserted before `</body>`
//!   ([`SerializedPayload::to_script`], [`inject_script`]);
//! - a `__edges_state__` field added to a JSON body ([`augment_json_body`]).
//!
//! Both carry each value as wire JSON (see [`encode`]). In the script form an
//! entry longer than the threshold may additionally be base64-packed.

mod codec;
mod script;
mod side_channel;

pub use codec::{decode, encode, pack, unpack};
pub use script::{SCRIPT_MARKER, inject_script, parse_script_payload};
pub use side_channel::{SIDE_CHANNEL_FIELD, augment_json_body, decode_side_channel, extract_side_channel};

use indexmap::IndexMap;

use crate::error::Result;
use crate::value::StateValue;

/// Default packing threshold in bytes.
pub const DEFAULT_THRESHOLD: usize = 1024;

/// Packing behaviour for [`serialize`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SerializeOptions {
	/// Pack entries whose encoded length exceeds `threshold`.
	pub compress: bool,
	/// Encoded length, in bytes, above which an entry is packed.
	pub threshold: usize,
}

impl Default for SerializeOptions {
	fn default() -> Self {
		Self {
			compress: false,
			threshold: DEFAULT_THRESHOLD,
		}
	}
}

impl SerializeOptions {
	/// Options with packing enabled at `threshold`
	pub fn compressed(threshold: usize) -> Self {
		Self {
			compress: true,
			threshold,
		}
	}
}

/// One encoded state entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PayloadEntry {
	/// State key
	pub key: String,
	/// Wire JSON of the value
	pub encoded: String,
	/// Whether the script form carries this entry base64-packed
	pub packed: bool,
}

/// A state map encoded for transfer, in insertion order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SerializedPayload {
	entries: Vec<PayloadEntry>,
}

impl SerializedPayload {
	/// Encodes every entry of `state`.
	///
	/// # Errors
	///
	/// [`StateError::Encode`](crate::StateError::Encode) if a value cannot be
	/// rendered as JSON.
	pub fn encode(state: &IndexMap<String, StateValue>, options: &SerializeOptions) -> Result<Self> {
		let entries = state
			.iter()
			.map(|(key, value)| {
				let encoded = encode(value)?;
				let packed = options.compress && encoded.len() > options.threshold;
				Ok(PayloadEntry {
					key: key.clone(),
					encoded,
					packed,
				})
			})
			.collect::<Result<Vec<_>>>()?;
		Ok(Self { entries })
	}

	/// Entries in insertion order
	pub fn entries(&self) -> &[PayloadEntry] {
		&self.entries
	}

	/// Number of entries
	pub fn len(&self) -> usize {
		self.entries.len()
	}

	/// Whether there is nothing to transfer
	pub fn is_empty(&self) -> bool {
		self.entries.is_empty()
	}

	/// Renders the `<script>` block for HTML responses.
	pub fn to_script(&self) -> String {
		script::render(&self.entries)
	}
}

/// Encodes `state` and renders it as a script block.
///
/// # Examples
///
/// ```
/// use edges_state::{SerializeOptions, StateValue, parse_script_payload, serialize};
/// use indexmap::IndexMap;
///
/// let mut state = IndexMap::new();
/// state.insert("count::state::0".to_string(), StateValue::from(5i64));
///
/// let script = serialize(&state, &SerializeOptions::default()).unwrap();
/// let entries = parse_script_payload(&script).unwrap();
/// assert_eq!(entries, vec![("count::state::0".to_string(), StateValue::from(5i64))]);
/// ```
pub fn serialize(state: &IndexMap<String, StateValue>, options: &SerializeOptions) -> Result<String> {
	Ok(SerializedPayload::encode(state, options)?.to_script())
}

#[cfg(test)]
mod tests {
	use super::*;
	use rstest::rstest;

	fn state_of(entries: &[(&str, StateValue)]) -> IndexMap<String, StateValue> {
		entries
			.iter()
			.map(|(k, v)| (k.to_string(), v.clone()))
			.collect()
	}

	#[rstest]
	fn test_threshold_decides_packing() {
		// Arrange
		let long = "x".repeat(48);
		let state = state_of(&[
			("big::state::0", StateValue::from(long.as_str())),
			("small::state::0", StateValue::from(12345i64)),
		]);

		// Act
		let payload = SerializedPayload::encode(&state, &SerializeOptions::compressed(10)).unwrap();

		// Assert
		let entries = payload.entries();
		assert_eq!(entries[0].encoded.len(), 50);
		assert!(entries[0].packed);
		assert_eq!(entries[1].encoded.len(), 5);
		assert!(!entries[1].packed);
	}

	#[rstest]
	fn test_no_packing_without_compress() {
		let state = state_of(&[("big::state::0", StateValue::from("y".repeat(4096)))]);

		let payload = SerializedPayload::encode(&state, &SerializeOptions::default()).unwrap();

		assert!(!payload.entries()[0].packed);
	}

	#[rstest]
	fn test_entry_at_threshold_stays_literal() {
		let state = state_of(&[("k", StateValue::from("abcdefgh"))]);

		let payload = SerializedPayload::encode(&state, &SerializeOptions::compressed(10)).unwrap();

		assert_eq!(payload.entries()[0].encoded.len(), 10);
		assert!(!payload.entries()[0].packed);
	}

	#[rstest]
	fn test_insertion_order_is_kept() {
		let state = state_of(&[
			("b::state::0", StateValue::Null),
			("a::state::0", StateValue::Undefined),
		]);

		let payload = SerializedPayload::encode(&state, &SerializeOptions::default()).unwrap();
		let keys: Vec<&str> = payload.entries().iter().map(|e| e.key.as_str()).collect();

		assert_eq!(keys, vec!["b::state::0", "a::state::0"]);
	}
}
